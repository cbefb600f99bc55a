//! Error kinds shared across the memory system.
//!
//! `ContractViolation` is recoverable from the agent loop's point of view: it
//! is formatted and re-enters the queue as a tool result so the LLM can
//! correct itself. The other three kinds terminate the current turn.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum HmmError {
    #[error("{0}")]
    ContractViolation(String),

    #[error("storage error: {0}")]
    StorageError(#[from] diesel::result::Error),

    #[error("storage connection error: {0}")]
    ConnectionError(#[from] diesel::ConnectionError),

    #[error("model error: {0}")]
    ModelError(String),

    #[error("iteration budget exceeded")]
    BudgetExceeded,
}

impl From<reqwest::Error> for HmmError {
    fn from(e: reqwest::Error) -> Self {
        HmmError::ModelError(e.to_string())
    }
}

pub type HmmResult<T> = std::result::Result<T, HmmError>;
