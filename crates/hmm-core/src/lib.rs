//! Hierarchical Memory Manager core library.
//!
//! A memory-management layer for LLM agents: token counting, a durable
//! recall log, a semantic archival store, a resident working context, a
//! token-budgeted queue with recursive summarization, a tool executor, and
//! the agent loop that ties them together.

pub mod agent;
pub mod config;
pub mod embedding;
pub mod error;
pub mod ingest;
pub mod llm;
pub mod memory;
pub mod schema;
pub mod token_counter;
pub mod tools;

pub use agent::{Agent, AgentOutcome, AgentStatus};
pub use config::Config;
pub use embedding::{EmbeddingClient, HttpEmbeddingClient};
pub use error::{HmmError, HmmResult};
pub use llm::{HttpLlmClient, LlmClient};
pub use memory::{ArchivalStore, MemoryDb, QueueManager, RecallStore, WorkingContext};
pub use token_counter::TokenCounter;
pub use tools::{ToolCall, ToolExecutor};
