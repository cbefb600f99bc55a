//! Layered configuration: CLI flags override environment variables, which
//! override built-in defaults. `from_env()` reads the environment half;
//! `main.rs` overlays CLI flags on top of it before constructing the agent.

use anyhow::{Context, Result};

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,

    pub llm_api_url: String,
    pub llm_api_key: Option<String>,
    pub model: String,

    pub embedding_api_url: String,
    pub embedding_api_key: Option<String>,
    pub embedding_model: String,

    pub max_tokens: u32,
    pub warning_threshold: f32,
    pub flush_threshold: f32,
    pub page_size: u32,
    pub max_iterations: u32,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            database_url: std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?,

            llm_api_url: std::env::var("HMM_LLM_API_URL")
                .unwrap_or_else(|_| "https://api.openai.com/v1".to_string()),
            llm_api_key: std::env::var("HMM_API_KEY")
                .ok()
                .or_else(|| std::env::var("OPENAI_API_KEY").ok()),
            model: std::env::var("HMM_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string()),

            embedding_api_url: std::env::var("HMM_EMBEDDING_API_URL")
                .unwrap_or_else(|_| "https://api.openai.com/v1".to_string()),
            embedding_api_key: std::env::var("HMM_EMBEDDING_API_KEY")
                .ok()
                .or_else(|| std::env::var("OPENAI_API_KEY").ok()),
            embedding_model: std::env::var("HMM_EMBEDDING_MODEL")
                .unwrap_or_else(|_| "text-embedding-3-small".to_string()),

            max_tokens: std::env::var("HMM_MAX_TOKENS")
                .unwrap_or_else(|_| "8000".to_string())
                .parse()
                .context("HMM_MAX_TOKENS must be a valid integer")?,
            warning_threshold: std::env::var("HMM_WARNING_THRESHOLD")
                .unwrap_or_else(|_| "0.70".to_string())
                .parse()
                .context("HMM_WARNING_THRESHOLD must be a valid float")?,
            flush_threshold: std::env::var("HMM_FLUSH_THRESHOLD")
                .unwrap_or_else(|_| "0.95".to_string())
                .parse()
                .context("HMM_FLUSH_THRESHOLD must be a valid float")?,
            page_size: std::env::var("HMM_PAGE_SIZE")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .context("HMM_PAGE_SIZE must be a valid integer")?,
            max_iterations: std::env::var("HMM_MAX_ITERATIONS")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .context("HMM_MAX_ITERATIONS must be a valid integer")?,
        })
    }
}
