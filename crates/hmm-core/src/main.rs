use std::io::Write as _;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use hmm_core::config::Config;
use hmm_core::embedding::HttpEmbeddingClient;
use hmm_core::llm::HttpLlmClient;
use hmm_core::memory::MemoryDb;
use hmm_core::token_counter::TokenCounter;
use hmm_core::{Agent, AgentStatus};

#[derive(Parser)]
#[command(name = "hmm", about = "Hierarchical memory manager for LLM agents")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run an interactive session against one agent.
    Run {
        /// Agent identity; a fresh one is generated if omitted.
        #[arg(long)]
        agent_id: Option<Uuid>,
        #[arg(long)]
        model: Option<String>,
        #[arg(long)]
        max_tokens: Option<u32>,
        /// Accepted for interface compatibility; folded into DATABASE_URL,
        /// since recall and archival storage share one PostgreSQL database.
        #[arg(long)]
        db_path: Option<String>,
        #[arg(long)]
        archival_path: Option<String>,
        #[arg(long)]
        api_key: Option<String>,
    },
    /// Batch-import a JSON transcript file into recall + archival storage.
    Ingest {
        path: std::path::PathBuf,
        #[arg(long)]
        api_key: Option<String>,
    },
}

fn embed_migrations(database_url: &str) -> Result<()> {
    use diesel::prelude::*;
    use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
    pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

    let mut conn = diesel::PgConnection::establish(database_url)
        .with_context(|| format!("failed to connect to {database_url}"))?;
    conn.run_pending_migrations(MIGRATIONS)
        .map_err(|e| anyhow::anyhow!("migration failed: {e}"))?;
    Ok(())
}

fn build_agent(config: &Config, api_key_override: Option<String>, agent_id: Uuid) -> Result<Agent> {
    let db = MemoryDb::new(&config.database_url)?;
    db.agents().ensure_agent_exists(agent_id, &agent_id.to_string())?;

    let llm_key = api_key_override.clone().or_else(|| config.llm_api_key.clone());
    let llm = Arc::new(HttpLlmClient::new(&config.llm_api_url, llm_key, &config.model));

    let embedding_key = api_key_override.or_else(|| config.embedding_api_key.clone());
    let embedding = Arc::new(HttpEmbeddingClient::new(
        &config.embedding_api_url,
        embedding_key,
        &config.embedding_model,
        1536,
    ));

    let counter = TokenCounter::for_model(&config.model);

    Ok(Agent::new(
        agent_id,
        db,
        llm,
        embedding,
        config.max_tokens,
        config.warning_threshold,
        config.flush_threshold,
        config.page_size,
        config.max_iterations,
        counter,
    )?)
}

const HELP_TEXT: &str = "\
/help    show this message
/status  show queue usage and iteration settings
/memory  render the working context
/reset   clear the queue (summary and recent turns), keeping working context
/quit    exit";

async fn run_session(
    config: Config,
    agent_id: Option<Uuid>,
    model: Option<String>,
    max_tokens: Option<u32>,
    api_key: Option<String>,
) -> Result<()> {
    let mut config = config;
    if let Some(model) = model {
        config.model = model;
    }
    if let Some(max_tokens) = max_tokens {
        config.max_tokens = max_tokens;
    }

    let agent_id = agent_id.unwrap_or_else(Uuid::new_v4);
    let mut agent = build_agent(&config, api_key, agent_id)?;

    println!("hmm agent {agent_id} ready. Type /help for commands.");
    let stdin = std::io::stdin();

    loop {
        print!("> ");
        std::io::stdout().flush().ok();
        let mut line = String::new();
        if stdin.read_line(&mut line)? == 0 {
            break;
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match line {
            "/help" => {
                println!("{HELP_TEXT}");
                continue;
            }
            "/quit" => break,
            "/status" => {
                println!(
                    "model={} max_tokens={} warning={:.2} flush={:.2} max_iterations={}",
                    config.model, config.max_tokens, config.warning_threshold, config.flush_threshold, config.max_iterations
                );
                continue;
            }
            "/memory" => {
                println!("{}", agent.working_context().render());
                continue;
            }
            "/reset" => {
                agent.reset_queue();
                println!("queue cleared");
                continue;
            }
            _ => {}
        }

        match agent.chat(Some(line)).await {
            Ok(outcome) => match outcome.status {
                AgentStatus::Success => println!("{}", outcome.message.unwrap_or_default()),
                AgentStatus::NoMessage => {
                    warn!("agent finished without a send_message call");
                    if let Some(thought) = outcome.thought {
                        println!("(no reply; last thought: {thought})");
                    }
                }
                AgentStatus::MaxIterations => {
                    warn!(iterations = outcome.iterations, "hit the iteration cap");
                    println!("(gave up after {} tool-call iterations)", outcome.iterations);
                }
                AgentStatus::Error => {
                    println!("error: {}", outcome.message.unwrap_or_default());
                }
            },
            Err(e) => println!("error: {e}"),
        }
    }

    Ok(())
}

async fn run_ingest(config: Config, path: std::path::PathBuf, api_key: Option<String>) -> Result<()> {
    let db = MemoryDb::new(&config.database_url)?;
    let embedding_key = api_key.or_else(|| config.embedding_api_key.clone());
    let embedding = Arc::new(HttpEmbeddingClient::new(
        &config.embedding_api_url,
        embedding_key,
        &config.embedding_model,
        1536,
    ));

    let raw = std::fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))?;
    let data: serde_json::Value = serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))?;

    let ingester = hmm_core::ingest::Ingester::new(db, embedding);
    let report = ingester.ingest(&data).await?;
    info!(
        conversations = report.conversations,
        sessions = report.sessions,
        messages = report.messages,
        "ingestion complete"
    );
    println!(
        "ingested {} conversation(s), {} session(s), {} message(s)",
        report.conversations, report.sessions, report.messages
    );
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "hmm_core=info,hmm=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    embed_migrations(&config.database_url)?;
    info!("database migrations applied");

    let cli = Cli::parse();
    match cli.command {
        Command::Run { agent_id, model, max_tokens, db_path, archival_path, api_key } => {
            if db_path.is_some() || archival_path.is_some() {
                warn!("--db-path/--archival-path are accepted for interface compatibility; this backend stores everything in DATABASE_URL");
            }
            run_session(config, agent_id, model, max_tokens, api_key).await
        }
        Command::Ingest { path, api_key } => run_ingest(config, path, api_key).await,
    }
}
