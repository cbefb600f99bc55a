//! Hierarchical memory tiers: C2 recall (full history), C3 archival
//! (semantic document store), C4 working context (resident, editable
//! sections), C5 queue (token-budgeted window over C2/C1).
//!
//! Backed by PostgreSQL with pgvector via Diesel.

pub mod archival;
pub mod block;
pub mod db;
pub mod queue;
pub mod recall;

pub use archival::{ArchivalDocument, ArchivalSearchResult, ArchivalStore};
pub use block::{BlockError, WorkingContext};
pub use db::MemoryDb;
pub use queue::{QueueManager, QueueMessage, Summarizer};
pub use recall::{RecallRecord, RecallStore};
