//! Archival store (C3): durable documents with vector embeddings, searched
//! by cosine distance. The collection's embedding dimension is fixed at
//! construction time from the configured embedding client and checked
//! against every insert.

use std::sync::Arc;

use uuid::Uuid;

use super::db::{MemoryDb, PassageRow};
use crate::embedding::EmbeddingClient;
use crate::error::{HmmError, HmmResult};

#[derive(Debug, Clone)]
pub struct ArchivalDocument {
    pub id: Uuid,
    pub content: String,
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Clone)]
pub struct ArchivalSearchResult {
    pub document: ArchivalDocument,
    pub similarity: f64,
}

impl From<PassageRow> for ArchivalDocument {
    fn from(row: PassageRow) -> Self {
        Self {
            id: row.id,
            content: row.content,
            metadata: row.metadata,
        }
    }
}

/// Per-agent document store backed by the `passages` table.
#[derive(Clone)]
pub struct ArchivalStore {
    agent_id: Uuid,
    db: MemoryDb,
    embedding: Arc<dyn EmbeddingClient>,
    page_size: i64,
}

impl ArchivalStore {
    /// Pagination depth cap: requests whose `offset + limit` would require
    /// fetching more than `MAX_PAGES` pages of `page_size` results fail
    /// with `ContractViolation` rather than silently truncating.
    pub const MAX_PAGES: i64 = 20;

    pub fn new(agent_id: Uuid, db: MemoryDb, embedding: Arc<dyn EmbeddingClient>, page_size: u32) -> Self {
        Self {
            agent_id,
            db,
            embedding,
            page_size: page_size as i64,
        }
    }

    fn agent_key(&self) -> String {
        self.agent_id.to_string()
    }

    pub async fn insert(&self, content: &str, metadata: Option<serde_json::Value>) -> HmmResult<Uuid> {
        let vector = self.embedding.embed(content).await?;
        if vector.len() != self.embedding.dimension() {
            return Err(HmmError::ContractViolation(format!(
                "embedding client returned {} dimensions, expected {}",
                vector.len(),
                self.embedding.dimension()
            )));
        }
        Ok(self
            .db
            .passages()
            .insert(&self.agent_key(), content, &vector, metadata.as_ref())?)
    }

    /// Nearest `limit` documents at rank `[offset, offset+limit)`, ordered
    /// by descending similarity (`1 - cosine distance`).
    pub async fn search(&self, query: &str, limit: u32, offset: u32) -> HmmResult<Vec<ArchivalSearchResult>> {
        Self::check_pagination(self.page_size, limit, offset)?;
        let query_embedding = self.embedding.embed(query).await?;
        let rows = self.db.passages().search_by_embedding(
            &self.agent_key(),
            &query_embedding,
            limit as i64,
            offset as i64,
        )?;
        Ok(rows
            .into_iter()
            .map(|(row, distance)| ArchivalSearchResult {
                document: ArchivalDocument::from(row),
                similarity: 1.0 - distance,
            })
            .collect())
    }

    pub fn all(&self, limit: u32) -> HmmResult<Vec<ArchivalDocument>> {
        Ok(self
            .db
            .passages()
            .all(&self.agent_key(), limit as i64)?
            .into_iter()
            .map(ArchivalDocument::from)
            .collect())
    }

    pub fn count(&self) -> HmmResult<u64> {
        Ok(self.db.passages().count(&self.agent_key())? as u64)
    }

    pub fn delete(&self, id: Uuid) -> HmmResult<bool> {
        self.db.passages().delete(&self.agent_key(), id)
    }

    pub fn clear(&self) -> HmmResult<()> {
        self.db.passages().clear(&self.agent_key())
    }

    fn check_pagination(page_size: i64, limit: u32, offset: u32) -> HmmResult<()> {
        let depth = offset as i64 + limit as i64;
        if depth > page_size * Self::MAX_PAGES {
            return Err(HmmError::ContractViolation(format!(
                "search offset+limit ({depth}) exceeds pagination cap ({} pages of {page_size})",
                Self::MAX_PAGES,
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pagination_within_cap_is_allowed() {
        assert!(ArchivalStore::check_pagination(5, 5, 95).is_ok());
    }

    #[test]
    fn pagination_beyond_cap_is_rejected() {
        assert!(ArchivalStore::check_pagination(5, 5, 100).is_err());
    }
}
