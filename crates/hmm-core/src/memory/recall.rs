//! Recall store (C2): durable, append-only message log with substring search.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::db::{MemoryDb, MessageRow, NewMessage};
use crate::error::HmmResult;

#[derive(Debug, Clone)]
pub struct RecallRecord {
    pub id: i64,
    pub role: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub summary_id: Option<i64>,
    pub metadata: Option<serde_json::Value>,
}

impl From<MessageRow> for RecallRecord {
    fn from(row: MessageRow) -> Self {
        Self {
            id: row.id,
            role: row.role,
            content: row.content,
            timestamp: row.timestamp,
            summary_id: row.summary_id,
            metadata: row.metadata,
        }
    }
}

/// Append-only conversation log for one agent, backed by the `messages` table.
#[derive(Clone)]
pub struct RecallStore {
    agent_id: Uuid,
    db: MemoryDb,
}

impl RecallStore {
    pub fn new(agent_id: Uuid, db: MemoryDb) -> Self {
        Self { agent_id, db }
    }

    pub fn insert(
        &self,
        role: &str,
        content: &str,
        timestamp: Option<DateTime<Utc>>,
        summary_id: Option<i64>,
        metadata: Option<serde_json::Value>,
    ) -> HmmResult<i64> {
        let row = self.db.messages().insert(NewMessage {
            agent_id: self.agent_id,
            role,
            content,
            timestamp: timestamp.unwrap_or_else(Utc::now),
            summary_id,
            metadata,
        })?;
        Ok(row.id)
    }

    /// Substring search over `content`, newest first.
    pub fn search(&self, query: &str, limit: u32, offset: u32) -> HmmResult<Vec<RecallRecord>> {
        Ok(self
            .db
            .messages()
            .search(self.agent_id, query, limit as i64, offset as i64)?
            .into_iter()
            .map(RecallRecord::from)
            .collect())
    }

    /// Most recent `limit` messages, chronological ascending.
    pub fn recent(&self, limit: u32) -> HmmResult<Vec<RecallRecord>> {
        Ok(self
            .db
            .messages()
            .recent(self.agent_id, limit as i64)?
            .into_iter()
            .map(RecallRecord::from)
            .collect())
    }

    /// Every record, chronological ascending.
    pub fn all(&self) -> HmmResult<Vec<RecallRecord>> {
        Ok(self
            .db
            .messages()
            .all(self.agent_id)?
            .into_iter()
            .map(RecallRecord::from)
            .collect())
    }

    pub fn delete(&self, id: i64) -> HmmResult<bool> {
        self.db.messages().delete(self.agent_id, id)
    }

    pub fn clear(&self) -> HmmResult<()> {
        self.db.messages().clear(self.agent_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_from_row_preserves_fields() {
        let now = Utc::now();
        let row = MessageRow {
            id: 7,
            agent_id: Uuid::nil(),
            role: "user".to_string(),
            content: "hello".to_string(),
            timestamp: now,
            summary_id: Some(3),
            metadata: None,
        };
        let record = RecallRecord::from(row);
        assert_eq!(record.id, 7);
        assert_eq!(record.role, "user");
        assert_eq!(record.summary_id, Some(3));
    }

    // RecallStore itself requires a live Postgres connection via MemoryDb;
    // its ordering contract (search=DESC, recent/all=ASC) is exercised by
    // the ignored integration suite under tests/.
}
