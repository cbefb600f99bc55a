//! Persistence layer for the memory system.
//!
//! Diesel-backed CRUD for agents, working-context blocks, recall messages,
//! and archival passages. Every value that originates from the LLM or from a
//! caller (content, metadata, embedding vectors) is bound as a query
//! parameter via `.bind::<Type, _>(...)`; none of it is ever interpolated
//! into SQL text.

#![allow(dead_code)]

use chrono::{DateTime, Utc};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::sql_types::{BigInt, Double, Nullable, Text, Uuid as DieselUuid};
use pgvector::{sql_types::Vector, Vector as PgVector};

use std::sync::{Arc, Mutex};
use uuid::Uuid;

use crate::error::HmmError;
use crate::schema::{agents, blocks, messages, passages};

type Result<T> = std::result::Result<T, HmmError>;

fn lock(conn: &Arc<Mutex<PgConnection>>) -> std::sync::MutexGuard<'_, PgConnection> {
    conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ============================================================================
// Agent operations
// ============================================================================

pub struct AgentDb {
    conn: Arc<Mutex<PgConnection>>,
}

impl AgentDb {
    pub fn new(conn: Arc<Mutex<PgConnection>>) -> Self {
        Self { conn }
    }

    /// Ensure an agent row exists, inserting it if absent. Required before any
    /// message/passage/block insert since those tables key off `agent_id`.
    pub fn ensure_agent_exists(&self, id: Uuid, name: &str) -> Result<()> {
        let mut conn = lock(&self.conn);

        diesel::insert_into(agents::table)
            .values((agents::id.eq(id), agents::name.eq(name)))
            .on_conflict(agents::id)
            .do_nothing()
            .execute(&mut *conn)?;

        Ok(())
    }
}

// ============================================================================
// Working-context block operations (C4)
// ============================================================================

#[derive(Queryable, Selectable, Debug, Clone)]
#[diesel(table_name = blocks)]
pub struct BlockRow {
    pub id: Uuid,
    pub agent_id: String,
    pub label: String,
    pub description: Option<String>,
    pub value: String,
    pub char_limit: i32,
    pub read_only: bool,
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Insertable)]
#[diesel(table_name = blocks)]
pub struct NewBlock<'a> {
    pub id: Uuid,
    pub agent_id: &'a str,
    pub label: &'a str,
    pub description: Option<&'a str>,
    pub value: &'a str,
    pub char_limit: i32,
    pub read_only: bool,
}

pub struct BlockDb {
    conn: Arc<Mutex<PgConnection>>,
}

impl BlockDb {
    pub fn new(conn: Arc<Mutex<PgConnection>>) -> Self {
        Self { conn }
    }

    pub fn load_blocks(&self, agent_id: &str) -> Result<Vec<BlockRow>> {
        let mut conn = lock(&self.conn);
        Ok(blocks::table
            .filter(blocks::agent_id.eq(agent_id))
            .select(BlockRow::as_select())
            .load(&mut *conn)?)
    }

    pub fn insert_block(&self, block: NewBlock) -> Result<BlockRow> {
        let mut conn = lock(&self.conn);
        Ok(diesel::insert_into(blocks::table)
            .values(&block)
            .get_result(&mut *conn)?)
    }

    pub fn update_block_value(&self, agent_id: &str, label: &str, value: &str) -> Result<BlockRow> {
        let mut conn = lock(&self.conn);
        Ok(diesel::update(blocks::table)
            .filter(blocks::agent_id.eq(agent_id))
            .filter(blocks::label.eq(label))
            .set((
                blocks::value.eq(value),
                blocks::version.eq(blocks::version + 1),
                blocks::updated_at.eq(diesel::dsl::now),
            ))
            .get_result(&mut *conn)?)
    }

    pub fn delete_block(&self, agent_id: &str, label: &str) -> Result<usize> {
        let mut conn = lock(&self.conn);
        Ok(diesel::delete(
            blocks::table
                .filter(blocks::agent_id.eq(agent_id))
                .filter(blocks::label.eq(label)),
        )
        .execute(&mut *conn)?)
    }
}

// ============================================================================
// Recall message operations (C2)
// ============================================================================

#[derive(Queryable, Selectable, Debug, Clone)]
#[diesel(table_name = messages)]
pub struct MessageRow {
    pub id: i64,
    pub agent_id: Uuid,
    pub role: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub summary_id: Option<i64>,
    pub metadata: Option<serde_json::Value>,
}

#[derive(Insertable)]
#[diesel(table_name = messages)]
pub struct NewMessage<'a> {
    pub agent_id: Uuid,
    pub role: &'a str,
    pub content: &'a str,
    pub timestamp: DateTime<Utc>,
    pub summary_id: Option<i64>,
    pub metadata: Option<serde_json::Value>,
}

pub struct MessageDb {
    conn: Arc<Mutex<PgConnection>>,
}

impl MessageDb {
    pub fn new(conn: Arc<Mutex<PgConnection>>) -> Self {
        Self { conn }
    }

    pub fn insert(&self, new_message: NewMessage) -> Result<MessageRow> {
        let mut conn = lock(&self.conn);
        Ok(diesel::insert_into(messages::table)
            .values(&new_message)
            .get_result(&mut *conn)?)
    }

    /// Substring search, newest first (by timestamp desc, id desc).
    pub fn search(
        &self,
        agent_id: Uuid,
        query: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<MessageRow>> {
        let mut conn = lock(&self.conn);
        let pattern = format!("%{}%", escape_like(query));
        Ok(messages::table
            .filter(messages::agent_id.eq(agent_id))
            .filter(messages::content.like(pattern))
            .order((messages::timestamp.desc(), messages::id.desc()))
            .limit(limit)
            .offset(offset)
            .select(MessageRow::as_select())
            .load(&mut *conn)?)
    }

    /// Most recent `limit` messages, returned oldest-first.
    pub fn recent(&self, agent_id: Uuid, limit: i64) -> Result<Vec<MessageRow>> {
        let mut conn = lock(&self.conn);
        let mut rows = messages::table
            .filter(messages::agent_id.eq(agent_id))
            .order((messages::timestamp.desc(), messages::id.desc()))
            .limit(limit)
            .select(MessageRow::as_select())
            .load(&mut *conn)?;
        rows.reverse();
        Ok(rows)
    }

    /// Every message for the agent, chronological ascending.
    pub fn all(&self, agent_id: Uuid) -> Result<Vec<MessageRow>> {
        let mut conn = lock(&self.conn);
        Ok(messages::table
            .filter(messages::agent_id.eq(agent_id))
            .order((messages::timestamp.asc(), messages::id.asc()))
            .select(MessageRow::as_select())
            .load(&mut *conn)?)
    }

    pub fn delete(&self, agent_id: Uuid, id: i64) -> Result<bool> {
        let mut conn = lock(&self.conn);
        let affected = diesel::delete(
            messages::table
                .filter(messages::agent_id.eq(agent_id))
                .filter(messages::id.eq(id)),
        )
        .execute(&mut *conn)?;
        Ok(affected > 0)
    }

    pub fn clear(&self, agent_id: Uuid) -> Result<()> {
        let mut conn = lock(&self.conn);
        diesel::delete(messages::table.filter(messages::agent_id.eq(agent_id)))
            .execute(&mut *conn)?;
        Ok(())
    }
}

/// Escape `%`, `_`, and `\` so user-supplied search text can't widen a LIKE
/// pattern beyond the literal substring the caller asked for.
fn escape_like(raw: &str) -> String {
    raw.replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

// ============================================================================
// Archival passage operations (C3)
// ============================================================================

#[derive(Debug, Clone)]
pub struct PassageRow {
    pub id: Uuid,
    pub agent_id: String,
    pub content: String,
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

#[derive(QueryableByName, Debug)]
struct PassageSearchRow {
    #[diesel(sql_type = DieselUuid)]
    id: Uuid,
    #[diesel(sql_type = Text)]
    agent_id: String,
    #[diesel(sql_type = Text)]
    content: String,
    #[diesel(sql_type = Nullable<Text>)]
    metadata: Option<String>,
    #[diesel(sql_type = diesel::sql_types::Timestamptz)]
    created_at: DateTime<Utc>,
    #[diesel(sql_type = Double)]
    distance: f64,
}

pub struct PassageDb {
    conn: Arc<Mutex<PgConnection>>,
}

impl PassageDb {
    pub fn new(conn: Arc<Mutex<PgConnection>>) -> Self {
        Self { conn }
    }

    pub fn count(&self, agent_id: &str) -> Result<i64> {
        let mut conn = lock(&self.conn);
        Ok(passages::table
            .filter(passages::agent_id.eq(agent_id))
            .count()
            .get_result(&mut *conn)?)
    }

    pub fn insert(
        &self,
        agent_id: &str,
        content: &str,
        embedding: &[f32],
        metadata: Option<&serde_json::Value>,
    ) -> Result<Uuid> {
        let mut conn = lock(&self.conn);
        let id = Uuid::new_v4();
        let vector = PgVector::from(embedding.to_vec());

        diesel::sql_query(
            "INSERT INTO passages (id, agent_id, content, embedding, metadata) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind::<DieselUuid, _>(id)
        .bind::<Text, _>(agent_id)
        .bind::<Text, _>(content)
        .bind::<Vector, _>(vector)
        .bind::<Nullable<diesel::sql_types::Jsonb>, _>(metadata.cloned())
        .execute(&mut *conn)?;

        Ok(id)
    }

    pub fn all(&self, agent_id: &str, limit: i64) -> Result<Vec<PassageRow>> {
        let mut conn = lock(&self.conn);
        #[derive(Queryable)]
        struct Row {
            id: Uuid,
            agent_id: String,
            content: String,
            metadata: Option<serde_json::Value>,
            created_at: DateTime<Utc>,
        }
        let rows: Vec<Row> = passages::table
            .filter(passages::agent_id.eq(agent_id))
            .order(passages::created_at.desc())
            .limit(limit)
            .select((
                passages::id,
                passages::agent_id,
                passages::content,
                passages::metadata,
                passages::created_at,
            ))
            .load(&mut *conn)?;
        Ok(rows
            .into_iter()
            .map(|r| PassageRow {
                id: r.id,
                agent_id: r.agent_id,
                content: r.content,
                metadata: r.metadata,
                created_at: r.created_at,
            })
            .collect())
    }

    /// Nearest neighbours by cosine distance, closest first.
    pub fn search_by_embedding(
        &self,
        agent_id: &str,
        query_embedding: &[f32],
        limit: i64,
        offset: i64,
    ) -> Result<Vec<(PassageRow, f64)>> {
        let mut conn = lock(&self.conn);
        let vector = PgVector::from(query_embedding.to_vec());

        let rows: Vec<PassageSearchRow> = diesel::sql_query(
            "SELECT id, agent_id, content, metadata::text AS metadata, created_at, \
                    (embedding <=> $1) AS distance \
             FROM passages \
             WHERE agent_id = $2 \
             ORDER BY embedding <=> $1 \
             LIMIT $3 OFFSET $4",
        )
        .bind::<Vector, _>(vector)
        .bind::<Text, _>(agent_id)
        .bind::<BigInt, _>(limit)
        .bind::<BigInt, _>(offset)
        .load(&mut *conn)?;

        Ok(rows
            .into_iter()
            .map(|row| {
                (
                    PassageRow {
                        id: row.id,
                        agent_id: row.agent_id,
                        content: row.content,
                        metadata: row
                            .metadata
                            .and_then(|m| serde_json::from_str(&m).ok()),
                        created_at: row.created_at,
                    },
                    row.distance,
                )
            })
            .collect())
    }

    pub fn delete(&self, agent_id: &str, id: Uuid) -> Result<bool> {
        let mut conn = lock(&self.conn);
        let affected = diesel::delete(
            passages::table
                .filter(passages::agent_id.eq(agent_id))
                .filter(passages::id.eq(id)),
        )
        .execute(&mut *conn)?;
        Ok(affected > 0)
    }

    pub fn clear(&self, agent_id: &str) -> Result<()> {
        let mut conn = lock(&self.conn);
        diesel::delete(passages::table.filter(passages::agent_id.eq(agent_id)))
            .execute(&mut *conn)?;
        Ok(())
    }
}

// ============================================================================
// Top-level facade
// ============================================================================

#[derive(Clone)]
pub struct MemoryDb {
    conn: Arc<Mutex<PgConnection>>,
}

impl MemoryDb {
    pub fn new(database_url: &str) -> Result<Self> {
        let conn = PgConnection::establish(database_url)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn agents(&self) -> AgentDb {
        AgentDb::new(Arc::clone(&self.conn))
    }

    pub fn blocks(&self) -> BlockDb {
        BlockDb::new(Arc::clone(&self.conn))
    }

    pub fn messages(&self) -> MessageDb {
        MessageDb::new(Arc::clone(&self.conn))
    }

    pub fn passages(&self) -> PassageDb {
        PassageDb::new(Arc::clone(&self.conn))
    }
}
