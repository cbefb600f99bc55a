//! Batch ingestion (A5): loads historical transcripts into the recall and
//! archival stores. Recognizes four JSON shapes — a flat message list, a
//! `{session_id: [messages]}` mapping, and two nested
//! `{conv_id: {...}}` shapes whose sessions get isolated per-conversation
//! storage. Where the original (SQLite + Chroma) backend isolated
//! conversations with a subdirectory per `conv_id`, this backend isolates
//! them with a distinct `agent_id` derived deterministically from the
//! conversation key, since one Postgres database serves every agent.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

use crate::embedding::EmbeddingClient;
use crate::error::{HmmError, HmmResult};
use crate::memory::{ArchivalStore, MemoryDb, RecallStore};

/// Namespace for deriving stable per-conversation agent ids from a
/// conversation/session key via UUIDv5.
const INGEST_NAMESPACE: Uuid = Uuid::from_bytes([
    0x9e, 0x2e, 0x1d, 0x78, 0x1c, 0x04, 0x4c, 0x45, 0xbb, 0x9a, 0x4a, 0x9e, 0x9c, 0x6f, 0x0b, 0x01,
]);

#[derive(Debug, Clone)]
pub struct IngestMessage {
    pub role: String,
    pub content: String,
    pub timestamp: Option<DateTime<Utc>>,
    pub metadata: Option<Value>,
}

#[derive(Debug, Default)]
pub struct IngestReport {
    pub conversations: usize,
    pub sessions: usize,
    pub messages: usize,
}

/// Derive a stable agent id for a named conversation so repeated ingestion
/// runs against the same file land on the same rows.
pub fn agent_id_for_key(key: &str) -> Uuid {
    Uuid::new_v5(&INGEST_NAMESPACE, key.as_bytes())
}

fn messages_from_array(array: &[Value]) -> Vec<IngestMessage> {
    let mut role_cycle = ["user", "assistant"].iter().cycle();
    array
        .iter()
        .map(|entry| match entry {
            Value::String(text) => IngestMessage {
                role: role_cycle.next().unwrap().to_string(),
                content: text.clone(),
                timestamp: None,
                metadata: None,
            },
            Value::Object(map) => {
                let role = map.get("role").and_then(Value::as_str).unwrap_or("user").to_string();
                let content = map.get("content").and_then(Value::as_str).unwrap_or("").to_string();
                let timestamp = map
                    .get("timestamp")
                    .and_then(Value::as_str)
                    .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                    .map(|dt| dt.with_timezone(&Utc));
                let metadata: serde_json::Map<String, Value> = map
                    .iter()
                    .filter(|(k, _)| !matches!(k.as_str(), "role" | "content" | "timestamp"))
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect();
                IngestMessage {
                    role,
                    content,
                    timestamp,
                    metadata: if metadata.is_empty() { None } else { Some(Value::Object(metadata)) },
                }
            }
            _ => IngestMessage {
                role: "user".to_string(),
                content: entry.to_string(),
                timestamp: None,
                metadata: None,
            },
        })
        .collect()
}

/// A normalized session: an identifier plus its messages.
type Session = (String, Vec<IngestMessage>);

fn sessions_from_flat(data: &Value) -> Vec<Session> {
    match data {
        Value::Array(items) => vec![("default".to_string(), messages_from_array(items))],
        Value::Object(map) => map
            .iter()
            .filter_map(|(session_id, value)| match value {
                Value::Array(items) => Some((session_id.clone(), messages_from_array(items))),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

fn is_nested(data: &Value) -> bool {
    let Value::Object(map) = data else { return false };
    let Some((_, sample)) = map.iter().next() else { return false };
    match sample {
        Value::Object(inner) => {
            inner.contains_key("conversation")
                || inner.values().next().map(|v| v.is_array()).unwrap_or(false)
        }
        _ => false,
    }
}

/// Loads a transcript JSON document and returns per-conversation sessions.
/// For flat shapes the single conversation key is `"default"`; for nested
/// shapes each top-level key becomes its own conversation.
pub fn parse_transcript(data: &Value) -> Vec<(String, Vec<Session>)> {
    if !is_nested(data) {
        return vec![("default".to_string(), sessions_from_flat(data))];
    }

    let Value::Object(map) = data else { return Vec::new() };
    map.iter()
        .map(|(conv_id, content)| {
            let raw_sessions = match content {
                Value::Object(inner) if inner.contains_key("conversation") => {
                    inner.get("conversation").cloned().unwrap_or(Value::Null)
                }
                other => other.clone(),
            };
            let sessions = match &raw_sessions {
                Value::Object(map) => map
                    .iter()
                    .filter_map(|(session_id, value)| match value {
                        Value::Array(items) => Some((session_id.clone(), messages_from_array(items))),
                        _ => None,
                    })
                    .collect(),
                _ => Vec::new(),
            };
            (conv_id.clone(), sessions)
        })
        .collect()
}

fn render_transcript(messages: &[IngestMessage]) -> String {
    messages
        .iter()
        .map(|m| {
            let ts = m.timestamp.map(|t| t.to_rfc3339()).unwrap_or_default();
            format!("[{ts}] {}: {}", m.role.to_uppercase(), m.content)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub struct Ingester {
    db: MemoryDb,
    embedding: Arc<dyn EmbeddingClient>,
}

impl Ingester {
    pub fn new(db: MemoryDb, embedding: Arc<dyn EmbeddingClient>) -> Self {
        Self { db, embedding }
    }

    /// Ingest one already-parsed transcript document into the database,
    /// creating one isolated agent per conversation key.
    pub async fn ingest(&self, data: &Value) -> HmmResult<IngestReport> {
        let conversations = parse_transcript(data);
        let mut report = IngestReport::default();

        for (conv_id, sessions) in &conversations {
            report.conversations += 1;
            let agent_id = agent_id_for_key(conv_id);
            self.db.agents().ensure_agent_exists(agent_id, conv_id)?;

            let recall = RecallStore::new(agent_id, self.db.clone());
            let archival = ArchivalStore::new(agent_id, self.db.clone(), self.embedding.clone(), 5);

            for (session_id, messages) in sessions {
                report.sessions += 1;
                report.messages += messages.len();

                for message in messages {
                    recall.insert(&message.role, &message.content, message.timestamp, None, message.metadata.clone())?;
                }

                let transcript = render_transcript(messages);
                if !transcript.is_empty() {
                    archival
                        .insert(
                            &transcript,
                            Some(serde_json::json!({
                                "session_id": session_id,
                                "message_count": messages.len(),
                                "type": "imported_session",
                            })),
                        )
                        .await
                        .map_err(|e| HmmError::ModelError(format!("archival ingest failed for session {session_id}: {e}")))?;
                }
            }
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_list_becomes_single_default_session() {
        let data = serde_json::json!([
            {"role": "user", "content": "hi"},
            {"role": "assistant", "content": "hello"},
        ]);
        let conversations = parse_transcript(&data);
        assert_eq!(conversations.len(), 1);
        assert_eq!(conversations[0].0, "default");
        assert_eq!(conversations[0].1.len(), 1);
        assert_eq!(conversations[0].1[0].0, "default");
        assert_eq!(conversations[0].1[0].1.len(), 2);
    }

    #[test]
    fn session_mapping_preserves_session_ids() {
        let data = serde_json::json!({
            "session1": [{"role": "user", "content": "a"}],
            "session2": [{"role": "user", "content": "b"}],
        });
        let conversations = parse_transcript(&data);
        assert_eq!(conversations.len(), 1);
        let sessions = &conversations[0].1;
        assert_eq!(sessions.len(), 2);
    }

    #[test]
    fn nested_conversation_wrapper_is_detected() {
        let data = serde_json::json!({
            "conv-a": {"conversation": {"s1": [{"role": "user", "content": "a"}]}},
        });
        let conversations = parse_transcript(&data);
        assert_eq!(conversations.len(), 1);
        assert_eq!(conversations[0].0, "conv-a");
        assert_eq!(conversations[0].1.len(), 1);
    }

    #[test]
    fn nested_flat_sessions_per_conversation_is_detected() {
        let data = serde_json::json!({
            "conv-a": {"s1": [{"role": "user", "content": "a"}]},
            "conv-b": {"s1": [{"role": "user", "content": "b"}]},
        });
        let conversations = parse_transcript(&data);
        assert_eq!(conversations.len(), 2);
    }

    #[test]
    fn bare_strings_alternate_roles_starting_with_user() {
        let data = serde_json::json!(["hi", "hello", "how are you"]);
        let conversations = parse_transcript(&data);
        let messages = &conversations[0].1[0].1;
        assert_eq!(messages[0].role, "user");
        assert_eq!(messages[1].role, "assistant");
        assert_eq!(messages[2].role, "user");
    }

    #[test]
    fn agent_id_derivation_is_deterministic() {
        assert_eq!(agent_id_for_key("conv-a"), agent_id_for_key("conv-a"));
        assert_ne!(agent_id_for_key("conv-a"), agent_id_for_key("conv-b"));
    }
}
