//! Working context (C4): in-memory, section-based, always resident.
//!
//! Sections are kept in an explicit insertion-order list rather than a
//! `HashMap`, so `render()` is deterministic across calls without a
//! secondary sort — it only changes order when a section is created.

use chrono::{DateTime, Utc};
use std::sync::{Arc, RwLock};
use thiserror::Error;
use uuid::Uuid;

use super::db::{BlockDb, MemoryDb, NewBlock};
use crate::error::HmmResult;

pub const DEFAULT_PERSONA_DESCRIPTION: &str =
    "The persona block: who the agent is and how it behaves.";
pub const DEFAULT_HUMAN_DESCRIPTION: &str =
    "The human block: what the agent knows about the person it's talking to.";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BlockError {
    #[error("unknown section: {0}")]
    UnknownSection(String),
    #[error("section already exists: {0}")]
    AlreadyExists(String),
    #[error("content not found in section {0}")]
    NotFound(String),
}

#[derive(Debug, Clone)]
struct Section {
    name: String,
    text: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Section {
    fn new(name: impl Into<String>, text: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            name: name.into(),
            text: text.into(),
            created_at: now,
            updated_at: now,
        }
    }

    fn append(&mut self, content: &str) {
        self.text.push('\n');
        self.text.push_str(content);
        self.updated_at = Utc::now();
    }

    /// Replace the first occurrence of `old` with `new`; error if absent.
    fn replace(&mut self, old: &str, new: &str) -> Result<(), BlockError> {
        let Some(pos) = self.text.find(old) else {
            return Err(BlockError::NotFound(self.name.clone()));
        };
        let mut replaced = String::with_capacity(self.text.len() - old.len() + new.len());
        replaced.push_str(&self.text[..pos]);
        replaced.push_str(new);
        replaced.push_str(&self.text[pos + old.len()..]);
        self.text = replaced;
        self.updated_at = Utc::now();
        Ok(())
    }
}

/// Manages the agent's working context with PostgreSQL-backed persistence.
///
/// Cloning shares the same section list and connection handle — the clone
/// is a handle, not a copy, matching C6's non-owning reference into C4.
#[derive(Clone)]
pub struct WorkingContext {
    agent_id: Uuid,
    sections: Arc<RwLock<Vec<Section>>>,
    db: MemoryDb,
}

impl WorkingContext {
    /// Load an agent's sections from the database, creating the default
    /// `persona`/`human` sections if none exist yet.
    pub fn new(agent_id: Uuid, db: MemoryDb) -> HmmResult<Self> {
        let agent_id_str = agent_id.to_string();
        let block_db = db.blocks();
        let existing = block_db.load_blocks(&agent_id_str)?;

        let sections = if existing.is_empty() {
            let persona = Section::new("persona", "");
            let human = Section::new("human", "");
            Self::persist_new(&block_db, &agent_id_str, &persona, DEFAULT_PERSONA_DESCRIPTION)?;
            Self::persist_new(&block_db, &agent_id_str, &human, DEFAULT_HUMAN_DESCRIPTION)?;
            vec![persona, human]
        } else {
            existing
                .into_iter()
                .map(|row| Section {
                    name: row.label,
                    text: row.value,
                    created_at: row.created_at,
                    updated_at: row.updated_at,
                })
                .collect()
        };

        Ok(Self {
            agent_id,
            sections: Arc::new(RwLock::new(sections)),
            db,
        })
    }

    fn persist_new(db: &BlockDb, agent_id: &str, section: &Section, description: &str) -> HmmResult<()> {
        db.insert_block(NewBlock {
            id: Uuid::new_v4(),
            agent_id,
            label: &section.name,
            description: Some(description),
            value: &section.text,
            char_limit: 20_000,
            read_only: false,
        })?;
        Ok(())
    }

    pub fn get(&self, section: &str) -> Option<String> {
        self.sections
            .read()
            .ok()?
            .iter()
            .find(|s| s.name == section)
            .map(|s| s.text.clone())
    }

    pub fn has(&self, section: &str) -> bool {
        self.sections
            .read()
            .map(|s| s.iter().any(|s| s.name == section))
            .unwrap_or(false)
    }

    pub fn create(&self, section: &str, initial: &str) -> Result<(), BlockError> {
        let mut sections = self.sections.write().expect("lock poisoned");
        if sections.iter().any(|s| s.name == section) {
            return Err(BlockError::AlreadyExists(section.to_string()));
        }
        sections.push(Section::new(section, initial));
        drop(sections);
        let agent_id_str = self.agent_id.to_string();
        let _ = self.db.blocks().insert_block(NewBlock {
            id: Uuid::new_v4(),
            agent_id: &agent_id_str,
            label: section,
            description: None,
            value: initial,
            char_limit: 20_000,
            read_only: false,
        });
        Ok(())
    }

    pub fn delete(&self, section: &str) -> Result<(), BlockError> {
        let mut sections = self.sections.write().expect("lock poisoned");
        let before = sections.len();
        sections.retain(|s| s.name != section);
        if sections.len() == before {
            return Err(BlockError::UnknownSection(section.to_string()));
        }
        drop(sections);
        let agent_id_str = self.agent_id.to_string();
        let _ = self.db.blocks().delete_block(&agent_id_str, section);
        Ok(())
    }

    /// Append `content` to `section`, separated by a newline.
    pub fn append(&self, section: &str, content: &str) -> Result<(), BlockError> {
        let new_value = {
            let mut sections = self.sections.write().expect("lock poisoned");
            let s = sections
                .iter_mut()
                .find(|s| s.name == section)
                .ok_or_else(|| BlockError::UnknownSection(section.to_string()))?;
            s.append(content);
            s.text.clone()
        };
        self.persist(section, &new_value);
        Ok(())
    }

    /// Replace the first occurrence of `old` with `new` within `section`.
    pub fn replace(&self, section: &str, old: &str, new: &str) -> Result<(), BlockError> {
        let new_value = {
            let mut sections = self.sections.write().expect("lock poisoned");
            let s = sections
                .iter_mut()
                .find(|s| s.name == section)
                .ok_or_else(|| BlockError::UnknownSection(section.to_string()))?;
            s.replace(old, new)?;
            s.text.clone()
        };
        self.persist(section, &new_value);
        Ok(())
    }

    fn persist(&self, section: &str, value: &str) {
        let agent_id_str = self.agent_id.to_string();
        if let Err(e) = self.db.blocks().update_block_value(&agent_id_str, section, value) {
            tracing::warn!("failed to persist working context section '{}': {}", section, e);
        }
    }

    /// Deterministic rendering for inclusion in the system prompt. Section
    /// order is the order sections were created in (persona/human first by
    /// construction), never re-sorted between renderings.
    pub fn render(&self) -> String {
        let sections = self.sections.read().expect("lock poisoned");
        if sections.is_empty() {
            return String::new();
        }
        let mut out = String::from("<working_context>\n");
        for section in sections.iter() {
            out.push_str(&format!(
                "<{label}>\n{text}\n</{label}>\n",
                label = section.name.to_uppercase(),
                text = section.text
            ));
        }
        out.push_str("</working_context>");
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_to_empty_section_always_prepends_newline() {
        let mut s = Section::new("human", "");
        s.append("name=Alice");
        assert_eq!(s.text, "\nname=Alice");
    }

    #[test]
    fn append_adds_newline_separator() {
        let mut s = Section::new("human", "name=Alice");
        s.append("likes=coffee");
        assert_eq!(s.text, "name=Alice\nlikes=coffee");
    }

    #[test]
    fn replace_first_occurrence_only() {
        let mut s = Section::new("test", "a-b-a");
        s.replace("a", "X").unwrap();
        assert_eq!(s.text, "X-b-a");
    }

    #[test]
    fn replace_missing_text_errors() {
        let mut s = Section::new("test", "hello");
        let err = s.replace("notfound", "x").unwrap_err();
        assert_eq!(err, BlockError::NotFound("test".to_string()));
        assert_eq!(s.text, "hello");
    }

    #[test]
    fn section_order_is_insertion_order() {
        let sections = vec![Section::new("persona", "I am helpful"), Section::new("human", "")];
        let mut out = String::new();
        for s in &sections {
            out.push_str(&s.name.to_uppercase());
            out.push('\n');
        }
        let persona_idx = out.find("PERSONA").unwrap();
        let human_idx = out.find("HUMAN").unwrap();
        assert!(persona_idx < human_idx);
    }
}
