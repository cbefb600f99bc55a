//! Queue manager (C5): the token-budgeted working message window.
//!
//! Slot 0 is always the running summary (role=system); slots 1..n are
//! recent messages in temporal order. Eviction moves the oldest third of
//! recent messages into the recall store and folds them into the summary,
//! keeping the window under its token budget without ever looping: pressure
//! is re-checked on the next `add`, not recursively within eviction itself.

use async_trait::async_trait;
use serde_json::Value;

use super::recall::RecallStore;
use crate::error::HmmResult;
use crate::token_counter::TokenCounter;

const DEFAULT_SUMMARY: &str = "No previous interactions.";
const PRESSURE_WARNING: &str = "Memory pressure detected. Save important data immediately.";
const FALLBACK_SUMMARY_CHARS: usize = 500;

#[derive(Debug, Clone)]
pub struct QueueMessage {
    pub role: String,
    pub content: String,
    pub metadata: Option<Value>,
}

impl QueueMessage {
    fn to_json(&self) -> Value {
        serde_json::json!({ "role": self.role, "content": self.content })
    }

    fn render_line(&self) -> String {
        format!("{}: {}", self.role.to_uppercase(), self.content)
    }
}

fn is_pressure_warning(message: &QueueMessage) -> bool {
    message.role == "system" && message.content == PRESSURE_WARNING
}

/// Produces a fresh summary from the prior one and the text being evicted.
/// Implementations call out to the LLM; failures fall back to truncation.
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, prior_summary: &str, evicted_text: &str) -> HmmResult<String>;
}

pub struct QueueManager<S: Summarizer> {
    max_tokens: u32,
    warning_threshold: f32,
    flush_threshold: f32,
    summary: QueueMessage,
    recent: Vec<QueueMessage>,
    counter: TokenCounter,
    recall: RecallStore,
    summarizer: S,
}

impl<S: Summarizer> QueueManager<S> {
    pub fn new(
        max_tokens: u32,
        warning_threshold: f32,
        flush_threshold: f32,
        counter: TokenCounter,
        recall: RecallStore,
        summarizer: S,
    ) -> Self {
        Self {
            max_tokens,
            warning_threshold,
            flush_threshold,
            summary: QueueMessage {
                role: "system".to_string(),
                content: DEFAULT_SUMMARY.to_string(),
                metadata: None,
            },
            recent: Vec::new(),
            counter,
            recall,
            summarizer,
        }
    }

    pub fn summary(&self) -> &str {
        &self.summary.content
    }

    pub fn set_summary(&mut self, text: impl Into<String>) {
        self.summary.content = text.into();
    }

    /// Defensive copy of the full queue (summary first) for prompt assembly.
    pub fn snapshot(&self) -> Vec<QueueMessage> {
        std::iter::once(self.summary.clone())
            .chain(self.recent.iter().cloned())
            .collect()
    }

    pub fn size(&self) -> u32 {
        let messages: Vec<Value> = self.snapshot().iter().map(QueueMessage::to_json).collect();
        self.counter.count_messages(&messages)
    }

    pub fn usage(&self) -> f32 {
        self.size() as f32 / self.max_tokens as f32
    }

    pub fn clear(&mut self, keep_summary: bool) {
        self.recent.clear();
        if !keep_summary {
            self.summary.content = DEFAULT_SUMMARY.to_string();
        }
    }

    /// The last slot already carries an unacknowledged pressure warning;
    /// a duplicate is suppressed only while it remains the most recent
    /// slot. Once any other message follows it, a fresh warning may fire
    /// again on the next crossing of the threshold — this is deliberate,
    /// not a bug to be "fixed" into full de-duplication.
    fn last_slot_is_pressure_warning(&self) -> bool {
        self.recent.last().map(is_pressure_warning).unwrap_or(false)
    }

    /// Appends a message and runs the pressure/eviction algorithm. Returns
    /// whether a pressure warning was injected on this call.
    pub async fn add(&mut self, role: &str, content: &str, metadata: Option<Value>) -> HmmResult<bool> {
        self.recent.push(QueueMessage {
            role: role.to_string(),
            content: content.to_string(),
            metadata,
        });

        let tokens = self.size();
        let warning_cutoff = (self.max_tokens as f32 * self.warning_threshold) as u32;
        let flush_cutoff = (self.max_tokens as f32 * self.flush_threshold) as u32;

        if tokens > warning_cutoff && !self.last_slot_is_pressure_warning() {
            self.recent.push(QueueMessage {
                role: "system".to_string(),
                content: PRESSURE_WARNING.to_string(),
                metadata: None,
            });
            return Ok(true);
        }

        if self.size() >= flush_cutoff {
            self.evict().await?;
        }

        Ok(false)
    }

    async fn evict(&mut self) -> HmmResult<()> {
        let n = self.recent.len();
        let k = std::cmp::max(1, n / 3).min(n);
        if k == 0 {
            return Ok(());
        }

        let evicted: Vec<QueueMessage> = self.recent.drain(0..k).collect();

        for message in &evicted {
            self.recall.insert(
                &message.role,
                &message.content,
                None,
                None,
                message.metadata.clone(),
            )?;
        }

        let evicted_text = evicted
            .iter()
            .map(QueueMessage::render_line)
            .collect::<Vec<_>>()
            .join("\n");

        let new_summary = match self.summarizer.summarize(&self.summary.content, &evicted_text).await {
            Ok(summary) => summary,
            Err(_) => {
                let truncated: String = evicted_text.chars().take(FALLBACK_SUMMARY_CHARS).collect();
                format!("{}\n\nRecent activity: {truncated}...", self.summary.content)
            }
        };

        self.summary.content = new_summary;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eviction_count(n: usize) -> usize {
        std::cmp::max(1, n / 3).min(n)
    }

    #[test]
    fn eviction_count_matches_one_third_rule() {
        assert_eq!(eviction_count(1), 1);
        assert_eq!(eviction_count(4), 1);
        assert_eq!(eviction_count(6), 2);
        assert_eq!(eviction_count(9), 3);
        assert_eq!(eviction_count(10), 3);
        assert_eq!(eviction_count(31), 10);
    }

    #[test]
    fn default_summary_is_no_previous_interactions() {
        assert_eq!(DEFAULT_SUMMARY, "No previous interactions.");
    }

    #[test]
    fn render_line_uppercases_role() {
        let m = QueueMessage {
            role: "user".to_string(),
            content: "hi".to_string(),
            metadata: None,
        };
        assert_eq!(m.render_line(), "USER: hi");
    }

    #[test]
    fn pressure_warning_is_recognized_by_role_and_content() {
        let warning = QueueMessage {
            role: "system".to_string(),
            content: PRESSURE_WARNING.to_string(),
            metadata: None,
        };
        assert!(is_pressure_warning(&warning));

        let other = QueueMessage {
            role: "system".to_string(),
            content: "unrelated".to_string(),
            metadata: None,
        };
        assert!(!is_pressure_warning(&other));
    }
}
