//! Token accounting (C1).
//!
//! Counts tokens the way the chat-completion wire format is actually billed:
//! a fixed per-message overhead plus the tokenized length of every string
//! field, with non-string fields stringified first. Selects a real BPE
//! encoder by model name and falls back to `cl100k_base` for anything
//! `tiktoken-rs` doesn't recognize.

use serde_json::Value;
use std::sync::Arc;
use tiktoken_rs::CoreBPE;

/// Per-message overhead, matching the `<|im_start|>{role}\n...<|im_end|>\n` framing.
const MESSAGE_OVERHEAD: u32 = 4;
/// Final reply primer (`<|im_start|>assistant`).
const REPLY_PRIMER: u32 = 2;

#[derive(Clone)]
pub struct TokenCounter {
    encoding: Arc<CoreBPE>,
}

impl TokenCounter {
    /// Build a counter for the given model name, falling back to `cl100k_base`
    /// when the model isn't in tiktoken-rs's table.
    pub fn for_model(model: &str) -> Self {
        let encoding = tiktoken_rs::get_bpe_from_model(model)
            .or_else(|_| tiktoken_rs::cl100k_base())
            .expect("cl100k_base encoding must always be available");
        Self {
            encoding: Arc::new(encoding),
        }
    }

    /// Count tokens in a plain string.
    pub fn count(&self, text: &str) -> u32 {
        if text.is_empty() {
            return 0;
        }
        self.encoding.encode_ordinary(text).len() as u32
    }

    /// Count tokens across a set of chat messages, each a `{role, content, ...}`
    /// style JSON object. Every string-valued field, every string in a list
    /// field, and every dict/list field (stringified) contributes; non-string
    /// scalars are ignored per the original overhead formula.
    pub fn count_messages(&self, messages: &[Value]) -> u32 {
        if messages.is_empty() {
            return 0;
        }
        let mut total = 0u32;
        for message in messages {
            total += MESSAGE_OVERHEAD;
            if let Value::Object(map) = message {
                for value in map.values() {
                    total += self.count_value(value);
                }
            }
        }
        total + REPLY_PRIMER
    }

    fn count_value(&self, value: &Value) -> u32 {
        match value {
            Value::String(s) => self.count(s),
            Value::Array(items) => items
                .iter()
                .map(|item| match item {
                    Value::String(s) => self.count(s),
                    Value::Object(_) | Value::Array(_) => self.count(&item.to_string()),
                    _ => 0,
                })
                .sum(),
            Value::Object(_) => self.count(&value.to_string()),
            _ => 0,
        }
    }

    /// Truncate `text` to the longest prefix whose token count is `<= max_tokens`.
    pub fn truncate(&self, text: &str, max_tokens: u32) -> String {
        if text.is_empty() {
            return String::new();
        }
        let tokens = self.encoding.encode_ordinary(text);
        if tokens.len() as u32 <= max_tokens {
            return text.to_string();
        }
        let truncated = &tokens[..max_tokens as usize];
        self.encoding
            .decode(truncated.to_vec())
            .unwrap_or_default()
    }
}

impl Default for TokenCounter {
    fn default() -> Self {
        Self::for_model("gpt-4")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_string_counts_zero() {
        let counter = TokenCounter::default();
        assert_eq!(counter.count(""), 0);
    }

    #[test]
    fn unknown_model_falls_back_to_cl100k() {
        let counter = TokenCounter::for_model("definitely-not-a-real-model");
        assert!(counter.count("hello world") > 0);
    }

    #[test]
    fn empty_message_list_counts_zero() {
        let counter = TokenCounter::default();
        assert_eq!(counter.count_messages(&[]), 0);
    }

    #[test]
    fn message_overhead_and_primer_applied() {
        let counter = TokenCounter::default();
        let messages = vec![json!({"role": "user", "content": "hi"})];
        let total = counter.count_messages(&messages);
        let content_tokens = counter.count("hi") + counter.count("user");
        assert_eq!(total, MESSAGE_OVERHEAD + content_tokens + REPLY_PRIMER);
    }

    #[test]
    fn truncate_respects_budget() {
        let counter = TokenCounter::default();
        let text = "the quick brown fox jumps over the lazy dog ".repeat(20);
        for n in [0u32, 1, 5, 50] {
            let truncated = counter.truncate(&text, n);
            assert!(counter.count(&truncated) <= n);
        }
    }

    #[test]
    fn truncate_is_noop_when_under_budget() {
        let counter = TokenCounter::default();
        let text = "short text";
        assert_eq!(counter.truncate(text, 1000), text);
    }
}
