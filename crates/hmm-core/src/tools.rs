//! Tool executor (C6): parses the LLM's raw `(name, arguments_json)` pair
//! into a tagged enum, then dispatches through an exhaustive match. Unknown
//! names and malformed argument shapes are parse-time `ContractViolation`s,
//! never panics.

use serde_json::Value;

use crate::error::{HmmError, HmmResult};
use crate::llm::ToolCallRequest;
use crate::memory::{ArchivalStore, RecallStore, WorkingContext};

#[derive(Debug, Clone, PartialEq)]
pub enum ToolCall {
    SendMessage { content: String },
    CoreMemoryAppend { section: String, content: String },
    CoreMemoryReplace { section: String, old_content: String, new_content: String },
    ArchivalMemoryInsert { content: String },
    ArchivalMemorySearch { query: String, page: u32 },
    ConversationSearch { query: String, page: u32 },
}

impl ToolCall {
    /// `send_message` is the unique tool whose successful execution
    /// terminates the heartbeat.
    pub fn should_continue(&self) -> bool {
        !matches!(self, ToolCall::SendMessage { .. })
    }

    pub fn name(&self) -> &'static str {
        match self {
            ToolCall::SendMessage { .. } => "send_message",
            ToolCall::CoreMemoryAppend { .. } => "core_memory_append",
            ToolCall::CoreMemoryReplace { .. } => "core_memory_replace",
            ToolCall::ArchivalMemoryInsert { .. } => "archival_memory_insert",
            ToolCall::ArchivalMemorySearch { .. } => "archival_memory_search",
            ToolCall::ConversationSearch { .. } => "conversation_search",
        }
    }

    pub fn parse(request: &ToolCallRequest) -> HmmResult<Self> {
        let args: Value = serde_json::from_str(&request.arguments)
            .map_err(|e| HmmError::ContractViolation(format!("invalid arguments JSON for {}: {e}", request.name)))?;

        fn field<'a>(args: &'a Value, name: &str, tool: &str) -> HmmResult<&'a str> {
            args.get(name)
                .and_then(Value::as_str)
                .ok_or_else(|| HmmError::ContractViolation(format!("{tool} is missing required string field '{name}'")))
        }

        fn page(args: &Value) -> u32 {
            args.get("page").and_then(Value::as_u64).unwrap_or(0) as u32
        }

        match request.name.as_str() {
            "send_message" => Ok(ToolCall::SendMessage {
                content: field(&args, "content", "send_message")?.to_string(),
            }),
            "core_memory_append" => Ok(ToolCall::CoreMemoryAppend {
                section: field(&args, "section", "core_memory_append")?.to_string(),
                content: field(&args, "content", "core_memory_append")?.to_string(),
            }),
            "core_memory_replace" => Ok(ToolCall::CoreMemoryReplace {
                section: field(&args, "section", "core_memory_replace")?.to_string(),
                old_content: field(&args, "old_content", "core_memory_replace")?.to_string(),
                new_content: field(&args, "new_content", "core_memory_replace")?.to_string(),
            }),
            "archival_memory_insert" => Ok(ToolCall::ArchivalMemoryInsert {
                content: field(&args, "content", "archival_memory_insert")?.to_string(),
            }),
            "archival_memory_search" => Ok(ToolCall::ArchivalMemorySearch {
                query: field(&args, "query", "archival_memory_search")?.to_string(),
                page: page(&args),
            }),
            "conversation_search" => Ok(ToolCall::ConversationSearch {
                query: field(&args, "query", "conversation_search")?.to_string(),
                page: page(&args),
            }),
            other => Err(HmmError::ContractViolation(format!("unknown tool: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ToolStatus {
    Success,
    Error,
}

pub struct ToolResult {
    pub function: &'static str,
    pub status: ToolStatus,
    pub message: String,
    pub output: String,
}

impl ToolResult {
    fn ok(function: &'static str, message: impl Into<String>, output: impl Into<String>) -> Self {
        Self { function, status: ToolStatus::Success, message: message.into(), output: output.into() }
    }

    fn err(function: &'static str, message: impl Into<String>) -> Self {
        Self { function, status: ToolStatus::Error, message: message.into(), output: String::new() }
    }

    /// Deterministic textual block pushed back into the queue as a
    /// `tool_result` role message.
    pub fn format(&self) -> String {
        let status = match self.status {
            ToolStatus::Success => "success",
            ToolStatus::Error => "error",
        };
        format!(
            "Function: {}\nStatus: {}\nMessage: {}\nOutput: {}",
            self.function, status, self.message, self.output
        )
    }
}

/// Owns non-owning handles into C2/C3/C4 and dispatches tool calls against them.
pub struct ToolExecutor {
    recall: RecallStore,
    archival: ArchivalStore,
    context: WorkingContext,
    page_size: u32,
}

impl ToolExecutor {
    pub fn new(recall: RecallStore, archival: ArchivalStore, context: WorkingContext, page_size: u32) -> Self {
        Self { recall, archival, context, page_size }
    }

    pub async fn execute(&self, call: &ToolCall) -> ToolResult {
        match call {
            ToolCall::SendMessage { content } => {
                ToolResult::ok("send_message", "message sent", content.clone())
            }
            ToolCall::CoreMemoryAppend { section, content } => {
                match self.context.append(section, content) {
                    Ok(()) => ToolResult::ok("core_memory_append", format!("appended to {section}"), ""),
                    Err(e) => ToolResult::err("core_memory_append", e.to_string()),
                }
            }
            ToolCall::CoreMemoryReplace { section, old_content, new_content } => {
                match self.context.replace(section, old_content, new_content) {
                    Ok(()) => ToolResult::ok("core_memory_replace", format!("replaced in {section}"), ""),
                    Err(e) => ToolResult::err("core_memory_replace", e.to_string()),
                }
            }
            ToolCall::ArchivalMemoryInsert { content } => {
                match self.archival.insert(content, None).await {
                    Ok(doc_id) => ToolResult::ok("archival_memory_insert", "inserted", doc_id.to_string()),
                    Err(e) => ToolResult::err("archival_memory_insert", e.to_string()),
                }
            }
            ToolCall::ArchivalMemorySearch { query, page } => {
                let offset = page * self.page_size;
                match self.archival.search(query, self.page_size, offset).await {
                    Ok(results) => {
                        let output = results
                            .iter()
                            .map(|r| format!("[{:.3}] {}", r.similarity, r.document.content))
                            .collect::<Vec<_>>()
                            .join("\n");
                        ToolResult::ok("archival_memory_search", format!("{} results", results.len()), output)
                    }
                    Err(e) => ToolResult::err("archival_memory_search", e.to_string()),
                }
            }
            ToolCall::ConversationSearch { query, page } => {
                let offset = page * self.page_size;
                match self.recall.search(query, self.page_size, offset) {
                    Ok(results) => {
                        let output = results
                            .iter()
                            .map(|r| format!("[{}] {}: {}", r.timestamp, r.role, r.content))
                            .collect::<Vec<_>>()
                            .join("\n");
                        ToolResult::ok("conversation_search", format!("{} results", results.len()), output)
                    }
                    Err(e) => ToolResult::err("conversation_search", e.to_string()),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(name: &str, args: Value) -> ToolCallRequest {
        ToolCallRequest { name: name.to_string(), arguments: args.to_string() }
    }

    #[test]
    fn parses_send_message() {
        let call = ToolCall::parse(&request("send_message", serde_json::json!({"content": "hi"}))).unwrap();
        assert_eq!(call, ToolCall::SendMessage { content: "hi".to_string() });
        assert!(!call.should_continue());
    }

    #[test]
    fn parses_core_memory_replace() {
        let call = ToolCall::parse(&request(
            "core_memory_replace",
            serde_json::json!({"section": "human", "old_content": "a", "new_content": "b"}),
        ))
        .unwrap();
        assert_eq!(
            call,
            ToolCall::CoreMemoryReplace {
                section: "human".to_string(),
                old_content: "a".to_string(),
                new_content: "b".to_string(),
            }
        );
        assert!(call.should_continue());
    }

    #[test]
    fn missing_field_is_contract_violation() {
        let err = ToolCall::parse(&request("send_message", serde_json::json!({}))).unwrap_err();
        assert!(matches!(err, HmmError::ContractViolation(_)));
    }

    #[test]
    fn unknown_tool_name_is_contract_violation() {
        let err = ToolCall::parse(&request("delete_everything", serde_json::json!({}))).unwrap_err();
        assert!(matches!(err, HmmError::ContractViolation(_)));
    }

    #[test]
    fn page_defaults_to_zero() {
        let call = ToolCall::parse(&request(
            "conversation_search",
            serde_json::json!({"query": "alice"}),
        ))
        .unwrap();
        assert_eq!(call, ToolCall::ConversationSearch { query: "alice".to_string(), page: 0 });
    }

    #[test]
    fn tool_result_format_matches_fixed_layout() {
        let result = ToolResult::ok("send_message", "message sent", "hello");
        assert_eq!(result.format(), "Function: send_message\nStatus: success\nMessage: message sent\nOutput: hello");
    }
}
