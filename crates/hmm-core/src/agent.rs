//! Agent loop (C7): the heartbeat state machine that drives one user turn
//! to a terminal outcome, cycling between composing a prompt, calling the
//! LLM, and dispatching whatever tool call comes back.

use std::sync::Arc;

use serde_json::Value;

use crate::embedding::EmbeddingClient;
use crate::error::HmmResult;
use crate::llm::LlmClient;
use crate::memory::{ArchivalStore, MemoryDb, QueueManager, RecallStore, Summarizer, WorkingContext};
use crate::tools::{ToolCall, ToolExecutor};

pub const SYSTEM_PROMPT: &str = "\
You are the memory manager of an AI agent, not a single undifferentiated \
model. You operate three tiers of memory: a resident WORKING context \
(always visible below, directly editable), an ARCHIVAL store of \
documents searched by meaning, and a RECALL store of the full \
conversation history searched by keyword. Your context window has a \
warning threshold and a flush threshold; when you see a memory-pressure \
system message, you are close to the flush threshold and must use \
core_memory_append, core_memory_replace, or archival_memory_insert to \
save anything important before older messages are evicted into \
recall-only storage. send_message is the only channel the user can see \
— everything else is internal bookkeeping. Every action you take, \
including replying, must be a tool call.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentStatus {
    Success,
    NoMessage,
    MaxIterations,
    Error,
}

#[derive(Debug, Clone)]
pub struct AgentOutcome {
    pub status: AgentStatus,
    pub message: Option<String>,
    pub thought: Option<String>,
    pub iterations: u32,
}

/// Wraps a `Summarizer` around an `LlmClient`'s `summarize` operation, per
/// the LLM client contract's second operation.
struct LlmSummarizer {
    llm: Arc<dyn LlmClient>,
}

#[async_trait::async_trait]
impl Summarizer for LlmSummarizer {
    async fn summarize(&self, prior_summary: &str, evicted_text: &str) -> HmmResult<String> {
        let prompt = format!(
            "Prior summary:\n{prior_summary}\n\nNew activity to fold in:\n{evicted_text}\n\n\
             Produce an updated summary that preserves the prior summary's facts plus this new activity."
        );
        self.llm.summarize(&prompt).await
    }
}

pub struct Agent {
    queue: QueueManager<LlmSummarizer>,
    context: WorkingContext,
    tools: ToolExecutor,
    llm: Arc<dyn LlmClient>,
    max_iterations: u32,
}

impl Agent {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        agent_id: uuid::Uuid,
        db: MemoryDb,
        llm: Arc<dyn LlmClient>,
        embedding: Arc<dyn EmbeddingClient>,
        max_tokens: u32,
        warning_threshold: f32,
        flush_threshold: f32,
        page_size: u32,
        max_iterations: u32,
        counter: crate::token_counter::TokenCounter,
    ) -> HmmResult<Self> {
        let recall = RecallStore::new(agent_id, db.clone());
        let archival = ArchivalStore::new(agent_id, db.clone(), embedding, page_size);
        let context = WorkingContext::new(agent_id, db.clone())?;

        let queue = QueueManager::new(
            max_tokens,
            warning_threshold,
            flush_threshold,
            counter,
            recall.clone(),
            LlmSummarizer { llm: llm.clone() },
        );

        let tools = ToolExecutor::new(recall, archival, context.clone(), page_size);

        Ok(Self { queue, context, tools, llm, max_iterations })
    }

    fn tool_catalogue() -> Vec<Value> {
        let tool = |name: &str, description: &str, properties: Value, required: Value| {
            serde_json::json!({
                "type": "function",
                "function": {
                    "name": name,
                    "description": description,
                    "parameters": {
                        "type": "object",
                        "properties": properties,
                        "required": required,
                    },
                },
            })
        };
        vec![
            tool(
                "send_message",
                "Send a user-visible reply and end this turn.",
                serde_json::json!({"content": {"type": "string"}}),
                serde_json::json!(["content"]),
            ),
            tool(
                "core_memory_append",
                "Append content to a working-context section.",
                serde_json::json!({"section": {"type": "string"}, "content": {"type": "string"}}),
                serde_json::json!(["section", "content"]),
            ),
            tool(
                "core_memory_replace",
                "Replace the first occurrence of old_content with new_content in a section.",
                serde_json::json!({
                    "section": {"type": "string"},
                    "old_content": {"type": "string"},
                    "new_content": {"type": "string"},
                }),
                serde_json::json!(["section", "old_content", "new_content"]),
            ),
            tool(
                "archival_memory_insert",
                "Insert a document into long-term archival storage.",
                serde_json::json!({"content": {"type": "string"}}),
                serde_json::json!(["content"]),
            ),
            tool(
                "archival_memory_search",
                "Search archival storage by meaning.",
                serde_json::json!({"query": {"type": "string"}, "page": {"type": "integer"}}),
                serde_json::json!(["query"]),
            ),
            tool(
                "conversation_search",
                "Search the full conversation history by keyword.",
                serde_json::json!({"query": {"type": "string"}, "page": {"type": "integer"}}),
                serde_json::json!(["query"]),
            ),
        ]
    }

    /// Handle into the agent's working context, for inspection by callers
    /// such as the CLI's `/memory` command.
    pub fn working_context(&self) -> &WorkingContext {
        &self.context
    }

    /// Clear the queue's recent messages and summary, keeping the working
    /// context untouched. Used by the CLI's `/reset` command.
    pub fn reset_queue(&mut self) {
        self.queue.clear(false);
    }

    fn system_message(&self) -> Value {
        serde_json::json!({
            "role": "system",
            "content": format!("{SYSTEM_PROMPT}\n\n{}", self.context.render()),
        })
    }

    /// Runs one user turn to a terminal outcome.
    pub async fn chat(&mut self, user_message: Option<&str>) -> HmmResult<AgentOutcome> {
        if let Some(content) = user_message {
            self.queue.add("user", content, None).await?;
        }

        let tools = Self::tool_catalogue();
        let mut iterations = 0u32;

        loop {
            iterations += 1;
            if iterations > self.max_iterations {
                return Ok(AgentOutcome {
                    status: AgentStatus::MaxIterations,
                    message: None,
                    thought: None,
                    iterations: iterations - 1,
                });
            }

            let mut prompt = vec![self.system_message()];
            prompt.extend(self.queue.snapshot().iter().map(|m| {
                serde_json::json!({ "role": m.role, "content": m.content })
            }));

            let choice = match self.llm.complete(&prompt, &tools, 0.7).await {
                Ok(choice) => choice,
                Err(e) => {
                    self.queue
                        .add("system", &format!("LLM transport error: {e}"), None)
                        .await?;
                    return Ok(AgentOutcome {
                        status: AgentStatus::Error,
                        message: Some(e.to_string()),
                        thought: None,
                        iterations,
                    });
                }
            };

            let Some(raw_call) = choice.tool_calls.first() else {
                let thought = choice.content.clone().unwrap_or_default();
                self.queue.add("assistant", &thought, None).await?;
                if choice.finish_reason == "stop" {
                    return Ok(AgentOutcome {
                        status: AgentStatus::NoMessage,
                        message: None,
                        thought: Some(thought),
                        iterations,
                    });
                }
                continue;
            };

            let call = match ToolCall::parse(raw_call) {
                Ok(call) => call,
                Err(e) => {
                    self.queue
                        .add("tool_result", &format!("Function: {}\nStatus: error\nMessage: {e}\nOutput: ", raw_call.name), None)
                        .await?;
                    continue;
                }
            };

            self.queue
                .add("assistant", &format!("calling {}", call.name()), None)
                .await?;

            let result = self.tools.execute(&call).await;
            self.queue.add("tool_result", &result.format(), None).await?;

            if let ToolCall::SendMessage { content } = call {
                return Ok(AgentOutcome {
                    status: AgentStatus::Success,
                    message: Some(content),
                    thought: None,
                    iterations,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_prompt_names_the_three_tiers() {
        assert!(SYSTEM_PROMPT.contains("WORKING"));
        assert!(SYSTEM_PROMPT.contains("ARCHIVAL"));
        assert!(SYSTEM_PROMPT.contains("RECALL"));
    }

    #[test]
    fn tool_catalogue_has_one_entry_per_required_tool() {
        let tools = Agent::tool_catalogue();
        assert_eq!(tools.len(), 6);
    }
}
