//! LLM client contract (A3): chat completion with tool calling, plus a
//! `summarize` convenience built on the same client.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use crate::error::{HmmError, HmmResult};

#[derive(Debug, Clone)]
pub struct ToolCallRequest {
    pub name: String,
    /// Raw JSON-encoded arguments, as returned by the model.
    pub arguments: String,
}

#[derive(Debug, Clone)]
pub struct LlmChoice {
    pub finish_reason: String,
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCallRequest>,
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, messages: &[Value], tools: &[Value], temperature: f32) -> HmmResult<LlmChoice>;

    /// Summarize `prompt` using a fixed system role. Default implementation
    /// reuses `complete` with no tools and returns the prose reply.
    async fn summarize(&self, prompt: &str) -> HmmResult<String> {
        let messages = vec![serde_json::json!({
            "role": "system",
            "content": "Summarize the following conversation excerpt concisely, \
                         preserving names, facts, and commitments.",
        }), serde_json::json!({ "role": "user", "content": prompt })];
        let choice = self.complete(&messages, &[], 0.2).await?;
        choice
            .content
            .ok_or_else(|| HmmError::ModelError("summarize response had no content".to_string()))
    }
}

/// OpenAI-compatible `/chat/completions` client.
pub struct HttpLlmClient {
    http: reqwest::Client,
    api_url: String,
    api_key: Option<String>,
    model: String,
}

impl HttpLlmClient {
    pub fn new(api_url: impl Into<String>, api_key: Option<String>, model: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_url: api_url.into(),
            api_key,
            model: model.into(),
        }
    }
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatCompletionChoice>,
}

#[derive(Deserialize)]
struct ChatCompletionChoice {
    finish_reason: Option<String>,
    message: ChatCompletionMessage,
}

#[derive(Deserialize)]
struct ChatCompletionMessage {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<ChatCompletionToolCall>,
    /// Legacy single-function-call shape, superseded by `tool_calls` but
    /// still emitted by some OpenAI-compatible backends.
    function_call: Option<ChatCompletionFunctionCall>,
}

#[derive(Deserialize)]
struct ChatCompletionToolCall {
    function: ChatCompletionFunctionCall,
}

#[derive(Deserialize)]
struct ChatCompletionFunctionCall {
    name: String,
    arguments: String,
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    async fn complete(&self, messages: &[Value], tools: &[Value], temperature: f32) -> HmmResult<LlmChoice> {
        let mut body = serde_json::json!({
            "model": self.model,
            "messages": messages,
            "temperature": temperature,
        });
        if !tools.is_empty() {
            body["tools"] = Value::Array(tools.to_vec());
        }

        let mut request = self.http.post(format!("{}/chat/completions", self.api_url)).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(HmmError::ModelError(format!("llm request failed ({status}): {body}")));
        }

        let parsed: ChatCompletionResponse = response.json().await?;
        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| HmmError::ModelError("llm response had no choices".to_string()))?;

        let mut tool_calls: Vec<ToolCallRequest> = choice
            .message
            .tool_calls
            .into_iter()
            .map(|tc| ToolCallRequest {
                name: tc.function.name,
                arguments: tc.function.arguments,
            })
            .collect();

        if tool_calls.is_empty() {
            if let Some(legacy) = choice.message.function_call {
                tool_calls.push(ToolCallRequest {
                    name: legacy.name,
                    arguments: legacy.arguments,
                });
            }
        }

        Ok(LlmChoice {
            finish_reason: choice.finish_reason.unwrap_or_else(|| "stop".to_string()),
            content: choice.message.content,
            tool_calls,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ScriptedClient {
        finish_reason: &'static str,
        content: Option<&'static str>,
        tool_calls: Vec<(&'static str, &'static str)>,
    }

    #[async_trait]
    impl LlmClient for ScriptedClient {
        async fn complete(&self, _messages: &[Value], _tools: &[Value], _temperature: f32) -> HmmResult<LlmChoice> {
            Ok(LlmChoice {
                finish_reason: self.finish_reason.to_string(),
                content: self.content.map(|c| c.to_string()),
                tool_calls: self
                    .tool_calls
                    .iter()
                    .map(|(name, args)| ToolCallRequest {
                        name: name.to_string(),
                        arguments: args.to_string(),
                    })
                    .collect(),
            })
        }
    }

    #[tokio::test]
    async fn default_summarize_extracts_prose_content() {
        let client = ScriptedClient {
            finish_reason: "stop",
            content: Some("summary text"),
            tool_calls: vec![],
        };
        let summary = client.summarize("some excerpt").await.unwrap();
        assert_eq!(summary, "summary text");
    }

    #[tokio::test]
    async fn default_summarize_errors_when_no_content_returned() {
        let client = ScriptedClient {
            finish_reason: "tool_calls",
            content: None,
            tool_calls: vec![("send_message", "{}")],
        };
        assert!(client.summarize("some excerpt").await.is_err());
    }
}
