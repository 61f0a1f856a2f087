//! LLM provider implementations.
//!
//! A unified chat-completions interface with tool calling, backed by either
//! Azure OpenAI deployments or the OpenAI API. Both providers speak the same
//! wire format; they differ only in endpoint shape and auth header.

mod azure;
mod openai;

pub use azure::AzureOpenAiProvider;
pub use openai::OpenAiProvider;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use thiserror::Error;

use crate::config::{LlmProviderType, LlmSettings};
use crate::domain::{Message, Role, ToolCall, ToolDefinition};

/// Errors specific to LLM provider operations
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Request timed out")]
    Timeout,
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LlmError::Timeout
        } else if err.is_connect() {
            LlmError::Network(format!("Connection error: {}", err))
        } else {
            LlmError::Network(err.to_string())
        }
    }
}

pub type LlmResult<T> = Result<T, LlmError>;

/// Trait for LLM providers
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Get the provider name
    fn name(&self) -> &str;

    /// Get the model being used
    fn model(&self) -> &str;

    /// Complete a request
    async fn complete(&self, request: CompletionRequest) -> LlmResult<CompletionResponse>;

    /// Count tokens in a text string
    fn count_tokens(&self, text: &str) -> u32;

    /// Get the context window size for the model
    fn context_window(&self) -> u32;
}

/// Request for LLM completion
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CompletionRequest {
    /// Messages in the conversation
    pub messages: Vec<Message>,
    /// Temperature for sampling
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    /// Maximum tokens to generate
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Tools available for calling
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ToolDefinition>>,
    /// Tool choice mode
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<ToolChoice>,
}

/// Tool choice mode
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolChoice {
    /// Let the model decide
    Auto,
    /// Don't use tools
    None,
    /// Must use a tool
    Required,
    /// Use a specific tool
    Tool { name: String },
}

/// Response from LLM completion
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionResponse {
    /// Generated message
    pub message: Message,
    /// Reason the completion stopped
    pub finish_reason: FinishReason,
    /// Token usage
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
}

/// Reason completion stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    /// Natural stop
    Stop,
    /// Hit max tokens
    Length,
    /// Tool call requested
    ToolCalls,
    /// Content filtered
    ContentFilter,
}

/// Token usage information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Create an LLM provider from configuration
pub fn create_provider(settings: &LlmSettings) -> LlmResult<Arc<dyn LlmProvider>> {
    match settings.provider {
        LlmProviderType::AzureOpenAI => {
            let provider = AzureOpenAiProvider::new(settings)?;
            Ok(Arc::new(provider))
        }
        LlmProviderType::OpenAI => {
            let provider = OpenAiProvider::new(settings)?;
            Ok(Arc::new(provider))
        }
    }
}

/// Convert internal messages to the chat-completions wire format
pub(crate) fn convert_messages(messages: &[Message]) -> Vec<Value> {
    messages
        .iter()
        .map(|m| {
            let mut msg = json!({
                "role": match m.role {
                    Role::System => "system",
                    Role::User => "user",
                    Role::Assistant => "assistant",
                    Role::Tool => "tool",
                },
                "content": m.content,
            });

            if let Some(tool_calls) = &m.tool_calls {
                msg["tool_calls"] = json!(tool_calls.iter().map(|tc| {
                    json!({
                        "id": tc.id,
                        "type": "function",
                        "function": {
                            "name": tc.name,
                            "arguments": serde_json::to_string(&tc.arguments).unwrap_or_default()
                        }
                    })
                }).collect::<Vec<_>>());
            }

            if let Some(tool_call_id) = &m.tool_call_id {
                msg["tool_call_id"] = json!(tool_call_id);
            }

            if let Some(name) = &m.name {
                msg["name"] = json!(name);
            }

            msg
        })
        .collect()
}

/// Convert tool definitions to the wire format, patching up parameter
/// schemas the API would reject (it requires at least `{"type":"object"}`).
pub(crate) fn convert_tools(tools: &[ToolDefinition]) -> Value {
    json!(tools
        .iter()
        .map(|t| {
            let params = if t.parameters.is_null()
                || t.parameters.as_object().map_or(true, |o| o.is_empty())
            {
                json!({
                    "type": "object",
                    "properties": {},
                    "required": []
                })
            } else if t.parameters.get("type").is_none() {
                let mut p = t.parameters.clone();
                if let Some(obj) = p.as_object_mut() {
                    obj.insert("type".to_string(), json!("object"));
                }
                p
            } else {
                t.parameters.clone()
            };
            json!({
                "type": "function",
                "function": {
                    "name": t.name,
                    "description": t.description,
                    "parameters": params
                }
            })
        })
        .collect::<Vec<_>>())
}

pub(crate) fn convert_tool_choice(choice: &ToolChoice) -> Value {
    match choice {
        ToolChoice::Auto => json!("auto"),
        ToolChoice::None => json!("none"),
        ToolChoice::Required => json!("required"),
        ToolChoice::Tool { name } => json!({
            "type": "function",
            "function": { "name": name }
        }),
    }
}

// Wire structs shared by both providers.

#[derive(Debug, Deserialize)]
pub(crate) struct ChatResponse {
    pub choices: Vec<ChatChoice>,
    pub usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChatChoice {
    pub message: ChatMessage,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChatMessage {
    pub content: Option<String>,
    pub tool_calls: Option<Vec<ChatToolCall>>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChatToolCall {
    pub id: String,
    pub function: ChatFunction,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChatFunction {
    pub name: String,
    pub arguments: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChatUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Decode a wire response into the provider-neutral shape.
pub(crate) fn parse_response(response: &ChatResponse) -> LlmResult<CompletionResponse> {
    let choice = response
        .choices
        .first()
        .ok_or_else(|| LlmError::Parse("No choices in response".to_string()))?;

    let tool_calls: Vec<ToolCall> = choice
        .message
        .tool_calls
        .as_ref()
        .map(|tcs| {
            tcs.iter()
                .map(|tc| ToolCall {
                    id: tc.id.clone(),
                    name: tc.function.name.clone(),
                    arguments: serde_json::from_str(&tc.function.arguments)
                        .unwrap_or(Value::Object(Default::default())),
                })
                .collect()
        })
        .unwrap_or_default();

    let message = if tool_calls.is_empty() {
        Message::assistant(choice.message.content.clone().unwrap_or_default())
    } else {
        Message::assistant_with_tools(choice.message.content.clone().unwrap_or_default(), tool_calls)
    };

    let finish_reason = match choice.finish_reason.as_deref() {
        Some("stop") => FinishReason::Stop,
        Some("length") => FinishReason::Length,
        Some("tool_calls") => FinishReason::ToolCalls,
        Some("content_filter") => FinishReason::ContentFilter,
        _ => FinishReason::Stop,
    };

    let usage = response.usage.as_ref().map(|u| TokenUsage {
        prompt_tokens: u.prompt_tokens,
        completion_tokens: u.completion_tokens,
        total_tokens: u.total_tokens,
    });

    Ok(CompletionResponse {
        message,
        finish_reason,
        usage,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_tool_schema_is_patched() {
        let tools = vec![ToolDefinition::new("t", "d", Value::Null)];
        let converted = convert_tools(&tools);
        assert_eq!(converted[0]["function"]["parameters"]["type"], "object");
    }

    #[test]
    fn parse_response_decodes_tool_calls() {
        let raw: ChatResponse = serde_json::from_str(
            r#"{
                "choices": [{
                    "message": {
                        "content": null,
                        "tool_calls": [{
                            "id": "call_abc",
                            "type": "function",
                            "function": { "name": "SQLConnector", "arguments": "{\"operation\":\"query\"}" }
                        }]
                    },
                    "finish_reason": "tool_calls"
                }],
                "usage": { "prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15 }
            }"#,
        )
        .unwrap();

        let parsed = parse_response(&raw).unwrap();
        assert_eq!(parsed.finish_reason, FinishReason::ToolCalls);
        let calls = parsed.message.tool_calls.unwrap();
        assert_eq!(calls[0].name, "SQLConnector");
        assert_eq!(calls[0].arguments["operation"], "query");
    }
}
