//! OpenAI LLM provider

use async_trait::async_trait;
use serde_json::{json, Value};
use std::env;
use tiktoken_rs::CoreBPE;

use super::{
    convert_messages, convert_tool_choice, convert_tools, parse_response, ChatResponse,
    CompletionRequest, CompletionResponse, LlmError, LlmProvider, LlmResult,
};
use crate::config::LlmSettings;

/// OpenAI chat-completions provider
pub struct OpenAiProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    default_temperature: Option<f32>,
    default_max_tokens: Option<u32>,
    bpe: Option<CoreBPE>,
}

impl OpenAiProvider {
    /// Create a new OpenAI provider from configuration
    pub fn new(settings: &LlmSettings) -> LlmResult<Self> {
        let env_var = settings.api_key_env.as_deref().unwrap_or("OPENAI_API_KEY");
        let api_key = env::var(env_var).map_err(|_| {
            LlmError::Authentication(format!("Environment variable {} not set", env_var))
        })?;

        let base_url = settings
            .base_url
            .clone()
            .unwrap_or_else(|| "https://api.openai.com/v1".to_string());

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            base_url,
            model: settings.model.clone(),
            default_temperature: settings.temperature,
            default_max_tokens: settings.max_tokens,
            bpe: tiktoken_rs::cl100k_base().ok(),
        })
    }

    /// Build the request body for the chat-completions API
    fn build_request_body(&self, request: &CompletionRequest) -> Value {
        let mut body = json!({
            "model": self.model,
            "messages": convert_messages(&request.messages),
        });

        if let Some(temp) = request.temperature.or(self.default_temperature) {
            body["temperature"] = json!(temp);
        }

        if let Some(max_tokens) = request.max_tokens.or(self.default_max_tokens) {
            body["max_tokens"] = json!(max_tokens);
        }

        if let Some(tools) = &request.tools {
            if !tools.is_empty() {
                body["tools"] = convert_tools(tools);
            }
        }

        if let Some(tool_choice) = &request.tool_choice {
            body["tool_choice"] = convert_tool_choice(tool_choice);
        }

        body
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: CompletionRequest) -> LlmResult<CompletionResponse> {
        let body = self.build_request_body(&request);

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(LlmError::Api {
                status: status.as_u16(),
                message: error_text,
            });
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Parse(format!("Failed to parse response: {}", e)))?;

        parse_response(&parsed)
    }

    fn count_tokens(&self, text: &str) -> u32 {
        match &self.bpe {
            Some(bpe) => bpe.encode_with_special_tokens(text).len() as u32,
            // Fall back to the usual 4-chars-per-token approximation.
            None => (text.len() / 4) as u32,
        }
    }

    fn context_window(&self) -> u32 {
        match self.model.as_str() {
            m if m.contains("gpt-4-turbo") || m.contains("gpt-4o") => 128000,
            m if m.contains("gpt-4-32k") => 32768,
            m if m.contains("gpt-4") => 8192,
            m if m.contains("gpt-3.5-turbo-16k") => 16384,
            m if m.contains("gpt-3.5-turbo") => 4096,
            _ => 8192,
        }
    }
}
