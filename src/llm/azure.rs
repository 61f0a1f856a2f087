//! Azure OpenAI LLM provider
//!
//! Same wire format as OpenAI, but the endpoint is deployment-scoped
//! (`{endpoint}/openai/deployments/{deployment}/chat/completions`), the API
//! version travels as a query parameter, and the key goes in the `api-key`
//! header.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::env;
use tiktoken_rs::CoreBPE;

use super::{
    convert_messages, convert_tool_choice, convert_tools, parse_response, ChatResponse,
    CompletionRequest, CompletionResponse, LlmError, LlmProvider, LlmResult,
};
use crate::config::LlmSettings;

/// Azure OpenAI chat-completions provider
pub struct AzureOpenAiProvider {
    client: reqwest::Client,
    api_key: String,
    endpoint: String,
    deployment: String,
    api_version: String,
    default_temperature: Option<f32>,
    default_max_tokens: Option<u32>,
    bpe: Option<CoreBPE>,
}

impl AzureOpenAiProvider {
    /// Create a new Azure OpenAI provider from configuration
    pub fn new(settings: &LlmSettings) -> LlmResult<Self> {
        let env_var = settings
            .api_key_env
            .as_deref()
            .unwrap_or("AZURE_OPENAI_API_KEY");
        let api_key = env::var(env_var).map_err(|_| {
            LlmError::Authentication(format!("Environment variable {} not set", env_var))
        })?;

        let endpoint = settings.base_url.clone().ok_or_else(|| {
            LlmError::InvalidRequest(
                "Azure OpenAI requires base_url to be set (e.g., https://your-resource.openai.azure.com)"
                    .to_string(),
            )
        })?;

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            deployment: settings.model.clone(),
            api_version: settings.api_version.clone(),
            default_temperature: settings.temperature,
            default_max_tokens: settings.max_tokens,
            bpe: tiktoken_rs::cl100k_base().ok(),
        })
    }

    fn build_request_body(&self, request: &CompletionRequest) -> Value {
        // Azure infers the model from the deployment; no "model" field.
        let mut body = json!({
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
impl LlmProvider for AzureOpenAiProvider {
    fn name(&self) -> &str {
        "azure-openai"
    }

    fn model(&self) -> &str {
        &self.deployment
    }

    async fn complete(&self, request: CompletionRequest) -> LlmResult<CompletionResponse> {
        let body = self.build_request_body(&request);
        let url = format!(
            "{}/openai/deployments/{}/chat/completions",
            self.endpoint, self.deployment
        );

        let response = self
            .client
            .post(url)
            .query(&[("api-version", self.api_version.as_str())])
            .header("api-key", &self.api_key)
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
            None => (text.len() / 4) as u32,
        }
    }

    fn context_window(&self) -> u32 {
        match self.deployment.as_str() {
            d if d.contains("gpt-4-turbo") || d.contains("gpt-4o") => 128000,
            d if d.contains("gpt-4-32k") => 32768,
            d if d.contains("gpt-4") => 8192,
            d if d.contains("gpt-35-turbo-16k") => 16384,
            d if d.contains("gpt-35-turbo") => 4096,
            _ => 8192,
        }
    }
}
