use config::{Config, File};
use serde::{Deserialize, Serialize};

pub mod s3;
pub mod watcher;

pub use s3::S3Config;

use crate::cli::Cli;

#[derive(Debug, Deserialize, Serialize)]
pub struct Settings {
    pub server: ServerSettings,
    #[serde(default)]
    pub assistant: AssistantSettings,
    #[serde(default)]
    pub llm: LlmSettings,
    #[serde(default)]
    pub loader: LoaderSettings,
    #[serde(default)]
    pub storage: StorageSettings,
    #[serde(default)]
    pub auth: AuthSettings,
    #[serde(default)]
    pub rate_limit: Option<RateLimitConfig>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

/// Identity and conversation policy for the assistant surface.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AssistantSettings {
    #[serde(default = "default_assistant_name")]
    pub assistant_name: String,
    #[serde(default = "default_characteristic")]
    pub characteristic_description: String,
    /// Conversation history is trimmed to this many trailing messages.
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
    /// Upper bound on tool-call rounds within one request.
    #[serde(default = "default_max_tool_iterations")]
    pub max_tool_iterations: usize,
}

fn default_assistant_name() -> String {
    "Proteus".to_string()
}

fn default_characteristic() -> String {
    "adaptive universal data connector and business insight assistant".to_string()
}

fn default_history_limit() -> usize {
    20
}

fn default_max_tool_iterations() -> usize {
    5
}

impl Default for AssistantSettings {
    fn default() -> Self {
        Self {
            assistant_name: default_assistant_name(),
            characteristic_description: default_characteristic(),
            history_limit: default_history_limit(),
            max_tool_iterations: default_max_tool_iterations(),
        }
    }
}

/// LLM provider selection and connection details.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LlmSettings {
    #[serde(default)]
    pub provider: LlmProviderType,
    /// Model name, or the deployment name for Azure.
    #[serde(default = "default_model")]
    pub model: String,
    /// Base endpoint. Required for Azure
    /// (e.g. `https://your-resource.openai.azure.com`).
    #[serde(default)]
    pub base_url: Option<String>,
    /// Environment variable holding the API key; provider-specific default
    /// when unset.
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default = "default_api_version")]
    pub api_version: String,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
}

fn default_model() -> String {
    "gpt-4o".to_string()
}

fn default_api_version() -> String {
    "2024-02-01".to_string()
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            provider: LlmProviderType::default(),
            model: default_model(),
            base_url: None,
            api_key_env: None,
            api_version: default_api_version(),
            temperature: None,
            max_tokens: None,
        }
    }
}

/// Supported LLM providers
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LlmProviderType {
    /// Azure OpenAI deployments
    #[default]
    #[serde(alias = "azure")]
    AzureOpenAI,
    /// OpenAI API
    OpenAI,
}

/// Reload policy for the agent loader.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoaderSettings {
    /// Minimum spacing between freshness checks.
    #[serde(default = "default_check_interval")]
    pub check_interval_secs: u64,
    /// Maximum time the registry may go without an unconditional reload.
    #[serde(default = "default_force_interval")]
    pub force_interval_secs: u64,
}

fn default_check_interval() -> u64 {
    30
}

fn default_force_interval() -> u64 {
    300
}

impl Default for LoaderSettings {
    fn default() -> Self {
        Self {
            check_interval_secs: default_check_interval(),
            force_interval_secs: default_force_interval(),
        }
    }
}

/// Agent source storage: a local directory by default, S3 when configured.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct StorageSettings {
    #[serde(default = "default_local_path")]
    pub local_path: Option<String>,
    #[serde(default)]
    pub s3: Option<S3Config>,
}

fn default_local_path() -> Option<String> {
    Some("storage".to_string())
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            local_path: default_local_path(),
            s3: None,
        }
    }
}

/// Static API-key authentication for the protected routes.
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct AuthSettings {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub api_keys: Vec<String>,
    #[serde(default = "default_auth_header")]
    pub header_name: String,
}

fn default_auth_header() -> String {
    "x-api-key".to_string()
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub requests_per_second: u32,
    pub burst_size: u32,
}

impl Settings {
    pub fn new() -> Result<Self, anyhow::Error> {
        Self::from_root(".")
    }

    /// Create settings from CLI arguments (config file plus CLI overrides).
    pub fn new_with_cli(cli: &Cli) -> Result<Self, anyhow::Error> {
        let s = Config::builder()
            .add_source(File::from(cli.config.clone()).required(false))
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 3000)?
            .build()?;

        let mut settings: Settings = s.try_deserialize()?;
        settings.apply_cli_overrides(cli);
        Ok(settings)
    }

    pub fn from_root(root: &str) -> Result<Self, anyhow::Error> {
        let config_path = std::path::Path::new(root).join("proteus");
        let s = Config::builder()
            .add_source(File::from(config_path).required(false))
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 3000)?
            .build()?;

        Ok(s.try_deserialize()?)
    }

    fn apply_cli_overrides(&mut self, cli: &Cli) {
        if let Some(host) = &cli.host {
            self.server.host = host.clone();
        }
        if let Some(port) = cli.port {
            self.server.port = port;
        }
        if let Some(path) = &cli.storage_path {
            self.storage.local_path = Some(path.clone());
        }
        if cli.has_s3_config() {
            let s3 = self.storage.s3.get_or_insert_with(S3Config::default);
            s3.merge_cli(cli);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sensible() {
        let loader = LoaderSettings::default();
        assert_eq!(loader.check_interval_secs, 30);
        assert_eq!(loader.force_interval_secs, 300);

        let assistant = AssistantSettings::default();
        assert_eq!(assistant.history_limit, 20);
        assert_eq!(assistant.assistant_name, "Proteus");
    }
}
