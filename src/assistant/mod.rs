//! The assistant dispatch layer.
//!
//! One [`Assistant`] is constructed per request (cheap: it is a view over
//! process-wide state). It renders the system prompt from the live agent
//! roster and the caller's memory context, runs the LLM tool-call loop, and
//! resolves tool names against the registry with a three-tier fallback:
//! registry lookup, just-in-time reload, then best-effort connector
//! synthesis.

mod cache;
mod error;
mod patterns;
mod prompt;

pub use cache::QueryCache;
pub use error::{AssistantError, AssistantResult};
pub use patterns::UsageTracker;
pub use prompt::{render_connector_source, render_system_prompt, SystemPromptContext};

use backoff::ExponentialBackoffBuilder;
use bytes::Bytes;
use chrono::Utc;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::agents::to_snake_case;
use crate::config::AssistantSettings;
use crate::domain::{AgentParams, DynAgent, Message, Role, ToolCall, ToolDefinition};
use crate::llm::{CompletionRequest, CompletionResponse, LlmProvider, ToolChoice};
use crate::loader::{Collection, LoaderState, RELOAD_MARKER};

/// Memory context is used verbatim in the system prompt; cap it so one noisy
/// memory file cannot crowd out the conversation.
const MEMORY_CONTEXT_LIMIT: usize = 5_000;

/// Fallback user identity when the request carries no GUID.
pub const DEFAULT_USER_GUID: &str = "00000000-0000-0000-0000-000000000000";

/// One message of inbound conversation history, tolerant of sloppy clients:
/// every field is optional and non-string content is coerced.
#[derive(Debug, Clone, Deserialize)]
pub struct IncomingMessage {
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub content: Option<Value>,
}

/// What a dispatch round trip produces.
#[derive(Debug, Clone)]
pub struct AssistantReply {
    pub formatted: String,
    pub voice: String,
    pub agent_logs: String,
}

impl AssistantReply {
    fn new(formatted: impl Into<String>, voice: impl Into<String>, logs: &[String]) -> Self {
        Self {
            formatted: formatted.into(),
            voice: voice.into(),
            agent_logs: logs.join("\n"),
        }
    }
}

pub struct Assistant {
    config: AssistantSettings,
    llm: Arc<dyn LlmProvider>,
    loader: Arc<LoaderState>,
    tracker: Arc<UsageTracker>,
    cache: Arc<QueryCache>,
    user_guid: String,
    shared_memory: String,
    user_memory: String,
}

impl Assistant {
    pub async fn new(
        config: AssistantSettings,
        llm: Arc<dyn LlmProvider>,
        loader: Arc<LoaderState>,
        tracker: Arc<UsageTracker>,
        cache: Arc<QueryCache>,
        user_guid: Option<String>,
    ) -> Self {
        let mut assistant = Self {
            config,
            llm,
            loader,
            tracker,
            cache,
            user_guid: user_guid.unwrap_or_else(|| DEFAULT_USER_GUID.to_string()),
            shared_memory: String::new(),
            user_memory: String::new(),
        };
        assistant.initialize_context_memory().await;
        assistant
    }

    pub fn user_guid(&self) -> &str {
        &self.user_guid
    }

    /// Pull shared and user memory through the ContextMemory agent, exactly
    /// as any other caller would. Failures leave placeholder text.
    async fn initialize_context_memory(&mut self) {
        let registry = self.loader.registry();
        let Some(agent) = registry.get("ContextMemory").await else {
            self.shared_memory = "No shared context memory available.".to_string();
            self.user_memory = "No specific context memory available.".to_string();
            return;
        };

        let mut shared_params = AgentParams::new();
        shared_params.insert("full_recall".into(), Value::Bool(true));
        self.shared_memory = match agent.perform(shared_params).await {
            Ok(text) => truncate(&text, MEMORY_CONTEXT_LIMIT),
            Err(e) => {
                warn!("error getting shared memory: {e}");
                "Context memory initialization failed.".to_string()
            }
        };

        let mut user_params = AgentParams::new();
        user_params.insert("user_guid".into(), Value::String(self.user_guid.clone()));
        user_params.insert("full_recall".into(), Value::Bool(true));
        self.user_memory = match agent.perform(user_params).await {
            Ok(text) => truncate(&text, MEMORY_CONTEXT_LIMIT),
            Err(e) => {
                warn!("error getting user memory: {e}");
                "Context memory initialization failed.".to_string()
            }
        };
    }

    /// Process one user request end to end.
    pub async fn respond(&mut self, prompt: &str, history: &[IncomingMessage]) -> AssistantReply {
        self.loader.check_and_reload().await;

        let mut history = history.to_vec();
        if history.len() > self.config.history_limit {
            let excess = history.len() - self.config.history_limit;
            history.drain(..excess);
            info!(limit = self.config.history_limit, "trimmed conversation history");
        }

        let guid_from_history = first_message_guid(&history);
        let guid_from_prompt = extract_user_guid(prompt);
        if let Some(guid) = guid_from_history.clone().or_else(|| guid_from_prompt.clone()) {
            if guid != self.user_guid {
                self.user_guid = guid;
                self.initialize_context_memory().await;
                info!(user_guid = %self.user_guid, "user GUID updated");
            }
        }

        let prompt = prompt.trim();

        // A bare-GUID prompt just primes the memory context.
        if let Some(guid) = &guid_from_prompt {
            if prompt.eq_ignore_ascii_case(guid) && self.user_guid == *guid {
                return AssistantReply::new(
                    "I've loaded your conversation memory and data connection patterns. \
                     How can I assist you today?",
                    "I've loaded your memory - what can I help you with?",
                    &[],
                );
            }
        }

        let is_data_request = is_data_connection_request(prompt);

        let mut messages = self
            .prepare_messages(&history, guid_from_history.is_some())
            .await;
        messages.push(Message::user(prompt));

        let mut agent_logs: Vec<String> = Vec::new();
        let mut force_text = false;

        for _round in 0..self.config.max_tool_iterations {
            // Re-read the roster every round: an agent created in the
            // previous round is advertisable in this one.
            let tools: Vec<ToolDefinition> = self
                .loader
                .registry()
                .metadata()
                .await
                .iter()
                .map(ToolDefinition::from)
                .collect();

            let response = match self.complete_with_retry(&messages, &tools, force_text).await {
                Ok(response) => response,
                Err(e) => {
                    error!("LLM call failed after retries: {e}");
                    return AssistantReply::new(
                        "An error occurred. Please try again.",
                        "Something went wrong - try again.",
                        &agent_logs,
                    );
                }
            };

            let assistant_msg = response.message;
            let tool_calls = assistant_msg.tool_calls.clone().unwrap_or_default();

            if tool_calls.is_empty() {
                let (formatted, voice) = parse_response_with_voice(&assistant_msg.content);
                return AssistantReply::new(formatted, voice, &agent_logs);
            }

            messages.push(assistant_msg);
            let mut needs_follow_up = false;

            for call in &tool_calls {
                let agent = match self
                    .resolve_agent(&call.name, is_data_request, &mut agent_logs)
                    .await
                {
                    Ok(agent) => agent,
                    Err(AssistantError::AgentNotFound { name, available }) => {
                        return AssistantReply::new(
                            format!(
                                "Agent '{}' does not exist. Available agents: {}",
                                name,
                                available.join(", ")
                            ),
                            "I couldn't find that agent.",
                            &agent_logs,
                        );
                    }
                    Err(e) => {
                        error!("agent resolution failed: {e}");
                        return AssistantReply::new(
                            "An error occurred. Please try again.",
                            "Something went wrong - try again.",
                            &agent_logs,
                        );
                    }
                };

                let result = match self
                    .execute_agent(&agent, call, is_data_request, &mut agent_logs)
                    .await
                {
                    Ok(result) => result,
                    Err(e) => {
                        error!(agent = %call.name, "agent execution failed: {e}");
                        return AssistantReply::new(
                            format!("Error executing agent '{}': {e}", call.name),
                            "I hit an error processing that.",
                            &agent_logs,
                        );
                    }
                };

                if result_requests_follow_up(&result) {
                    needs_follow_up = true;
                }
                messages.push(Message::tool_result(
                    call.id.clone(),
                    call.name.clone(),
                    &Value::String(result),
                ));
            }

            // Once no tool result asked for another action, the next turn is
            // answer-only: tools are withheld so the model wraps up in text.
            force_text = !needs_follow_up;
        }

        AssistantReply::new(
            "Service temporarily unavailable. Please try again later.",
            "Service is down - try again later.",
            &agent_logs,
        )
    }

    async fn prepare_messages(
        &self,
        history: &[IncomingMessage],
        skip_first_guid: bool,
    ) -> Vec<Message> {
        let registry = self.loader.registry();
        let agent_names = registry.names().await;

        let context = SystemPromptContext {
            assistant_name: self.config.assistant_name.clone(),
            characteristic_description: self.config.characteristic_description.clone(),
            current_datetime: Utc::now().format("%A, %B %d, %Y at %I:%M %p").to_string(),
            agent_count: agent_names.len(),
            agent_names,
            shared_memory: self.shared_memory.clone(),
            user_memory: self.user_memory.clone(),
            pattern_count: self.tracker.pattern_count().await,
            connection_count: self.tracker.connection_count().await,
        };
        let system = render_system_prompt(&context).unwrap_or_else(|e| {
            error!("system prompt rendering failed: {e}");
            format!(
                "You are {}, a {}.",
                context.assistant_name, context.characteristic_description
            )
        });

        let mut messages = vec![Message::system(system)];
        let start = usize::from(skip_first_guid);
        for incoming in history.iter().skip(start) {
            messages.push(ensure_string_content(incoming));
        }
        messages
    }

    async fn complete_with_retry(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
        force_text: bool,
    ) -> AssistantResult<CompletionResponse> {
        let request = CompletionRequest {
            messages: messages.to_vec(),
            tools: if force_text || tools.is_empty() {
                None
            } else {
                Some(tools.to_vec())
            },
            tool_choice: if force_text || tools.is_empty() {
                None
            } else {
                Some(ToolChoice::Auto)
            },
            ..Default::default()
        };

        let policy = ExponentialBackoffBuilder::new()
            .with_initial_interval(Duration::from_secs(2))
            .with_max_elapsed_time(Some(Duration::from_secs(20)))
            .build();

        let llm = self.llm.clone();
        let response = backoff::future::retry(policy, || {
            let llm = llm.clone();
            let request = request.clone();
            async move {
                llm.complete(request).await.map_err(|e| {
                    warn!("LLM call failed, will retry: {e}");
                    backoff::Error::transient(e)
                })
            }
        })
        .await?;
        Ok(response)
    }

    /// Three-tier resolution: registry, just-in-time reload, connector
    /// synthesis. Agents can be created mid-conversation by LearnNewAgent,
    /// so a miss is not yet a failure.
    async fn resolve_agent(
        &self,
        name: &str,
        is_data_request: bool,
        agent_logs: &mut Vec<String>,
    ) -> AssistantResult<DynAgent> {
        let registry = self.loader.registry();
        if let Some(agent) = registry.get(name).await {
            return Ok(agent);
        }

        info!(agent = name, "agent not in registry; attempting reload");
        self.loader.force_reload().await;
        if let Some(agent) = registry.get(name).await {
            agent_logs.push(format!("Found {name} after reload"));
            return Ok(agent);
        }

        if name.contains("Connector") || is_data_request {
            if let Some(agent) = self.synthesize_connector(name, agent_logs).await {
                return Ok(agent);
            }
        }

        Err(AssistantError::AgentNotFound {
            name: name.to_string(),
            available: registry.names().await,
        })
    }

    /// Write a minimal templated connector to the `remote_connectors`
    /// collection and reload once more. Strictly best-effort.
    async fn synthesize_connector(
        &self,
        name: &str,
        agent_logs: &mut Vec<String>,
    ) -> Option<DynAgent> {
        info!(connector = name, "attempting to synthesize connector");
        let source = match render_connector_source(name) {
            Ok(source) => source,
            Err(e) => {
                warn!("connector template rendering failed: {e}");
                return None;
            }
        };

        let store = self.loader.store();
        let file_id = format!("{}_connector.rhai", to_snake_case(name));
        if let Err(e) = store
            .write(
                Collection::RemoteConnectors,
                &file_id,
                Bytes::from(source.into_bytes()),
            )
            .await
        {
            warn!("could not persist synthesized connector: {e}");
            return None;
        }
        let _ = store
            .write(
                Collection::RemoteAgents,
                RELOAD_MARKER,
                Bytes::from(Utc::now().to_rfc3339().into_bytes()),
            )
            .await;

        self.loader.force_reload().await;
        let agent = self.loader.registry().get(name).await;
        if agent.is_some() {
            agent_logs.push(format!("Synthesized and loaded connector {name}"));
        }
        agent
    }

    async fn execute_agent(
        &self,
        agent: &DynAgent,
        call: &ToolCall,
        is_data_request: bool,
        agent_logs: &mut Vec<String>,
    ) -> anyhow::Result<String> {
        let mut params: AgentParams = match &call.arguments {
            Value::Object(map) => map.clone(),
            _ => AgentParams::new(),
        };
        // Null arguments become empty strings rather than tripping agents up.
        for value in params.values_mut() {
            if value.is_null() {
                *value = Value::String(String::new());
            }
        }

        let name = agent.name().to_string();
        if matches!(name.as_str(), "ManageMemory" | "ContextMemory") {
            params.insert("user_guid".into(), Value::String(self.user_guid.clone()));
        }

        let params_value = Value::Object(params.clone());
        if name.contains("Connector") || name.contains("SQL") || name.contains("API") {
            self.tracker.track_access(&name, &params_value).await;
        }

        let result = if is_data_request && matches!(name.as_str(), "SQLConnector" | "APIConnector")
        {
            match self.cache.get(&name, &params_value).await {
                Some(cached) => {
                    agent_logs.push(format!("Cache hit for {name}"));
                    format!("Retrieved from cache: {cached}")
                }
                None => {
                    let result = agent.perform(params).await?;
                    if let Ok(envelope) = serde_json::from_str::<Value>(&result) {
                        if envelope["status"] == "success" {
                            self.cache.put(&name, &params_value, &envelope["data"]).await;
                        }
                    }
                    result
                }
            }
        } else {
            agent.perform(params).await?
        };

        agent_logs.push(format!("Performed {name} and got result: {result}"));

        // A freshly authored agent must be callable in this very
        // conversation; don't wait for the scheduler.
        if name == "LearnNewAgent" && result.to_lowercase().contains("successfully") {
            info!("LearnNewAgent created a new agent, forcing immediate reload");
            self.loader.force_reload().await;
        }

        if result.to_lowercase().contains("success")
            && (name.contains("Connector") || is_data_request)
        {
            self.tracker.learn_success(&name, &params_value).await;
        }

        Ok(result)
    }
}

fn truncate(text: &str, limit: usize) -> String {
    if text.len() <= limit {
        return text.to_string();
    }
    let mut end = limit;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    text[..end].to_string()
}

/// Coerce an inbound history message into a well-formed chat message.
pub fn ensure_string_content(incoming: &IncomingMessage) -> Message {
    let role = match incoming.role.as_deref() {
        Some("system") => Role::System,
        Some("assistant") => Role::Assistant,
        _ => Role::User,
    };
    let content = incoming
        .content
        .as_ref()
        .map(|v| match v {
            Value::String(s) => s.clone(),
            Value::Null => String::new(),
            other => other.to_string(),
        })
        .unwrap_or_default();
    Message {
        role,
        content,
        tool_calls: None,
        tool_call_id: None,
        name: None,
    }
}

/// Whether a string is exactly a hyphenated GUID.
pub fn is_guid(text: &str) -> bool {
    text.len() == 36 && uuid::Uuid::parse_str(text).is_ok()
}

/// Extract a GUID from user input, either bare or labeled (`guid: <...>`).
pub fn extract_user_guid(text: &str) -> Option<String> {
    let trimmed = text.trim();
    if is_guid(trimmed) {
        return Some(trimmed.to_lowercase());
    }

    let lower = trimmed.to_lowercase();
    if let Some(rest) = lower.strip_prefix("guid") {
        let candidate = rest.trim_start_matches([':', '=', ' ', '\t']);
        if is_guid(candidate) {
            return Some(candidate.to_string());
        }
    }
    None
}

/// Whether the first history message is only a GUID (a memory-priming call).
pub fn first_message_guid(history: &[IncomingMessage]) -> Option<String> {
    let first = history.first()?;
    if first.role.as_deref().unwrap_or("user") != "user" {
        return None;
    }
    let content = first.content.as_ref()?.as_str()?.trim();
    is_guid(content).then(|| content.to_lowercase())
}

/// Heuristic for data-ish prompts; feeds the cache and connector-synthesis
/// paths.
pub fn is_data_connection_request(prompt: &str) -> bool {
    const KEYWORDS: [&str; 16] = [
        "connect", "database", "api", "query", "fetch", "retrieve", "load", "import", "access",
        "sql", "nosql", "graphql", "csv", "json", "transform", "export",
    ];
    let lower = prompt.to_lowercase();
    KEYWORDS.iter().any(|k| lower.contains(k))
}

/// Split a response into its formatted and voice parts. Without the
/// delimiter, the first sentence (markdown stripped) becomes the voice line.
pub fn parse_response_with_voice(content: &str) -> (String, String) {
    if content.is_empty() {
        return (String::new(), String::new());
    }

    if let Some((formatted, voice)) = content.split_once("|||VOICE|||") {
        return (formatted.trim().to_string(), voice.trim().to_string());
    }

    let formatted = content.trim().to_string();
    let first_sentence = formatted.split('.').next().unwrap_or("").trim();
    let voice = if first_sentence.is_empty() {
        "I've completed your request.".to_string()
    } else {
        let stripped = first_sentence
            .replace("**", "")
            .replace("---", "")
            .replace(['`', '#', '>'], "");
        format!(
            "{}.",
            stripped.split_whitespace().collect::<Vec<_>>().join(" ")
        )
    };
    (formatted, voice)
}

/// A tool result can ask for another round explicitly.
fn result_requests_follow_up(result: &str) -> bool {
    let Ok(value) = serde_json::from_str::<Value>(result) else {
        return false;
    };
    let Some(obj) = value.as_object() else {
        return false;
    };
    if obj.get("error").map_or(false, |e| !e.is_null()) {
        return true;
    }
    if obj.get("status").and_then(Value::as_str) == Some("incomplete") {
        return true;
    }
    obj.get("requires_additional_action") == Some(&Value::Bool(true))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn guid_detection() {
        assert!(is_guid("9b2e1f60-1234-4cde-8f0a-22ab44cd55ef"));
        assert!(!is_guid("not-a-guid"));
        assert!(!is_guid("9b2e1f60-1234-4cde-8f0a-22ab44cd55ef "));

        assert_eq!(
            extract_user_guid("  9B2E1F60-1234-4CDE-8F0A-22AB44CD55EF "),
            Some("9b2e1f60-1234-4cde-8f0a-22ab44cd55ef".to_string())
        );
        assert_eq!(
            extract_user_guid("guid: 9b2e1f60-1234-4cde-8f0a-22ab44cd55ef"),
            Some("9b2e1f60-1234-4cde-8f0a-22ab44cd55ef".to_string())
        );
        assert_eq!(extract_user_guid("connect to the database"), None);
    }

    #[test]
    fn first_history_guid_must_be_user_role() {
        let history = vec![IncomingMessage {
            role: Some("assistant".into()),
            content: Some(json!("9b2e1f60-1234-4cde-8f0a-22ab44cd55ef")),
        }];
        assert!(first_message_guid(&history).is_none());

        let history = vec![IncomingMessage {
            role: Some("user".into()),
            content: Some(json!("9b2e1f60-1234-4cde-8f0a-22ab44cd55ef")),
        }];
        assert!(first_message_guid(&history).is_some());
    }

    #[test]
    fn voice_split_with_delimiter() {
        let (formatted, voice) =
            parse_response_with_voice("**Done!** Details follow.\n|||VOICE|||\nAll done here.");
        assert_eq!(formatted, "**Done!** Details follow.");
        assert_eq!(voice, "All done here.");
    }

    #[test]
    fn voice_split_fallback_strips_markdown() {
        let (formatted, voice) =
            parse_response_with_voice("**Connected** to `postgres`. 15 tables found.");
        assert!(formatted.starts_with("**Connected**"));
        assert_eq!(voice, "Connected to postgres.");
    }

    #[test]
    fn data_request_heuristic() {
        assert!(is_data_connection_request("Please query the sales database"));
        assert!(!is_data_connection_request("Tell me a joke"));
    }

    #[test]
    fn follow_up_detection() {
        assert!(result_requests_follow_up(r#"{"status":"incomplete"}"#));
        assert!(result_requests_follow_up(r#"{"error":"nope"}"#));
        assert!(result_requests_follow_up(
            r#"{"requires_additional_action":true}"#
        ));
        assert!(!result_requests_follow_up(r#"{"status":"success"}"#));
        assert!(!result_requests_follow_up("plain text"));
    }

    #[test]
    fn sloppy_history_messages_are_coerced() {
        let incoming = IncomingMessage {
            role: None,
            content: Some(json!({"nested": true})),
        };
        let message = ensure_string_content(&incoming);
        assert_eq!(message.role, Role::User);
        assert_eq!(message.content, r#"{"nested":true}"#);

        let empty = IncomingMessage {
            role: Some("assistant".into()),
            content: None,
        };
        let message = ensure_string_content(&empty);
        assert_eq!(message.role, Role::Assistant);
        assert_eq!(message.content, "");
    }
}
