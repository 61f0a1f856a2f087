//! Prompt templates: the system prompt and the synthesized-connector source.

use serde::Serialize;
use tera::{Context, Tera};

/// Everything the system prompt interpolates.
#[derive(Debug, Serialize)]
pub struct SystemPromptContext {
    pub assistant_name: String,
    pub characteristic_description: String,
    pub current_datetime: String,
    pub agent_names: Vec<String>,
    pub agent_count: usize,
    pub shared_memory: String,
    pub user_memory: String,
    pub pattern_count: usize,
    pub connection_count: usize,
}

const SYSTEM_PROMPT: &str = r#"<identity>
You are an assistant named {{ assistant_name }}, a {{ characteristic_description }}.
The current date and time is {{ current_datetime }}.
</identity>

<capabilities>
- Connect to databases and APIs through connector agents
- Learn and adapt to new data sources, creating new agents dynamically with LearnNewAgent
- Cache frequently accessed data for performance
- Remember shared and per-user context across conversations
</capabilities>

<available_agents>
{{ agent_names | join(sep=", ") }}
Total agents available: {{ agent_count }}
</available_agents>

<shared_memory_output>
These are memories accessible by all users of the system:
{{ shared_memory }}
</shared_memory_output>

<specific_memory_output>
These are memories specific to the current conversation:
{{ user_memory }}
</specific_memory_output>

<learned_patterns>
Known data patterns: {{ pattern_count }} sources
Cached connections: {{ connection_count }} active
</learned_patterns>

<context_instructions>
- Apply specific context with higher precedence than shared context
- Synthesize information from both contexts for comprehensive responses
- Learn from successful connections and reuse what worked
</context_instructions>

<agent_usage>
IMPORTANT: You must be honest and accurate about agent usage:
- NEVER pretend or imply you've executed an agent when you haven't actually called it
- NEVER fabricate success messages about data operations that haven't occurred
- When a user requests an action, either call the appropriate agent and report actual
  results, or say you don't have the capability and suggest an alternative
- If an agent doesn't exist yet, you can create it with LearnNewAgent
</agent_usage>

<response_format>
CRITICAL: Structure your response in TWO parts separated by the delimiter |||VOICE|||

1. FIRST PART (before |||VOICE|||): your full formatted response, using markdown
   headings, bold, code blocks and lists where they help.
2. SECOND PART (after |||VOICE|||): a concise voice response of one or two sentences,
   pure conversational English with no formatting, focused on the key takeaway.
</response_format>"#;

pub fn render_system_prompt(ctx: &SystemPromptContext) -> tera::Result<String> {
    let context = Context::from_serialize(ctx)?;
    Tera::one_off(SYSTEM_PROMPT, &context, false)
}

/// Minimal connector source synthesized when the LLM asks for a connector
/// that does not exist yet. Best-effort: anything that goes wrong here
/// degrades to "agent not found".
const CONNECTOR_SOURCE: &str = r#"fn register() {
    [#{
        name: "{{ name }}",
        description: "Dynamic connector for the {{ name }} data source",
        parameters: #{
            "type": "object",
            "properties": #{
                "connection_string": #{
                    "type": "string",
                    "description": "Connection string or endpoint URL"
                },
                "query": #{
                    "type": "string",
                    "description": "Query or request to execute"
                }
            },
            "required": ["connection_string", "query"]
        },
        entry: "perform"
    }]
}

fn perform(params) {
    let connection = params.connection_string ?? "";
    let query = params.query ?? "";
    `{"status":"connected","connector":"{{ name }}","target":"${connection}","query":"${query}","checked_at":"${now_iso()}"}`
}
"#;

pub fn render_connector_source(name: &str) -> tera::Result<String> {
    let mut context = Context::new();
    context.insert("name", name);
    Tera::one_off(CONNECTOR_SOURCE, &context, false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_prompt_renders() {
        let ctx = SystemPromptContext {
            assistant_name: "Proteus".into(),
            characteristic_description: "adaptive data assistant".into(),
            current_datetime: "Friday, August 7, 2026 at 10:00 AM".into(),
            agent_names: vec!["SQLConnector".into(), "ContextMemory".into()],
            agent_count: 2,
            shared_memory: "No shared context memory available.".into(),
            user_memory: "No specific context memory available.".into(),
            pattern_count: 0,
            connection_count: 0,
        };
        let rendered = render_system_prompt(&ctx).unwrap();
        assert!(rendered.contains("Proteus"));
        assert!(rendered.contains("SQLConnector, ContextMemory"));
        assert!(rendered.contains("|||VOICE|||"));
    }

    #[test]
    fn connector_source_compiles() {
        let source = render_connector_source("Salesforce").unwrap();
        let engine = crate::loader::ScriptEngine::new();
        let unit = crate::loader::ScriptUnit::compile_source(&engine, &source).unwrap();
        let regs = unit.registrations().unwrap();
        assert_eq!(regs[0].name, "Salesforce");
        assert!(unit.has_entry("perform"));
    }
}
