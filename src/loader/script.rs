//! Rhai script units and the agents they declare.
//!
//! A loadable unit is a Rhai file exposing a top-level `register()` function
//! that returns an array of agent declarations:
//!
//! ```rhai
//! fn register() {
//!     [#{
//!         name: "Stock",
//!         description: "Looks up stock quotes",
//!         parameters: #{ "type": "object", "properties": #{} },
//!         entry: "perform_stock"
//!     }]
//! }
//!
//! fn perform_stock(params) {
//!     `{"status":"success","symbol":"${params.symbol ?? "MSFT"}"}`
//! }
//! ```
//!
//! One file may declare multiple agents; each declaration names its own
//! entry function.

use anyhow::Context;
use async_trait::async_trait;
use chrono::Utc;
use fake::faker::address::en::CityName;
use fake::faker::internet::en::SafeEmail;
use fake::faker::lorem::en::Sentence;
use fake::faker::name::en::Name;
use fake::faker::phone_number::en::PhoneNumber;
use fake::Fake;
use rand::Rng;
use rhai::{Dynamic, Engine, Scope, AST};
use serde::Deserialize;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;

use super::error::LoadError;
use crate::domain::{Agent, AgentMetadata, AgentParams};

/// Shared Rhai engine with the fake-data helpers scripts rely on for
/// simulated payloads.
#[derive(Clone)]
pub struct ScriptEngine {
    engine: Arc<Engine>,
}

impl ScriptEngine {
    pub fn new() -> Self {
        let mut engine = Engine::new();

        engine.register_fn("fake_name", || Name().fake::<String>());
        engine.register_fn("fake_email", || SafeEmail().fake::<String>());
        engine.register_fn("fake_sentence", || Sentence(1..10).fake::<String>());
        engine.register_fn("fake_city", || CityName().fake::<String>());
        engine.register_fn("fake_phone", || PhoneNumber().fake::<String>());
        engine.register_fn("rand_int", |lo: i64, hi: i64| {
            if lo >= hi {
                lo
            } else {
                rand::thread_rng().gen_range(lo..=hi)
            }
        });
        engine.register_fn("rand_float", || rand::thread_rng().gen::<f64>());
        engine.register_fn("now_iso", || Utc::now().to_rfc3339());

        Self {
            engine: Arc::new(engine),
        }
    }

    pub fn compile_file(&self, path: &Path) -> Result<AST, LoadError> {
        self.engine
            .compile_file(path.to_path_buf())
            .map_err(|e| LoadError::Compile(e.to_string()))
    }

    /// Compile source held in memory. Used to validate agent code before it
    /// is persisted (LearnNewAgent) and in tests.
    pub fn compile_source(&self, source: &str) -> Result<AST, LoadError> {
        self.engine
            .compile(source)
            .map_err(|e| LoadError::Compile(e.to_string()))
    }

    fn raw(&self) -> Arc<Engine> {
        self.engine.clone()
    }
}

impl Default for ScriptEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// One agent declaration returned by a unit's `register()`.
#[derive(Debug, Clone, Deserialize)]
pub struct Registration {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub parameters: Option<Value>,
    pub entry: String,
}

/// A compiled script unit: the opaque loaded-unit handle stored in the
/// module cache.
pub struct ScriptUnit {
    engine: Arc<Engine>,
    ast: AST,
}

impl ScriptUnit {
    pub fn compile_file(engine: &ScriptEngine, path: &Path) -> Result<Self, LoadError> {
        let ast = engine.compile_file(path)?;
        Ok(Self {
            engine: engine.raw(),
            ast,
        })
    }

    pub fn compile_source(engine: &ScriptEngine, source: &str) -> Result<Self, LoadError> {
        let ast = engine.compile_source(source)?;
        Ok(Self {
            engine: engine.raw(),
            ast,
        })
    }

    /// Call the unit's `register()` and decode the declarations.
    pub fn registrations(&self) -> Result<Vec<Registration>, LoadError> {
        let mut scope = Scope::new();
        let result = self
            .engine
            .call_fn::<Dynamic>(&mut scope, &self.ast, "register", ())
            .map_err(|e| LoadError::Registration(e.to_string()))?;

        let value = serde_json::to_value(&result)
            .map_err(|e| LoadError::Registration(format!("register() is not serializable: {e}")))?;
        serde_json::from_value(value)
            .map_err(|e| LoadError::Registration(format!("invalid declaration list: {e}")))
    }

    /// Whether the unit defines a one-argument function with this name.
    pub fn has_entry(&self, entry: &str) -> bool {
        self.ast
            .iter_functions()
            .any(|f| f.name == entry && f.params.len() == 1)
    }

    fn call_entry(&self, entry: &str, params: Dynamic) -> anyhow::Result<String> {
        let mut scope = Scope::new();
        let result = self
            .engine
            .call_fn::<Dynamic>(&mut scope, &self.ast, entry, (params,))
            .map_err(|e| anyhow::anyhow!("script error in '{entry}': {e}"))?;

        // Strings pass through untouched; anything else is JSON-encoded.
        match result.clone().into_string() {
            Ok(text) => Ok(text),
            Err(_) => {
                let value =
                    serde_json::to_value(&result).context("script returned unserializable value")?;
                Ok(value.to_string())
            }
        }
    }
}

/// An agent instance backed by a compiled script unit. Holds its own handle
/// to the unit, so it survives the unit's eviction from the module cache.
pub struct ScriptAgent {
    metadata: AgentMetadata,
    entry: String,
    unit: Arc<ScriptUnit>,
}

impl ScriptAgent {
    /// Construct from a declaration, verifying the entry point exists.
    pub fn new(unit: Arc<ScriptUnit>, registration: Registration) -> Result<Self, LoadError> {
        if !unit.has_entry(&registration.entry) {
            return Err(LoadError::Instantiation(format!(
                "agent '{}' declares missing entry function '{}'",
                registration.name, registration.entry
            )));
        }
        let parameters = registration
            .parameters
            .unwrap_or_else(|| serde_json::json!({ "type": "object", "properties": {} }));
        Ok(Self {
            metadata: AgentMetadata::new(registration.name, registration.description, parameters),
            entry: registration.entry,
            unit,
        })
    }
}

#[async_trait]
impl Agent for ScriptAgent {
    fn name(&self) -> &str {
        &self.metadata.name
    }

    fn metadata(&self) -> &AgentMetadata {
        &self.metadata
    }

    async fn perform(&self, params: AgentParams) -> anyhow::Result<String> {
        let args: Dynamic = serde_json::from_value(Value::Object(params))
            .context("parameters are not representable in the script engine")?;
        self.unit.call_entry(&self.entry, args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const UNIT: &str = r#"
fn register() {
    [#{
        name: "Echo",
        description: "Echoes its input",
        parameters: #{ "type": "object", "properties": #{ "text": #{ "type": "string" } } },
        entry: "run_echo"
    }, #{
        name: "Broken",
        entry: "no_such_fn"
    }]
}

fn run_echo(params) {
    `echo: ${params.text}`
}
"#;

    #[tokio::test]
    async fn registers_and_performs() {
        let engine = ScriptEngine::new();
        let unit = Arc::new(ScriptUnit::compile_source(&engine, UNIT).unwrap());

        let regs = unit.registrations().unwrap();
        assert_eq!(regs.len(), 2);

        let echo = ScriptAgent::new(unit.clone(), regs[0].clone()).unwrap();
        assert_eq!(echo.name(), "Echo");

        let mut params = AgentParams::new();
        params.insert("text".into(), serde_json::json!("hi"));
        let result = echo.perform(params).await.unwrap();
        assert_eq!(result, "echo: hi");
    }

    #[test]
    fn missing_entry_is_instantiation_failure() {
        let engine = ScriptEngine::new();
        let unit = Arc::new(ScriptUnit::compile_source(&engine, UNIT).unwrap());
        let regs = unit.registrations().unwrap();

        let err = ScriptAgent::new(unit, regs[1].clone()).unwrap_err();
        assert!(matches!(err, LoadError::Instantiation(_)));
    }

    #[test]
    fn syntax_error_is_compile_failure() {
        let engine = ScriptEngine::new();
        let err = ScriptUnit::compile_source(&engine, "fn register( {").unwrap_err();
        assert!(matches!(err, LoadError::Compile(_)));
    }

    #[test]
    fn fake_helpers_are_callable_from_scripts() {
        let engine = ScriptEngine::new();
        let unit = ScriptUnit::compile_source(
            &engine,
            r#"
fn register() { [#{ name: "Fake", entry: "run" }] }
fn run(params) { fake_name() }
"#,
        )
        .unwrap();
        assert!(unit.has_entry("run"));
    }
}
