//! Error types for the assistant dispatch layer.

use thiserror::Error;

use crate::llm::LlmError;

/// Errors that can surface from request dispatch. Everything recoverable is
/// handled inside the loop; only these reach the HTTP boundary, where they
/// become JSON error bodies (never stack traces).
#[derive(Debug, Error)]
pub enum AssistantError {
    /// Requested name absent from the registry even after a forced reload
    /// and a synthesis attempt.
    #[error("Agent not found: {name}")]
    AgentNotFound { name: String, available: Vec<String> },

    #[error(transparent)]
    Llm(#[from] LlmError),
}

pub type AssistantResult<T> = Result<T, AssistantError>;
