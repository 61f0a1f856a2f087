//! Core domain types shared by the loader, dispatch and HTTP layers.

mod agent;
mod message;
mod tool_call;

pub use agent::{Agent, AgentMetadata, AgentParams, DynAgent};
pub use message::{Message, Role};
pub use tool_call::{ToolCall, ToolDefinition};
