//! # agentpi core
//!
//! Domain types, traits, and error definitions for the agentpi streaming
//! agent runtime. This crate defines the model that the adapter and loop
//! crates implement against; it performs no I/O.
//!
//! ## Layout
//!
//! - [`model`]: immutable model descriptions and the model registry
//! - [`message`]: content blocks, messages, usage and stop reasons
//! - [`event`]: the streamed assistant event sequence and its channel
//! - [`provider`]: the `StreamAdapter` contract and its call payload
//! - [`tool`]: the tool contract the agent loop dispatches through
//! - [`agent`]: agent-level history entries and state

pub mod agent;
pub mod error;
pub mod event;
pub mod message;
pub mod model;
pub mod provider;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use agent::{AgentMessage, AgentState, CustomMessage, ThinkingLevel};
pub use error::{ProviderError, ToolError};
pub use event::{AssistantEventSender, AssistantEventStream, AssistantMessageEvent, event_channel};
pub use message::{
    AssistantMessage, ContentBlock, Cost, Message, StopReason, ToolCall, ToolResultMessage,
    Usage, UserContent, UserMessage,
};
pub use model::{InputModality, Model, ModelCost, ModelRegistry};
pub use provider::{Context, StreamAdapter, StreamOptions, ToolDefinition};
pub use tool::{AgentTool, ToolOutput, ToolRegistry, ToolUpdate, ToolUpdateSink};
