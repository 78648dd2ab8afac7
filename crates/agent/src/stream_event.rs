//! Agent-level events.
//!
//! `AgentEvent` lifts the per-turn assistant stream into the lifecycle of a
//! whole run, so observers (terminal UI, logger, gateway) can follow along
//! without seeing loop internals. Events serialize with a `type` tag and can
//! be forwarded over SSE or WebSocket as-is.

use agentpi_core::agent::AgentMessage;
use agentpi_core::event::AssistantMessageEvent;
use agentpi_core::message::{AssistantMessage, ToolResultMessage};
use agentpi_core::tool::ToolUpdate;
use serde::{Deserialize, Serialize};

/// Events emitted by the agent loop, in order:
///
/// - `agent_start`, once per run
/// - `turn_start` / `turn_end` around every model call
/// - `message_start`, `message_update`*, `message_end` for the streamed reply
/// - `tool_execution_*` for each dispatched tool
/// - `agent_end`, once, with the final history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    AgentStart,

    /// The run finished. Carries the full conversation history.
    AgentEnd { messages: Vec<AgentMessage> },

    TurnStart,

    /// A turn finished, with the tool results it produced (possibly none).
    TurnEnd {
        message: AssistantMessage,
        tool_results: Vec<ToolResultMessage>,
    },

    MessageStart { message: AssistantMessage },

    /// A streamed update, with the provider event that caused it.
    MessageUpdate {
        message: AssistantMessage,
        assistant_event: AssistantMessageEvent,
    },

    MessageEnd { message: AssistantMessage },

    ToolExecutionStart {
        tool_call_id: String,
        tool_name: String,
        args: serde_json::Map<String, serde_json::Value>,
    },

    /// Progress pushed by a running tool.
    ToolExecutionUpdate {
        tool_call_id: String,
        tool_name: String,
        update: ToolUpdate,
    },

    ToolExecutionEnd {
        tool_call_id: String,
        tool_name: String,
        result: ToolResultMessage,
        is_error: bool,
    },
}

impl AgentEvent {
    /// Wire name for this event type.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::AgentStart => "agent_start",
            Self::AgentEnd { .. } => "agent_end",
            Self::TurnStart => "turn_start",
            Self::TurnEnd { .. } => "turn_end",
            Self::MessageStart { .. } => "message_start",
            Self::MessageUpdate { .. } => "message_update",
            Self::MessageEnd { .. } => "message_end",
            Self::ToolExecutionStart { .. } => "tool_execution_start",
            Self::ToolExecutionUpdate { .. } => "tool_execution_update",
            Self::ToolExecutionEnd { .. } => "tool_execution_end",
        }
    }
}
