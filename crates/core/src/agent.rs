//! Agent-level messages and state.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::message::{AssistantMessage, Message, ToolResultMessage, UserMessage, now_millis};
use crate::model::Model;
use crate::tool::ToolRegistry;

/// Reasoning effort requested from models that support it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThinkingLevel {
    #[default]
    Off,
    Minimal,
    Low,
    Medium,
    High,
    #[serde(rename = "xhigh")]
    XHigh,
}

/// An application-defined message kept in history but not part of the
/// provider-neutral vocabulary (notes, UI markers, injected context).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomMessage {
    pub custom_type: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    pub timestamp: i64,
}

/// One entry of agent conversation history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "camelCase")]
pub enum AgentMessage {
    User(UserMessage),
    Assistant(AssistantMessage),
    ToolResult(ToolResultMessage),
    Custom(CustomMessage),
}

impl AgentMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self::User(UserMessage::text(content))
    }

    pub fn custom(custom_type: impl Into<String>, content: impl Into<String>) -> Self {
        Self::Custom(CustomMessage {
            custom_type: custom_type.into(),
            content: content.into(),
            details: None,
            timestamp: now_millis(),
        })
    }

    pub fn role(&self) -> &'static str {
        match self {
            Self::User(_) => "user",
            Self::Assistant(_) => "assistant",
            Self::ToolResult(_) => "toolResult",
            Self::Custom(_) => "custom",
        }
    }

    pub fn timestamp(&self) -> i64 {
        match self {
            Self::User(m) => m.timestamp,
            Self::Assistant(m) => m.timestamp,
            Self::ToolResult(m) => m.timestamp,
            Self::Custom(m) => m.timestamp,
        }
    }

    /// The provider-neutral form of this message, if it has one.
    pub fn to_llm(&self) -> Option<Message> {
        match self {
            Self::User(m) => Some(Message::User(m.clone())),
            Self::Assistant(m) => Some(Message::Assistant(m.clone())),
            Self::ToolResult(m) => Some(Message::ToolResult(m.clone())),
            Self::Custom(_) => None,
        }
    }
}

impl From<AssistantMessage> for AgentMessage {
    fn from(message: AssistantMessage) -> Self {
        Self::Assistant(message)
    }
}

impl From<ToolResultMessage> for AgentMessage {
    fn from(message: ToolResultMessage) -> Self {
        Self::ToolResult(message)
    }
}

/// Default history conversion: keep provider-neutral messages, drop custom ones.
pub fn default_convert_to_llm(messages: &[AgentMessage]) -> Vec<Message> {
    messages.iter().filter_map(AgentMessage::to_llm).collect()
}

/// Everything one agent instance knows about its conversation.
///
/// Owned by the agent; only the active run writes to it.
#[derive(Debug, Clone)]
pub struct AgentState {
    pub system_prompt: String,
    pub model: Model,
    pub thinking_level: ThinkingLevel,
    pub tools: ToolRegistry,
    pub messages: Vec<AgentMessage>,
    pub is_streaming: bool,
    pub stream_message: Option<AssistantMessage>,
    pub pending_tool_calls: HashSet<String>,
    pub error: Option<String>,
}

impl AgentState {
    /// Fresh state for a model, with no history.
    pub fn new(model: Model) -> Self {
        Self {
            system_prompt: String::new(),
            model,
            thinking_level: ThinkingLevel::Off,
            tools: ToolRegistry::new(),
            messages: Vec::new(),
            is_streaming: false,
            stream_message: None,
            pending_tool_calls: HashSet::new(),
            error: None,
        }
    }
}
