//! AgentTool trait — the contract between the agent loop and tools.
//!
//! The loop never inspects a tool's internals. It looks a tool up by name,
//! hands it the call id, the decoded argument map, the run's cancellation
//! token and a progress sink, and gets back either output or a [`ToolError`].

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::ToolError;
use crate::message::ContentBlock;
use crate::provider::ToolDefinition;

/// Successful tool output.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolOutput {
    pub content: Vec<ContentBlock>,

    /// Optional structured data for observers; not sent to the model
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ToolOutput {
    /// Output consisting of a single text block.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ContentBlock::text(text)],
            details: None,
        }
    }
}

/// Partial progress pushed by a long-running tool.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolUpdate {
    pub content: Vec<ContentBlock>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// Where a tool sends its [`ToolUpdate`]s.
#[derive(Clone)]
pub struct ToolUpdateSink {
    send: Arc<dyn Fn(ToolUpdate) + Send + Sync>,
}

impl ToolUpdateSink {
    pub fn new(send: impl Fn(ToolUpdate) + Send + Sync + 'static) -> Self {
        Self {
            send: Arc::new(send),
        }
    }

    pub fn send(&self, update: ToolUpdate) {
        (self.send)(update);
    }
}

impl fmt::Debug for ToolUpdateSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolUpdateSink").finish_non_exhaustive()
    }
}

/// A capability the agent can invoke on the model's request.
#[async_trait]
pub trait AgentTool: Send + Sync {
    /// The unique name of this tool, as the model refers to it.
    fn name(&self) -> &str;

    /// A short human label for UIs. Defaults to the name.
    fn label(&self) -> &str {
        self.name()
    }

    /// A description of what this tool does (sent to the LLM).
    fn description(&self) -> &str;

    /// JSON Schema describing this tool's parameters.
    fn parameters_schema(&self) -> serde_json::Value;

    /// Execute one call.
    ///
    /// Tools should honor `cancel` cooperatively; the loop never kills a
    /// running tool.
    async fn execute(
        &self,
        call_id: &str,
        arguments: serde_json::Map<String, serde_json::Value>,
        cancel: CancellationToken,
        on_update: Option<ToolUpdateSink>,
    ) -> Result<ToolOutput, ToolError>;

    /// Convert this tool into a ToolDefinition for sending to the LLM.
    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

/// The ordered set of tools available to an agent.
///
/// Declaration order is preserved so the model sees a stable tool list.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn AgentTool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. Replaces any existing tool with the same name in place.
    pub fn register(&mut self, tool: Arc<dyn AgentTool>) {
        match self.tools.iter_mut().find(|t| t.name() == tool.name()) {
            Some(slot) => *slot = tool,
            None => self.tools.push(tool),
        }
    }

    /// Builder-style registration.
    pub fn with(mut self, tool: Arc<dyn AgentTool>) -> Self {
        self.register(tool);
        self
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn AgentTool>> {
        self.tools.iter().find(|t| t.name() == name).cloned()
    }

    /// All tool definitions, in registration order.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(|t| t.to_definition()).collect()
    }

    /// All tool names, in registration order.
    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}
