//! StreamAdapter trait — the abstraction over LLM wire protocols.
//!
//! An adapter knows how to send a [`Context`] to one kind of backend and
//! translate the incremental response into [`AssistantMessageEvent`]s.
//!
//! Implementations: OpenAI-compatible completions, Copilot-fronted
//! completions. The dispatcher picks one by the model's `api` field.
//!
//! [`AssistantMessageEvent`]: crate::event::AssistantMessageEvent

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::ProviderError;
use crate::event::AssistantEventStream;
use crate::message::Message;
use crate::model::Model;

/// A tool definition sent to the LLM so it knows what tools it can call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// The tool name
    pub name: String,

    /// Description of what the tool does
    pub description: String,

    /// JSON Schema describing the tool's parameters
    pub parameters: serde_json::Value,
}

/// The provider-neutral payload for one model call.
///
/// Rebuilt from agent history before every call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Context {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,

    pub messages: Vec<Message>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,
}

/// Per-call options.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StreamOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Explicit API key; adapters fall back to their environment variable
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Extra HTTP headers; these win over the model's headers
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub headers: HashMap<String, String>,

    /// Caller session id, used for log correlation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

impl StreamOptions {
    /// Copy of these options with the API key replaced.
    pub fn with_api_key(&self, api_key: impl Into<String>) -> Self {
        Self {
            api_key: Some(api_key.into()),
            ..self.clone()
        }
    }

    /// The explicit key, treating an empty string as absent.
    pub fn explicit_api_key(&self) -> Option<&str> {
        self.api_key.as_deref().filter(|k| !k.is_empty())
    }
}

/// The core streaming contract.
///
/// `stream` returns `Err` only for configuration problems (missing key,
/// unresolvable credentials) detected before any event is produced. Once it
/// returns `Ok`, every transport failure, including cancellation, arrives
/// as the terminal `Error` event of the returned stream.
#[async_trait]
pub trait StreamAdapter: Send + Sync {
    /// The API identifier this adapter serves (e.g., "openai-completions").
    fn api(&self) -> &str;

    async fn stream(
        &self,
        model: &Model,
        context: &Context,
        options: &StreamOptions,
        cancel: CancellationToken,
    ) -> Result<AssistantEventStream, ProviderError>;
}
