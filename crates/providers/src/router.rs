//! Adapter router — selects the stream adapter for a model's API.
//!
//! Every model names the wire protocol it speaks in its `api` field. The
//! router maps that identifier to a registered [`StreamAdapter`] and fails
//! fast with [`ProviderError::UnsupportedApi`] when none is registered.

use std::collections::HashMap;
use std::sync::Arc;

use agentpi_config::AppConfig;
use agentpi_core::error::ProviderError;
use agentpi_core::event::AssistantEventStream;
use agentpi_core::model::{Model, api};
use agentpi_core::provider::{Context, StreamAdapter, StreamOptions};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::copilot::{CopilotAdapter, StaticCredentials};
use crate::openai_compat::OpenAiCompletionsAdapter;

/// Routes stream requests to the adapter registered for the model's API.
#[derive(Default, Clone)]
pub struct AdapterRouter {
    adapters: HashMap<String, Arc<dyn StreamAdapter>>,
}

impl AdapterRouter {
    /// Create an empty router.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an adapter under an API identifier. Replaces any previous one.
    pub fn register(&mut self, api: impl Into<String>, adapter: Arc<dyn StreamAdapter>) {
        self.adapters.insert(api.into(), adapter);
    }

    /// Register an adapter under the API it reports for itself.
    pub fn with(mut self, adapter: Arc<dyn StreamAdapter>) -> Self {
        let api = adapter.api().to_string();
        self.register(api, adapter);
        self
    }

    /// Get the adapter for an API identifier.
    pub fn get(&self, api: &str) -> Option<Arc<dyn StreamAdapter>> {
        self.adapters.get(api).cloned()
    }

    /// List registered API identifiers, sorted.
    pub fn apis(&self) -> Vec<&str> {
        let mut apis: Vec<&str> = self.adapters.keys().map(|s| s.as_str()).collect();
        apis.sort_unstable();
        apis
    }

    /// Stream a completion through the adapter for `model.api`.
    pub async fn stream(
        &self,
        model: &Model,
        context: &Context,
        options: &StreamOptions,
        cancel: CancellationToken,
    ) -> Result<AssistantEventStream, ProviderError> {
        let adapter = self
            .get(&model.api)
            .ok_or_else(|| ProviderError::UnsupportedApi(model.api.clone()))?;

        debug!(api = %model.api, model = %model.id, "Dispatching stream");
        adapter.stream(model, context, options, cancel).await
    }
}

impl std::fmt::Debug for AdapterRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterRouter")
            .field("apis", &self.apis())
            .finish()
    }
}

/// Build the router from configuration.
///
/// The OpenAI-compatible adapter is always available. The Copilot adapter is
/// registered when `[providers.github-copilot]` carries a token.
pub fn build_from_config(config: &AppConfig) -> AdapterRouter {
    let completions: Arc<dyn StreamAdapter> = Arc::new(OpenAiCompletionsAdapter::new());
    let mut router = AdapterRouter::new();
    router.register(api::OPENAI_COMPLETIONS, completions.clone());

    if let Some(copilot) = config.providers.get("github-copilot") {
        if let Some(token) = copilot.token.as_deref().filter(|t| !t.is_empty()) {
            let resolver = StaticCredentials::new(token, copilot.expires_at.unwrap_or(i64::MAX));
            router.register(
                api::COPILOT_COMPLETIONS,
                Arc::new(CopilotAdapter::new(completions, Arc::new(resolver))),
            );
        }
    }

    router
}
