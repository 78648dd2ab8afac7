//! GitHub Copilot-fronted completions.
//!
//! Copilot speaks the OpenAI completions protocol, but from a per-session
//! endpoint with a short-lived token. Before each call the adapter makes sure
//! it holds credentials that are valid for at least another minute,
//! re-resolving them through a [`CredentialResolver`] when they are not,
//! then delegates to the wrapped completions adapter with the resolved base
//! URL and token substituted in.

use std::sync::Arc;

use agentpi_core::error::ProviderError;
use agentpi_core::event::AssistantEventStream;
use agentpi_core::model::{Model, api};
use agentpi_core::provider::{Context, StreamAdapter, StreamOptions};
use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Endpoint used when the token does not name a proxy host.
pub const DEFAULT_COPILOT_BASE_URL: &str = "https://api.individual.githubcopilot.com";

/// Credentials are refreshed this many seconds before they expire.
pub const REFRESH_MARGIN_SECS: i64 = 60;

/// A usable Copilot session.
#[derive(Clone, PartialEq, Eq)]
pub struct ResolvedCredentials {
    pub token: String,
    /// Unix seconds
    pub expires_at: i64,
    pub base_url: String,
}

impl ResolvedCredentials {
    /// Credentials whose base URL is derived from the token itself.
    pub fn from_token(token: impl Into<String>, expires_at: i64) -> Self {
        let token = token.into();
        let base_url = copilot_base_url(&token);
        Self {
            token,
            expires_at,
            base_url,
        }
    }

    /// Whether these credentials are within the refresh margin at `now`.
    pub fn needs_refresh(&self, now: i64) -> bool {
        now >= self.expires_at.saturating_sub(REFRESH_MARGIN_SECS)
    }
}

impl std::fmt::Debug for ResolvedCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedCredentials")
            .field("token", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .field("base_url", &self.base_url)
            .finish()
    }
}

/// Source of Copilot session credentials (token exchange, keychain, config).
#[async_trait]
pub trait CredentialResolver: Send + Sync {
    async fn resolve(&self) -> Result<ResolvedCredentials, ProviderError>;
}

/// Derive the API endpoint from a Copilot token.
///
/// Tokens are `;`-separated `key=value` fields. A `proxy-ep=proxy.<rest>`
/// field maps to `https://api.<rest>`.
pub fn copilot_base_url(token: &str) -> String {
    token
        .split(';')
        .find_map(|field| field.trim().strip_prefix("proxy-ep="))
        .filter(|host| !host.is_empty())
        .map(|host| match host.strip_prefix("proxy.") {
            Some(rest) => format!("https://api.{rest}"),
            None => format!("https://{host}"),
        })
        .unwrap_or_else(|| DEFAULT_COPILOT_BASE_URL.to_string())
}

/// A fixed token, typically from `[providers.github-copilot]` in config.
///
/// It cannot refresh; once the token has expired every call fails.
pub struct StaticCredentials {
    credentials: ResolvedCredentials,
}

impl StaticCredentials {
    pub fn new(token: impl Into<String>, expires_at: i64) -> Self {
        Self {
            credentials: ResolvedCredentials::from_token(token, expires_at),
        }
    }
}

#[async_trait]
impl CredentialResolver for StaticCredentials {
    async fn resolve(&self) -> Result<ResolvedCredentials, ProviderError> {
        if chrono::Utc::now().timestamp() >= self.credentials.expires_at {
            return Err(ProviderError::AuthenticationFailed(
                "Copilot token has expired".into(),
            ));
        }
        Ok(self.credentials.clone())
    }
}

/// Completions through GitHub Copilot.
pub struct CopilotAdapter {
    inner: Arc<dyn StreamAdapter>,
    resolver: Arc<dyn CredentialResolver>,
    cached: Mutex<Option<ResolvedCredentials>>,
}

impl CopilotAdapter {
    pub fn new(inner: Arc<dyn StreamAdapter>, resolver: Arc<dyn CredentialResolver>) -> Self {
        Self {
            inner,
            resolver,
            cached: Mutex::new(None),
        }
    }

    /// Current credentials, re-resolved when missing or about to expire.
    async fn credentials(&self) -> Result<ResolvedCredentials, ProviderError> {
        let mut cached = self.cached.lock().await;
        let now = chrono::Utc::now().timestamp();

        if let Some(creds) = cached.as_ref().filter(|c| !c.needs_refresh(now)) {
            return Ok(creds.clone());
        }

        debug!("Resolving Copilot credentials");
        let fresh = self.resolver.resolve().await.map_err(|e| match e {
            ProviderError::AuthenticationFailed(_) => e,
            other => ProviderError::AuthenticationFailed(other.to_string()),
        })?;
        *cached = Some(fresh.clone());
        Ok(fresh)
    }
}

#[async_trait]
impl StreamAdapter for CopilotAdapter {
    fn api(&self) -> &str {
        api::COPILOT_COMPLETIONS
    }

    async fn stream(
        &self,
        model: &Model,
        context: &Context,
        options: &StreamOptions,
        cancel: CancellationToken,
    ) -> Result<AssistantEventStream, ProviderError> {
        let creds = self.credentials().await?;
        let model = model.with_base_url(&creds.base_url);
        let options = options.with_api_key(&creds.token);
        self.inner.stream(&model, context, &options, cancel).await
    }
}
