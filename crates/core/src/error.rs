//! Error types for the agentpi domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProviderError {
    // --- Configuration: returned from `stream()` before any event ---
    #[error("No API key available for provider '{0}'")]
    MissingApiKey(String),

    #[error("API '{0}' is not supported")]
    UnsupportedApi(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    // --- Transport: only ever surfaced inside an Error event ---
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("Request was aborted")]
    Aborted,
}

impl ProviderError {
    /// Configuration errors are never retried and never become stream events.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::MissingApiKey(_) | Self::UnsupportedApi(_) | Self::AuthenticationFailed(_)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ToolError {
    #[error("Tool '{0}' not found")]
    NotFound(String),

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),

    #[error("Tool execution failed: {tool_name}: {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("Tool execution aborted")]
    Aborted,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_error_displays_correctly() {
        let err = ProviderError::ApiError {
            status_code: 429,
            message: "Too many requests".into(),
        };
        assert!(err.to_string().contains("429"));
        assert!(err.to_string().contains("Too many requests"));
        assert!(!err.is_configuration());
    }

    #[test]
    fn configuration_errors_are_classified() {
        assert!(ProviderError::MissingApiKey("openai".into()).is_configuration());
        assert!(ProviderError::UnsupportedApi("bedrock".into()).is_configuration());
        assert!(!ProviderError::Aborted.is_configuration());
        assert_eq!(
            ProviderError::UnsupportedApi("bedrock".into()).to_string(),
            "API 'bedrock' is not supported"
        );
    }

    #[test]
    fn tool_error_displays_correctly() {
        let err = ToolError::NotFound("shell".into());
        assert_eq!(err.to_string(), "Tool 'shell' not found");
    }
}
