//! Agent run errors.

use agentpi_core::error::ProviderError;
use thiserror::Error;

/// Why an agent run stopped without reaching `AgentEnd`.
///
/// Transport failures and tool failures never appear here: the former arrive
/// as error-flagged assistant messages, the latter become error-flagged tool
/// results.
#[derive(Debug, Error)]
pub enum AgentError {
    /// The dispatcher or adapter rejected the call before streaming began.
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// The adapter closed its stream without producing a single event.
    #[error("Stream ended without producing an assistant message")]
    EmptyStream,

    /// `continue_run` was called on a history the model cannot pick up from.
    #[error("Cannot continue: {0}")]
    CannotContinue(String),
}
