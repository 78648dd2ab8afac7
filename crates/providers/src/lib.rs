//! Stream adapters for agentpi.
//!
//! All adapters implement `agentpi_core::StreamAdapter`.
//! The router selects the adapter for a model's `api` identifier.

pub mod copilot;
pub mod openai_compat;
pub mod router;
pub mod sse;

pub use copilot::{CopilotAdapter, CredentialResolver, ResolvedCredentials, StaticCredentials};
pub use openai_compat::OpenAiCompletionsAdapter;
pub use router::{AdapterRouter, build_from_config};
