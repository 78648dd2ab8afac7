//! The agent runtime: turn loop, event model and stateful facade.
//!
//! A run follows the loop in [`loop_runner`]:
//!
//! 1. **Receive** history and a tool set
//! 2. **Stream** an assistant reply through the [`AdapterRouter`](agentpi_providers::AdapterRouter)
//! 3. **If tool calls**: execute tools, append results, loop back to step 2
//! 4. **If text only**: ask for follow-up messages, or finish
//!
//! The loop ends when the model stops on its own, the turn limit is reached,
//! or the run is cancelled. [`Agent`] wraps the loop
//! with owned state and subscriber fan-out.

pub mod agent;
pub mod error;
pub mod loop_runner;
pub mod stream_event;
pub mod subscribers;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use agent::{AbortHandle, Agent};
pub use error::AgentError;
pub use loop_runner::{AgentLoop, AgentLoopConfig, MAX_TURNS};
pub use stream_event::AgentEvent;
pub use subscribers::{Subscribers, Subscription};
