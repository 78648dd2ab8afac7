//! Stateful agent facade.
//!
//! [`Agent`] owns the conversation state and runs the turn loop against it,
//! folding every loop event into [`AgentState`] before fanning it out to
//! subscribers.

use std::sync::{Arc, Mutex, PoisonError};

use agentpi_core::agent::{AgentMessage, AgentState, ThinkingLevel};
use agentpi_core::model::Model;
use agentpi_core::tool::ToolRegistry;
use agentpi_providers::AdapterRouter;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::AgentError;
use crate::loop_runner::{AgentLoop, AgentLoopConfig};
use crate::stream_event::AgentEvent;
use crate::subscribers::{Subscribers, Subscription};

/// Cancels whichever run is currently active on an [`Agent`].
///
/// Cloneable and usable from any task (e.g. a Ctrl-C handler) while the
/// agent itself is mutably borrowed by `prompt`.
#[derive(Debug, Clone, Default)]
pub struct AbortHandle {
    current: Arc<Mutex<Option<CancellationToken>>>,
}

impl AbortHandle {
    /// Cancel the active run. Returns false if nothing was running.
    pub fn abort(&self) -> bool {
        match self.lock().as_ref() {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn is_running(&self) -> bool {
        self.lock().is_some()
    }

    /// Link a fresh run token to the caller's token.
    fn arm(&self, parent: &CancellationToken) -> CancellationToken {
        let token = parent.child_token();
        *self.lock() = Some(token.clone());
        token
    }

    fn disarm(&self) {
        *self.lock() = None;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<CancellationToken>> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// An agent with its own history, tools and subscribers.
pub struct Agent {
    state: AgentState,
    router: Arc<AdapterRouter>,
    config: AgentLoopConfig,
    subscribers: Subscribers,
    abort: AbortHandle,
    session_id: String,
}

impl Agent {
    pub fn new(model: Model, router: Arc<AdapterRouter>) -> Self {
        Self::with_config(router, AgentLoopConfig::new(model))
    }

    /// Build an agent whose runs use the given hooks and stream options.
    pub fn with_config(router: Arc<AdapterRouter>, config: AgentLoopConfig) -> Self {
        Self {
            state: AgentState::new(config.model.clone()),
            router,
            config,
            subscribers: Subscribers::new(),
            abort: AbortHandle::default(),
            session_id: uuid::Uuid::new_v4().to_string(),
        }
    }

    pub fn state(&self) -> &AgentState {
        &self.state
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn set_system_prompt(&mut self, prompt: impl Into<String>) {
        self.state.system_prompt = prompt.into();
    }

    pub fn set_model(&mut self, model: Model) {
        self.state.model = model;
    }

    /// Stored on the state for callers and future adapters; the
    /// completions adapter does not send it.
    pub fn set_thinking_level(&mut self, level: ThinkingLevel) {
        self.state.thinking_level = level;
    }

    pub fn set_tools(&mut self, tools: ToolRegistry) {
        self.state.tools = tools;
    }

    pub fn append_message(&mut self, message: AgentMessage) {
        self.state.messages.push(message);
    }

    pub fn clear_messages(&mut self) {
        self.state.messages.clear();
    }

    pub fn subscribe(&self, handler: impl Fn(&AgentEvent) + Send + Sync + 'static) -> Subscription {
        self.subscribers.subscribe(handler)
    }

    /// Append a user message and run the loop until it ends.
    pub async fn prompt(
        &mut self,
        text: impl Into<String>,
        cancel: CancellationToken,
    ) -> Result<(), AgentError> {
        self.append_message(AgentMessage::user(text));
        self.run(cancel).await
    }

    /// Run the loop on the current history without adding a message.
    ///
    /// The history must be non-empty and must not end with an assistant reply.
    pub async fn continue_run(&mut self, cancel: CancellationToken) -> Result<(), AgentError> {
        match self.state.messages.last() {
            None => Err(AgentError::CannotContinue("no messages to continue from".into())),
            Some(AgentMessage::Assistant(_)) => Err(AgentError::CannotContinue(
                "last message is from the assistant".into(),
            )),
            Some(_) => self.run(cancel).await,
        }
    }

    /// Cancel the active run, if any.
    pub fn abort(&self) {
        if !self.abort.abort() {
            debug!("Abort requested with no active run");
        }
    }

    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    async fn run(&mut self, cancel: CancellationToken) -> Result<(), AgentError> {
        let token = self.abort.arm(&cancel);
        let _armed = ArmedRun(self.abort.clone());

        let mut config = AgentLoopConfig {
            model: self.state.model.clone(),
            ..self.config.clone()
        };
        config.stream_options.session_id = Some(self.session_id.clone());
        let agent_loop = AgentLoop::new(self.router.clone(), config);

        let system_prompt = self.state.system_prompt.clone();
        let tools = self.state.tools.clone();
        let mut history = self.state.messages.clone();
        self.state.error = None;

        let (tx, mut rx) = mpsc::unbounded_channel();
        let state = &mut self.state;
        let subscribers = &self.subscribers;

        let run = agent_loop.run_in(&system_prompt, &mut history, &tools, tx, token);
        let fold = async {
            while let Some(event) = rx.recv().await {
                apply_event(state, &event);
                subscribers.emit(&event);
            }
        };
        let (result, ()) = tokio::join!(run, fold);

        // Turns that completed before a failure stay in the history
        self.state.messages = history;

        if let Err(e) = &result {
            warn!(session_id = %self.session_id, error = %e, "Agent run failed");
            self.state.is_streaming = false;
            self.state.pending_tool_calls.clear();
            self.state.error = Some(e.to_string());
        }
        result
    }
}

/// Clears the abort handle when a run ends, including when its future is dropped.
struct ArmedRun(AbortHandle);

impl Drop for ArmedRun {
    fn drop(&mut self) {
        self.0.disarm();
    }
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("session_id", &self.session_id)
            .field("model", &self.state.model.id)
            .field("messages", &self.state.messages.len())
            .field("router", &self.router)
            .field("subscribers", &self.subscribers)
            .finish()
    }
}

/// Fold one loop event into the agent state.
pub(crate) fn apply_event(state: &mut AgentState, event: &AgentEvent) {
    match event {
        AgentEvent::MessageStart { message } => {
            state.is_streaming = true;
            state.stream_message = Some(message.clone());
        }
        AgentEvent::MessageUpdate { message, .. } => {
            state.stream_message = Some(message.clone());
        }
        AgentEvent::MessageEnd { message } => {
            state.is_streaming = false;
            state.stream_message = Some(message.clone());
            state.error = message.error_message.clone();
        }
        AgentEvent::ToolExecutionStart { tool_call_id, .. } => {
            state.pending_tool_calls.insert(tool_call_id.clone());
        }
        AgentEvent::ToolExecutionEnd { tool_call_id, .. } => {
            state.pending_tool_calls.remove(tool_call_id);
        }
        AgentEvent::AgentEnd { messages } => {
            state.messages = messages.clone();
            state.is_streaming = false;
            state.pending_tool_calls.clear();
        }
        AgentEvent::AgentStart
        | AgentEvent::TurnStart
        | AgentEvent::TurnEnd { .. }
        | AgentEvent::ToolExecutionUpdate { .. } => {}
    }
}
