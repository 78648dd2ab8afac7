//! The agent turn loop.
//!
//! One run drives repeated model calls until the model stops on its own,
//! the turn budget is spent, or the run is cancelled:
//!
//! 1. **Build context** from history (optionally filtered and converted by hooks)
//! 2. **Stream** the assistant reply through the adapter router
//! 3. **Steer**: injected messages pre-empt tool dispatch for the turn
//! 4. **Act**: run requested tools sequentially, appending each result
//! 5. **Follow up**: after a natural stop, injected messages start another turn

use std::fmt;
use std::sync::Arc;

use agentpi_core::agent::{AgentMessage, default_convert_to_llm};
use agentpi_core::error::ToolError;
use agentpi_core::event::{AssistantEventStream, AssistantMessageEvent};
use agentpi_core::message::{AssistantMessage, Message, StopReason, ToolCall, ToolResultMessage, now_millis};
use agentpi_core::model::Model;
use agentpi_core::provider::{Context, StreamOptions};
use agentpi_core::tool::{ToolRegistry, ToolUpdateSink};
use agentpi_providers::AdapterRouter;
use futures::future::BoxFuture;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::AgentError;
use crate::stream_event::AgentEvent;

/// Upper bound on model calls per run.
pub const MAX_TURNS: usize = 25;

/// Rewrites history before each turn (truncation, summarization).
pub type TransformContextFn =
    Arc<dyn Fn(Vec<AgentMessage>, CancellationToken) -> BoxFuture<'static, Vec<AgentMessage>> + Send + Sync>;

/// Maps agent history to provider-neutral messages.
pub type ConvertToLlmFn = Arc<dyn Fn(&[AgentMessage]) -> Vec<Message> + Send + Sync>;

/// Looks up an API key for a provider name.
pub type ApiKeyFn = Arc<dyn Fn(&str) -> BoxFuture<'static, Option<String>> + Send + Sync>;

/// Yields messages to inject (steering or follow-up). Empty means none.
pub type MessageSourceFn = Arc<dyn Fn() -> BoxFuture<'static, Vec<AgentMessage>> + Send + Sync>;

/// Everything a run needs besides the conversation itself.
///
/// Every hook is optional; an absent hook behaves as if it returned nothing
/// (or, for conversion, as [`default_convert_to_llm`]).
#[derive(Clone)]
pub struct AgentLoopConfig {
    pub model: Model,
    pub stream_options: StreamOptions,
    pub transform_context: Option<TransformContextFn>,
    pub convert_to_llm: Option<ConvertToLlmFn>,
    pub get_api_key: Option<ApiKeyFn>,
    pub get_steering_messages: Option<MessageSourceFn>,
    pub get_follow_up_messages: Option<MessageSourceFn>,
}

impl AgentLoopConfig {
    pub fn new(model: Model) -> Self {
        Self {
            model,
            stream_options: StreamOptions::default(),
            transform_context: None,
            convert_to_llm: None,
            get_api_key: None,
            get_steering_messages: None,
            get_follow_up_messages: None,
        }
    }

    pub fn with_stream_options(mut self, options: StreamOptions) -> Self {
        self.stream_options = options;
        self
    }

    pub fn with_transform_context(
        mut self,
        f: impl Fn(Vec<AgentMessage>, CancellationToken) -> BoxFuture<'static, Vec<AgentMessage>>
        + Send
        + Sync
        + 'static,
    ) -> Self {
        self.transform_context = Some(Arc::new(f));
        self
    }

    pub fn with_convert_to_llm(
        mut self,
        f: impl Fn(&[AgentMessage]) -> Vec<Message> + Send + Sync + 'static,
    ) -> Self {
        self.convert_to_llm = Some(Arc::new(f));
        self
    }

    pub fn with_api_key_provider(
        mut self,
        f: impl Fn(&str) -> BoxFuture<'static, Option<String>> + Send + Sync + 'static,
    ) -> Self {
        self.get_api_key = Some(Arc::new(f));
        self
    }

    pub fn with_steering_messages(
        mut self,
        f: impl Fn() -> BoxFuture<'static, Vec<AgentMessage>> + Send + Sync + 'static,
    ) -> Self {
        self.get_steering_messages = Some(Arc::new(f));
        self
    }

    pub fn with_follow_up_messages(
        mut self,
        f: impl Fn() -> BoxFuture<'static, Vec<AgentMessage>> + Send + Sync + 'static,
    ) -> Self {
        self.get_follow_up_messages = Some(Arc::new(f));
        self
    }
}

impl fmt::Debug for AgentLoopConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentLoopConfig")
            .field("model", &self.model.id)
            .field("stream_options", &self.stream_options)
            .field("transform_context", &self.transform_context.is_some())
            .field("convert_to_llm", &self.convert_to_llm.is_some())
            .field("get_api_key", &self.get_api_key.is_some())
            .field("get_steering_messages", &self.get_steering_messages.is_some())
            .field("get_follow_up_messages", &self.get_follow_up_messages.is_some())
            .finish()
    }
}

/// The agent loop that orchestrates model calls and tool execution.
pub struct AgentLoop {
    router: Arc<AdapterRouter>,
    config: AgentLoopConfig,
}

impl AgentLoop {
    pub fn new(router: Arc<AdapterRouter>, config: AgentLoopConfig) -> Self {
        Self { router, config }
    }

    /// Run to completion, sending events as they happen.
    ///
    /// Returns the final history. `AgentEnd` is emitted on every `Ok` path and
    /// never on an `Err` path.
    pub async fn run(
        &self,
        system_prompt: &str,
        messages: Vec<AgentMessage>,
        tools: &ToolRegistry,
        events: mpsc::UnboundedSender<AgentEvent>,
        cancel: CancellationToken,
    ) -> Result<Vec<AgentMessage>, AgentError> {
        let mut history = messages;
        self.run_in(system_prompt, &mut history, tools, events, cancel)
            .await?;
        Ok(history)
    }

    /// Run against a caller-owned history.
    ///
    /// Every completed message is appended to `history` as it is produced, so
    /// on an `Err` return the history still holds the turns that finished.
    pub async fn run_in(
        &self,
        system_prompt: &str,
        history: &mut Vec<AgentMessage>,
        tools: &ToolRegistry,
        events: mpsc::UnboundedSender<AgentEvent>,
        cancel: CancellationToken,
    ) -> Result<(), AgentError> {
        let model = &self.config.model;
        let tool_definitions = tools.definitions();
        let mut turn = 0;

        info!(
            model = %model.id,
            messages = history.len(),
            tools = tools.len(),
            "Agent run starting"
        );
        emit(&events, AgentEvent::AgentStart);

        loop {
            if turn >= MAX_TURNS {
                warn!(model = %model.id, turns = turn, "Turn limit reached, ending run");
                break;
            }
            if cancel.is_cancelled() {
                debug!(turn, "Run cancelled, ending run");
                break;
            }

            emit(&events, AgentEvent::TurnStart);
            debug!(model = %model.id, turn, "Agent turn");

            if let Some(transform) = &self.config.transform_context {
                *history = transform(std::mem::take(history), cancel.clone()).await;
            }

            let context = Context {
                system_prompt: Some(system_prompt.to_string()).filter(|s| !s.is_empty()),
                messages: match &self.config.convert_to_llm {
                    Some(convert) => convert(history),
                    None => default_convert_to_llm(history),
                },
                tools: tool_definitions.clone(),
            };
            let options = self.stream_options().await;

            let stream = self
                .router
                .stream(model, &context, &options, cancel.clone())
                .await?;
            let (assistant, tool_calls) = consume(stream, &events).await;
            let assistant = assistant.ok_or(AgentError::EmptyStream)?;

            history.push(assistant.clone().into());

            match assistant.stop_reason {
                StopReason::Aborted => {
                    warn!(model = %model.id, turn, "Model call aborted, ending run");
                    emit(
                        &events,
                        AgentEvent::TurnEnd {
                            message: assistant,
                            tool_results: Vec::new(),
                        },
                    );
                    break;
                }
                StopReason::Error => {
                    warn!(
                        model = %model.id,
                        turn,
                        error = assistant.error_message.as_deref().unwrap_or(""),
                        "Model call failed"
                    );
                }
                _ => {}
            }

            let steering = pending_messages(&self.config.get_steering_messages).await;
            if !steering.is_empty() {
                debug!(turn, count = steering.len(), "Steering messages pre-empt tool dispatch");
                history.extend(steering);
                emit(
                    &events,
                    AgentEvent::TurnEnd {
                        message: assistant,
                        tool_results: Vec::new(),
                    },
                );
                turn += 1;
                continue;
            }

            let mut tool_results = Vec::new();
            if assistant.stop_reason == StopReason::ToolUse && !tool_calls.is_empty() {
                debug!(tool_count = tool_calls.len(), "Executing tool calls");
                for call in &tool_calls {
                    let result = execute_tool(tools, call, &events, &cancel).await;
                    history.push(result.clone().into());
                    tool_results.push(result);
                }
            }

            let natural_stop = assistant.stop_reason == StopReason::Stop && tool_calls.is_empty();
            emit(
                &events,
                AgentEvent::TurnEnd {
                    message: assistant,
                    tool_results,
                },
            );
            turn += 1;

            if natural_stop {
                let follow_up = pending_messages(&self.config.get_follow_up_messages).await;
                if follow_up.is_empty() {
                    break;
                }
                debug!(turn, count = follow_up.len(), "Follow-up messages continue the run");
                history.extend(follow_up);
            }
        }

        info!(model = %model.id, turns = turn, messages = history.len(), "Agent run finished");
        emit(
            &events,
            AgentEvent::AgentEnd {
                messages: history.clone(),
            },
        );
        Ok(())
    }

    /// Run on a background task, returning the event stream and the task handle.
    pub fn spawn(
        self,
        system_prompt: String,
        messages: Vec<AgentMessage>,
        tools: ToolRegistry,
        cancel: CancellationToken,
    ) -> (
        UnboundedReceiverStream<AgentEvent>,
        JoinHandle<Result<Vec<AgentMessage>, AgentError>>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(async move {
            self.run(&system_prompt, messages, &tools, tx, cancel).await
        });
        (UnboundedReceiverStream::new(rx), handle)
    }

    /// Per-turn options, with the key from the key provider when it has one.
    async fn stream_options(&self) -> StreamOptions {
        let mut options = self.config.stream_options.clone();
        if let Some(get_api_key) = &self.config.get_api_key {
            if let Some(key) = get_api_key(&self.config.model.provider)
                .await
                .filter(|k| !k.is_empty())
            {
                options.api_key = Some(key);
            }
        }
        options
    }
}

fn emit(events: &mpsc::UnboundedSender<AgentEvent>, event: AgentEvent) {
    // A dropped receiver only means nobody is watching; the run continues.
    let _ = events.send(event);
}

async fn pending_messages(source: &Option<MessageSourceFn>) -> Vec<AgentMessage> {
    match source {
        Some(source) => source().await,
        None => Vec::new(),
    }
}

/// Fold one assistant stream into agent events.
///
/// Returns the last snapshot seen (None if the stream produced nothing) and
/// the tool calls completed during the stream, in order.
async fn consume(
    mut stream: AssistantEventStream,
    events: &mpsc::UnboundedSender<AgentEvent>,
) -> (Option<AssistantMessage>, Vec<ToolCall>) {
    let mut assistant = None;
    let mut tool_calls = Vec::new();

    while let Some(event) = stream.recv().await {
        match &event {
            AssistantMessageEvent::Start { partial } => {
                assistant = Some(partial.clone());
                emit(
                    events,
                    AgentEvent::MessageStart {
                        message: partial.clone(),
                    },
                );
            }
            AssistantMessageEvent::Done { message, .. }
            | AssistantMessageEvent::Error { error: message, .. } => {
                assistant = Some(message.clone());
                emit(
                    events,
                    AgentEvent::MessageEnd {
                        message: message.clone(),
                    },
                );
            }
            update => {
                if let AssistantMessageEvent::ToolCallEnd { tool_call, .. } = update {
                    tool_calls.push(tool_call.clone());
                }
                let message = update.message().clone();
                assistant = Some(message.clone());
                emit(
                    events,
                    AgentEvent::MessageUpdate {
                        message,
                        assistant_event: event.clone(),
                    },
                );
            }
        }
    }

    (assistant, tool_calls)
}

/// Execute one tool call, always producing a result.
async fn execute_tool(
    tools: &ToolRegistry,
    call: &ToolCall,
    events: &mpsc::UnboundedSender<AgentEvent>,
    cancel: &CancellationToken,
) -> ToolResultMessage {
    let Some(tool) = tools.get(&call.name) else {
        warn!(tool = %call.name, call_id = %call.id, "Model requested an unknown tool");
        return ToolResultMessage::error(
            &call.id,
            &call.name,
            ToolError::NotFound(call.name.clone()).to_string(),
        );
    };

    emit(
        events,
        AgentEvent::ToolExecutionStart {
            tool_call_id: call.id.clone(),
            tool_name: call.name.clone(),
            args: call.arguments.clone(),
        },
    );

    let sink = {
        let events = events.clone();
        let tool_call_id = call.id.clone();
        let tool_name = call.name.clone();
        ToolUpdateSink::new(move |update| {
            emit(
                &events,
                AgentEvent::ToolExecutionUpdate {
                    tool_call_id: tool_call_id.clone(),
                    tool_name: tool_name.clone(),
                    update,
                },
            );
        })
    };

    let result = match tool
        .execute(&call.id, call.arguments.clone(), cancel.clone(), Some(sink))
        .await
    {
        Ok(output) => {
            debug!(tool = %call.name, call_id = %call.id, "Tool succeeded");
            ToolResultMessage {
                tool_call_id: call.id.clone(),
                tool_name: call.name.clone(),
                content: output.content,
                details: output.details,
                is_error: false,
                timestamp: now_millis(),
            }
        }
        Err(e) => {
            warn!(tool = %call.name, call_id = %call.id, error = %e, "Tool execution failed");
            ToolResultMessage::error(&call.id, &call.name, format!("Error: {e}"))
        }
    };

    emit(
        events,
        AgentEvent::ToolExecutionEnd {
            tool_call_id: call.id.clone(),
            tool_name: call.name.clone(),
            result: result.clone(),
            is_error: result.is_error,
        },
    );
    result
}
