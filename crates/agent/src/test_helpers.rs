//! Shared test helpers for loop and agent tests.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use agentpi_core::error::{ProviderError, ToolError};
use agentpi_core::event::{AssistantEventStream, AssistantMessageEvent, event_channel};
use agentpi_core::message::{AssistantMessage, ContentBlock, StopReason, ToolCall, Usage};
use agentpi_core::model::{InputModality, Model, ModelCost};
use agentpi_core::provider::{Context, StreamAdapter, StreamOptions};
use agentpi_core::tool::{AgentTool, ToolOutput, ToolUpdate, ToolUpdateSink};
use agentpi_providers::AdapterRouter;
use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::stream_event::AgentEvent;

pub const MOCK_API: &str = "mock-completions";

pub fn mock_model() -> Model {
    Model {
        id: "mock-model".into(),
        name: "Mock Model".into(),
        api: MOCK_API.into(),
        provider: "mock".into(),
        base_url: "http://mock.invalid".into(),
        reasoning: false,
        input: vec![InputModality::Text],
        cost: ModelCost::default(),
        context_window: 8_192,
        max_tokens: 1_024,
        headers: HashMap::new(),
    }
}

pub fn assistant(content: Vec<ContentBlock>, stop_reason: StopReason) -> AssistantMessage {
    AssistantMessage {
        content,
        api: MOCK_API.into(),
        provider: "mock".into(),
        model: "mock-model".into(),
        usage: Usage::default(),
        stop_reason,
        error_message: None,
        timestamp: 0,
    }
}

pub fn tool_call(id: &str, name: &str, args: serde_json::Value) -> ToolCall {
    ToolCall {
        id: id.into(),
        name: name.into(),
        arguments: args.as_object().cloned().unwrap_or_default(),
        thought_signature: None,
    }
}

/// Start, one text block, Done(Stop).
pub fn text_turn(text: &str) -> Vec<AssistantMessageEvent> {
    let empty = assistant(vec![], StopReason::Stop);
    let opened = assistant(vec![ContentBlock::text("")], StopReason::Stop);
    let filled = assistant(vec![ContentBlock::text(text)], StopReason::Stop);
    vec![
        AssistantMessageEvent::Start { partial: empty },
        AssistantMessageEvent::TextStart {
            content_index: 0,
            partial: opened,
        },
        AssistantMessageEvent::TextDelta {
            content_index: 0,
            delta: text.into(),
            partial: filled.clone(),
        },
        AssistantMessageEvent::Done {
            reason: StopReason::Stop,
            message: filled,
        },
    ]
}

/// Start, a start/end pair per call, Done(ToolUse).
pub fn tool_turn(calls: Vec<ToolCall>) -> Vec<AssistantMessageEvent> {
    let mut events = vec![AssistantMessageEvent::Start {
        partial: assistant(vec![], StopReason::Stop),
    }];
    let mut content = Vec::new();
    for (index, call) in calls.into_iter().enumerate() {
        content.push(ContentBlock::ToolCall(call.clone()));
        let partial = assistant(content.clone(), StopReason::Stop);
        events.push(AssistantMessageEvent::ToolCallStart {
            content_index: index,
            partial: partial.clone(),
        });
        events.push(AssistantMessageEvent::ToolCallEnd {
            content_index: index,
            tool_call: call,
            partial,
        });
    }
    events.push(AssistantMessageEvent::Done {
        reason: StopReason::ToolUse,
        message: assistant(content, StopReason::ToolUse),
    });
    events
}

/// Start, then a failure snapshot.
pub fn error_turn(message: &str) -> Vec<AssistantMessageEvent> {
    let empty = assistant(vec![], StopReason::Stop);
    vec![
        AssistantMessageEvent::Start {
            partial: empty.clone(),
        },
        AssistantMessageEvent::Error {
            reason: StopReason::Error,
            error: empty.with_error(StopReason::Error, message),
        },
    ]
}

/// A mock adapter that replays scripted turns in order.
///
/// Each call consumes the next script; with `always`, the same script
/// repeats forever. Panics if more calls are made than scripts provided.
#[derive(Default)]
pub struct SequentialMockAdapter {
    scripts: Mutex<VecDeque<Vec<AssistantMessageEvent>>>,
    always: Option<Vec<AssistantMessageEvent>>,
    contexts: Mutex<Vec<Context>>,
    options: Mutex<Vec<StreamOptions>>,
}

impl SequentialMockAdapter {
    pub fn new(scripts: Vec<Vec<AssistantMessageEvent>>) -> Self {
        Self {
            scripts: Mutex::new(scripts.into()),
            ..Self::default()
        }
    }

    pub fn always(script: Vec<AssistantMessageEvent>) -> Self {
        Self {
            always: Some(script),
            ..Self::default()
        }
    }

    pub fn call_count(&self) -> usize {
        self.contexts.lock().unwrap().len()
    }

    pub fn contexts(&self) -> Vec<Context> {
        self.contexts.lock().unwrap().clone()
    }

    pub fn options(&self) -> Vec<StreamOptions> {
        self.options.lock().unwrap().clone()
    }
}

#[async_trait]
impl StreamAdapter for SequentialMockAdapter {
    fn api(&self) -> &str {
        MOCK_API
    }

    async fn stream(
        &self,
        _model: &Model,
        context: &Context,
        options: &StreamOptions,
        _cancel: CancellationToken,
    ) -> Result<AssistantEventStream, ProviderError> {
        self.contexts.lock().unwrap().push(context.clone());
        self.options.lock().unwrap().push(options.clone());

        let script = match &self.always {
            Some(script) => script.clone(),
            None => self.scripts.lock().unwrap().pop_front().unwrap_or_else(|| {
                panic!("SequentialMockAdapter: no more scripts (call #{})", self.call_count())
            }),
        };

        let (tx, rx) = event_channel();
        let mut terminal = None;
        for event in script {
            if event.is_terminal() {
                terminal = Some(event);
            } else {
                tx.emit(event);
            }
        }
        match terminal {
            Some(AssistantMessageEvent::Done { message, .. }) => tx.done(message),
            Some(AssistantMessageEvent::Error { error, .. }) => tx.error(error),
            _ => {}
        }
        Ok(rx)
    }
}

/// Emits Start, then waits for cancellation and ends with an aborted snapshot.
pub struct HangingAdapter;

#[async_trait]
impl StreamAdapter for HangingAdapter {
    fn api(&self) -> &str {
        MOCK_API
    }

    async fn stream(
        &self,
        _model: &Model,
        _context: &Context,
        _options: &StreamOptions,
        cancel: CancellationToken,
    ) -> Result<AssistantEventStream, ProviderError> {
        let (tx, rx) = event_channel();
        let partial = assistant(vec![], StopReason::Stop);
        tx.emit(AssistantMessageEvent::Start {
            partial: partial.clone(),
        });
        tokio::spawn(async move {
            cancel.cancelled().await;
            tx.error(partial.with_error(StopReason::Aborted, ProviderError::Aborted.to_string()));
        });
        Ok(rx)
    }
}

pub fn router_with(adapter: Arc<dyn StreamAdapter>) -> Arc<AdapterRouter> {
    let mut router = AdapterRouter::new();
    router.register(MOCK_API, adapter);
    Arc::new(router)
}

/// Drain everything already sent on a closed event channel.
pub fn drain(mut rx: mpsc::UnboundedReceiver<AgentEvent>) -> Vec<AgentEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

pub fn kinds(events: &[AgentEvent]) -> Vec<&'static str> {
    events.iter().map(AgentEvent::event_type).collect()
}

/// Echoes its `text` argument.
pub struct EchoTool;

#[async_trait]
impl AgentTool for EchoTool {
    fn name(&self) -> &str {
        "echo"
    }

    fn description(&self) -> &str {
        "Echo the input back"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": { "text": { "type": "string" } },
            "required": ["text"]
        })
    }

    async fn execute(
        &self,
        _call_id: &str,
        arguments: serde_json::Map<String, serde_json::Value>,
        _cancel: CancellationToken,
        _on_update: Option<ToolUpdateSink>,
    ) -> Result<ToolOutput, ToolError> {
        let text = arguments
            .get("text")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ToolError::InvalidArguments("missing 'text'".into()))?;
        Ok(ToolOutput::text(text))
    }
}

/// Always fails.
pub struct FailingTool;

#[async_trait]
impl AgentTool for FailingTool {
    fn name(&self) -> &str {
        "fail"
    }

    fn description(&self) -> &str {
        "Always fails"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({ "type": "object" })
    }

    async fn execute(
        &self,
        _call_id: &str,
        _arguments: serde_json::Map<String, serde_json::Value>,
        _cancel: CancellationToken,
        _on_update: Option<ToolUpdateSink>,
    ) -> Result<ToolOutput, ToolError> {
        Err(ToolError::ExecutionFailed {
            tool_name: "fail".into(),
            reason: "disk on fire".into(),
        })
    }
}

/// Reports two progress steps before finishing.
pub struct ProgressTool;

#[async_trait]
impl AgentTool for ProgressTool {
    fn name(&self) -> &str {
        "progress"
    }

    fn description(&self) -> &str {
        "Reports progress"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({ "type": "object" })
    }

    async fn execute(
        &self,
        _call_id: &str,
        _arguments: serde_json::Map<String, serde_json::Value>,
        _cancel: CancellationToken,
        on_update: Option<ToolUpdateSink>,
    ) -> Result<ToolOutput, ToolError> {
        if let Some(sink) = on_update {
            for step in ["50%", "100%"] {
                sink.send(ToolUpdate {
                    content: vec![ContentBlock::text(step)],
                    details: None,
                });
            }
        }
        Ok(ToolOutput::text("finished"))
    }
}

/// Blocks until cancelled, then reports the abort.
pub struct WaitForCancelTool;

#[async_trait]
impl AgentTool for WaitForCancelTool {
    fn name(&self) -> &str {
        "wait"
    }

    fn description(&self) -> &str {
        "Waits until the run is cancelled"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({ "type": "object" })
    }

    async fn execute(
        &self,
        _call_id: &str,
        _arguments: serde_json::Map<String, serde_json::Value>,
        cancel: CancellationToken,
        _on_update: Option<ToolUpdateSink>,
    ) -> Result<ToolOutput, ToolError> {
        cancel.cancelled().await;
        Err(ToolError::Aborted)
    }
}
