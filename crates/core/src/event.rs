//! Assistant message streaming events.
//!
//! A stream adapter turns a backend's wire protocol into an ordered
//! sequence of [`AssistantMessageEvent`]s. Every event after `Start` refers
//! to a content-block index and carries a full snapshot of the message so
//! far, so a consumer can always render the last snapshot it has seen.
//!
//! The sequence always starts with `Start` and ends with exactly one of
//! `Done` or `Error`. [`AssistantEventSender`] enforces the second half of
//! that at the type level: the terminal methods consume the sender.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::message::{AssistantMessage, StopReason, ToolCall};

/// One step in the life of a streamed assistant message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AssistantMessageEvent {
    Start {
        partial: AssistantMessage,
    },
    TextStart {
        content_index: usize,
        partial: AssistantMessage,
    },
    TextDelta {
        content_index: usize,
        delta: String,
        partial: AssistantMessage,
    },
    TextEnd {
        content_index: usize,
        content: String,
        partial: AssistantMessage,
    },
    ThinkingStart {
        content_index: usize,
        partial: AssistantMessage,
    },
    ThinkingDelta {
        content_index: usize,
        delta: String,
        partial: AssistantMessage,
    },
    ThinkingEnd {
        content_index: usize,
        content: String,
        partial: AssistantMessage,
    },
    #[serde(rename = "toolcall_start")]
    ToolCallStart {
        content_index: usize,
        partial: AssistantMessage,
    },
    #[serde(rename = "toolcall_delta")]
    ToolCallDelta {
        content_index: usize,
        delta: String,
        partial: AssistantMessage,
    },
    #[serde(rename = "toolcall_end")]
    ToolCallEnd {
        content_index: usize,
        tool_call: ToolCall,
        partial: AssistantMessage,
    },
    /// Normal completion. `reason` is Stop, Length or ToolUse.
    Done {
        reason: StopReason,
        message: AssistantMessage,
    },
    /// Failed or aborted completion. `reason` is Error or Aborted.
    Error {
        reason: StopReason,
        error: AssistantMessage,
    },
}

impl AssistantMessageEvent {
    /// The message snapshot this event carries.
    pub fn message(&self) -> &AssistantMessage {
        match self {
            Self::Start { partial }
            | Self::TextStart { partial, .. }
            | Self::TextDelta { partial, .. }
            | Self::TextEnd { partial, .. }
            | Self::ThinkingStart { partial, .. }
            | Self::ThinkingDelta { partial, .. }
            | Self::ThinkingEnd { partial, .. }
            | Self::ToolCallStart { partial, .. }
            | Self::ToolCallDelta { partial, .. }
            | Self::ToolCallEnd { partial, .. } => partial,
            Self::Done { message, .. } => message,
            Self::Error { error, .. } => error,
        }
    }

    /// The content-block index this event refers to, if any.
    pub fn content_index(&self) -> Option<usize> {
        match self {
            Self::TextStart { content_index, .. }
            | Self::TextDelta { content_index, .. }
            | Self::TextEnd { content_index, .. }
            | Self::ThinkingStart { content_index, .. }
            | Self::ThinkingDelta { content_index, .. }
            | Self::ThinkingEnd { content_index, .. }
            | Self::ToolCallStart { content_index, .. }
            | Self::ToolCallDelta { content_index, .. }
            | Self::ToolCallEnd { content_index, .. } => Some(*content_index),
            Self::Start { .. } | Self::Done { .. } | Self::Error { .. } => None,
        }
    }

    /// Whether this event ends the stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done { .. } | Self::Error { .. })
    }

    /// Wire name for this event type.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Start { .. } => "start",
            Self::TextStart { .. } => "text_start",
            Self::TextDelta { .. } => "text_delta",
            Self::TextEnd { .. } => "text_end",
            Self::ThinkingStart { .. } => "thinking_start",
            Self::ThinkingDelta { .. } => "thinking_delta",
            Self::ThinkingEnd { .. } => "thinking_end",
            Self::ToolCallStart { .. } => "toolcall_start",
            Self::ToolCallDelta { .. } => "toolcall_delta",
            Self::ToolCallEnd { .. } => "toolcall_end",
            Self::Done { .. } => "done",
            Self::Error { .. } => "error",
        }
    }
}

/// Create a connected producer/consumer pair.
///
/// The channel is unbounded: a slow consumer never throttles the producer.
/// Event volume per turn is bounded by the model's output length.
pub fn event_channel() -> (AssistantEventSender, AssistantEventStream) {
    let (tx, rx) = mpsc::unbounded_channel();
    (AssistantEventSender { tx }, AssistantEventStream { rx })
}

/// Producer half of an assistant event stream.
#[derive(Debug)]
pub struct AssistantEventSender {
    tx: mpsc::UnboundedSender<AssistantMessageEvent>,
}

impl AssistantEventSender {
    /// Emit a non-terminal event. Returns `false` once the consumer is gone.
    pub fn emit(&self, event: AssistantMessageEvent) -> bool {
        debug_assert!(!event.is_terminal(), "terminal events go through done()/error()");
        self.tx.send(event).is_ok()
    }

    /// Whether the consumer has dropped its half.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Finish the stream normally.
    pub fn done(self, message: AssistantMessage) {
        let reason = message.stop_reason;
        let _ = self.tx.send(AssistantMessageEvent::Done { reason, message });
    }

    /// Finish the stream with a failure snapshot.
    pub fn error(self, error: AssistantMessage) {
        let reason = error.stop_reason;
        let _ = self.tx.send(AssistantMessageEvent::Error { reason, error });
    }
}

/// Consumer half of an assistant event stream.
#[derive(Debug)]
pub struct AssistantEventStream {
    rx: mpsc::UnboundedReceiver<AssistantMessageEvent>,
}

impl AssistantEventStream {
    /// Next event in production order, or `None` once the producer is gone.
    pub async fn recv(&mut self) -> Option<AssistantMessageEvent> {
        self.rx.recv().await
    }

    /// Drain the stream to completion.
    pub async fn collect_all(mut self) -> Vec<AssistantMessageEvent> {
        let mut events = Vec::new();
        while let Some(event) = self.rx.recv().await {
            events.push(event);
        }
        events
    }
}

impl Stream for AssistantEventStream {
    type Item = AssistantMessageEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}
