//! OpenAI-compatible streaming chat completions adapter.
//!
//! Works with OpenAI, OpenRouter, Ollama, vLLM and any endpoint exposing a
//! streaming `/chat/completions` route.
//!
//! Only text crosses this boundary. Assistant history is flattened to its
//! concatenated text and tool results are not forwarded, so multi-step tool
//! round trips need a richer adapter.

use std::fmt::Display;
use std::time::Duration;

use agentpi_core::error::ProviderError;
use agentpi_core::event::{
    AssistantEventSender, AssistantEventStream, AssistantMessageEvent, event_channel,
};
use agentpi_core::message::{
    AssistantMessage, ContentBlock, Message, StopReason, TextContent, Usage, UserContent,
    now_millis,
};
use agentpi_core::model::{Model, ModelCost, api};
use agentpi_core::provider::{Context, StreamAdapter, StreamOptions};
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::sse::{SseDecoder, SseFrame};

/// Environment variable consulted when no explicit key is passed.
pub const DEFAULT_API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Streams completions from an OpenAI-compatible endpoint.
///
/// The endpoint is taken from the model's `base_url` on every call, so one
/// adapter instance serves every model that speaks this protocol.
pub struct OpenAiCompletionsAdapter {
    client: reqwest::Client,
    api_key_env: Option<String>,
}

impl OpenAiCompletionsAdapter {
    pub fn new() -> Self {
        // No overall timeout: a streamed response stays open as long as the model writes.
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();

        Self {
            client,
            api_key_env: Some(DEFAULT_API_KEY_ENV.into()),
        }
    }

    /// Read the fallback key from another environment variable.
    pub fn with_api_key_env(mut self, var: impl Into<String>) -> Self {
        self.api_key_env = Some(var.into());
        self
    }

    /// Require an explicit key on every call.
    pub fn without_env_fallback(mut self) -> Self {
        self.api_key_env = None;
        self
    }

    fn resolve_api_key(
        &self,
        model: &Model,
        options: &StreamOptions,
    ) -> Result<String, ProviderError> {
        if let Some(key) = options.explicit_api_key() {
            return Ok(key.to_string());
        }

        self.api_key_env
            .as_deref()
            .and_then(|var| std::env::var(var).ok())
            .filter(|key| !key.is_empty())
            .ok_or_else(|| ProviderError::MissingApiKey(model.provider.clone()))
    }
}

impl Default for OpenAiCompletionsAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StreamAdapter for OpenAiCompletionsAdapter {
    fn api(&self) -> &str {
        api::OPENAI_COMPLETIONS
    }

    async fn stream(
        &self,
        model: &Model,
        context: &Context,
        options: &StreamOptions,
        cancel: CancellationToken,
    ) -> Result<AssistantEventStream, ProviderError> {
        let api_key = self.resolve_api_key(model, options)?;
        let url = format!("{}/chat/completions", model.base_url.trim_end_matches('/'));
        let body = build_request(model, context, options);

        // Option headers win over model headers
        let mut headers = model.headers.clone();
        headers.extend(options.headers.iter().map(|(k, v)| (k.clone(), v.clone())));

        let mut request = self
            .client
            .post(&url)
            .bearer_auth(&api_key)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .json(&body);
        for (name, value) in &headers {
            request = request.header(name.as_str(), value.as_str());
        }

        debug!(
            model = %model.id,
            provider = %model.provider,
            session_id = ?options.session_id,
            messages = body.messages.len(),
            "Sending streaming completion request"
        );

        let (tx, rx) = event_channel();
        let partial = AssistantMessage {
            content: Vec::new(),
            api: model.api.clone(),
            provider: model.provider.clone(),
            model: model.id.clone(),
            usage: Usage::default(),
            stop_reason: StopReason::Stop,
            error_message: None,
            timestamp: now_millis(),
        };
        tx.emit(AssistantMessageEvent::Start {
            partial: partial.clone(),
        });

        let model_id = model.id.clone();
        let mut acc = StreamAccumulator::new(partial, model.cost);

        tokio::spawn(async move {
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(ProviderError::Aborted),
                result = read_response(request, &mut acc, &tx) => result,
            };
            finish_stream(acc, tx, outcome, &model_id);
        });

        Ok(rx)
    }
}

/// Map a wire `finish_reason` to a stop reason. Unknown reasons are a normal stop.
pub fn map_finish_reason(reason: &str) -> StopReason {
    match reason {
        "stop" => StopReason::Stop,
        "length" => StopReason::Length,
        "tool_calls" => StopReason::ToolUse,
        _ => StopReason::Stop,
    }
}

fn build_request(model: &Model, context: &Context, options: &StreamOptions) -> ChatRequest {
    ChatRequest {
        model: model.id.clone(),
        messages: to_api_messages(context),
        temperature: options.temperature,
        max_tokens: options.max_tokens,
        stream: true,
    }
}

fn to_api_messages(context: &Context) -> Vec<ChatMessage> {
    let mut out = Vec::with_capacity(context.messages.len() + 1);

    if let Some(system) = context.system_prompt.as_deref().filter(|s| !s.is_empty()) {
        out.push(ChatMessage {
            role: "system",
            content: system.to_string(),
        });
    }

    for message in &context.messages {
        match message {
            Message::User(user) => out.push(ChatMessage {
                role: "user",
                content: user_text(&user.content),
            }),
            Message::Assistant(assistant) => out.push(ChatMessage {
                role: "assistant",
                content: assistant.text(),
            }),
            Message::ToolResult(_) => {}
        }
    }

    out
}

fn user_text(content: &UserContent) -> String {
    match content {
        UserContent::Text(text) => text.clone(),
        UserContent::Blocks(blocks) => blocks
            .iter()
            .filter_map(ContentBlock::as_text)
            .collect::<Vec<_>>()
            .join("\n"),
    }
}

async fn read_response(
    request: reqwest::RequestBuilder,
    acc: &mut StreamAccumulator,
    tx: &AssistantEventSender,
) -> Result<(), ProviderError> {
    let response = request
        .send()
        .await
        .map_err(|e| ProviderError::Network(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        warn!(status = status.as_u16(), body = %body, "Completions endpoint returned error");
        return Err(ProviderError::ApiError {
            status_code: status.as_u16(),
            message: body,
        });
    }

    pump(response.bytes_stream(), acc, tx).await
}

/// Decode an SSE body and forward the resulting events until `[DONE]` or EOF.
async fn pump<S, B, E>(
    body: S,
    acc: &mut StreamAccumulator,
    tx: &AssistantEventSender,
) -> Result<(), ProviderError>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: Display,
{
    let mut body = std::pin::pin!(body);
    let mut decoder = SseDecoder::new();

    while let Some(chunk) = body.next().await {
        let chunk = chunk.map_err(|e| ProviderError::StreamInterrupted(e.to_string()))?;
        for frame in decoder.push(chunk.as_ref()) {
            if !handle_frame(frame, acc, tx) {
                return Ok(());
            }
        }
    }

    if let Some(frame) = decoder.finish() {
        handle_frame(frame, acc, tx);
    }
    Ok(())
}

/// Returns `false` when reading should stop.
fn handle_frame(frame: SseFrame, acc: &mut StreamAccumulator, tx: &AssistantEventSender) -> bool {
    match frame {
        SseFrame::Done => false,
        SseFrame::Data(data) => match serde_json::from_str::<StreamResponse>(&data) {
            Ok(chunk) => acc.apply(chunk).into_iter().all(|event| tx.emit(event)),
            Err(e) => {
                trace!(data = %data, error = %e, "Skipping malformed stream chunk");
                true
            }
        },
    }
}

/// Emit the single terminal event for a stream.
fn finish_stream(
    acc: StreamAccumulator,
    tx: AssistantEventSender,
    outcome: Result<(), ProviderError>,
    model_id: &str,
) {
    match outcome {
        Ok(()) => {
            let message = acc.finish();
            debug!(model = %model_id, stop_reason = ?message.stop_reason, "Stream completed");
            tx.done(message);
        }
        Err(e) => {
            warn!(model = %model_id, error = %e, "Stream failed");
            tx.error(acc.fail(&e));
        }
    }
}

/// Folds wire chunks into successive message snapshots.
///
/// Stop reason and usage are held back and attached only to the terminal
/// snapshot.
struct StreamAccumulator {
    partial: AssistantMessage,
    rates: ModelCost,
    stop_reason: StopReason,
    usage: Option<Usage>,
}

impl StreamAccumulator {
    fn new(partial: AssistantMessage, rates: ModelCost) -> Self {
        Self {
            partial,
            rates,
            stop_reason: StopReason::Stop,
            usage: None,
        }
    }

    fn apply(&mut self, chunk: StreamResponse) -> Vec<AssistantMessageEvent> {
        let mut events = Vec::new();

        if let Some(choice) = chunk.choices.into_iter().next() {
            if let Some(delta) = choice.delta.content.filter(|d| !d.is_empty()) {
                self.push_text(delta, &mut events);
            }
            if let Some(reason) = choice.finish_reason.as_deref() {
                self.stop_reason = map_finish_reason(reason);
            }
        }

        if let Some(usage) = chunk.usage {
            self.usage = Some(Usage::priced(
                &self.rates,
                usage.prompt_tokens,
                usage.completion_tokens,
                0,
                0,
                usage.total_tokens,
            ));
        }

        events
    }

    fn push_text(&mut self, delta: String, events: &mut Vec<AssistantMessageEvent>) {
        let mut next = self.partial.clone();

        if !matches!(next.content.last(), Some(ContentBlock::Text(_))) {
            next.content.push(ContentBlock::Text(TextContent::new("")));
            events.push(AssistantMessageEvent::TextStart {
                content_index: next.content.len() - 1,
                partial: next.clone(),
            });
        }

        let content_index = next.content.len() - 1;
        if let Some(ContentBlock::Text(text)) = next.content.last_mut() {
            text.text.push_str(&delta);
        }

        events.push(AssistantMessageEvent::TextDelta {
            content_index,
            delta,
            partial: next.clone(),
        });
        self.partial = next;
    }

    fn finish(self) -> AssistantMessage {
        let message = self.partial.with_stop_reason(self.stop_reason);
        match self.usage {
            Some(usage) => message.with_usage(usage),
            None => message,
        }
    }

    fn fail(self, error: &ProviderError) -> AssistantMessage {
        let reason = match error {
            ProviderError::Aborted => StopReason::Aborted,
            _ => StopReason::Error,
        };
        let message = self.partial.with_error(reason, error.to_string());
        match self.usage {
            Some(usage) => message.with_usage(usage),
            None => message,
        }
    }
}

// --- OpenAI API types (internal) ---

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

/// A single SSE `data: {...}` chunk from a streaming response.
#[derive(Debug, Deserialize)]
struct StreamResponse {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
    #[serde(default)]
    total_tokens: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentpi_core::model::ModelRegistry;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const HI_THERE: &str = concat!(
        "data: {\"choices\":[{\"delta\":{\"content\":\"Hi\"}}]}\n\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\" there\"},\"finish_reason\":\"stop\"}],",
        "\"usage\":{\"prompt_tokens\":5,\"completion_tokens\":2,\"total_tokens\":7}}\n\n",
        "data: [DONE]\n\n",
    );

    fn gpt4o() -> Model {
        ModelRegistry::with_defaults().get("gpt-4o").cloned().unwrap()
    }

    fn options() -> StreamOptions {
        StreamOptions::default().with_api_key("sk-test")
    }

    fn context() -> Context {
        Context {
            system_prompt: None,
            messages: vec![Message::user("hello")],
            tools: vec![],
        }
    }

    fn empty_partial() -> AssistantMessage {
        AssistantMessage {
            content: Vec::new(),
            api: api::OPENAI_COMPLETIONS.into(),
            provider: "openai".into(),
            model: "gpt-4o".into(),
            usage: Usage::default(),
            stop_reason: StopReason::Stop,
            error_message: None,
            timestamp: 0,
        }
    }

    async fn serve(template: ResponseTemplate) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(template)
            .mount(&server)
            .await;
        server
    }

    /// Drive the read loop over in-memory chunks, the way the spawned task does.
    async fn run_pump(chunks: Vec<Result<Vec<u8>, String>>) -> Vec<AssistantMessageEvent> {
        let (tx, rx) = event_channel();
        let mut acc = StreamAccumulator::new(empty_partial(), gpt4o().cost);
        let outcome = pump(futures::stream::iter(chunks), &mut acc, &tx).await;
        finish_stream(acc, tx, outcome, "gpt-4o");
        rx.collect_all().await
    }

    fn kinds(events: &[AssistantMessageEvent]) -> Vec<&'static str> {
        events.iter().map(|e| e.event_type()).collect()
    }

    #[test]
    fn finish_reason_mapping() {
        assert_eq!(map_finish_reason("stop"), StopReason::Stop);
        assert_eq!(map_finish_reason("length"), StopReason::Length);
        assert_eq!(map_finish_reason("tool_calls"), StopReason::ToolUse);
        assert_eq!(map_finish_reason("content_filter"), StopReason::Stop);
        assert_eq!(map_finish_reason(""), StopReason::Stop);
    }

    #[test]
    fn request_body_flattens_history() {
        let mut assistant = empty_partial();
        assistant.content = vec![
            ContentBlock::text("Hello"),
            ContentBlock::ToolCall(agentpi_core::message::ToolCall {
                id: "c1".into(),
                name: "echo".into(),
                arguments: serde_json::Map::new(),
                thought_signature: None,
            }),
            ContentBlock::text(" again"),
        ];
        let context = Context {
            system_prompt: Some("be brief".into()),
            messages: vec![
                Message::user("hi"),
                Message::Assistant(assistant),
                Message::ToolResult(agentpi_core::message::ToolResultMessage::error(
                    "c1", "echo", "boom",
                )),
            ],
            tools: vec![],
        };
        let options = StreamOptions {
            temperature: Some(0.3),
            ..options()
        };

        let body = serde_json::to_value(build_request(&gpt4o(), &context, &options)).unwrap();
        assert_eq!(
            body,
            serde_json::json!({
                "model": "gpt-4o",
                "messages": [
                    {"role": "system", "content": "be brief"},
                    {"role": "user", "content": "hi"},
                    {"role": "assistant", "content": "Hello again"},
                ],
                "temperature": 0.3f32,
                "stream": true,
            })
        );
    }

    #[test]
    fn empty_system_prompt_is_omitted() {
        let context = Context {
            system_prompt: Some(String::new()),
            ..context()
        };
        let messages = to_api_messages(&context);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].role, "user");
    }

    #[test]
    fn structured_user_content_sends_its_text() {
        let context = Context {
            system_prompt: None,
            messages: vec![Message::User(agentpi_core::message::UserMessage {
                content: UserContent::Blocks(vec![
                    ContentBlock::text("line one"),
                    ContentBlock::text("line two"),
                ]),
                timestamp: 0,
            })],
            tools: vec![],
        };
        assert_eq!(to_api_messages(&context)[0].content, "line one\nline two");
    }

    #[test]
    fn accumulator_reuses_open_text_block() {
        let mut acc = StreamAccumulator::new(empty_partial(), ModelCost::default());
        let first: StreamResponse =
            serde_json::from_str(r#"{"choices":[{"delta":{"content":"a"}}]}"#).unwrap();
        let second: StreamResponse =
            serde_json::from_str(r#"{"choices":[{"delta":{"content":"b"}}]}"#).unwrap();

        let events = acc.apply(first);
        assert_eq!(kinds(&events), vec!["text_start", "text_delta"]);
        let events = acc.apply(second);
        assert_eq!(kinds(&events), vec!["text_delta"]);
        assert_eq!(events[0].content_index(), Some(0));
        assert_eq!(events[0].message().text(), "ab");
    }

    #[test]
    fn usage_is_attached_only_to_terminal_snapshot() {
        let mut acc = StreamAccumulator::new(empty_partial(), gpt4o().cost);
        let chunk: StreamResponse = serde_json::from_str(
            r#"{"choices":[{"delta":{"content":"x"},"finish_reason":"length"}],"usage":{"prompt_tokens":1000000,"completion_tokens":1000000,"total_tokens":2000000}}"#,
        )
        .unwrap();

        let events = acc.apply(chunk);
        assert!(events.iter().all(|e| e.message().usage == Usage::default()));
        assert!(events.iter().all(|e| e.message().stop_reason == StopReason::Stop));

        let message = acc.finish();
        assert_eq!(message.stop_reason, StopReason::Length);
        assert_eq!(message.usage.total_tokens, 2_000_000);
        // gpt-4o: $2.50 in, $10.00 out per million
        assert!((message.usage.cost.input - 2.5).abs() < 1e-9);
        assert!((message.usage.cost.output - 10.0).abs() < 1e-9);
        assert!((message.usage.cost.total - 12.5).abs() < 1e-9);
        assert_eq!(message.usage.cost.cache_read, 0.0);
    }

    #[tokio::test]
    async fn streams_text_to_done() {
        let server =
            serve(ResponseTemplate::new(200).set_body_raw(HI_THERE, "text/event-stream")).await;
        let model = gpt4o().with_base_url(server.uri());

        let stream = OpenAiCompletionsAdapter::new()
            .stream(&model, &context(), &options(), CancellationToken::new())
            .await
            .unwrap();
        let events = stream.collect_all().await;

        assert_eq!(
            kinds(&events),
            vec!["start", "text_start", "text_delta", "text_delta", "done"]
        );
        assert!(events[0].message().content.is_empty());
        assert_eq!(events[1].content_index(), Some(0));

        let deltas: String = events
            .iter()
            .filter_map(|e| match e {
                AssistantMessageEvent::TextDelta { delta, .. } => Some(delta.as_str()),
                _ => None,
            })
            .collect();

        let AssistantMessageEvent::Done { reason, message } = events.last().unwrap() else {
            panic!("expected Done");
        };
        assert_eq!(*reason, StopReason::Stop);
        assert_eq!(message.text(), "Hi there");
        assert_eq!(message.text(), deltas);
        assert_eq!(message.usage.total_tokens, 7);
        assert_eq!(message.usage.input, 5);
        assert_eq!(message.usage.output, 2);
        let expected = 5.0 / 1e6 * 2.5 + 2.0 / 1e6 * 10.0;
        assert!((message.usage.cost.total - expected).abs() < 1e-12);
    }

    #[tokio::test]
    async fn sends_bearer_token_and_merged_headers() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(header("x-client", "from-options"))
            .and(header("x-model-only", "yes"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(HI_THERE, "text/event-stream"))
            .expect(1)
            .mount(&server)
            .await;

        let mut model = gpt4o().with_base_url(server.uri());
        model.headers.insert("x-client".into(), "from-model".into());
        model.headers.insert("x-model-only".into(), "yes".into());
        let mut options = options();
        options.headers.insert("x-client".into(), "from-options".into());

        let events = OpenAiCompletionsAdapter::new()
            .stream(&model, &context(), &options, CancellationToken::new())
            .await
            .unwrap()
            .collect_all()
            .await;

        assert_eq!(events.last().unwrap().event_type(), "done");
    }

    #[tokio::test]
    async fn http_error_status_becomes_error_event() {
        let server = serve(ResponseTemplate::new(401).set_body_string("invalid api key")).await;
        let model = gpt4o().with_base_url(server.uri());

        let events = OpenAiCompletionsAdapter::new()
            .stream(&model, &context(), &options(), CancellationToken::new())
            .await
            .unwrap()
            .collect_all()
            .await;

        assert_eq!(kinds(&events), vec!["start", "error"]);
        let AssistantMessageEvent::Error { reason, error } = &events[1] else {
            panic!("expected Error");
        };
        assert_eq!(*reason, StopReason::Error);
        let text = error.error_message.as_deref().unwrap();
        assert!(text.contains("401"));
        assert!(text.contains("invalid api key"));
    }

    #[tokio::test]
    async fn cancellation_ends_with_aborted_error() {
        let server = serve(
            ResponseTemplate::new(200)
                .set_body_raw(HI_THERE, "text/event-stream")
                .set_delay(Duration::from_secs(10)),
        )
        .await;
        let model = gpt4o().with_base_url(server.uri());
        let cancel = CancellationToken::new();

        let stream = OpenAiCompletionsAdapter::new()
            .stream(&model, &context(), &options(), cancel.clone())
            .await
            .unwrap();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            cancel.cancel();
        });
        let events = stream.collect_all().await;

        assert_eq!(kinds(&events), vec!["start", "error"]);
        let message = events[1].message();
        assert_eq!(message.stop_reason, StopReason::Aborted);
        assert_eq!(message.error_message.as_deref(), Some("Request was aborted"));
    }

    #[tokio::test]
    async fn missing_api_key_fails_before_any_event() {
        let result = OpenAiCompletionsAdapter::new()
            .without_env_fallback()
            .stream(
                &gpt4o(),
                &context(),
                &StreamOptions::default(),
                CancellationToken::new(),
            )
            .await;

        let err = result.unwrap_err();
        assert_eq!(err, ProviderError::MissingApiKey("openai".into()));
        assert!(err.is_configuration());
    }

    #[tokio::test]
    async fn network_failure_mid_stream_yields_single_error() {
        let events = run_pump(vec![
            Ok(b"data: {\"choices\":[{\"delta\":{\"content\":\"Hi\"}}]}\n\n".to_vec()),
            Err("connection reset by peer".into()),
        ])
        .await;

        assert_eq!(kinds(&events), vec!["text_start", "text_delta", "error"]);
        assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);
        let message = events.last().unwrap().message();
        assert_eq!(message.stop_reason, StopReason::Error);
        assert_eq!(message.text(), "Hi");
        assert!(
            message
                .error_message
                .as_deref()
                .is_some_and(|m| m.contains("connection reset"))
        );
    }

    #[tokio::test]
    async fn malformed_chunks_are_skipped() {
        let events = run_pump(vec![Ok(concat!(
            "data: {not json\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"ok\"},\"finish_reason\":\"stop\"}]}\n\n",
            "data: [DONE]\n\n",
        )
        .as_bytes()
        .to_vec())])
        .await;

        assert_eq!(kinds(&events), vec!["text_start", "text_delta", "done"]);
        assert_eq!(events.last().unwrap().message().text(), "ok");
    }

    #[tokio::test]
    async fn eof_without_done_sentinel_completes_normally() {
        let events = run_pump(vec![Ok(
            b"data: {\"choices\":[{\"delta\":{\"content\":\"partial\"}}]}".to_vec(),
        )])
        .await;

        assert_eq!(kinds(&events), vec!["text_start", "text_delta", "done"]);
        let message = events.last().unwrap().message();
        assert_eq!(message.text(), "partial");
        assert!(message.usage.total_tokens == 0);
    }

    #[tokio::test]
    async fn frames_after_done_are_ignored() {
        let events = run_pump(vec![Ok(concat!(
            "data: [DONE]\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"late\"}}]}\n\n",
        )
        .as_bytes()
        .to_vec())])
        .await;

        assert_eq!(kinds(&events), vec!["done"]);
    }

    #[tokio::test]
    async fn content_indices_never_decrease() {
        let mut body = String::new();
        for word in ["one ", "two ", "three ", "four"] {
            body.push_str(&format!(
                "data: {{\"choices\":[{{\"delta\":{{\"content\":\"{word}\"}}}}]}}\n\n"
            ));
        }
        let events = run_pump(vec![Ok(body.into_bytes())]).await;

        let indices: Vec<usize> = events.iter().filter_map(|e| e.content_index()).collect();
        assert!(indices.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(
            events.iter().filter(|e| e.event_type() == "text_start").count(),
            1
        );
        assert_eq!(events.last().unwrap().message().text(), "one two three four");
    }
}
