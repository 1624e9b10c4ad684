//! Upstream chat-completion client.
//!
//! Wraps exactly one outbound call per request to an OpenAI-compatible
//! provider. Non-streaming calls return the assistant message and token usage;
//! streaming calls return a lazy, single-pass [`FragmentStream`]. Failures are
//! classified into [`crate::core::UpstreamErrorKind`] and never retried here.

use crate::api::models::{Message, TokenUsage};
use crate::core::config::{AppConfig, UpstreamConfig};
use crate::core::error::UpstreamError;
use crate::core::logging::get_request_id;
use crate::core::metrics::get_metrics;
use crate::services::sse::{SseEvent, SseParser, DONE_MARKER};
use anyhow::Context;
use bytes::Bytes;
use futures::stream::{self, BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

const MAX_ERROR_MESSAGE_LEN: usize = 500;

/// One incremental piece of a streamed completion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fragment {
    /// Assistant text carried by this fragment, possibly empty
    pub delta: String,
    /// Set on the fragment that ends generation (`stop`, `length`, ...)
    pub finish_reason: Option<String>,
}

impl Fragment {
    pub fn text(delta: impl Into<String>) -> Self {
        Self {
            delta: delta.into(),
            finish_reason: None,
        }
    }

    pub fn finished(delta: impl Into<String>, finish_reason: impl Into<String>) -> Self {
        Self {
            delta: delta.into(),
            finish_reason: Some(finish_reason.into()),
        }
    }

    pub fn is_final(&self) -> bool {
        self.finish_reason.is_some()
    }
}

/// Forward-only sequence of fragments. Dropping it releases the upstream connection.
pub type FragmentStream = BoxStream<'static, Result<Fragment, UpstreamError>>;

/// Complete non-streaming answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub message: Message,
    pub usage: TokenUsage,
}

/// Result of [`CompletionClient::complete`].
pub enum CompletionResult {
    Message(Completion),
    Stream(FragmentStream),
}

impl std::fmt::Debug for CompletionResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Message(completion) => f.debug_tuple("Message").field(completion).finish(),
            Self::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

/// Parameters of one upstream call. Temperature must already be validated.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub messages: Vec<Message>,
    pub model: Option<String>,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    pub stream: bool,
}

#[derive(Serialize)]
struct UpstreamPayload<'a> {
    model: &'a str,
    messages: &'a [Message],
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
}

#[derive(Deserialize)]
struct UpstreamResponse {
    #[serde(default)]
    choices: Vec<UpstreamChoice>,
    #[serde(default)]
    usage: Option<TokenUsage>,
}

#[derive(Deserialize)]
struct UpstreamChoice {
    message: UpstreamMessage,
}

#[derive(Deserialize)]
struct UpstreamMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct UpstreamChunk {
    #[serde(default)]
    choices: Vec<UpstreamChunkChoice>,
    #[serde(default)]
    error: Option<Value>,
}

#[derive(Deserialize)]
struct UpstreamChunkChoice {
    #[serde(default)]
    delta: UpstreamDelta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize, Default)]
struct UpstreamDelta {
    #[serde(default)]
    content: Option<String>,
}

/// Client for the configured upstream provider.
///
/// Constructed once at startup and shared through the application state.
#[derive(Clone, Debug)]
pub struct CompletionClient {
    http: reqwest::Client,
    api_base: String,
    api_key: String,
    default_model: String,
}

impl CompletionClient {
    pub fn new(http: reqwest::Client, upstream: &UpstreamConfig) -> Self {
        Self {
            http,
            api_base: upstream.api_base.trim_end_matches('/').to_string(),
            api_key: upstream.api_key.clone(),
            default_model: upstream.default_model.clone(),
        }
    }

    /// Build the client together with a pooled HTTP client honoring the
    /// configured timeout and TLS verification.
    pub fn from_config(config: &AppConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .danger_accept_invalid_certs(!config.verify_ssl)
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(60))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self::new(http, &config.upstream))
    }

    pub fn default_model(&self) -> &str {
        &self.default_model
    }

    /// Model actually sent upstream: the explicit one, else the configured default.
    pub fn resolve_model(&self, model: Option<&str>) -> String {
        model
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .unwrap_or(&self.default_model)
            .to_string()
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.api_base)
    }

    /// Issue one upstream call.
    pub async fn complete(
        &self,
        request: CompletionRequest,
    ) -> Result<CompletionResult, UpstreamError> {
        if request.messages.is_empty() {
            return Err(UpstreamError::unknown("no messages to send"));
        }

        let model = self.resolve_model(request.model.as_deref());
        let payload = UpstreamPayload {
            model: &model,
            messages: &request.messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            stream: request.stream,
        };
        let started = Instant::now();

        tracing::debug!(
            request_id = %get_request_id(),
            model = %model,
            stream = request.stream,
            messages = request.messages.len(),
            "Sending upstream completion request"
        );

        let response = self
            .http
            .post(self.completions_url())
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| report(classify_transport_error(&e), &model, started))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(report(classify_status(status.as_u16(), &body), &model, started));
        }

        if request.stream {
            return Ok(CompletionResult::Stream(fragment_stream(
                response.bytes_stream().boxed(),
            )));
        }

        let body: UpstreamResponse = response
            .json()
            .await
            .map_err(|e| report(classify_transport_error(&e), &model, started))?;
        let content = body
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content.unwrap_or_default())
            .ok_or_else(|| {
                report(
                    UpstreamError::provider("response contained no choices"),
                    &model,
                    started,
                )
            })?;
        let usage = body.usage.unwrap_or_default();
        record_token_usage(&usage, &model);

        tracing::debug!(
            request_id = %get_request_id(),
            model = %model,
            elapsed_ms = started.elapsed().as_millis() as u64,
            total_tokens = usage.total_tokens,
            "Upstream completion finished"
        );

        Ok(CompletionResult::Message(Completion {
            message: Message::assistant(content),
            usage,
        }))
    }

    /// Non-streaming call.
    pub async fn complete_message(
        &self,
        mut request: CompletionRequest,
    ) -> Result<Completion, UpstreamError> {
        request.stream = false;
        match self.complete(request).await? {
            CompletionResult::Message(completion) => Ok(completion),
            CompletionResult::Stream(_) => Err(UpstreamError::unknown(
                "unexpected streaming result",
            )),
        }
    }

    /// Streaming call.
    pub async fn complete_stream(
        &self,
        mut request: CompletionRequest,
    ) -> Result<FragmentStream, UpstreamError> {
        request.stream = true;
        match self.complete(request).await? {
            CompletionResult::Stream(fragments) => Ok(fragments),
            CompletionResult::Message(_) => Err(UpstreamError::unknown(
                "unexpected non-streaming result",
            )),
        }
    }
}

fn report(error: UpstreamError, model: &str, started: Instant) -> UpstreamError {
    get_metrics()
        .upstream_errors
        .with_label_values(&[error.kind.as_str()])
        .inc();
    tracing::error!(
        request_id = %get_request_id(),
        model = %model,
        kind = %error.kind,
        retryable = error.is_retryable(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        error = %error,
        "Upstream completion failed"
    );
    error
}

fn record_token_usage(usage: &TokenUsage, model: &str) {
    let metrics = get_metrics();
    for (token_type, count) in [
        ("prompt", usage.prompt_tokens),
        ("completion", usage.completion_tokens),
        ("total", usage.total_tokens),
    ] {
        metrics
            .token_usage
            .with_label_values(&[model, token_type])
            .inc_by(count as u64);
    }
}

/// Classify transport-level reqwest failures.
///
/// Messages are sanitized so internal URLs never reach clients.
pub fn classify_transport_error(error: &reqwest::Error) -> UpstreamError {
    if error.is_timeout() {
        UpstreamError::timeout()
    } else if error.is_connect() {
        UpstreamError::provider("Failed to connect to upstream provider")
    } else if error.is_decode() || error.is_body() {
        UpstreamError::provider("Invalid response from upstream provider")
    } else {
        UpstreamError::unknown("Upstream request failed")
    }
}

/// Classify a non-success HTTP status from the provider.
pub fn classify_status(status: u16, body: &str) -> UpstreamError {
    match status {
        429 => UpstreamError::rate_limited(),
        408 | 504 => UpstreamError::timeout(),
        _ => {
            let detail = serde_json::from_str::<Value>(body)
                .ok()
                .as_ref()
                .and_then(extract_error_message)
                .or_else(|| {
                    let trimmed = body.trim();
                    (!trimmed.is_empty()).then(|| truncate_message(trimmed))
                });
            match detail {
                Some(detail) => UpstreamError::provider(format!("HTTP {}: {}", status, detail)),
                None => UpstreamError::provider(format!("HTTP {}", status)),
            }
        }
    }
}

/// Pull a human-readable message out of a provider error body.
pub fn extract_error_message(body: &Value) -> Option<String> {
    let message = body
        .pointer("/error/message")
        .and_then(Value::as_str)
        .or_else(|| body.get("error").and_then(Value::as_str))
        .or_else(|| body.get("message").and_then(Value::as_str))?;
    Some(truncate_message(message))
}

fn truncate_message(message: &str) -> String {
    if message.chars().count() <= MAX_ERROR_MESSAGE_LEN {
        message.to_string()
    } else {
        let truncated: String = message.chars().take(MAX_ERROR_MESSAGE_LEN).collect();
        format!("{}...", truncated)
    }
}

/// Decode one upstream SSE event.
///
/// `Ok(None)` means the event carries nothing for the caller (usage-only chunks,
/// named non-data events).
fn decode_event(event: &SseEvent) -> Result<Option<Fragment>, UpstreamError> {
    let Some(data) = event.data.as_deref() else {
        return Ok(None);
    };
    let chunk: UpstreamChunk = serde_json::from_str(data)
        .map_err(|_| UpstreamError::provider("malformed stream chunk from upstream provider"))?;

    if let Some(error) = chunk.error {
        let detail = extract_error_message(&serde_json::json!({ "error": error }))
            .unwrap_or_else(|| "stream error reported by upstream provider".to_string());
        return Err(UpstreamError::provider(detail));
    }

    Ok(chunk.choices.into_iter().next().map(|choice| Fragment {
        delta: choice.delta.content.unwrap_or_default(),
        finish_reason: choice.finish_reason,
    }))
}

struct DecodeState {
    bytes: BoxStream<'static, reqwest::Result<Bytes>>,
    parser: SseParser,
    ready: VecDeque<Result<Fragment, UpstreamError>>,
    exhausted: bool,
    request_id: String,
}

impl DecodeState {
    /// Queue the fragments of decoded events.
    fn accept(&mut self, events: Vec<SseEvent>) {
        for event in events {
            if event.data.as_deref().map(str::trim) == Some(DONE_MARKER) {
                self.exhausted = true;
                return;
            }
            match decode_event(&event) {
                Ok(Some(fragment)) => self.ready.push_back(Ok(fragment)),
                Ok(None) => {}
                Err(error) => {
                    get_metrics()
                        .upstream_errors
                        .with_label_values(&[error.kind.as_str()])
                        .inc();
                    tracing::error!(
                        request_id = %self.request_id,
                        error = %error,
                        "Upstream stream failed"
                    );
                    self.ready.push_back(Err(error));
                    self.exhausted = true;
                    return;
                }
            }
        }
    }
}

/// Turn a provider SSE byte stream into fragments.
///
/// Ends after `[DONE]`, after the first error, or when the body ends.
pub fn fragment_stream(bytes: BoxStream<'static, reqwest::Result<Bytes>>) -> FragmentStream {
    let state = DecodeState {
        bytes,
        parser: SseParser::new(),
        ready: VecDeque::new(),
        exhausted: false,
        request_id: get_request_id(),
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.ready.pop_front() {
                return Some((item, state));
            }
            if state.exhausted {
                return None;
            }
            match state.bytes.next().await {
                Some(Ok(bytes)) => {
                    let events = state.parser.parse(&bytes);
                    state.accept(events);
                }
                Some(Err(error)) => {
                    let error = classify_transport_error(&error);
                    state.exhausted = true;
                    return Some((Err(error), state));
                }
                None => {
                    let trailing = state.parser.finish().into_iter().collect();
                    state.accept(trailing);
                    state.exhausted = true;
                }
            }
        }
    })
    .boxed()
}
