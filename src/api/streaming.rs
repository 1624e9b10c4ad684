//! Server-Sent Events relays for the streaming endpoints.
//!
//! Each relay is a single-pass state machine over the upstream fragment stream
//! (`Streaming -> Finalizing -> Done`) built with `futures::stream::unfold`.
//! Whatever happens upstream, a relay that is not cancelled emits exactly one
//! `[DONE]` frame, and errors become in-band `{"error": ...}` frames.

use crate::api::disconnect::DisconnectStream;
use crate::api::models::DomainChatChunk;
use crate::core::error::UpstreamError;
use crate::core::error_types::INVALID_RECOMMENDATIONS_MESSAGE;
use crate::core::logging::get_request_id;
use crate::core::metrics::get_metrics;
use crate::core::StreamCancelHandle;
use crate::services::completion_client::{Fragment, FragmentStream};
use crate::services::recommendation::parse_recommendation;
use crate::services::references::extract_references;
use crate::services::sse::{format_sse_data, format_sse_done, format_sse_error, format_sse_json};
use axum::body::{Body, Bytes};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use chrono::{SecondsFormat, Utc};
use futures::stream::{self, BoxStream, StreamExt};
use std::convert::Infallible;
use std::time::Instant;

/// Outbound SSE frames.
pub type FrameStream = BoxStream<'static, Result<Bytes, Infallible>>;

/// One upstream fragment as seen by a relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamChunk {
    /// 1-based, increasing by one per chunk of the stream
    pub sequence_index: u64,
    pub delta_text: String,
    /// Set on the chunk carrying the upstream finish signal
    pub is_final: bool,
}

/// Turns relay chunks into outbound frames for one endpoint family.
pub trait FrameEncoder: Send + 'static {
    /// Label used for metrics and logs.
    fn relay(&self) -> &'static str;

    /// Frame for a chunk, if the chunk produces one.
    fn encode_chunk(&mut self, chunk: StreamChunk) -> Option<String>;

    /// Frame reporting an upstream failure.
    fn encode_error(&mut self, error: &UpstreamError) -> String {
        format_sse_error(&error.message)
    }
}

/// Plain chat: the bare incremental text.
#[derive(Debug, Default)]
pub struct ChatFrames;

impl FrameEncoder for ChatFrames {
    fn relay(&self) -> &'static str {
        "chat"
    }

    fn encode_chunk(&mut self, chunk: StreamChunk) -> Option<String> {
        (!chunk.delta_text.is_empty()).then(|| format_sse_data(&chunk.delta_text))
    }
}

/// Domain chat: JSON events, with references attached to the final one.
#[derive(Debug)]
pub struct DomainChatFrames {
    response_id: String,
    buffer: String,
}

impl DomainChatFrames {
    pub fn new(response_id: String) -> Self {
        Self {
            response_id,
            buffer: String::new(),
        }
    }
}

impl FrameEncoder for DomainChatFrames {
    fn relay(&self) -> &'static str {
        "domain_chat"
    }

    fn encode_chunk(&mut self, chunk: StreamChunk) -> Option<String> {
        self.buffer.push_str(&chunk.delta_text);

        let (references, created_at) = if chunk.is_final {
            (
                Some(extract_references(&self.buffer)),
                Some(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)),
            )
        } else {
            (None, None)
        };

        Some(format_sse_json(&DomainChatChunk {
            response_id: self.response_id.clone(),
            chunk_index: chunk.sequence_index,
            content: chunk.delta_text,
            is_complete: chunk.is_final,
            references,
            created_at,
        }))
    }
}

/// Recommendations: raw progress text, then the validated object or a fixed error.
#[derive(Debug, Default)]
pub struct RecommendationFrames {
    buffer: String,
}

impl FrameEncoder for RecommendationFrames {
    fn relay(&self) -> &'static str {
        "recommendations"
    }

    fn encode_chunk(&mut self, chunk: StreamChunk) -> Option<String> {
        self.buffer.push_str(&chunk.delta_text);
        if !chunk.is_final {
            return Some(format_sse_data(&chunk.delta_text));
        }

        match parse_recommendation(&self.buffer) {
            Ok(recommendation) => Some(format_sse_json(&recommendation)),
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    output_len = self.buffer.len(),
                    "Streamed recommendation output rejected"
                );
                Some(format_sse_error(INVALID_RECOMMENDATIONS_MESSAGE))
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RelayPhase {
    Streaming,
    Finalizing,
    Done,
}

enum Pull {
    Item(Result<Fragment, UpstreamError>),
    Exhausted,
    Cancelled,
}

/// Wait for the next upstream item unless the client goes away first.
async fn pull_fragment(upstream: &mut FragmentStream, cancel: &StreamCancelHandle) -> Pull {
    if cancel.is_cancelled() {
        return Pull::Cancelled;
    }
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Pull::Cancelled,
        item = upstream.next() => match item {
            Some(item) => Pull::Item(item),
            None => Pull::Exhausted,
        },
    }
}

struct RelayState<E> {
    upstream: FragmentStream,
    encoder: E,
    cancel: StreamCancelHandle,
    phase: RelayPhase,
    next_index: u64,
    frames: u64,
    request_id: String,
    started: Instant,
}

impl<E: FrameEncoder> RelayState<E> {
    fn next_chunk(&mut self, delta_text: String, is_final: bool) -> StreamChunk {
        let chunk = StreamChunk {
            sequence_index: self.next_index,
            delta_text,
            is_final,
        };
        self.next_index += 1;
        chunk
    }

    fn frame(&mut self, frame: String) -> Result<Bytes, Infallible> {
        self.frames += 1;
        get_metrics()
            .stream_chunks
            .with_label_values(&[self.encoder.relay()])
            .inc();
        Ok(Bytes::from(frame))
    }
}

/// Drive `encoder` over `upstream`.
pub fn relay<E: FrameEncoder>(
    upstream: FragmentStream,
    encoder: E,
    cancel: StreamCancelHandle,
) -> FrameStream {
    let state = RelayState {
        upstream,
        encoder,
        cancel,
        phase: RelayPhase::Streaming,
        next_index: 1,
        frames: 0,
        request_id: get_request_id(),
        started: Instant::now(),
    };

    stream::unfold(state, |mut state| async move {
        loop {
            match state.phase {
                RelayPhase::Done => return None,
                RelayPhase::Finalizing => {
                    state.phase = RelayPhase::Done;
                    state.cancel.mark_completed();
                    tracing::debug!(
                        request_id = %state.request_id,
                        relay = state.encoder.relay(),
                        frames = state.frames + 1,
                        elapsed_ms = state.started.elapsed().as_millis() as u64,
                        "Stream relay finished"
                    );
                    let done = state.frame(format_sse_done());
                    return Some((done, state));
                }
                RelayPhase::Streaming => {}
            }

            match pull_fragment(&mut state.upstream, &state.cancel).await {
                Pull::Cancelled => {
                    tracing::info!(
                        request_id = %state.request_id,
                        relay = state.encoder.relay(),
                        frames = state.frames,
                        elapsed_ms = state.started.elapsed().as_millis() as u64,
                        "Client disconnected during streaming"
                    );
                    return None;
                }
                Pull::Item(Ok(fragment)) => {
                    let is_final = fragment.is_final();
                    // Role-only and keep-alive deltas carry no text, so they get no
                    // frame and do not advance `chunk_index`.
                    if fragment.delta.is_empty() && !is_final {
                        continue;
                    }
                    if is_final {
                        state.phase = RelayPhase::Finalizing;
                    }
                    let chunk = state.next_chunk(fragment.delta, is_final);
                    if let Some(frame) = state.encoder.encode_chunk(chunk) {
                        let frame = state.frame(frame);
                        return Some((frame, state));
                    }
                }
                Pull::Item(Err(error)) => {
                    tracing::warn!(
                        request_id = %state.request_id,
                        relay = state.encoder.relay(),
                        kind = %error.kind,
                        elapsed_ms = state.started.elapsed().as_millis() as u64,
                        error = %error,
                        "Upstream failure during streaming"
                    );
                    state.phase = RelayPhase::Finalizing;
                    let frame = state.encoder.encode_error(&error);
                    let frame = state.frame(frame);
                    return Some((frame, state));
                }
                Pull::Exhausted => {
                    // Upstream ended without a finish signal: close the stream as if
                    // an empty final fragment had arrived.
                    state.phase = RelayPhase::Finalizing;
                    let chunk = state.next_chunk(String::new(), true);
                    if let Some(frame) = state.encoder.encode_chunk(chunk) {
                        let frame = state.frame(frame);
                        return Some((frame, state));
                    }
                }
            }
        }
    })
    .boxed()
}

pub fn chat_relay(upstream: FragmentStream, cancel: StreamCancelHandle) -> FrameStream {
    relay(upstream, ChatFrames, cancel)
}

pub fn domain_chat_relay(
    upstream: FragmentStream,
    response_id: String,
    cancel: StreamCancelHandle,
) -> FrameStream {
    relay(upstream, DomainChatFrames::new(response_id), cancel)
}

pub fn recommendation_relay(upstream: FragmentStream, cancel: StreamCancelHandle) -> FrameStream {
    relay(upstream, RecommendationFrames::default(), cancel)
}

/// Upstream stream that fails immediately, for calls that never got a stream.
pub fn failed_upstream(error: UpstreamError) -> FragmentStream {
    stream::once(async move { Err(error) }).boxed()
}

/// Wrap relay frames into an SSE response whose body cancels the relay on drop.
pub fn sse_response(frames: FrameStream, cancel: StreamCancelHandle, endpoint: &'static str) -> Response {
    let body = DisconnectStream::new(frames, cancel, get_request_id(), endpoint);
    (
        [
            (header::CONTENT_TYPE, "text/event-stream"),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        Body::from_stream(body),
    )
        .into_response()
}
