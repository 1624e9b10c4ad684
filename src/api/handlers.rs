//! HTTP request handlers for the gateway API.
//!
//! This module contains the plain chat proxy, the two medical-record endpoints,
//! health checks and metrics.

use crate::api::models::*;
use crate::api::streaming::{
    chat_relay, domain_chat_relay, failed_upstream, recommendation_relay, sse_response,
};
use crate::core::error::UpstreamError;
use crate::core::logging::{generate_request_id, get_request_id};
use crate::core::{AppError, Result, StreamCancelHandle};
use crate::services::completion_client::{CompletionClient, CompletionRequest, FragmentStream};
use crate::services::prompts::{build_chat_messages, build_recommendation_messages};
use crate::services::recommendation::parse_recommendation;
use crate::services::references::extract_references;
use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{SecondsFormat, Utc};
use prometheus::{Encoder, TextEncoder};
use std::sync::Arc;
use std::time::Instant;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub client: CompletionClient,
}

impl AppState {
    pub fn new(client: CompletionClient) -> Arc<Self> {
        Arc::new(Self { client })
    }
}

/// Unwrap a JSON body, turning extractor rejections into validation errors.
fn json_body<T>(payload: std::result::Result<Json<T>, JsonRejection>) -> Result<T> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| AppError::BadRequest(rejection.body_text()))
}

/// Log an upstream failure with the endpoint and elapsed time, then wrap it.
fn upstream_failure(endpoint: &'static str, started: Instant, error: UpstreamError) -> AppError {
    tracing::error!(
        request_id = %get_request_id(),
        endpoint = endpoint,
        kind = %error.kind,
        elapsed_ms = started.elapsed().as_millis() as u64,
        error = %error,
        "Request failed upstream"
    );
    AppError::Upstream(error)
}

/// Open an upstream stream; a failed call becomes a stream that yields the error
/// so the client still gets an error frame and the terminator.
async fn open_stream(
    client: &CompletionClient,
    request: CompletionRequest,
    endpoint: &'static str,
    started: Instant,
) -> FragmentStream {
    match client.complete_stream(request).await {
        Ok(fragments) => fragments,
        Err(error) => {
            tracing::error!(
                request_id = %get_request_id(),
                endpoint = endpoint,
                kind = %error.kind,
                elapsed_ms = started.elapsed().as_millis() as u64,
                error = %error,
                "Stream could not be opened"
            );
            failed_upstream(error)
        }
    }
}

/// Relay a chat conversation to the upstream provider.
///
/// Streams bare text deltas as SSE when `stream` is true.
#[utoipa::path(
    post,
    path = "/chat/completions",
    tag = "chat",
    request_body = ChatCompletionRequest,
    responses(
        (status = 200, description = "Assistant message, or an SSE stream of text deltas", body = ChatCompletionResponse),
        (status = 400, description = "Invalid request", body = ApiErrorResponse),
        (status = 502, description = "Upstream provider error", body = ApiErrorResponse),
        (status = 503, description = "Upstream rate limited", body = ApiErrorResponse),
        (status = 504, description = "Upstream timeout", body = ApiErrorResponse)
    )
)]
pub async fn chat_completions(
    State(state): State<Arc<AppState>>,
    payload: std::result::Result<Json<ChatCompletionRequest>, JsonRejection>,
) -> Result<Response> {
    const ENDPOINT: &str = "/chat/completions";
    let started = Instant::now();
    let payload = json_body(payload)?;
    payload.validate()?;

    let is_stream = payload.is_stream();
    tracing::debug!(
        request_id = %get_request_id(),
        messages = payload.messages.len(),
        stream = is_stream,
        "Processing chat completion request"
    );

    let request = CompletionRequest {
        messages: payload.messages,
        model: payload.model,
        temperature: payload.temperature.unwrap_or(DEFAULT_TEMPERATURE) as f32,
        max_tokens: payload.max_tokens,
        stream: is_stream,
    };

    if is_stream {
        let cancel = StreamCancelHandle::new();
        let upstream = open_stream(&state.client, request, ENDPOINT, started).await;
        return Ok(sse_response(chat_relay(upstream, cancel.clone()), cancel, ENDPOINT));
    }

    let completion = state
        .client
        .complete_message(request)
        .await
        .map_err(|e| upstream_failure(ENDPOINT, started, e))?;

    Ok(Json(ChatCompletionResponse {
        message: completion.message,
        usage: completion.usage,
    })
    .into_response())
}

/// Answer a patient's question about their examination record.
///
/// Non-streaming responses carry the full answer and the references scraped
/// from it; streaming responses emit one JSON event per delta.
#[utoipa::path(
    post,
    path = "/domain-chat",
    tag = "eye-doctor",
    request_body = DomainChatRequest,
    responses(
        (status = 200, description = "Answer, or an SSE stream of DomainChatChunk events", body = DomainChatResponse),
        (status = 400, description = "Invalid request", body = ApiErrorResponse),
        (status = 502, description = "Upstream provider error", body = ApiErrorResponse),
        (status = 503, description = "Upstream rate limited", body = ApiErrorResponse),
        (status = 504, description = "Upstream timeout", body = ApiErrorResponse)
    )
)]
pub async fn domain_chat(
    State(state): State<Arc<AppState>>,
    payload: std::result::Result<Json<DomainChatRequest>, JsonRejection>,
) -> Result<Response> {
    const ENDPOINT: &str = "/domain-chat";
    let started = Instant::now();
    let payload = json_body(payload)?;
    payload.validate()?;

    let is_stream = payload.is_stream();
    let response_id = generate_request_id();
    tracing::debug!(
        request_id = %get_request_id(),
        response_id = %response_id,
        disease = %payload.disease_name,
        stream = is_stream,
        "Processing domain chat request"
    );

    let request = CompletionRequest {
        messages: build_chat_messages(&payload),
        model: payload.model.clone(),
        temperature: payload.temperature.unwrap_or(DEFAULT_TEMPERATURE) as f32,
        max_tokens: payload.max_tokens,
        stream: is_stream,
    };

    if is_stream {
        let cancel = StreamCancelHandle::new();
        let upstream = open_stream(&state.client, request, ENDPOINT, started).await;
        return Ok(sse_response(
            domain_chat_relay(upstream, response_id, cancel.clone()),
            cancel,
            ENDPOINT,
        ));
    }

    let completion = state
        .client
        .complete_message(request)
        .await
        .map_err(|e| upstream_failure(ENDPOINT, started, e))?;
    let content = completion.message.content;
    let references = extract_references(&content);

    Ok(Json(DomainChatResponse {
        response_id,
        content,
        references,
        created_at: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
    })
    .into_response())
}

/// Suggest medications and a treatment plan for a diagnosis.
///
/// The model's answer must decode into a [`Recommendation`]; anything else is
/// reported as `invalid recommendations format`.
#[utoipa::path(
    post,
    path = "/domain-recommendations",
    tag = "eye-doctor",
    request_body = RecommendationRequest,
    responses(
        (status = 200, description = "Validated recommendation, or an SSE stream ending with it", body = Recommendation),
        (status = 400, description = "Invalid request", body = ApiErrorResponse),
        (status = 500, description = "Model output could not be parsed", body = ApiErrorResponse),
        (status = 502, description = "Upstream provider error", body = ApiErrorResponse),
        (status = 503, description = "Upstream rate limited", body = ApiErrorResponse),
        (status = 504, description = "Upstream timeout", body = ApiErrorResponse)
    )
)]
pub async fn domain_recommendations(
    State(state): State<Arc<AppState>>,
    payload: std::result::Result<Json<RecommendationRequest>, JsonRejection>,
) -> Result<Response> {
    const ENDPOINT: &str = "/domain-recommendations";
    let started = Instant::now();
    let payload = json_body(payload)?;
    payload.validate()?;

    let is_stream = payload.is_stream();
    tracing::debug!(
        request_id = %get_request_id(),
        disease = %payload.disease_name,
        stream = is_stream,
        "Processing recommendation request"
    );

    let request = CompletionRequest {
        messages: build_recommendation_messages(&payload),
        model: payload.model.clone(),
        temperature: payload.temperature.unwrap_or(DEFAULT_TEMPERATURE) as f32,
        max_tokens: payload.max_tokens,
        stream: is_stream,
    };

    if is_stream {
        let cancel = StreamCancelHandle::new();
        let upstream = open_stream(&state.client, request, ENDPOINT, started).await;
        return Ok(sse_response(
            recommendation_relay(upstream, cancel.clone()),
            cancel,
            ENDPOINT,
        ));
    }

    let completion = state
        .client
        .complete_message(request)
        .await
        .map_err(|e| upstream_failure(ENDPOINT, started, e))?;
    let recommendation = parse_recommendation(&completion.message.content).map_err(|e| {
        tracing::warn!(
            request_id = %get_request_id(),
            endpoint = ENDPOINT,
            elapsed_ms = started.elapsed().as_millis() as u64,
            error = %e,
            "Model output is not a valid recommendation"
        );
        AppError::Format(e)
    })?;

    Ok(Json(recommendation).into_response())
}

/// Basic health check endpoint.
#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses(
        (status = 200, description = "Service is alive", body = HealthResponse)
    )
)]
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

/// Prometheus metrics endpoint.
#[tracing::instrument]
pub async fn metrics_handler() -> Result<Response> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| AppError::Internal(e.to_string()))?;

    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, encoder.format_type().to_string())],
        buffer,
    )
        .into_response())
}
