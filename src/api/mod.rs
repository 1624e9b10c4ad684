//! API layer for the gateway.
//!
//! This module contains the HTTP handlers, request/response models, SSE relays
//! and the router that wires them together.

pub mod disconnect;
pub mod handlers;
pub mod models;
pub mod streaming;

use crate::core::{request_id_middleware, MetricsMiddleware};
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

// Re-export commonly used types
pub use handlers::{
    chat_completions, domain_chat, domain_recommendations, health, metrics_handler, AppState,
};
pub use models::{
    ChatCompletionRequest, ChatCompletionResponse, DomainChatRequest, DomainChatResponse,
    HealthResponse, Recommendation, RecommendationRequest,
};
pub use streaming::{sse_response, StreamChunk};

/// OpenAPI documentation for the public endpoints
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::chat_completions,
        handlers::domain_chat,
        handlers::domain_recommendations,
        handlers::health,
    ),
    components(
        schemas(
            models::Role,
            models::Message,
            models::ChatCompletionRequest,
            models::ChatCompletionResponse,
            models::TokenUsage,
            models::TreatmentPlanInput,
            models::MedicationInput,
            models::PriorTurn,
            models::DomainChatRequest,
            models::DomainChatResponse,
            models::DomainChatChunk,
            models::Citation,
            models::PatientInfo,
            models::RecommendationRequest,
            models::Medication,
            models::TreatmentPlan,
            models::Recommendation,
            models::ApiErrorResponse,
            models::ApiErrorDetail,
            models::HealthResponse,
        )
    ),
    tags(
        (name = "chat", description = "Plain chat completion relay"),
        (name = "eye-doctor", description = "Ophthalmology record consultation and recommendations"),
        (name = "health", description = "Liveness")
    ),
    info(
        title = "Eyecare Gateway API",
        description = "LLM gateway for ophthalmology medical-record consultation"
    )
)]
pub struct ApiDoc;

/// Build the application router with every route and middleware layer.
pub fn router(state: Arc<AppState>) -> Router {
    let api_routes = Router::new()
        .route("/chat/completions", post(chat_completions))
        .route("/api/chat/completions", post(chat_completions))
        .route("/domain-chat", post(domain_chat))
        .route("/api/eye-doctor/chat", post(domain_chat))
        .route("/domain-recommendations", post(domain_recommendations))
        .route("/api/eye-doctor/recommendations", post(domain_recommendations))
        .layer(axum::middleware::from_fn(MetricsMiddleware::track_metrics))
        .with_state(state);

    let swagger_ui = SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi());

    Router::new()
        .merge(swagger_ui)
        .merge(api_routes)
        .route("/health", get(health))
        .route("/metrics", get(metrics_handler))
        .layer(axum::middleware::from_fn(request_id_middleware))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_lists_public_paths() {
        let doc = ApiDoc::openapi();
        for path in ["/chat/completions", "/domain-chat", "/domain-recommendations", "/health"] {
            assert!(doc.paths.paths.contains_key(path), "missing {}", path);
        }
    }
}
