//! Error types and handling for the gateway.
//!
//! [`AppError`] is the handler-facing error and converts into an HTTP response.
//! [`UpstreamError`] and [`FormatError`] are raised by the completion client and
//! the recommendation parser respectively and are wrapped by `AppError` at the
//! handler boundary.

use crate::core::error_types::{
    UpstreamErrorKind, ERROR_TYPE_API, ERROR_TYPE_FORMAT, ERROR_TYPE_INVALID_REQUEST,
    INVALID_RECOMMENDATIONS_MESSAGE,
};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Failure of a single upstream completion call.
///
/// The `Display` output is safe to show to clients.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct UpstreamError {
    pub kind: UpstreamErrorKind,
    pub message: String,
}

impl UpstreamError {
    pub fn rate_limited() -> Self {
        Self {
            kind: UpstreamErrorKind::RateLimited,
            message: "Rate limit exceeded, please try again later".to_string(),
        }
    }

    pub fn timeout() -> Self {
        Self {
            kind: UpstreamErrorKind::Timeout,
            message: "Request timed out, please try again".to_string(),
        }
    }

    pub fn provider(detail: impl AsRef<str>) -> Self {
        Self {
            kind: UpstreamErrorKind::ProviderError,
            message: format!("API error: {}", detail.as_ref()),
        }
    }

    pub fn unknown(detail: impl AsRef<str>) -> Self {
        Self {
            kind: UpstreamErrorKind::Unknown,
            message: format!("Error processing request: {}", detail.as_ref()),
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }

    fn status(&self) -> StatusCode {
        match self.kind {
            UpstreamErrorKind::RateLimited => StatusCode::SERVICE_UNAVAILABLE,
            UpstreamErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
            UpstreamErrorKind::ProviderError => StatusCode::BAD_GATEWAY,
            UpstreamErrorKind::Unknown => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Model output that could not be decoded into a recommendation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FormatError {
    #[error("invalid JSON: {0}")]
    InvalidJson(String),

    #[error("expected a JSON object")]
    NotAnObject,

    #[error("missing field: {0}")]
    MissingField(&'static str),

    #[error("field {field} must be {expected}")]
    WrongType {
        field: &'static str,
        expected: &'static str,
    },

    #[error("medication {index} is missing fields: {}", .fields.join(", "))]
    MissingMedicationFields { index: usize, fields: Vec<&'static str> },

    #[error("treatment_plan is missing fields: {}", .0.join(", "))]
    MissingTreatmentPlanFields(Vec<&'static str>),

    #[error("invalid field value: {0}")]
    InvalidValue(String),
}

/// Main error type for request handlers.
#[derive(Error, Debug)]
pub enum AppError {
    /// Malformed inbound request, rejected before any upstream call
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Upstream completion call failed
    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    /// Model output failed recommendation parsing
    #[error("Format error: {0}")]
    Format(#[from] FormatError),

    /// Generic internal server errors with custom message
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_type, error_message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, ERROR_TYPE_INVALID_REQUEST, msg),
            AppError::Upstream(e) => (e.status(), e.kind.error_type(), e.message),
            // Parser detail is logged by the handler and never returned.
            AppError::Format(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ERROR_TYPE_FORMAT,
                INVALID_RECOMMENDATIONS_MESSAGE.to_string(),
            ),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, ERROR_TYPE_API, msg),
        };

        let body = Json(json!({
            "error": {
                "message": error_message,
                "type": error_type,
                "code": status.as_u16()
            }
        }));

        (status, body).into_response()
    }
}

/// Convenience type alias for Results using [`AppError`].
pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_error_display() {
        let err = AppError::BadRequest("temperature out of range".to_string());
        assert_eq!(err.to_string(), "Bad request: temperature out of range");

        let err = AppError::Internal("test error".to_string());
        assert_eq!(err.to_string(), "Internal server error: test error");

        let err = AppError::Upstream(UpstreamError::timeout());
        assert_eq!(err.to_string(), "Request timed out, please try again");
    }

    #[test]
    fn test_upstream_error_messages() {
        assert_eq!(
            UpstreamError::rate_limited().to_string(),
            "Rate limit exceeded, please try again later"
        );
        assert_eq!(
            UpstreamError::provider("HTTP 500").to_string(),
            "API error: HTTP 500"
        );
        assert_eq!(
            UpstreamError::unknown("boom").to_string(),
            "Error processing request: boom"
        );
    }

    #[test]
    fn test_bad_request_response() {
        let response = AppError::BadRequest("x".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_upstream_status_mapping() {
        let cases = [
            (UpstreamError::rate_limited(), StatusCode::SERVICE_UNAVAILABLE),
            (UpstreamError::timeout(), StatusCode::GATEWAY_TIMEOUT),
            (UpstreamError::provider("x"), StatusCode::BAD_GATEWAY),
            (UpstreamError::unknown("x"), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            let response = AppError::Upstream(err).into_response();
            assert_eq!(response.status(), status);
            assert!(response.status().is_server_error());
        }
    }

    #[tokio::test]
    async fn test_format_error_hides_detail() {
        let err = AppError::Format(FormatError::MissingField("treatment_plan"));
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = body_json(response).await;
        assert_eq!(body["error"]["message"], "invalid recommendations format");
        assert_eq!(body["error"]["type"], "format_error");
    }

    #[tokio::test]
    async fn test_upstream_error_body_carries_reason() {
        let response = AppError::Upstream(UpstreamError::rate_limited()).into_response();
        let body = body_json(response).await;
        assert_eq!(
            body["error"]["message"],
            "Rate limit exceeded, please try again later"
        );
        assert_eq!(body["error"]["type"], "rate_limit_error");
        assert_eq!(body["error"]["code"], 503);
    }

    #[test]
    fn test_format_error_display_lists_fields() {
        let err = FormatError::MissingMedicationFields {
            index: 0,
            fields: vec!["dosage", "frequency"],
        };
        assert_eq!(
            err.to_string(),
            "medication 0 is missing fields: dosage, frequency"
        );

        let err = FormatError::MissingTreatmentPlanFields(vec!["treatment_type"]);
        assert_eq!(
            err.to_string(),
            "treatment_plan is missing fields: treatment_type"
        );
    }

    #[test]
    fn test_error_from_upstream() {
        let app_err: AppError = UpstreamError::timeout().into();
        assert!(matches!(app_err, AppError::Upstream(_)));
    }
}
