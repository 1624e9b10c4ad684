//! Shared constants for structured API errors and upstream failure classes.

use std::fmt;

pub const ERROR_TYPE_API: &str = "api_error";
pub const ERROR_TYPE_TIMEOUT: &str = "timeout_error";
pub const ERROR_TYPE_INVALID_REQUEST: &str = "invalid_request_error";
pub const ERROR_TYPE_RATE_LIMIT: &str = "rate_limit_error";
pub const ERROR_TYPE_FORMAT: &str = "format_error";

pub const UPSTREAM_KIND_RATE_LIMITED: &str = "rate_limited";
pub const UPSTREAM_KIND_TIMEOUT: &str = "timeout";
pub const UPSTREAM_KIND_PROVIDER_ERROR: &str = "provider_error";
pub const UPSTREAM_KIND_UNKNOWN: &str = "unknown";

/// Message returned to callers when model output cannot be turned into a recommendation.
pub const INVALID_RECOMMENDATIONS_MESSAGE: &str = "invalid recommendations format";

/// Classification of a failed upstream completion call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamErrorKind {
    RateLimited,
    Timeout,
    ProviderError,
    Unknown,
}

impl UpstreamErrorKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RateLimited => UPSTREAM_KIND_RATE_LIMITED,
            Self::Timeout => UPSTREAM_KIND_TIMEOUT,
            Self::ProviderError => UPSTREAM_KIND_PROVIDER_ERROR,
            Self::Unknown => UPSTREAM_KIND_UNKNOWN,
        }
    }

    /// Whether the caller may reasonably retry. The gateway itself never does.
    pub const fn is_retryable(self) -> bool {
        matches!(self, Self::RateLimited | Self::Timeout)
    }

    /// Error `type` field used in JSON error bodies.
    pub const fn error_type(self) -> &'static str {
        match self {
            Self::RateLimited => ERROR_TYPE_RATE_LIMIT,
            Self::Timeout => ERROR_TYPE_TIMEOUT,
            Self::ProviderError | Self::Unknown => ERROR_TYPE_API,
        }
    }
}

impl fmt::Display for UpstreamErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
