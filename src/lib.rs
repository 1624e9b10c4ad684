//! Eyecare Gateway - an LLM gateway for ophthalmology medical records
//!
//! This library provides a stateless HTTP gateway in front of an OpenAI-compatible
//! chat-completion provider:
//!
//! - **Chat Relay**: Forward conversations, optionally streamed as Server-Sent Events
//! - **Domain Chat**: Build consultation prompts from structured examination records
//!   and scrape the references section out of the answer
//! - **Recommendations**: Ask for medications and a treatment plan and validate the
//!   JSON object embedded in the model output
//! - **Metrics & Monitoring**: Prometheus metrics and request-id correlated logs
//! - **Service Registry**: Optional Nacos registration with heartbeats
//!
//! # Architecture
//!
//! The codebase is organized into three main layers:
//!
//! - [`core`]: Core functionality (config, errors, logging, metrics, middleware, cancellation)
//! - [`services`]: Upstream client, SSE codec, prompts, answer post-processing, registry
//! - [`api`]: HTTP handlers, streaming relays, request/response models, router
//!
//! # Configuration
//!
//! The server requires the following environment variables:
//! - `API_KEY`: Upstream provider credential
//!
//! Optional environment variables:
//! - `BASE_URL`: Upstream base URL (default: https://api.openai.com/v1)
//! - `MODEL_ID`: Default model (default: gpt-3.5-turbo)
//! - `HOST`: Server bind address (default: 0.0.0.0)
//! - `PORT`: Server port (default: 8000)
//! - `VERIFY_SSL`: Verify SSL certificates for upstream (default: true)
//! - `REQUEST_TIMEOUT_SECS`: Upstream request timeout in seconds (default: 300)
//! - `NACOS_SERVER_ADDRESS` and friends: enable service registration

pub mod api;
pub mod core;
pub mod services;

// Re-export commonly used types for convenience
pub use api::{router, ApiDoc, AppState, ChatCompletionRequest, ChatCompletionResponse};
pub use core::{AppConfig, AppError, Result};
pub use services::CompletionClient;
