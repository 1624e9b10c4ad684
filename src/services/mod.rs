//! Business logic services for the gateway.
//!
//! This module contains the upstream completion client, SSE framing, prompt
//! construction, answer post-processing and service-registry integration.

pub mod completion_client;
pub mod prompts;
pub mod recommendation;
pub mod references;
pub mod registry;
pub mod sse;

// Re-export commonly used types
pub use completion_client::{
    Completion, CompletionClient, CompletionRequest, CompletionResult, Fragment, FragmentStream,
};
pub use prompts::{build_chat_messages, build_chat_prompt, build_recommendation_prompt};
pub use recommendation::parse_recommendation;
pub use references::extract_references;
pub use registry::RegistryClient;
