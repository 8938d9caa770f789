use serde::Serialize;
use utoipa::ToSchema;

use crate::feedback::FeedbackError;

/// Structured error response.
/// Every error carries a machine-readable code plus enough context for a client
/// to decide whether to fix the request or retry it later.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ApiError {
    /// Machine-readable error code (e.g. "validation_failed", "not_found", "upstream_timeout")
    pub error: String,
    /// Human-readable description of what went wrong
    pub message: String,
    /// Which field caused the error (if applicable)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    /// The value that was received (if applicable)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub received: Option<serde_json::Value>,
    /// Request ID for tracing and debugging
    pub request_id: String,
    /// Hint about what the correct usage looks like
    #[serde(skip_serializing_if = "Option::is_none")]
    pub docs_hint: Option<String>,
}

/// Error codes used across the API
pub mod codes {
    pub const VALIDATION_FAILED: &str = "validation_failed";
    pub const NOT_FOUND: &str = "not_found";
    pub const UNAUTHORIZED: &str = "unauthorized";
    pub const UPSTREAM_UNAVAILABLE: &str = "upstream_unavailable";
    pub const UPSTREAM_TIMEOUT: &str = "upstream_timeout";
    pub const UPSTREAM_EMPTY_RESPONSE: &str = "upstream_empty_response";
    pub const MALFORMED_FEEDBACK: &str = "malformed_feedback";
    pub const RATE_LIMITED: &str = "rate_limited";
    pub const INTERNAL_ERROR: &str = "internal_error";
}

/// Failure of the external text-generation capability.
///
/// All variants are transient from the caller's point of view. Respond-mode calls
/// replace them with a fallback line; analyze-mode calls surface them.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UpstreamError {
    #[error("text generation unavailable: {0}")]
    Unavailable(String),

    #[error("text generation timed out after {after_ms}ms")]
    Timeout { after_ms: u64 },

    #[error("text generation returned no content")]
    EmptyResponse,
}

impl UpstreamError {
    pub fn code(&self) -> &'static str {
        match self {
            UpstreamError::Unavailable(_) => codes::UPSTREAM_UNAVAILABLE,
            UpstreamError::Timeout { .. } => codes::UPSTREAM_TIMEOUT,
            UpstreamError::EmptyResponse => codes::UPSTREAM_EMPTY_RESPONSE,
        }
    }
}

/// A session log could not be written.
#[derive(Debug, thiserror::Error)]
#[error("session log not persisted: {0}")]
pub struct PersistenceError(pub String);

/// Errors the simulation pipeline reports to its caller.
#[derive(Debug, thiserror::Error)]
pub enum SimulationError {
    #[error("scenario {scenario_id} not found")]
    NotFound { scenario_id: i64 },

    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    #[error("malformed feedback: {0}")]
    MalformedFeedback(#[from] FeedbackError),
}
