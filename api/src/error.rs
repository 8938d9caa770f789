use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use rehearse_core::error::{self, ApiError, SimulationError};

/// Internal error type that converts to structured API responses
#[derive(Debug)]
pub enum AppError {
    /// Validation error (400)
    Validation {
        message: String,
        field: Option<String>,
        received: Option<serde_json::Value>,
        docs_hint: Option<String>,
    },
    /// Resource not found (404)
    NotFound { resource: String },
    /// Missing or invalid credentials (401)
    Unauthorized {
        message: String,
        docs_hint: Option<String>,
    },
    /// Text generation failed during analysis (502)
    Upstream { code: &'static str, message: String },
    /// Text generation violated the feedback contract (502)
    MalformedFeedback {
        message: String,
        field: Option<String>,
    },
    /// Database error (500)
    Database(sqlx::Error),
    /// Internal error (500)
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let request_id = uuid::Uuid::now_v7().to_string();

        let (status, api_error) = match self {
            AppError::Validation {
                message,
                field,
                received,
                docs_hint,
            } => (
                StatusCode::BAD_REQUEST,
                ApiError {
                    error: error::codes::VALIDATION_FAILED.to_string(),
                    message,
                    field,
                    received,
                    request_id,
                    docs_hint,
                },
            ),
            AppError::NotFound { resource } => (
                StatusCode::NOT_FOUND,
                ApiError {
                    error: error::codes::NOT_FOUND.to_string(),
                    message: format!("{resource} not found"),
                    field: None,
                    received: None,
                    request_id,
                    docs_hint: Some("List available scenarios with GET /v1/scenarios.".to_string()),
                },
            ),
            AppError::Unauthorized { message, docs_hint } => (
                StatusCode::UNAUTHORIZED,
                ApiError {
                    error: error::codes::UNAUTHORIZED.to_string(),
                    message,
                    field: None,
                    received: None,
                    request_id,
                    docs_hint,
                },
            ),
            AppError::Upstream { code, message } => {
                tracing::warn!(code, "Upstream error surfaced to client: {}", message);
                (
                    StatusCode::BAD_GATEWAY,
                    ApiError {
                        error: code.to_string(),
                        message,
                        field: None,
                        received: None,
                        request_id,
                        docs_hint: Some(
                            "The text-generation service failed. The request can be retried as-is."
                                .to_string(),
                        ),
                    },
                )
            }
            AppError::MalformedFeedback { message, field } => {
                tracing::warn!(
                    field = ?field,
                    "Malformed feedback surfaced to client: {}",
                    message
                );
                (
                    StatusCode::BAD_GATEWAY,
                    ApiError {
                        error: error::codes::MALFORMED_FEEDBACK.to_string(),
                        message,
                        field,
                        received: None,
                        request_id,
                        docs_hint: Some(
                            "The analysis output did not match the feedback schema. Retry the request."
                                .to_string(),
                        ),
                    },
                )
            }
            AppError::Database(err) => {
                tracing::error!("Database error: {:?}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ApiError {
                        error: error::codes::INTERNAL_ERROR.to_string(),
                        message: "An internal error occurred".to_string(),
                        field: None,
                        received: None,
                        request_id,
                        docs_hint: None,
                    },
                )
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ApiError {
                        error: error::codes::INTERNAL_ERROR.to_string(),
                        message: "An internal error occurred".to_string(),
                        field: None,
                        received: None,
                        request_id,
                        docs_hint: None,
                    },
                )
            }
        };

        (status, Json(api_error)).into_response()
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Database(err)
    }
}

impl From<SimulationError> for AppError {
    fn from(err: SimulationError) -> Self {
        match err {
            SimulationError::NotFound { scenario_id } => AppError::NotFound {
                resource: format!("scenario {scenario_id}"),
            },
            SimulationError::Upstream(upstream) => AppError::Upstream {
                code: upstream.code(),
                message: upstream.to_string(),
            },
            SimulationError::MalformedFeedback(feedback) => AppError::MalformedFeedback {
                field: feedback.key(),
                message: feedback.to_string(),
            },
        }
    }
}
