use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::feedback::Feedback;
use crate::transcript::Transcript;

/// A completed, scored simulation ready to be persisted. Written once, never updated.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSessionLog {
    pub user_id: Uuid,
    pub scenario_id: i64,
    pub transcript: Transcript,
    pub feedback: Feedback,
}

/// A non-fatal problem attached to an otherwise successful response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct ResponseWarning {
    /// Which part of the response the warning concerns
    pub field: String,
    pub message: String,
    /// Always "warning"
    pub severity: String,
}

impl ResponseWarning {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            severity: "warning".to_string(),
        }
    }
}
