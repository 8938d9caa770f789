use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use rehearse_core::error::ApiError;
use rehearse_core::feedback::Feedback;
use rehearse_core::session::ResponseWarning;
use rehearse_core::transcript::Transcript;

use crate::auth::AuthenticatedUser;
use crate::error::AppError;
use crate::extract::AppJson;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/simulation/respond", post(respond))
        .route("/v1/simulation/analyze", post(analyze))
}

/// A transcript to continue or score, tied to a scenario.
#[derive(Debug, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SimulationRequest {
    /// Conversation so far, oldest line first
    #[serde(alias = "conversation")]
    pub transcript: Transcript,
    #[serde(alias = "scenario_id")]
    pub scenario_id: i64,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RespondResponse {
    /// Next line from the simulated customer
    pub ai_response: String,
}

/// Feedback plus non-fatal warnings (omitted when empty).
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct AnalyzeResponse {
    #[serde(flatten)]
    pub feedback: Feedback,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<ResponseWarning>,
}

/// Generate the simulated customer's next turn
///
/// Text-generation failures never break a live conversation: the customer answers
/// with a short "technical difficulties" line instead.
#[utoipa::path(
    post,
    path = "/v1/simulation/respond",
    request_body = SimulationRequest,
    responses(
        (status = 200, description = "Customer turn (or fallback line)", body = RespondResponse),
        (status = 400, description = "Invalid transcript", body = ApiError),
        (status = 401, description = "Unauthorized", body = ApiError),
        (status = 404, description = "Scenario not found", body = ApiError)
    ),
    security(("bearer_auth" = [])),
    tag = "simulation"
)]
pub async fn respond(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    AppJson(req): AppJson<SimulationRequest>,
) -> Result<Json<RespondResponse>, AppError> {
    tracing::debug!(
        user_id = %auth.user_id,
        scenario_id = req.scenario_id,
        lines = req.transcript.len(),
        "respond requested"
    );
    let ai_response = state
        .simulator
        .respond(req.scenario_id, &req.transcript)
        .await?;
    Ok(Json(RespondResponse { ai_response }))
}

/// Score the user's performance and log the session
///
/// Only the user's lines are evaluated. The session is logged once; if logging
/// fails the feedback is still returned with a `warnings` entry.
#[utoipa::path(
    post,
    path = "/v1/simulation/analyze",
    request_body = SimulationRequest,
    responses(
        (status = 200, description = "Structured feedback", body = AnalyzeResponse),
        (status = 400, description = "Invalid transcript", body = ApiError),
        (status = 401, description = "Unauthorized", body = ApiError),
        (status = 404, description = "Scenario not found", body = ApiError),
        (status = 502, description = "Text generation failed or returned malformed feedback", body = ApiError)
    ),
    security(("bearer_auth" = [])),
    tag = "simulation"
)]
pub async fn analyze(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    AppJson(req): AppJson<SimulationRequest>,
) -> Result<Json<AnalyzeResponse>, AppError> {
    let outcome = state
        .simulator
        .analyze(auth.user_id, req.scenario_id, req.transcript)
        .await?;
    tracing::debug!(
        user_id = %auth.user_id,
        log_id = ?outcome.log_id,
        warnings = outcome.warnings.len(),
        "analysis complete"
    );
    Ok(Json(AnalyzeResponse {
        feedback: outcome.feedback,
        warnings: outcome.warnings,
    }))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::Extension;
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode};
    use rehearse_core::error::UpstreamError;
    use serde_json::{Value, json};
    use tower::ServiceExt;
    use uuid::Uuid;

    use super::*;
    use crate::gateway::FALLBACK_RESPONSE;
    use crate::gateway::testing::ScriptedGenerator;
    use crate::session_log::testing::MemorySessionLogWriter;
    use crate::simulation::testing::simulator;

    fn app(generator: Arc<ScriptedGenerator>, logs: Arc<MemorySessionLogWriter>) -> Router {
        let state = AppState {
            db: sqlx::postgres::PgPoolOptions::new()
                .connect_lazy("postgres://localhost/unused")
                .unwrap(),
            simulator: Arc::new(simulator(generator, logs)),
        };
        router()
            .layer(Extension(AuthenticatedUser {
                user_id: Uuid::now_v7(),
            }))
            .with_state(state)
    }

    async fn post(app: Router, path: &str, body: Value) -> (StatusCode, Value) {
        let response = app
            .oneshot(
                Request::post(path)
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn request(scenario_id: i64) -> Value {
        json!({
            "scenarioId": scenario_id,
            "transcript": [
                {"speaker": "AI", "text": "Hello?"},
                {"speaker": "User", "text": "Hi, is this a good time to talk about a demo?"}
            ]
        })
    }

    #[tokio::test]
    async fn respond_timeout_returns_fallback_with_200() {
        let generator = Arc::new(ScriptedGenerator::failing(UpstreamError::Timeout {
            after_ms: 30_000,
        }));
        let app = app(generator, Arc::new(MemorySessionLogWriter::default()));

        let (status, body) = post(app, "/v1/simulation/respond", request(1)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "aiResponse": FALLBACK_RESPONSE }));
    }

    #[tokio::test]
    async fn analyze_timeout_is_bad_gateway_and_unlogged() {
        let generator = Arc::new(ScriptedGenerator::failing(UpstreamError::Timeout {
            after_ms: 30_000,
        }));
        let logs = Arc::new(MemorySessionLogWriter::default());
        let app = app(generator, logs.clone());

        let (status, body) = post(app, "/v1/simulation/analyze", request(1)).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["error"], "upstream_timeout");
        assert!(logs.logs().is_empty());
    }

    #[tokio::test]
    async fn unknown_scenario_is_404_on_both_paths() {
        let generator = Arc::new(ScriptedGenerator::replying("unused"));
        for path in ["/v1/simulation/respond", "/v1/simulation/analyze"] {
            let app = app(generator.clone(), Arc::new(MemorySessionLogWriter::default()));
            let (status, body) = post(app, path, request(999)).await;
            assert_eq!(status, StatusCode::NOT_FOUND);
            assert_eq!(body["error"], "not_found");
        }
        assert_eq!(generator.calls(), 0);
    }

    #[tokio::test]
    async fn analyze_returns_exact_feedback_shape() {
        let generator = Arc::new(ScriptedGenerator::replying(
            r#"{"goalAchieved": false, "keywordsUsed": ["demo", "synergy"], "scores": {"clarity": 7}, "assessment": "Ask for the meeting."}"#,
        ));
        let app = app(generator, Arc::new(MemorySessionLogWriter::default()));

        let (status, body) = post(app, "/v1/simulation/analyze", request(1)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!({
                "goalAchieved": false,
                "keywordsUsed": ["demo"],
                "scores": {"clarity": 7},
                "assessment": "Ask for the meeting."
            })
        );
    }

    #[tokio::test]
    async fn analyze_reports_log_failure_as_warning() {
        let generator = Arc::new(ScriptedGenerator::replying(
            r#"{"goalAchieved": true, "keywordsUsed": [], "scores": {}, "assessment": "ok"}"#,
        ));
        let app = app(generator, Arc::new(MemorySessionLogWriter::failing()));

        let (status, body) = post(app, "/v1/simulation/analyze", request(1)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["goalAchieved"], true);
        assert_eq!(body["warnings"][0]["field"], "sessionLog");
    }

    #[tokio::test]
    async fn legacy_field_names_are_accepted() {
        let generator = Arc::new(ScriptedGenerator::replying("Go on."));
        let app = app(generator, Arc::new(MemorySessionLogWriter::default()));

        let body = json!({
            "scenario_id": 2,
            "conversation": [{"speaker": "User", "text": "Hello Marcus."}]
        });
        let (status, body) = post(app, "/v1/simulation/respond", body).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["aiResponse"], "Go on.");
    }

    #[tokio::test]
    async fn unknown_speaker_is_a_validation_error() {
        let generator = Arc::new(ScriptedGenerator::replying("unused"));
        let app = app(generator.clone(), Arc::new(MemorySessionLogWriter::default()));

        let body = json!({
            "scenarioId": 1,
            "transcript": [{"speaker": "Customer", "text": "Hi"}]
        });
        let (status, body) = post(app, "/v1/simulation/respond", body).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "validation_failed");
        assert_eq!(generator.calls(), 0);
    }
}
