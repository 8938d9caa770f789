use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};

use rehearse_core::error::ApiError;
use rehearse_core::scenario::Scenario;

use crate::auth::AuthenticatedUser;
use crate::error::AppError;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/scenarios", get(list_scenarios))
        .route("/v1/scenarios/{scenario_id}", get(get_scenario))
}

/// List all scenarios available for simulation, ordered by id
#[utoipa::path(
    get,
    path = "/v1/scenarios",
    responses(
        (status = 200, description = "All scenarios", body = Vec<Scenario>),
        (status = 401, description = "Unauthorized", body = ApiError)
    ),
    security(("bearer_auth" = [])),
    tag = "scenarios"
)]
pub async fn list_scenarios(
    State(state): State<AppState>,
    _auth: AuthenticatedUser,
) -> Json<Vec<Scenario>> {
    let scenarios = state
        .simulator
        .scenarios()
        .list()
        .iter()
        .map(|scenario| scenario.as_ref().clone())
        .collect();
    Json(scenarios)
}

/// Get a single scenario by id
#[utoipa::path(
    get,
    path = "/v1/scenarios/{scenario_id}",
    params(
        ("scenario_id" = i64, Path, description = "Scenario id")
    ),
    responses(
        (status = 200, description = "Scenario found", body = Scenario),
        (status = 401, description = "Unauthorized", body = ApiError),
        (status = 404, description = "Scenario not found", body = ApiError)
    ),
    security(("bearer_auth" = [])),
    tag = "scenarios"
)]
pub async fn get_scenario(
    State(state): State<AppState>,
    _auth: AuthenticatedUser,
    Path(scenario_id): Path<i64>,
) -> Result<Json<Scenario>, AppError> {
    let scenario = state.simulator.scenarios().get(scenario_id)?;
    Ok(Json(scenario.as_ref().clone()))
}
