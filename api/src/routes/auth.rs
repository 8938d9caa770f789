use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use rehearse_core::auth;

use crate::error::AppError;
use crate::extract::AppJson;
use crate::state::AppState;

const ACCESS_TOKEN_TTL_HOURS: i64 = 24;

pub fn register_router() -> Router<AppState> {
    Router::new().route("/v1/auth/register", post(register))
}

pub fn token_router() -> Router<AppState> {
    Router::new().route("/v1/auth/token", post(token))
}

// ──────────────────────────────────────────────
// POST /v1/auth/register
// ──────────────────────────────────────────────

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RegisterResponse {
    pub user_id: Uuid,
    pub username: String,
}

#[utoipa::path(
    post,
    path = "/v1/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "User registered", body = RegisterResponse),
        (status = 400, description = "Validation error or username taken", body = rehearse_core::error::ApiError)
    ),
    tag = "auth"
)]
pub async fn register(
    State(state): State<AppState>,
    AppJson(req): AppJson<RegisterRequest>,
) -> Result<impl IntoResponse, AppError> {
    let username = req.username.trim().to_string();
    validate_registration(&username, &req.password)?;

    let password_hash = auth::hash_password(&req.password).map_err(AppError::Internal)?;
    let user_id = Uuid::now_v7();

    sqlx::query("INSERT INTO users (id, username, password_hash) VALUES ($1, $2, $3)")
        .bind(user_id)
        .bind(&username)
        .bind(&password_hash)
        .execute(&state.db)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e {
                if db_err.code().as_deref() == Some("23505") {
                    return AppError::Validation {
                        message: format!("Username '{username}' is already registered"),
                        field: Some("username".to_string()),
                        received: Some(serde_json::Value::String(username.clone())),
                        docs_hint: Some("Choose a different username.".to_string()),
                    };
                }
            }
            AppError::Database(e)
        })?;

    tracing::info!(user_id = %user_id, "user registered");

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse { user_id, username }),
    ))
}

fn validate_registration(username: &str, password: &str) -> Result<(), AppError> {
    let length = username.chars().count();
    if !(3..=64).contains(&length) {
        return Err(AppError::Validation {
            message: "username must be between 3 and 64 characters".to_string(),
            field: Some("username".to_string()),
            received: Some(serde_json::Value::String(username.to_string())),
            docs_hint: None,
        });
    }
    if password.len() < 8 {
        return Err(AppError::Validation {
            message: "password must be at least 8 characters".to_string(),
            field: Some("password".to_string()),
            received: None,
            docs_hint: None,
        });
    }
    Ok(())
}

// ──────────────────────────────────────────────
// POST /v1/auth/token
// ──────────────────────────────────────────────

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct TokenRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    /// Seconds until the token expires
    pub expires_in: i64,
}

#[utoipa::path(
    post,
    path = "/v1/auth/token",
    request_body = TokenRequest,
    responses(
        (status = 200, description = "Access token issued", body = TokenResponse),
        (status = 400, description = "Invalid request", body = rehearse_core::error::ApiError),
        (status = 401, description = "Incorrect username or password", body = rehearse_core::error::ApiError)
    ),
    tag = "auth"
)]
pub async fn token(
    State(state): State<AppState>,
    AppJson(req): AppJson<TokenRequest>,
) -> Result<Json<TokenResponse>, AppError> {
    let invalid_credentials = || AppError::Unauthorized {
        message: "Incorrect username or password".to_string(),
        docs_hint: None,
    };

    let user = sqlx::query_as::<_, UserRow>(
        "SELECT id, password_hash FROM users WHERE username = $1 AND is_active = TRUE",
    )
    .bind(req.username.trim())
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(invalid_credentials)?;

    let verified =
        auth::verify_password(&req.password, &user.password_hash).map_err(AppError::Internal)?;
    if !verified {
        tracing::warn!(user_id = %user.id, "token request with wrong password");
        return Err(invalid_credentials());
    }

    let token_id = Uuid::now_v7();
    let (access_token, token_hash) = auth::generate_access_token();
    let expires_at = Utc::now() + Duration::hours(ACCESS_TOKEN_TTL_HOURS);

    sqlx::query(
        "INSERT INTO access_tokens (id, user_id, token_hash, expires_at) VALUES ($1, $2, $3, $4)",
    )
    .bind(token_id)
    .bind(user.id)
    .bind(&token_hash)
    .bind(expires_at)
    .execute(&state.db)
    .await?;

    Ok(Json(TokenResponse {
        access_token,
        token_type: "Bearer".to_string(),
        expires_in: ACCESS_TOKEN_TTL_HOURS * 3600,
    }))
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: Uuid,
    password_hash: String,
}
