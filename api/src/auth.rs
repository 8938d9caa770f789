use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use axum::extract::{FromRequestParts, Request};
use axum::http::request::Parts;
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use rehearse_core::auth::ACCESS_TOKEN_PREFIX;
use tower::{Layer, Service, ServiceExt};
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

/// Authenticated user extracted from the `Authorization: Bearer <token>` header.
///
/// Two-phase resolution:
/// 1. Auth middleware (`InjectAuthLayer`) runs first — validates token, injects into extensions
/// 2. Handler extractor reads from extensions (no DB hit) — or falls back to full auth
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user_id: Uuid,
}

// --- Tower Layer/Service for auth injection ---

/// Tower Layer that injects `AuthenticatedUser` into request extensions.
/// Silently continues on auth failure (unauthenticated endpoints like health, auth).
#[derive(Clone)]
pub struct InjectAuthLayer {
    pool: sqlx::PgPool,
}

impl InjectAuthLayer {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }
}

impl<S> Layer<S> for InjectAuthLayer {
    type Service = InjectAuthService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        InjectAuthService {
            inner,
            pool: self.pool.clone(),
        }
    }
}

#[derive(Clone)]
pub struct InjectAuthService<S> {
    inner: S,
    pool: sqlx::PgPool,
}

impl<S> Service<Request> for InjectAuthService<S>
where
    S: Service<Request, Response = Response, Error = Infallible> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = Response;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<Response, Infallible>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request) -> Self::Future {
        let not_ready = self.inner.clone();
        let ready = std::mem::replace(&mut self.inner, not_ready);
        let pool = self.pool.clone();

        // Headers are Send-safe, the body is not
        let token = bearer_token(req.headers()).map(str::to_owned);

        Box::pin(async move {
            if let Some(token) = token {
                if let Ok(auth_user) = authenticate_access_token(&token, &pool).await {
                    req.extensions_mut().insert(auth_user);
                }
            }
            Ok(ready.oneshot(req).await.into_response())
        })
    }
}

fn bearer_token(headers: &axum::http::HeaderMap) -> Option<&str> {
    headers
        .get("authorization")?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

// --- Extractor (used by handlers) ---

impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        // Fast path: auth middleware already validated the token
        if let Some(user) = parts.extensions.get::<AuthenticatedUser>() {
            return Ok(user.clone());
        }

        let header = parts
            .headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| AppError::Unauthorized {
                message: "Missing Authorization header".to_string(),
                docs_hint: Some(
                    "Include 'Authorization: Bearer <token>'. Obtain a token via POST /v1/auth/token."
                        .to_string(),
                ),
            })?;

        let token = header
            .strip_prefix("Bearer ")
            .ok_or_else(|| AppError::Unauthorized {
                message: "Authorization header must use Bearer scheme".to_string(),
                docs_hint: Some("Format: 'Authorization: Bearer <token>'".to_string()),
            })?;

        authenticate_access_token(token, &state.db).await
    }
}

async fn authenticate_access_token(
    token: &str,
    pool: &sqlx::PgPool,
) -> Result<AuthenticatedUser, AppError> {
    if !token.starts_with(ACCESS_TOKEN_PREFIX) {
        return Err(AppError::Unauthorized {
            message: "Invalid token format".to_string(),
            docs_hint: Some(format!(
                "Access tokens start with '{ACCESS_TOKEN_PREFIX}'."
            )),
        });
    }

    let token_hash = rehearse_core::auth::hash_token(token);

    let row = sqlx::query_as::<_, AccessTokenRow>(
        "SELECT t.id, t.user_id, t.expires_at \
         FROM access_tokens t \
         JOIN users u ON u.id = t.user_id \
         WHERE t.token_hash = $1 \
           AND t.is_revoked = FALSE \
           AND u.is_active = TRUE",
    )
    .bind(&token_hash)
    .fetch_optional(pool)
    .await
    .map_err(AppError::Database)?
    .ok_or_else(|| AppError::Unauthorized {
        message: "Invalid access token".to_string(),
        docs_hint: Some(
            "Check that the access token is correct and has not been revoked.".to_string(),
        ),
    })?;

    if Utc::now() > row.expires_at {
        return Err(AppError::Unauthorized {
            message: "Access token has expired".to_string(),
            docs_hint: Some("Request a new token via POST /v1/auth/token.".to_string()),
        });
    }

    // Fire-and-forget last_used_at update
    let pool_clone = pool.clone();
    let token_id = row.id;
    tokio::spawn(async move {
        if let Err(err) =
            sqlx::query("UPDATE access_tokens SET last_used_at = NOW() WHERE id = $1")
                .bind(token_id)
                .execute(&pool_clone)
                .await
        {
            tracing::debug!(token_id = %token_id, error = %err, "failed to update last_used_at");
        }
    });

    Ok(AuthenticatedUser {
        user_id: row.user_id,
    })
}

#[derive(sqlx::FromRow)]
struct AccessTokenRow {
    id: Uuid,
    user_id: Uuid,
    expires_at: chrono::DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use axum::http::{HeaderMap, HeaderValue};

    use super::*;

    #[test]
    fn bearer_token_requires_scheme() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("Bearer rh_at_abc"));
        assert_eq!(bearer_token(&headers), Some("rh_at_abc"));

        headers.insert("authorization", HeaderValue::from_static("Basic dXNlcjpwYXNz"));
        assert_eq!(bearer_token(&headers), None);

        assert_eq!(bearer_token(&HeaderMap::new()), None);
    }

    #[tokio::test]
    async fn foreign_token_format_is_rejected_without_db() {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .connect_lazy("postgres://localhost/unused")
            .unwrap();
        let err = authenticate_access_token("sk_live_123", &pool)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Unauthorized { .. }));
    }
}
