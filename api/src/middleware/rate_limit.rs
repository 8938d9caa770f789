use axum::http::{HeaderValue, Response, StatusCode};
use tower_governor::{
    GovernorError, GovernorLayer, governor::GovernorConfigBuilder,
    key_extractor::SmartIpKeyExtractor,
};

type RateLimitLayer =
    GovernorLayer<SmartIpKeyExtractor, governor::middleware::NoOpMiddleware, axum::body::Body>;

/// Rate limit for POST /v1/auth/register: 5 requests per hour per IP.
pub fn register_layer() -> RateLimitLayer {
    GovernorLayer::new(
        GovernorConfigBuilder::default()
            .per_second(720)
            .burst_size(5)
            .key_extractor(SmartIpKeyExtractor)
            .finish()
            .expect("invalid governor config for register"),
    )
    .error_handler(json_error_handler)
}

/// Rate limit for POST /v1/auth/token: 30 requests per minute per IP.
pub fn token_layer() -> RateLimitLayer {
    GovernorLayer::new(
        GovernorConfigBuilder::default()
            .per_second(2)
            .burst_size(30)
            .key_extractor(SmartIpKeyExtractor)
            .finish()
            .expect("invalid governor config for token"),
    )
    .error_handler(json_error_handler)
}

/// Rate limit for POST /v1/simulation/*: 30 requests per minute per IP.
/// Every request here costs a text-generation call.
pub fn simulation_layer() -> RateLimitLayer {
    GovernorLayer::new(
        GovernorConfigBuilder::default()
            .per_second(2)
            .burst_size(15)
            .key_extractor(SmartIpKeyExtractor)
            .finish()
            .expect("invalid governor config for simulation"),
    )
    .error_handler(json_error_handler)
}

/// Rate limit for GET /v1/scenarios: 120 requests per minute per IP.
pub fn read_layer() -> RateLimitLayer {
    GovernorLayer::new(
        GovernorConfigBuilder::default()
            .per_millisecond(500)
            .burst_size(30)
            .key_extractor(SmartIpKeyExtractor)
            .finish()
            .expect("invalid governor config for read"),
    )
    .error_handler(json_error_handler)
}

/// Returns JSON in ApiError format with a Retry-After header.
fn json_error_handler(err: GovernorError) -> Response<axum::body::Body> {
    let (status, retry_after, message) = match err {
        GovernorError::TooManyRequests { wait_time, .. } => (
            StatusCode::TOO_MANY_REQUESTS,
            Some(wait_time),
            format!("Too many requests. Retry after {wait_time} seconds."),
        ),
        GovernorError::UnableToExtractKey => (
            StatusCode::INTERNAL_SERVER_ERROR,
            None,
            "Unable to determine client identity for rate limiting".to_string(),
        ),
        GovernorError::Other { code, msg, .. } => {
            (code, None, msg.unwrap_or_default().to_string())
        }
    };

    let request_id = uuid::Uuid::now_v7().to_string();
    let body = serde_json::json!({
        "error": rehearse_core::error::codes::RATE_LIMITED,
        "message": message,
        "requestId": request_id,
    });

    let mut response = Response::new(axum::body::Body::from(body.to_string()));
    *response.status_mut() = status;
    response.headers_mut().insert(
        "content-type",
        HeaderValue::from_static("application/json"),
    );
    if let Some(wait_time) = retry_after {
        response
            .headers_mut()
            .insert("retry-after", HeaderValue::from(wait_time));
    }

    response
}
