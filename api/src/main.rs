use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use rehearse_core::scenario::ScenarioCatalog;
use serde::Serialize;
use sqlx::postgres::PgPoolOptions;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

mod auth;
mod error;
mod extract;
mod gateway;
mod middleware;
mod routes;
mod session_log;
mod simulation;
mod state;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Rehearse API",
        version = "0.1.0",
        description = "Sales conversation simulator: rehearse against a scripted customer persona, then get structured feedback."
    ),
    paths(
        routes::health::health_check,
        routes::auth::register,
        routes::auth::token,
        routes::scenarios::list_scenarios,
        routes::scenarios::get_scenario,
        routes::simulation::respond,
        routes::simulation::analyze,
    ),
    components(schemas(
        HealthResponse,
        rehearse_core::error::ApiError,
        rehearse_core::scenario::Scenario,
        rehearse_core::transcript::Speaker,
        rehearse_core::transcript::ConversationLine,
        rehearse_core::transcript::Transcript,
        rehearse_core::feedback::Feedback,
        rehearse_core::session::ResponseWarning,
        routes::auth::RegisterRequest,
        routes::auth::RegisterResponse,
        routes::auth::TokenRequest,
        routes::auth::TokenResponse,
        routes::simulation::SimulationRequest,
        routes::simulation::RespondResponse,
        routes::simulation::AnalyzeResponse,
    )),
    modifiers(&SecurityAddon)
)]
struct ApiDoc;

struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            utoipa::openapi::security::SecurityScheme::Http(
                utoipa::openapi::security::Http::new(
                    utoipa::openapi::security::HttpAuthScheme::Bearer,
                ),
            ),
        );
    }
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    /// Number of scenarios loaded at startup
    pub scenarios: usize,
}

#[tokio::main]
async fn main() {
    // Load .env if present (dev only)
    let _ = dotenvy::dotenv();

    // Structured JSON logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "rehearse_api=debug,rehearse_core=info,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    // Database connection
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    let pool = PgPoolOptions::new()
        .max_connections(20)
        .connect(&database_url)
        .await
        .expect("Failed to connect to database");

    sqlx::migrate!("../migrations")
        .run(&pool)
        .await
        .expect("Failed to run migrations");

    // Scenario catalog: loaded once, read-only afterwards
    let scenarios = match std::env::var("REHEARSE_SCENARIOS_PATH") {
        Ok(path) => ScenarioCatalog::load(&path)
            .unwrap_or_else(|e| panic!("Failed to load scenarios from {path}: {e}")),
        Err(_) => ScenarioCatalog::builtin(),
    };
    tracing::info!(count = scenarios.len(), "scenario catalog loaded");

    // Text generation
    let gateway_config = gateway::GatewayConfig::from_env();
    if gateway_config.api_key.is_none() {
        tracing::warn!(
            "No text-generation API key configured; respond will use the fallback line and analyze will fail"
        );
    }
    let generator = gateway::OpenAiChatGenerator::new(&gateway_config)
        .expect("Failed to build text-generation HTTP client");
    let completion_gateway =
        gateway::CompletionGateway::new(Arc::new(generator), gateway_config.timeout);

    let simulator = simulation::Simulator::new(
        Arc::new(scenarios),
        completion_gateway,
        Arc::new(session_log::PgSessionLogWriter::new(pool.clone())),
    );

    let app_state = state::AppState {
        db: pool,
        simulator: Arc::new(simulator),
    };

    let cors_layer = middleware::cors::build_cors_layer();

    let app = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .merge(routes::health::router())
        .merge(routes::scenarios::router().layer(middleware::rate_limit::read_layer()))
        .merge(routes::simulation::router().layer(middleware::rate_limit::simulation_layer()))
        .merge(routes::auth::register_router().layer(middleware::rate_limit::register_layer()))
        .merge(routes::auth::token_router().layer(middleware::rate_limit::token_layer()))
        .layer(auth::InjectAuthLayer::new(app_state.db.clone()))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors_layer),
        )
        .with_state(app_state);

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(3000);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Rehearse API listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind listener");
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .expect("Server error");
}
