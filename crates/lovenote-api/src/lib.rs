//! LoveNote API - REST server
//!
//! Accounts, relationship groups, invites and notes over HTTP, with JWT
//! sessions and membership/ownership gates.

pub mod audit;
pub mod auth;
pub mod error;
pub mod extract;
pub mod handlers;
pub mod middleware;
pub mod openapi;
pub mod routes;
pub mod state;

use axum::{middleware::from_fn_with_state, routing::get, Router};
use handlers::health;
use openapi::ApiDoc;
use state::AppState;
use std::sync::Arc;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

/// Build the application router over shared state
///
/// Operational endpoints sit at the root; the API is nested under `/api`.
/// Timeouts, CORS and request tracing are added by the binary.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/ready", get(health::readiness_check))
        .route("/metrics", get(health::prometheus_metrics))
        .nest("/api", routes::api_routes(state.clone()))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(from_fn_with_state(
            state.clone(),
            middleware::metrics_middleware,
        ))
        .layer(from_fn_with_state(
            state.clone(),
            middleware::security_headers_middleware,
        ))
        .with_state(state)
}

/// Secret used by [`create_router_for_testing`]; tests sign their own tokens with it
#[cfg(feature = "test-utils")]
pub const TEST_JWT_SECRET: &str = "lovenote-test-secret-do-not-use-in-production";

/// Configuration used by [`create_router_for_testing`]
#[cfg(feature = "test-utils")]
pub fn test_config() -> lovenote_core::AppConfig {
    let mut config = lovenote_core::AppConfig::default();
    config.auth.jwt_secret = TEST_JWT_SECRET.to_string();
    config.auth.password = lovenote_core::PasswordConfig::fast_insecure();
    config
}

/// In-memory state with cheap password hashing
#[cfg(feature = "test-utils")]
pub fn create_state_for_testing() -> Arc<AppState> {
    let store = Arc::new(lovenote_store::MemoryStore::new());
    match AppState::new(test_config(), store) {
        Ok(state) => Arc::new(state),
        Err(e) => panic!("test state must build: {e}"),
    }
}

/// Router over a fresh in-memory store
#[cfg(feature = "test-utils")]
pub fn create_router_for_testing() -> Router {
    create_router(create_state_for_testing())
}
