//! Tally API - identity and access-control HTTP server
//!
//! Registration, login, token refresh, profile and password management over
//! HS256 bearer tokens, with a declarative per-route access policy.

pub mod audit;
pub mod auth;
pub mod docs;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;

use axum::{http::HeaderValue, Router};
use state::AppState;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Build the complete application router
pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = cors_layer(&state.config.server.cors_origins);

    routes::api_routes(state.clone())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Router over an in-memory store with default configuration
pub fn create_router_for_testing() -> Router {
    create_router(Arc::new(AppState::default()))
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);

    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    if origins.is_empty() {
        layer
    } else {
        layer.allow_origin(origins)
    }
}
