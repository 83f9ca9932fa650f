//! API route definitions
//!
//! Every route goes through the same two layers: `authenticate` attaches the
//! request identity when a valid access token is presented, then
//! `enforce_access` applies the access policy. Which routes are public is
//! decided by the policy table, not by how routes are grouped here.

use crate::auth::{authenticate, enforce_access};
use crate::docs;
use crate::handlers::{admin, auth, health};
use crate::state::AppState;
use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;

/// Authentication endpoints
pub fn auth_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/auth/register", post(auth::register_handler))
        .route("/auth/login", post(auth::login_handler))
        .route("/auth/refresh-token", post(auth::refresh_handler))
        .route("/auth/profile", get(auth::profile_handler))
        .route("/auth/change-password", put(auth::change_password_handler))
        .route("/auth/logout", post(auth::logout_handler))
}

/// Administrative endpoints
pub fn admin_routes() -> Router<Arc<AppState>> {
    Router::new().route("/admin/users/:username", get(admin::get_user_handler))
}

/// Probes and API documentation
pub fn system_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/ready", get(health::readiness_check))
        .route("/api-docs/openapi.json", get(docs::openapi_json))
}

/// All routes with the authentication and access layers applied
pub fn api_routes(state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .merge(auth_routes())
        .merge(admin_routes())
        .merge(system_routes())
        // Layers run outermost-first: authenticate, then enforce_access
        .layer(middleware::from_fn_with_state(state.clone(), enforce_access))
        .layer(middleware::from_fn_with_state(state, authenticate))
}
