//! Administrative handlers
//!
//! Everything here sits under `/admin` and is only reachable with role
//! `ADMIN`; the access policy enforces that before these run.

use crate::auth::UserInfo;
use crate::error::AppError;
use crate::state::AppState;
use axum::{
    extract::{Path, State},
    Json,
};
use std::sync::Arc;

/// Look up any user's profile
#[utoipa::path(
    get,
    path = "/admin/users/{username}",
    tag = "admin",
    params(
        ("username" = String, Path, description = "Username to look up")
    ),
    responses(
        (status = 200, description = "User profile", body = UserInfo),
        (status = 401, description = "Unauthorized", body = crate::error::ApiError),
        (status = 403, description = "Requires role ADMIN", body = crate::error::ApiError),
        (status = 404, description = "No such user", body = crate::error::ApiError),
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn get_user_handler(
    State(state): State<Arc<AppState>>,
    Path(username): Path<String>,
) -> Result<Json<UserInfo>, AppError> {
    let profile = state.auth.get_profile(&username).await?;
    Ok(Json(profile))
}
