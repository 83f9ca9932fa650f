//! Authentication API handlers
//!
//! Bodies are checked against their input rules here, before the
//! authentication service sees them. Every outcome is written to the audit
//! log.

use crate::audit::{audit_log, extract_ip_address, extract_user_agent, AuditEvent};
use crate::auth::{
    clear_request_identity, AuthError, AuthResponse, ChangePasswordRequest, LoginRequest,
    MessageResponse, RefreshRequest, RegisterRequest, RequestIdentity, UserInfo,
};
use crate::error::AppError;
use crate::state::AppState;
use axum::{
    extract::{Request, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use std::sync::Arc;
use validator::Validate;

struct Client {
    ip_address: Option<String>,
    user_agent: Option<String>,
}

impl Client {
    fn from_headers(headers: &HeaderMap) -> Self {
        Self {
            ip_address: extract_ip_address(headers),
            user_agent: extract_user_agent(headers),
        }
    }
}

/// Register a new user account
///
/// New accounts get role `USER` and are signed in immediately.
#[utoipa::path(
    post,
    path = "/auth/register",
    tag = "auth",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "User registered successfully", body = AuthResponse),
        (status = 400, description = "Invalid input or username/email taken", body = crate::error::ApiError),
        (status = 500, description = "Internal server error", body = crate::error::ApiError),
    )
)]
pub async fn register_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<RegisterRequest>,
) -> Result<impl IntoResponse, AppError> {
    let client = Client::from_headers(&headers);
    let username = request.username.clone();

    let result = match request.check() {
        Ok(()) => state.auth.register(request).await.map_err(AppError::from),
        Err(errors) => Err(AppError::from(errors)),
    };

    match result {
        Ok(response) => {
            audit_log(&AuditEvent::RegistrationSuccess {
                username,
                role: response.user.role.to_string(),
                ip_address: client.ip_address,
                user_agent: client.user_agent,
            });
            Ok((StatusCode::CREATED, Json(response)))
        }
        Err(err) => {
            audit_log(&AuditEvent::RegistrationFailure {
                username,
                reason: failure_reason(&err),
                ip_address: client.ip_address,
                user_agent: client.user_agent,
            });
            Err(err)
        }
    }
}

/// Login with username and password
#[utoipa::path(
    post,
    path = "/auth/login",
    tag = "auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = AuthResponse),
        (status = 400, description = "Invalid input", body = crate::error::ApiError),
        (status = 401, description = "Invalid credentials or disabled account", body = crate::error::ApiError),
        (status = 500, description = "Internal server error", body = crate::error::ApiError),
    )
)]
pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, AppError> {
    let client = Client::from_headers(&headers);
    let username = request.username.clone();

    let result = match request.validate() {
        Ok(()) => state.auth.login(request).await.map_err(AppError::from),
        Err(errors) => Err(AppError::from(errors)),
    };

    match result {
        Ok(response) => {
            audit_log(&AuditEvent::LoginSuccess {
                username,
                ip_address: client.ip_address,
                user_agent: client.user_agent,
            });
            Ok(Json(response))
        }
        Err(err) => {
            audit_log(&AuditEvent::LoginFailure {
                username,
                reason: failure_reason(&err),
                ip_address: client.ip_address,
                user_agent: client.user_agent,
            });
            Err(err)
        }
    }
}

/// Exchange a refresh token for a new token pair
#[utoipa::path(
    post,
    path = "/auth/refresh-token",
    tag = "auth",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "Token refreshed successfully", body = AuthResponse),
        (status = 400, description = "Invalid input", body = crate::error::ApiError),
        (status = 401, description = "Invalid or expired refresh token", body = crate::error::ApiError),
        (status = 500, description = "Internal server error", body = crate::error::ApiError),
    )
)]
pub async fn refresh_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<RefreshRequest>,
) -> Result<Json<AuthResponse>, AppError> {
    let client = Client::from_headers(&headers);

    let result = match request.validate() {
        Ok(()) => state.auth.refresh(request).await.map_err(AppError::from),
        Err(errors) => Err(AppError::from(errors)),
    };

    match result {
        Ok(response) => {
            audit_log(&AuditEvent::TokenRefresh {
                username: response.user.username.clone(),
                ip_address: client.ip_address,
                user_agent: client.user_agent,
            });
            Ok(Json(response))
        }
        Err(err) => {
            audit_log(&AuditEvent::TokenRefreshFailure {
                reason: failure_reason(&err),
                ip_address: client.ip_address,
                user_agent: client.user_agent,
            });
            Err(err)
        }
    }
}

/// Profile of the authenticated user
#[utoipa::path(
    get,
    path = "/auth/profile",
    tag = "auth",
    responses(
        (status = 200, description = "Current user profile", body = UserInfo),
        (status = 401, description = "Unauthorized", body = crate::error::ApiError),
        (status = 404, description = "User no longer exists", body = crate::error::ApiError),
        (status = 500, description = "Internal server error", body = crate::error::ApiError),
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn profile_handler(
    State(state): State<Arc<AppState>>,
    identity: RequestIdentity,
) -> Result<Json<UserInfo>, AppError> {
    let profile = state.auth.get_profile(identity.username()).await?;
    Ok(Json(profile))
}

/// Change the password of the authenticated user
#[utoipa::path(
    put,
    path = "/auth/change-password",
    tag = "auth",
    request_body = ChangePasswordRequest,
    responses(
        (status = 200, description = "Password changed", body = MessageResponse),
        (status = 400, description = "Invalid input or wrong current password", body = crate::error::ApiError),
        (status = 401, description = "Unauthorized", body = crate::error::ApiError),
        (status = 404, description = "User no longer exists", body = crate::error::ApiError),
        (status = 500, description = "Internal server error", body = crate::error::ApiError),
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn change_password_handler(
    State(state): State<Arc<AppState>>,
    identity: RequestIdentity,
    headers: HeaderMap,
    Json(request): Json<ChangePasswordRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    let client = Client::from_headers(&headers);
    let username = identity.username().to_string();

    let result = match request.check() {
        Ok(()) => state
            .auth
            .change_password(&username, request)
            .await
            .map_err(AppError::from),
        Err(errors) => Err(AppError::from(errors)),
    };

    match result {
        Ok(()) => {
            audit_log(&AuditEvent::PasswordChange {
                username,
                ip_address: client.ip_address,
                user_agent: client.user_agent,
            });
            Ok(Json(MessageResponse::new("Password changed successfully")))
        }
        Err(err) => {
            audit_log(&AuditEvent::PasswordChangeFailure {
                username,
                reason: failure_reason(&err),
                ip_address: client.ip_address,
                user_agent: client.user_agent,
            });
            Err(err)
        }
    }
}

/// End the current session
///
/// Always succeeds. Clears the identity of this request only; issued tokens
/// stay valid until they expire and should be discarded by the client.
#[utoipa::path(
    post,
    path = "/auth/logout",
    tag = "auth",
    responses(
        (status = 200, description = "Logout successful", body = MessageResponse),
    ),
    security(
        (),
        ("bearer_auth" = [])
    )
)]
pub async fn logout_handler(mut request: Request) -> Json<MessageResponse> {
    let ip_address = extract_ip_address(request.headers());
    clear_request_identity(request.extensions_mut(), ip_address);

    Json(MessageResponse::new("Logged out successfully"))
}

fn failure_reason(err: &AppError) -> String {
    match err {
        AppError::Validation(_) => "validation failed".to_string(),
        AppError::Auth(AuthError::Internal(_)) | AppError::Internal(_) => {
            "internal error".to_string()
        }
        AppError::Auth(e) => e.to_string(),
        AppError::Unauthenticated => "unauthenticated".to_string(),
        AppError::Forbidden => "forbidden".to_string(),
        AppError::NotFound(resource) => format!("{resource} not found"),
    }
}
