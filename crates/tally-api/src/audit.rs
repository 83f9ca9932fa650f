//! Security audit logging for authentication events
//!
//! Every event is written at INFO level with the `audit` target, so security
//! logs can be filtered and routed separately from application logs. The full
//! event is attached as a JSON field for log aggregators.
//!
//! Passwords and tokens never appear in an event.

use axum::http::HeaderMap;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Security audit events for authentication and authorization
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum AuditEvent {
    /// Successful registration
    RegistrationSuccess {
        username: String,
        role: String,
        ip_address: Option<String>,
        user_agent: Option<String>,
    },

    /// Rejected registration
    RegistrationFailure {
        username: String,
        reason: String,
        ip_address: Option<String>,
        user_agent: Option<String>,
    },

    /// Successful login
    LoginSuccess {
        username: String,
        ip_address: Option<String>,
        user_agent: Option<String>,
    },

    /// Failed login attempt
    LoginFailure {
        username: String,
        reason: String,
        ip_address: Option<String>,
        user_agent: Option<String>,
    },

    /// Token pair rotated through a refresh token
    TokenRefresh {
        username: String,
        ip_address: Option<String>,
        user_agent: Option<String>,
    },

    /// Refresh token rejected
    TokenRefreshFailure {
        reason: String,
        ip_address: Option<String>,
        user_agent: Option<String>,
    },

    /// Password changed
    PasswordChange {
        username: String,
        ip_address: Option<String>,
        user_agent: Option<String>,
    },

    /// Password change rejected
    PasswordChangeFailure {
        username: String,
        reason: String,
        ip_address: Option<String>,
        user_agent: Option<String>,
    },

    /// Request context cleared by logout
    Logout {
        username: Option<String>,
        ip_address: Option<String>,
    },

    /// Request refused by the access policy
    AccessDenied {
        username: Option<String>,
        resource: String,
        required_role: Option<String>,
        ip_address: Option<String>,
        user_agent: Option<String>,
    },

    /// Bearer credential presented but not accepted
    InvalidToken {
        reason: String,
        ip_address: Option<String>,
        user_agent: Option<String>,
    },
}

impl AuditEvent {
    /// Short human-readable label used as the log message
    pub fn label(&self) -> &'static str {
        match self {
            AuditEvent::RegistrationSuccess { .. } => "Registration successful",
            AuditEvent::RegistrationFailure { .. } => "Registration failed",
            AuditEvent::LoginSuccess { .. } => "Login successful",
            AuditEvent::LoginFailure { .. } => "Login failed",
            AuditEvent::TokenRefresh { .. } => "Token refresh",
            AuditEvent::TokenRefreshFailure { .. } => "Token refresh failed",
            AuditEvent::PasswordChange { .. } => "Password changed",
            AuditEvent::PasswordChangeFailure { .. } => "Password change failed",
            AuditEvent::Logout { .. } => "User logout",
            AuditEvent::AccessDenied { .. } => "Access denied",
            AuditEvent::InvalidToken { .. } => "Invalid token",
        }
    }

    /// Username the event concerns, when known
    pub fn username(&self) -> Option<&str> {
        match self {
            AuditEvent::RegistrationSuccess { username, .. }
            | AuditEvent::RegistrationFailure { username, .. }
            | AuditEvent::LoginSuccess { username, .. }
            | AuditEvent::LoginFailure { username, .. }
            | AuditEvent::TokenRefresh { username, .. }
            | AuditEvent::PasswordChange { username, .. }
            | AuditEvent::PasswordChangeFailure { username, .. } => Some(username),
            AuditEvent::Logout { username, .. } | AuditEvent::AccessDenied { username, .. } => {
                username.as_deref()
            }
            AuditEvent::TokenRefreshFailure { .. } | AuditEvent::InvalidToken { .. } => None,
        }
    }

    fn ip_address(&self) -> Option<&str> {
        match self {
            AuditEvent::RegistrationSuccess { ip_address, .. }
            | AuditEvent::RegistrationFailure { ip_address, .. }
            | AuditEvent::LoginSuccess { ip_address, .. }
            | AuditEvent::LoginFailure { ip_address, .. }
            | AuditEvent::TokenRefresh { ip_address, .. }
            | AuditEvent::TokenRefreshFailure { ip_address, .. }
            | AuditEvent::PasswordChange { ip_address, .. }
            | AuditEvent::PasswordChangeFailure { ip_address, .. }
            | AuditEvent::Logout { ip_address, .. }
            | AuditEvent::AccessDenied { ip_address, .. }
            | AuditEvent::InvalidToken { ip_address, .. } => ip_address.as_deref(),
        }
    }
}

/// Log a security audit event with structured fields
///
/// Example output with JSON logging enabled:
///
/// ```json
/// {
///   "target": "audit",
///   "fields": {
///     "message": "Login successful",
///     "event": "{\"event_type\":\"login_success\",\"username\":\"alice\",...}",
///     "username": "alice",
///     "ip_address": "203.0.113.1"
///   }
/// }
/// ```
pub fn audit_log(event: &AuditEvent) {
    let timestamp = Utc::now();

    let event_json = serde_json::to_string(event)
        .unwrap_or_else(|e| format!("{{\"error\":\"Failed to serialize audit event: {e}\"}}"));

    info!(
        target: "audit",
        timestamp = %timestamp,
        event = %event_json,
        username = ?event.username(),
        ip_address = ?event.ip_address(),
        "{}",
        event.label()
    );
}

/// Client address from proxy headers
///
/// Takes the first entry of `X-Forwarded-For`, then `X-Real-IP`.
pub fn extract_ip_address(headers: &HeaderMap) -> Option<String> {
    if let Some(xff) = headers.get("x-forwarded-for") {
        if let Ok(xff_str) = xff.to_str() {
            if let Some(first_ip) = xff_str.split(',').next() {
                let first_ip = first_ip.trim();
                if !first_ip.is_empty() {
                    return Some(first_ip.to_string());
                }
            }
        }
    }

    headers
        .get("x-real-ip")
        .and_then(|ip| ip.to_str().ok())
        .map(|ip| ip.trim().to_string())
}

pub fn extract_user_agent(headers: &HeaderMap) -> Option<String> {
    headers
        .get(axum::http::header::USER_AGENT)
        .and_then(|ua| ua.to_str().ok())
        .map(|s| s.to_string())
}
