//! API error handling
//!
//! [`AppError`] is the only place status codes are chosen. Services below
//! the handlers raise typed errors and never build responses themselves.

use crate::auth::AuthError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use utoipa::ToSchema;
use validator::ValidationErrors;

/// API error response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ApiError {
    /// Error code
    pub code: String,
    /// Human-readable message
    pub message: String,
    /// Additional details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    /// Field-level validation messages, keyed by camelCase field name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fields: Option<BTreeMap<String, Vec<String>>>,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
            fields: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_fields(mut self, fields: BTreeMap<String, Vec<String>>) -> Self {
        self.fields = Some(fields);
        self
    }

    pub fn not_found(resource: &str) -> Self {
        Self::new("NOT_FOUND", format!("{resource} not found"))
    }

    pub fn unauthorized() -> Self {
        Self::new("UNAUTHORIZED", "Authentication required")
    }

    pub fn forbidden() -> Self {
        Self::new("FORBIDDEN", "Access denied")
    }

    pub fn internal_error() -> Self {
        Self::new("INTERNAL_ERROR", "Internal server error")
    }
}

/// Application error type
#[derive(Debug)]
pub enum AppError {
    /// Request body failed its input rules
    Validation(ValidationErrors),
    /// Failure raised by the authentication service
    Auth(AuthError),
    /// Route requires an identity and the request has none
    Unauthenticated,
    /// Identity lacks the role the route requires
    Forbidden,
    NotFound(String),
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error) = match self {
            AppError::Validation(errors) => (
                StatusCode::BAD_REQUEST,
                ApiError::new("VALIDATION_ERROR", "Request validation failed")
                    .with_fields(field_messages(&errors)),
            ),
            AppError::Auth(err) => auth_status(err),
            AppError::Unauthenticated => (StatusCode::UNAUTHORIZED, ApiError::unauthorized()),
            AppError::Forbidden => (StatusCode::FORBIDDEN, ApiError::forbidden()),
            AppError::NotFound(resource) => (StatusCode::NOT_FOUND, ApiError::not_found(&resource)),
            AppError::Internal(details) => internal(details),
        };

        (status, Json(error)).into_response()
    }
}

fn auth_status(err: AuthError) -> (StatusCode, ApiError) {
    let message = err.to_string();
    match err {
        AuthError::DuplicateUsername => (
            StatusCode::BAD_REQUEST,
            ApiError::new("DUPLICATE_USERNAME", message),
        ),
        AuthError::DuplicateEmail => (
            StatusCode::BAD_REQUEST,
            ApiError::new("DUPLICATE_EMAIL", message),
        ),
        AuthError::InvalidCredentials => (
            StatusCode::UNAUTHORIZED,
            ApiError::new("INVALID_CREDENTIALS", message),
        ),
        AuthError::AccountDisabled => (
            StatusCode::UNAUTHORIZED,
            ApiError::new("ACCOUNT_DISABLED", message),
        ),
        AuthError::IncorrectPassword => (
            StatusCode::BAD_REQUEST,
            ApiError::new("INCORRECT_PASSWORD", message),
        ),
        AuthError::InvalidToken => (
            StatusCode::UNAUTHORIZED,
            ApiError::new("INVALID_TOKEN", message),
        ),
        AuthError::UserNotFound => (StatusCode::NOT_FOUND, ApiError::not_found("User")),
        AuthError::Internal(details) => internal(details),
    }
}

fn internal(details: String) -> (StatusCode, ApiError) {
    // Details stay in the log; the caller only sees a generic body
    tracing::error!(error = %details, "request failed with internal error");
    (StatusCode::INTERNAL_SERVER_ERROR, ApiError::internal_error())
}

fn field_messages(errors: &ValidationErrors) -> BTreeMap<String, Vec<String>> {
    errors
        .field_errors()
        .into_iter()
        .map(|(field, errs)| {
            let messages = errs
                .iter()
                .map(|e| {
                    e.message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| e.code.to_string())
                })
                .collect();
            (camel_case(&field.to_string()), messages)
        })
        .collect()
}

fn camel_case(field: &str) -> String {
    let mut out = String::with_capacity(field.len());
    let mut upper = false;
    for c in field.chars() {
        if c == '_' {
            upper = true;
        } else if upper {
            out.extend(c.to_uppercase());
            upper = false;
        } else {
            out.push(c);
        }
    }
    out
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        AppError::Auth(err)
    }
}

impl From<ValidationErrors> for AppError {
    fn from(errors: ValidationErrors) -> Self {
        AppError::Validation(errors)
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<tally_core::TallyError> for AppError {
    fn from(err: tally_core::TallyError) -> Self {
        use tally_core::TallyError;

        match err {
            TallyError::NotFound(resource) => AppError::NotFound(resource),
            other => AppError::Auth(AuthError::from(other)),
        }
    }
}
