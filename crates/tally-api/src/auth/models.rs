//! Request and response bodies of the authentication endpoints
//!
//! Field names are camelCase on the wire. Request bodies carry their own
//! input rules (`validator`) and are checked at the handler boundary before
//! the authentication service sees them.

use super::password::validate_password_strength;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use tally_core::{Identity, Role};
use utoipa::ToSchema;
use validator::{Validate, ValidationError, ValidationErrors};

/// User registration request
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    #[validate(length(min = 3, max = 50, message = "Username must be between 3 and 50 characters"))]
    pub username: String,

    #[validate(email(message = "Please provide a valid email address"))]
    pub email: String,

    pub password: String,

    #[validate(length(min = 1, max = 50, message = "First name is required and must not exceed 50 characters"))]
    pub first_name: String,

    #[validate(length(min = 1, max = 50, message = "Last name is required and must not exceed 50 characters"))]
    pub last_name: String,
}

impl RegisterRequest {
    /// Field rules plus the password policy
    pub fn check(&self) -> Result<(), ValidationErrors> {
        with_password_policy(self.validate(), "password", &self.password)
    }
}

/// User login request
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    #[validate(length(min = 1, message = "Username is required"))]
    pub username: String,

    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

/// Token refresh request
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    #[validate(length(min = 1, message = "Refresh token is required"))]
    pub refresh_token: String,
}

/// Password change request
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    #[validate(length(min = 1, message = "Current password is required"))]
    pub current_password: String,

    pub new_password: String,
}

impl ChangePasswordRequest {
    pub fn check(&self) -> Result<(), ValidationErrors> {
        with_password_policy(self.validate(), "new_password", &self.new_password)
    }
}

fn with_password_policy(
    derived: Result<(), ValidationErrors>,
    field: &'static str,
    password: &str,
) -> Result<(), ValidationErrors> {
    let mut errors = derived.err().unwrap_or_else(ValidationErrors::new);

    if let Err(message) = validate_password_strength(password) {
        let mut error = ValidationError::new("password_policy");
        error.message = Some(Cow::Owned(message));
        errors.add(field, error);
    }

    if errors.errors().is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Authentication response with tokens
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub access_token: String,
    pub refresh_token: String,
    /// Always `Bearer`
    pub token_type: String,
    /// Access token lifetime in seconds
    pub expires_in: u64,
    pub user: UserInfo,
}

/// Public profile view (never includes the password hash)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserInfo {
    pub id: Option<i64>,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    #[schema(value_type = String, example = "USER")]
    pub role: Role,
    pub created_at: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub is_verified: bool,
}

impl From<&Identity> for UserInfo {
    fn from(identity: &Identity) -> Self {
        Self {
            id: identity.id,
            username: identity.username.clone(),
            email: identity.email.clone(),
            first_name: identity.first_name.clone(),
            last_name: identity.last_name.clone(),
            role: identity.role,
            created_at: identity.created_at,
            last_login: identity.last_login,
            is_active: identity.is_active,
            is_verified: identity.is_verified,
        }
    }
}

/// Plain acknowledgement body
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
