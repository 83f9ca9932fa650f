//! Identity model
//!
//! The durable principal record every authenticated request is attributed to.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Coarse-grained authorization label
///
/// - User: default role assigned at registration
/// - Admin: may reach the administrative route prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    User,
    Admin,
}

impl Role {
    /// Stored and serialized form (`USER`, `ADMIN`)
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "USER",
            Role::Admin => "ADMIN",
        }
    }

    /// Granted authority string derived from the role
    pub fn authority(&self) -> String {
        format!("ROLE_{}", self.as_str())
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "USER" => Ok(Role::User),
            "ADMIN" => Ok(Role::Admin),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

/// User identity record
///
/// `password_hash` holds an Argon2 PHC string and is never serialized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    /// Numeric id, assigned by the credential store on first save
    pub id: Option<i64>,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub role: Role,
    pub is_active: bool,
    pub is_verified: bool,
    pub created_at: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Identity {
    /// Create an unsaved identity with role `USER`
    ///
    /// Accounts start active and verified; there is no e-mail verification
    /// step.
    pub fn new(
        username: impl Into<String>,
        email: impl Into<String>,
        password_hash: impl Into<String>,
        first_name: impl Into<String>,
        last_name: impl Into<String>,
    ) -> Self {
        Self {
            id: None,
            username: username.into(),
            email: email.into(),
            password_hash: password_hash.into(),
            first_name: first_name.into(),
            last_name: last_name.into(),
            role: Role::User,
            is_active: true,
            is_verified: true,
            created_at: Utc::now(),
            last_login: None,
            updated_at: None,
        }
    }

    /// Override the role of an unsaved identity
    pub fn with_role(mut self, role: Role) -> Self {
        self.role = role;
        self
    }

    /// Authorities granted to this identity
    pub fn authorities(&self) -> Vec<String> {
        vec![self.role.authority()]
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.role == role
    }

    /// Record a successful authentication at `at`
    ///
    /// The stored value never moves backwards.
    pub fn touch_last_login(&mut self, at: DateTime<Utc>) {
        self.last_login = Some(match self.last_login {
            Some(previous) if previous > at => previous,
            _ => at,
        });
    }
}
