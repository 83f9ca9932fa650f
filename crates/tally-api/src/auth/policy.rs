//! Access control policy
//!
//! A declarative, ordered table of path prefixes. The first rule whose
//! prefix matches the request path decides; a path no rule covers is denied.
//! Prefixes match on segment boundaries: `/admin` covers `/admin` and
//! `/admin/users` but not `/administrator`.

use super::middleware::RequestIdentity;
use crate::audit::{audit_log, extract_ip_address, extract_user_agent, AuditEvent};
use crate::error::AppError;
use crate::state::AppState;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tally_core::Role;

/// What a matching rule demands of the request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement {
    /// Always allowed
    Public,
    /// Identity holding the role
    Role(Role),
    /// Any identity
    Authenticated,
}

#[derive(Debug, Clone)]
pub struct AccessRule {
    pub prefix: String,
    pub requirement: Requirement,
}

impl AccessRule {
    pub fn matches(&self, path: &str) -> bool {
        matches_prefix(&self.prefix, path)
    }
}

/// Outcome of evaluating a request against the policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    /// No identity, but the route needs one
    Unauthenticated,
    /// Identity present, but not enough; `required` is the missing role when
    /// a role rule decided
    Forbidden { required: Option<Role> },
}

#[derive(Debug, Clone, Default)]
pub struct AccessPolicy {
    rules: Vec<AccessRule>,
}

impl AccessPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Public auth endpoints, health and API docs; `/admin` for admins; every
    /// other path for any authenticated identity
    ///
    /// Logout is public so that it succeeds with an expired or missing token.
    pub fn standard() -> Self {
        Self::new()
            .permit("/auth/register")
            .permit("/auth/login")
            .permit("/auth/refresh-token")
            .permit("/auth/logout")
            .permit("/health")
            .permit("/ready")
            .permit("/api-docs")
            .require_role("/admin", Role::Admin)
            .authenticated("/")
    }

    pub fn permit(self, prefix: impl Into<String>) -> Self {
        self.rule(prefix, Requirement::Public)
    }

    pub fn require_role(self, prefix: impl Into<String>, role: Role) -> Self {
        self.rule(prefix, Requirement::Role(role))
    }

    pub fn authenticated(self, prefix: impl Into<String>) -> Self {
        self.rule(prefix, Requirement::Authenticated)
    }

    fn rule(mut self, prefix: impl Into<String>, requirement: Requirement) -> Self {
        self.rules.push(AccessRule {
            prefix: prefix.into(),
            requirement,
        });
        self
    }

    pub fn rules(&self) -> &[AccessRule] {
        &self.rules
    }

    /// First rule covering `path`, in declaration order
    pub fn rule_for(&self, path: &str) -> Option<&AccessRule> {
        self.rules.iter().find(|rule| rule.matches(path))
    }

    pub fn is_public(&self, path: &str) -> bool {
        matches!(
            self.rule_for(path).map(|rule| rule.requirement),
            Some(Requirement::Public)
        )
    }

    pub fn evaluate(&self, path: &str, identity: Option<&RequestIdentity>) -> Decision {
        let Some(rule) = self.rule_for(path) else {
            // Implicit deny
            return match identity {
                None => Decision::Unauthenticated,
                Some(_) => Decision::Forbidden { required: None },
            };
        };

        match (rule.requirement, identity) {
            (Requirement::Public, _) => Decision::Allow,
            (_, None) => Decision::Unauthenticated,
            (Requirement::Authenticated, Some(_)) => Decision::Allow,
            (Requirement::Role(role), Some(identity)) if identity.has_role(role) => {
                Decision::Allow
            }
            (Requirement::Role(role), Some(_)) => Decision::Forbidden {
                required: Some(role),
            },
        }
    }
}

fn matches_prefix(prefix: &str, path: &str) -> bool {
    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() {
        return path.starts_with('/');
    }
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

/// Axum middleware applying the access policy
///
/// Runs after [`authenticate`](super::middleware::authenticate), before any
/// handler.
pub async fn enforce_access(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let identity = request.extensions().get::<RequestIdentity>();
    let decision = state.policy.evaluate(request.uri().path(), identity);

    let required_role = match decision {
        Decision::Allow => return next.run(request).await,
        Decision::Unauthenticated => None,
        Decision::Forbidden { required } => required,
    };

    audit_log(&AuditEvent::AccessDenied {
        username: identity.map(|i| i.username().to_string()),
        resource: request.uri().path().to_string(),
        required_role: required_role.map(|role| role.to_string()),
        ip_address: extract_ip_address(request.headers()),
        user_agent: extract_user_agent(request.headers()),
    });

    match decision {
        Decision::Unauthenticated => AppError::Unauthenticated.into_response(),
        _ => AppError::Forbidden.into_response(),
    }
}
