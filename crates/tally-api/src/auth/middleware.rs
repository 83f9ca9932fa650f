/// Request authentication middleware
///
/// Reads the bearer credential from the Authorization header, validates it
/// and, on success, places a [`RequestIdentity`] in the request extensions.
/// It never rejects a request itself: a missing or bad credential simply
/// leaves the request anonymous, and the access policy decides what an
/// anonymous request may reach.
use super::jwt::{JwtError, TokenKind, TokenService};
use crate::audit::{audit_log, extract_ip_address, extract_user_agent, AuditEvent};
use crate::error::AppError;
use crate::state::AppState;
use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tally_core::{Identity, Role, TallyError, UserResolver};
use thiserror::Error;

/// Identity attached to one request
///
/// Lives only in that request's extensions, so concurrent requests never
/// share it.
#[derive(Debug, Clone)]
pub struct RequestIdentity {
    pub identity: Identity,
    /// Granted authorities (`ROLE_USER`, `ROLE_ADMIN`)
    pub authorities: Vec<String>,
}

impl RequestIdentity {
    pub fn new(identity: Identity) -> Self {
        let authorities = identity.authorities();
        Self {
            identity,
            authorities,
        }
    }

    pub fn username(&self) -> &str {
        &self.identity.username
    }

    pub fn has_role(&self, role: Role) -> bool {
        let authority = role.authority();
        self.authorities.iter().any(|a| *a == authority)
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for RequestIdentity
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<RequestIdentity>()
            .cloned()
            .ok_or(AppError::Unauthenticated)
    }
}

/// Why a presented credential did not establish an identity
#[derive(Debug, Error)]
pub enum AuthenticationFailure {
    #[error("token rejected: {0}")]
    Token(#[from] JwtError),

    #[error("token subject has no identity")]
    UnknownSubject,

    #[error("token does not match the resolved identity")]
    SubjectMismatch,

    #[error("identity is inactive")]
    Inactive,

    #[error("identity lookup failed: {0}")]
    Lookup(#[from] TallyError),
}

/// Bearer credential from the Authorization header
///
/// `None` when the header is absent, not valid text, or lacks the
/// `Bearer ` prefix.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Turn a bearer credential into a request identity
///
/// The subject comes from a verified access token; role and account state
/// come from the resolver, never from the token.
pub async fn authenticate_request<R>(
    tokens: &TokenService,
    resolver: &R,
    token: &str,
) -> Result<RequestIdentity, AuthenticationFailure>
where
    R: UserResolver + ?Sized,
{
    let subject = tokens.extract_subject(token, TokenKind::Access)?;

    let identity = resolver
        .resolve(&subject)
        .await?
        .ok_or(AuthenticationFailure::UnknownSubject)?;

    if !tokens.is_valid(token, &identity, TokenKind::Access) {
        return Err(AuthenticationFailure::SubjectMismatch);
    }

    if !identity.is_active {
        return Err(AuthenticationFailure::Inactive);
    }

    Ok(RequestIdentity::new(identity))
}

/// Axum middleware establishing the request identity
///
/// Runs on public routes too, so a handler such as logout sees the identity
/// when a valid token is presented. A bad credential on a public route is
/// not an access attempt and is only logged at debug level.
///
/// # Usage
///
/// ```ignore
/// let app = Router::new()
///     .route("/auth/profile", get(profile_handler))
///     .layer(middleware::from_fn_with_state(state.clone(), authenticate));
/// ```
pub async fn authenticate(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Response {
    if request.extensions().get::<RequestIdentity>().is_some() {
        return next.run(request).await;
    }

    let Some(token) = bearer_token(request.headers()).map(str::to_owned) else {
        return next.run(request).await;
    };

    match authenticate_request(&state.tokens, state.store.as_ref(), &token).await {
        Ok(identity) => {
            tracing::debug!(username = %identity.username(), "request authenticated");
            request.extensions_mut().insert(identity);
        }
        Err(AuthenticationFailure::Lookup(e)) => {
            tracing::error!(error = %e, "identity lookup failed during authentication");
        }
        Err(reason) if state.policy.is_public(request.uri().path()) => {
            tracing::debug!(reason = %reason, "ignoring bad credential on public route");
        }
        Err(reason) => {
            audit_log(&AuditEvent::InvalidToken {
                reason: reason.to_string(),
                ip_address: extract_ip_address(request.headers()),
                user_agent: extract_user_agent(request.headers()),
            });
        }
    }

    next.run(request).await
}
