//! Logout
//!
//! Logout clears the identity attached to the current request. The token
//! itself stays valid until it expires; clients are expected to discard it.

use super::middleware::RequestIdentity;
use crate::audit::{audit_log, AuditEvent};
use axum::http::Extensions;

/// Remove the request identity, returning the username it carried
///
/// Calling it on an anonymous request is a no-op.
pub fn clear_request_identity(
    extensions: &mut Extensions,
    ip_address: Option<String>,
) -> Option<String> {
    let username = extensions
        .remove::<RequestIdentity>()
        .map(|identity| identity.identity.username);

    audit_log(&AuditEvent::Logout {
        username: username.clone(),
        ip_address,
    });

    username
}
