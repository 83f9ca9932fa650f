//! JWT token generation and validation
//!
//! Implements the token service with HMAC-SHA256 signing. Access and refresh
//! tokens share one claim shape and are told apart by the `kind` claim; a
//! token of one kind is rejected wherever the other is expected.

use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use tally_core::config::SecurityConfig;
use tally_core::Identity;
use thiserror::Error;
use uuid::Uuid;

/// Which job a token was issued for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

impl std::fmt::Display for TokenKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenKind::Access => f.write_str("access"),
            TokenKind::Refresh => f.write_str("refresh"),
        }
    }
}

/// JWT Claims structure
///
/// Only the subject is trusted from a token. Role and account state are
/// re-read from the credential store on every use.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Token issuer
    pub iss: String,
    /// Subject - username
    pub sub: String,
    /// JWT ID - unique per issued token
    pub jti: String,
    /// Issued at timestamp (Unix epoch)
    pub iat: u64,
    /// Expiration timestamp (Unix epoch)
    pub exp: u64,
    /// Access or refresh
    pub kind: TokenKind,
}

/// JWT token generation and validation errors
#[derive(Debug, Error)]
pub enum JwtError {
    #[error("Failed to encode JWT: {0}")]
    EncodingError(#[from] jsonwebtoken::errors::Error),

    #[error("Invalid token format")]
    InvalidToken,

    #[error("Token has expired")]
    ExpiredToken,

    #[error("Invalid token signature")]
    InvalidSignature,

    #[error("Expected {expected} token, got {found} token")]
    WrongKind { expected: TokenKind, found: TokenKind },

    #[error("Token lifetime overflows the expiry timestamp")]
    LifetimeOverflow,

    #[error("System time error: {0}")]
    SystemTimeError(#[from] std::time::SystemTimeError),
}

/// JWT Configuration
#[derive(Clone)]
pub struct JwtConfig {
    /// Secret key for HMAC signing
    pub secret: String,
    /// Token issuer identifier
    pub issuer: String,
    /// Access token lifetime in seconds (default: 86400 = 24 hours)
    pub access_expiration_secs: u64,
    /// Refresh token lifetime in seconds (default: 604800 = 7 days)
    pub refresh_expiration_secs: u64,
}

impl Default for JwtConfig {
    fn default() -> Self {
        Self::from(&SecurityConfig::default())
    }
}

impl From<&SecurityConfig> for JwtConfig {
    fn from(security: &SecurityConfig) -> Self {
        Self {
            secret: security.jwt_secret.clone(),
            issuer: security.jwt_issuer.clone(),
            access_expiration_secs: security.access_token_ttl_secs,
            refresh_expiration_secs: security.refresh_token_ttl_secs,
        }
    }
}

impl std::fmt::Debug for JwtConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtConfig")
            .field("secret", &"<redacted>")
            .field("issuer", &self.issuer)
            .field("access_expiration_secs", &self.access_expiration_secs)
            .field("refresh_expiration_secs", &self.refresh_expiration_secs)
            .finish()
    }
}

/// Access/refresh token pair returned by login, registration and refresh
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Token service
///
/// Holds the signing key for the life of the process; it is never rotated
/// while running. Every method is a pure function of the token, the clock and
/// the key, so the service is shared freely across requests.
#[derive(Clone)]
pub struct TokenService {
    config: JwtConfig,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl TokenService {
    pub fn new(config: JwtConfig) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&config.issuer]);
        validation.set_required_spec_claims(&["exp", "iss", "sub"]);
        validation.leeway = 0;

        Self {
            encoding_key: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.secret.as_bytes()),
            validation,
            config,
        }
    }

    /// Access token lifetime, reported to clients as `expiresIn`
    pub fn access_expiration_secs(&self) -> u64 {
        self.config.access_expiration_secs
    }

    pub fn issue_access_token(&self, identity: &Identity) -> Result<String, JwtError> {
        self.issue(identity, TokenKind::Access, self.config.access_expiration_secs)
    }

    pub fn issue_refresh_token(&self, identity: &Identity) -> Result<String, JwtError> {
        self.issue(identity, TokenKind::Refresh, self.config.refresh_expiration_secs)
    }

    pub fn issue_pair(&self, identity: &Identity) -> Result<TokenPair, JwtError> {
        Ok(TokenPair {
            access_token: self.issue_access_token(identity)?,
            refresh_token: self.issue_refresh_token(identity)?,
        })
    }

    fn issue(
        &self,
        identity: &Identity,
        kind: TokenKind,
        lifetime_secs: u64,
    ) -> Result<String, JwtError> {
        let now = SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs();

        let claims = Claims {
            iss: self.config.issuer.clone(),
            sub: identity.username.clone(),
            jti: Uuid::new_v4().to_string(),
            iat: now,
            exp: now
                .checked_add(lifetime_secs)
                .ok_or(JwtError::LifetimeOverflow)?,
            kind,
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)?;
        Ok(token)
    }

    /// Verify signature, issuer and expiry, then return the claims
    pub fn decode(&self, token: &str) -> Result<Claims, JwtError> {
        let token_data = decode::<Claims>(token, &self.decoding_key, &self.validation).map_err(
            |e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => JwtError::ExpiredToken,
                jsonwebtoken::errors::ErrorKind::InvalidSignature => JwtError::InvalidSignature,
                _ => JwtError::InvalidToken,
            },
        )?;

        Ok(token_data.claims)
    }

    /// Return the subject of a verified token of the expected kind
    pub fn extract_subject(&self, token: &str, expected: TokenKind) -> Result<String, JwtError> {
        let claims = self.decode(token)?;
        if claims.kind != expected {
            return Err(JwtError::WrongKind {
                expected,
                found: claims.kind,
            });
        }
        Ok(claims.sub)
    }

    /// True iff the token verifies, is unexpired, has the expected kind and
    /// names `identity` as its subject
    pub fn is_valid(&self, token: &str, identity: &Identity, expected: TokenKind) -> bool {
        self.extract_subject(token, expected)
            .map(|subject| subject == identity.username)
            .unwrap_or(false)
    }
}
