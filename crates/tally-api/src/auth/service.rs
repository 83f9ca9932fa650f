//! Authentication service layer
//!
//! Provides business logic for registration, login, token refresh, profile
//! retrieval and password change. Every operation raises a typed
//! [`AuthError`]; choosing status codes is left to the HTTP boundary.

use super::jwt::{JwtError, TokenKind, TokenPair, TokenService};
use super::models::{
    AuthResponse, ChangePasswordRequest, LoginRequest, RefreshRequest, RegisterRequest, UserInfo,
};
use super::password::{hash_password_with_config, verify_password, PasswordConfig};
use chrono::Utc;
use std::sync::Arc;
use tally_core::{CredentialStore, Identity, TallyError, UserResolver};
use thiserror::Error;
use tokio::sync::OnceCell;

/// Hashed once and verified against when a login names an unknown user
const DECOY_PASSWORD: &str = "decoy-password-never-assigned";

/// Authentication failures
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Username already exists")]
    DuplicateUsername,

    #[error("Email already exists")]
    DuplicateEmail,

    /// Unknown username or wrong password; deliberately indistinguishable
    #[error("Invalid username or password")]
    InvalidCredentials,

    #[error("Account is disabled")]
    AccountDisabled,

    #[error("Current password is incorrect")]
    IncorrectPassword,

    #[error("Invalid or expired token")]
    InvalidToken,

    #[error("User not found")]
    UserNotFound,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<TallyError> for AuthError {
    fn from(err: TallyError) -> Self {
        match err {
            TallyError::DuplicateKey(field) if field == "username" => AuthError::DuplicateUsername,
            TallyError::DuplicateKey(field) if field == "email" => AuthError::DuplicateEmail,
            other => AuthError::Internal(other.to_string()),
        }
    }
}

impl From<JwtError> for AuthError {
    fn from(err: JwtError) -> Self {
        match err {
            JwtError::EncodingError(e) => AuthError::Internal(format!("token encoding: {e}")),
            JwtError::SystemTimeError(e) => AuthError::Internal(format!("system clock: {e}")),
            JwtError::LifetimeOverflow => {
                AuthError::Internal("token lifetime overflows the clock".to_string())
            }
            _ => AuthError::InvalidToken,
        }
    }
}

/// Authentication service
///
/// Built once at startup and shared by all requests.
#[derive(Clone)]
pub struct AuthService {
    store: Arc<dyn CredentialStore>,
    tokens: Arc<TokenService>,
    password_config: PasswordConfig,
    decoy_hash: Arc<OnceCell<String>>,
}

impl AuthService {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        tokens: Arc<TokenService>,
        password_config: PasswordConfig,
    ) -> Self {
        Self {
            store,
            tokens,
            password_config,
            decoy_hash: Arc::new(OnceCell::new()),
        }
    }

    /// Compute the decoy hash ahead of the first login
    pub async fn prepare(&self) -> Result<(), AuthError> {
        self.decoy_hash().await.map(|_| ())
    }

    /// Register a new identity and sign it in
    ///
    /// New identities get role `USER` and start active and verified.
    pub async fn register(&self, request: RegisterRequest) -> Result<AuthResponse, AuthError> {
        if self.store.exists_by_username(&request.username).await? {
            return Err(AuthError::DuplicateUsername);
        }
        if self.store.exists_by_email(&request.email).await? {
            return Err(AuthError::DuplicateEmail);
        }

        let password_hash = self.hash(request.password).await?;
        let identity = Identity::new(
            request.username,
            request.email,
            password_hash,
            request.first_name,
            request.last_name,
        );

        // The store enforces uniqueness again, covering concurrent registrations
        let identity = self.store.save(identity).await?;
        tracing::info!(username = %identity.username, id = ?identity.id, "identity registered");

        self.respond(&identity)
    }

    /// Authenticate with username and password
    ///
    /// Updates `last_login` and issues a fresh token pair. An unknown
    /// username costs the same Argon2 verification as a wrong password.
    pub async fn login(&self, request: LoginRequest) -> Result<AuthResponse, AuthError> {
        let Some(identity) = self.store.find_by_username(&request.username).await? else {
            let decoy = self.decoy_hash().await?;
            self.verify(request.password, decoy).await?;
            return Err(AuthError::InvalidCredentials);
        };

        if !self
            .verify(request.password, identity.password_hash.clone())
            .await?
        {
            return Err(AuthError::InvalidCredentials);
        }

        if !identity.is_active {
            return Err(AuthError::AccountDisabled);
        }

        // Only last_login is written, so a concurrent password change is kept
        let identity = self
            .store
            .record_login(&identity.username, Utc::now())
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        self.respond(&identity)
    }

    /// Exchange a refresh token for a brand-new token pair
    ///
    /// The presented refresh token is not invalidated server-side.
    pub async fn refresh(&self, request: RefreshRequest) -> Result<AuthResponse, AuthError> {
        let subject = self
            .tokens
            .extract_subject(&request.refresh_token, TokenKind::Refresh)
            .map_err(|e| {
                tracing::debug!(error = %e, "refresh token rejected");
                AuthError::InvalidToken
            })?;

        let identity = self
            .store
            .resolve(&subject)
            .await?
            .ok_or(AuthError::InvalidToken)?;

        if !self
            .tokens
            .is_valid(&request.refresh_token, &identity, TokenKind::Refresh)
        {
            return Err(AuthError::InvalidToken);
        }

        if !identity.is_active {
            return Err(AuthError::InvalidToken);
        }

        self.respond(&identity)
    }

    /// Public profile of `username`
    pub async fn get_profile(&self, username: &str) -> Result<UserInfo, AuthError> {
        let identity = self
            .store
            .find_by_username(username)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        Ok(UserInfo::from(&identity))
    }

    /// Replace the password of `username` after checking the current one
    pub async fn change_password(
        &self,
        username: &str,
        request: ChangePasswordRequest,
    ) -> Result<(), AuthError> {
        let mut identity = self
            .store
            .find_by_username(username)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        if !self
            .verify(request.current_password, identity.password_hash.clone())
            .await?
        {
            return Err(AuthError::IncorrectPassword);
        }

        // Hash and timestamp travel in one save
        identity.password_hash = self.hash(request.new_password).await?;
        identity.updated_at = Some(Utc::now());
        self.store.save(identity).await?;

        Ok(())
    }

    fn respond(&self, identity: &Identity) -> Result<AuthResponse, AuthError> {
        let TokenPair {
            access_token,
            refresh_token,
        } = self.tokens.issue_pair(identity)?;

        Ok(AuthResponse {
            access_token,
            refresh_token,
            token_type: "Bearer".to_string(),
            expires_in: self.tokens.access_expiration_secs(),
            user: UserInfo::from(identity),
        })
    }

    async fn decoy_hash(&self) -> Result<String, AuthError> {
        self.decoy_hash
            .get_or_try_init(|| self.hash(DECOY_PASSWORD.to_string()))
            .await
            .cloned()
    }

    async fn hash(&self, password: String) -> Result<String, AuthError> {
        let config = self.password_config.clone();
        tokio::task::spawn_blocking(move || hash_password_with_config(&password, &config))
            .await
            .map_err(|e| AuthError::Internal(format!("password hashing task failed: {e}")))?
            .map_err(|e| AuthError::Internal(e.to_string()))
    }

    async fn verify(&self, password: String, hash: String) -> Result<bool, AuthError> {
        tokio::task::spawn_blocking(move || verify_password(&password, &hash))
            .await
            .map_err(|e| AuthError::Internal(format!("password verification task failed: {e}")))
    }
}
