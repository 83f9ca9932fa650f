//! Application state management

use crate::auth::{AccessPolicy, AuthService, JwtConfig, PasswordConfig, TokenService};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tally_core::config::AppConfig;
use tally_core::{CredentialStore, InMemoryCredentialStore};

/// Application state shared across handlers
///
/// Everything here is immutable after startup except the ready flag; the
/// credential store is the only shared mutable resource and guards itself.
pub struct AppState {
    /// Application configuration
    pub config: AppConfig,
    /// Server start time
    pub start_time: Instant,
    /// Ready status
    pub is_ready: AtomicBool,
    /// Credential store backing every identity lookup
    pub store: Arc<dyn CredentialStore>,
    /// Name of the store backend, reported by readiness
    pub store_backend: &'static str,
    /// Token service built from the configured signing key
    pub tokens: Arc<TokenService>,
    /// Authentication service
    pub auth: AuthService,
    /// Route access policy
    pub policy: AccessPolicy,
}

impl AppState {
    /// Create application state over `store`
    pub fn new(config: AppConfig, store: Arc<dyn CredentialStore>, store_backend: &'static str) -> Self {
        let tokens = Arc::new(TokenService::new(JwtConfig::from(&config.security)));
        let auth = AuthService::new(
            store.clone(),
            tokens.clone(),
            PasswordConfig::from(&config.security),
        );

        Self {
            config,
            start_time: Instant::now(),
            is_ready: AtomicBool::new(true),
            store,
            store_backend,
            tokens,
            auth,
            policy: AccessPolicy::standard(),
        }
    }

    /// State backed by a fresh in-memory credential store
    pub fn in_memory(config: AppConfig) -> Self {
        Self::new(config, Arc::new(InMemoryCredentialStore::new()), "memory")
    }

    /// Replace the access policy
    pub fn with_policy(mut self, policy: AccessPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Get uptime in seconds
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    pub fn is_ready(&self) -> bool {
        self.is_ready.load(Ordering::SeqCst)
    }

    pub fn set_ready(&self, ready: bool) {
        self.is_ready.store(ready, Ordering::SeqCst);
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::in_memory(AppConfig::default())
    }
}
