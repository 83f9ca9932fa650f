//! Tally Core
//!
//! Identity model, credential storage seam and configuration shared by the
//! Tally API server and the operator CLI.

pub mod config;
pub mod identity;
pub mod store;

pub use identity::{Identity, Role};
pub use store::{CredentialStore, InMemoryCredentialStore, UserResolver};

use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Core error type
#[derive(Error, Debug)]
pub enum TallyError {
    #[error("Entity not found: {0}")]
    NotFound(String),

    /// A unique column (`username` or `email`) already holds the value
    #[error("Duplicate value for unique field: {0}")]
    DuplicateKey(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, TallyError>;

impl From<config::ConfigError> for TallyError {
    fn from(err: config::ConfigError) -> Self {
        TallyError::Config(err.to_string())
    }
}
