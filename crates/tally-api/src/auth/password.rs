/// Password hashing and verification using Argon2id
///
/// - Algorithm: Argon2id (memory-hard, resistant to GPU attacks)
/// - Salt: 16 bytes random, embedded in the PHC string
/// - Cost parameters come from `SecurityConfig`
///
/// Verification goes through `argon2`'s constant-time comparison.
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2, Params,
};
use tally_core::config::SecurityConfig;
use thiserror::Error;

/// Characters that satisfy the "special character" rule
pub const SPECIAL_CHARACTERS: &str = "@$!%*?&";

/// Minimum accepted password length
pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Password hashing errors
#[derive(Debug, Error)]
pub enum PasswordError {
    #[error("Failed to hash password: {0}")]
    HashingFailed(String),

    #[error("Invalid Argon2 parameters: {0}")]
    InvalidParams(String),
}

/// Password hashing configuration
#[derive(Debug, Clone)]
pub struct PasswordConfig {
    /// Memory cost in KiB (default: 65536 = 64 MiB)
    pub memory_cost: u32,
    /// Time cost (iterations, default: 3)
    pub time_cost: u32,
    /// Parallelism (lanes, default: 4)
    pub parallelism: u32,
}

impl Default for PasswordConfig {
    fn default() -> Self {
        Self::from(&SecurityConfig::default())
    }
}

impl From<&SecurityConfig> for PasswordConfig {
    fn from(security: &SecurityConfig) -> Self {
        Self {
            memory_cost: security.password_memory_kib,
            time_cost: security.password_iterations,
            parallelism: security.password_parallelism,
        }
    }
}

impl PasswordConfig {
    fn to_params(&self) -> Result<Params, PasswordError> {
        Params::new(self.memory_cost, self.time_cost, self.parallelism, Some(32))
            .map_err(|e| PasswordError::InvalidParams(e.to_string()))
    }
}

/// Hash a plaintext password with default parameters
pub fn hash_password(password: &str) -> Result<String, PasswordError> {
    hash_password_with_config(password, &PasswordConfig::default())
}

/// Hash a password with custom configuration
///
/// Returns a PHC string (`$argon2id$v=19$m=...`) carrying algorithm,
/// parameters and salt, so no separate salt storage is needed.
pub fn hash_password_with_config(
    password: &str,
    config: &PasswordConfig,
) -> Result<String, PasswordError> {
    let salt = SaltString::generate(&mut OsRng);

    let params = config.to_params()?;
    let argon2 = Argon2::new(argon2::Algorithm::Argon2id, argon2::Version::V0x13, params);

    let password_hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| PasswordError::HashingFailed(e.to_string()))?;

    Ok(password_hash.to_string())
}

/// Verify a plaintext password against a stored hash
///
/// A stored hash that does not parse counts as a mismatch.
pub fn verify_password(password: &str, hash: &str) -> bool {
    let parsed_hash = match PasswordHash::new(hash) {
        Ok(parsed) => parsed,
        Err(e) => {
            tracing::warn!(error = %e, "stored password hash is malformed");
            return false;
        }
    };

    // Parameters are read back from the PHC string
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok()
}

/// Validate password strength
///
/// - At least 8 characters
/// - At least 1 uppercase letter
/// - At least 1 lowercase letter
/// - At least 1 digit
/// - At least 1 of `@$!%*?&`
pub fn validate_password_strength(password: &str) -> Result<(), String> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err("Password must be at least 8 characters long".to_string());
    }

    if !password.chars().any(|c| c.is_uppercase()) {
        return Err("Password must contain at least one uppercase letter".to_string());
    }

    if !password.chars().any(|c| c.is_lowercase()) {
        return Err("Password must contain at least one lowercase letter".to_string());
    }

    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Err("Password must contain at least one digit".to_string());
    }

    if !password.chars().any(|c| SPECIAL_CHARACTERS.contains(c)) {
        return Err(format!(
            "Password must contain at least one special character ({SPECIAL_CHARACTERS})"
        ));
    }

    Ok(())
}
