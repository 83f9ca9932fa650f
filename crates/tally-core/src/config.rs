//! Tally Configuration Management
//!
//! Handles configuration from environment variables and TOML files with
//! sensible defaults for development.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Signing secret used when none is configured. Startup warns when it is in use.
pub const DEVELOPMENT_JWT_SECRET: &str = "development-secret-key-change-in-production";

/// Longest accepted token lifetime (10 years)
pub const MAX_TOKEN_TTL_SECS: u64 = 10 * 365 * 86_400;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Server configuration
    pub server: ServerConfig,

    /// Credential store connection
    pub database: DatabaseConfig,

    /// Token signing and password hashing
    pub security: SecurityConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env()?;
        Ok(config)
    }

    /// Load from a TOML file
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::FileReadError {
            path: path.clone(),
            source: e,
        })?;

        Self::from_toml_str(&content).map_err(|message| ConfigError::ParseError { path, message })
    }

    fn from_toml_str(content: &str) -> Result<Self, String> {
        toml::from_str(content).map_err(|e| e.to_string())
    }

    /// Merge with environment variables (env takes precedence)
    pub fn with_env_override(mut self) -> Result<Self, ConfigError> {
        self.apply_env()?;
        Ok(self)
    }

    /// Check invariants that defaults cannot guarantee
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.security.jwt_secret.trim().is_empty() {
            return Err(ConfigError::MissingRequired("JWT_SECRET".to_string()));
        }
        check_ttl(
            "JWT_ACCESS_EXPIRATION_SECS",
            self.security.access_token_ttl_secs,
        )?;
        check_ttl(
            "JWT_REFRESH_EXPIRATION_SECS",
            self.security.refresh_token_ttl_secs,
        )?;
        Ok(())
    }

    fn apply_env(&mut self) -> Result<(), ConfigError> {
        // Server
        if let Ok(host) = std::env::var("API_HOST") {
            self.server.host = host;
        }
        if let Some(port) = parse_env("API_PORT")? {
            self.server.port = port;
        }
        if let Ok(origins) = std::env::var("CORS_ORIGINS") {
            self.server.cors_origins = origins
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }

        // PostgreSQL
        if let Ok(url) = std::env::var("DATABASE_URL") {
            self.database.url = Some(url);
        }
        if let Some(size) = parse_env("DATABASE_POOL_SIZE")? {
            self.database.pool_size = size;
        }

        // Security
        if let Ok(secret) = std::env::var("JWT_SECRET") {
            self.security.jwt_secret = secret;
        }
        if let Ok(issuer) = std::env::var("JWT_ISSUER") {
            self.security.jwt_issuer = issuer;
        }
        if let Some(secs) = parse_env("JWT_ACCESS_EXPIRATION_SECS")? {
            self.security.access_token_ttl_secs = secs;
        }
        if let Some(secs) = parse_env("JWT_REFRESH_EXPIRATION_SECS")? {
            self.security.refresh_token_ttl_secs = secs;
        }
        if let Some(kib) = parse_env("PASSWORD_MEMORY_KIB")? {
            self.security.password_memory_kib = kib;
        }
        if let Some(iterations) = parse_env("PASSWORD_ITERATIONS")? {
            self.security.password_iterations = iterations;
        }
        if let Some(lanes) = parse_env("PASSWORD_PARALLELISM")? {
            self.security.password_parallelism = lanes;
        }

        // Logging
        if let Ok(level) = std::env::var("LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(json) = parse_env("LOG_JSON")? {
            self.logging.json_format = json;
        }

        Ok(())
    }
}

fn check_ttl(key: &str, secs: u64) -> Result<(), ConfigError> {
    if secs == 0 || secs > MAX_TOKEN_TTL_SECS {
        return Err(ConfigError::InvalidValue {
            key: key.to_string(),
            value: secs.to_string(),
        });
    }
    Ok(())
}

fn parse_env<T: std::str::FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    match std::env::var(key) {
        Ok(value) => value
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue {
                key: key.to_string(),
                value,
            }),
        Err(_) => Ok(None),
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Allowed origins for CORS
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            // Empty by default - set via CORS_ORIGINS env var
            cors_origins: vec![],
        }
    }
}

/// Credential store connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL; the in-memory store is used when unset
    pub url: Option<String>,

    /// Connection pool size
    pub pool_size: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            pool_size: 10,
        }
    }
}

/// Token signing and password hashing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// HMAC-SHA256 signing secret
    #[serde(skip_serializing)]
    pub jwt_secret: String,

    /// Token issuer (`iss` claim)
    pub jwt_issuer: String,

    /// Access token lifetime in seconds (default: 86400 = 24 hours)
    pub access_token_ttl_secs: u64,

    /// Refresh token lifetime in seconds (default: 604800 = 7 days)
    pub refresh_token_ttl_secs: u64,

    /// Argon2 memory cost in KiB (default: 65536 = 64 MiB)
    pub password_memory_kib: u32,

    /// Argon2 iterations
    pub password_iterations: u32,

    /// Argon2 lanes
    pub password_parallelism: u32,
}

impl SecurityConfig {
    pub fn uses_development_secret(&self) -> bool {
        self.jwt_secret == DEVELOPMENT_JWT_SECRET
    }
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            jwt_secret: DEVELOPMENT_JWT_SECRET.to_string(),
            jwt_issuer: "tally".to_string(),
            access_token_ttl_secs: 86_400,
            refresh_token_ttl_secs: 604_800,
            password_memory_kib: 65_536,
            password_iterations: 3,
            password_parallelism: 4,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// JSON format for logs
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("Missing required configuration: {0}")]
    MissingRequired(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.security.access_token_ttl_secs, 86_400);
        assert_eq!(config.security.refresh_token_ttl_secs, 604_800);
        assert!(config.database.url.is_none());
        assert!(config.security.uses_development_secret());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = AppConfig::from_toml_str(
            r#"
            [server]
            port = 9090

            [security]
            jwt_secret = "from-file"
            "#,
        )
        .unwrap();

        assert_eq!(config.server.port, 9090);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.security.jwt_secret, "from-file");
        assert_eq!(config.security.jwt_issuer, "tally");
    }

    #[test]
    fn test_invalid_toml() {
        assert!(AppConfig::from_toml_str("[server\nport = ").is_err());
    }

    #[test]
    fn test_missing_file() {
        let err = AppConfig::from_file("/nonexistent/tally.toml").unwrap_err();
        assert!(matches!(err, ConfigError::FileReadError { .. }));
    }

    #[test]
    fn test_validate_rejects_empty_secret() {
        let mut config = AppConfig::default();
        config.security.jwt_secret = "  ".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingRequired(_))
        ));
    }

    #[test]
    fn test_validate_bounds_token_lifetimes() {
        let mut config = AppConfig::default();
        config.security.access_token_ttl_secs = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { ref key, .. }) if key == "JWT_ACCESS_EXPIRATION_SECS"
        ));

        let mut config = AppConfig::default();
        config.security.refresh_token_ttl_secs = u64::MAX;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { ref key, .. }) if key == "JWT_REFRESH_EXPIRATION_SECS"
        ));

        config.security.refresh_token_ttl_secs = MAX_TOKEN_TTL_SECS;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_secret_is_not_serialized() {
        let mut config = AppConfig::default();
        config.security.jwt_secret = "super-secret".to_string();
        let rendered = toml::to_string(&config).unwrap();
        assert!(!rendered.contains("super-secret"));
    }
}
