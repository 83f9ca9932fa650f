//! Authentication and authorization module
//!
//! - Token issuing and validation (HS256 JWT)
//! - Password hashing with Argon2id and the password policy
//! - Authentication service: register, login, refresh, profile, password change
//! - Middleware establishing the per-request identity
//! - Declarative access policy
//! - PostgreSQL credential store

pub mod jwt;
pub mod logout;
pub mod middleware;
pub mod models;
pub mod password;
pub mod policy;
pub mod repository;
pub mod service;

pub use jwt::{Claims, JwtConfig, JwtError, TokenKind, TokenPair, TokenService};
pub use logout::clear_request_identity;
pub use middleware::{
    authenticate, authenticate_request, bearer_token, AuthenticationFailure, RequestIdentity,
};
pub use models::{
    AuthResponse, ChangePasswordRequest, LoginRequest, MessageResponse, RefreshRequest,
    RegisterRequest, UserInfo,
};
pub use password::{
    hash_password, hash_password_with_config, validate_password_strength, verify_password,
    PasswordConfig, PasswordError,
};
pub use policy::{enforce_access, AccessPolicy, AccessRule, Decision, Requirement};
pub use repository::PgCredentialStore;
pub use service::{AuthError, AuthService};
