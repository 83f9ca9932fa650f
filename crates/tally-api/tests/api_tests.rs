//! API Integration Tests
//!
//! Drive the full router in-process against the in-memory credential store
//! with cheap Argon2 parameters.

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tally_api::auth::{hash_password_with_config, PasswordConfig};
use tally_api::{create_router, state::AppState};
use tally_core::config::AppConfig;
use tally_core::{CredentialStore, Identity, InMemoryCredentialStore, Role};
use tower::ServiceExt;

struct TestApp {
    router: Router,
    store: Arc<InMemoryCredentialStore>,
}

fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.security.jwt_secret = "integration-test-secret".to_string();
    config.security.password_memory_kib = 1024;
    config.security.password_iterations = 1;
    config.security.password_parallelism = 1;
    config
}

fn test_app() -> TestApp {
    let store = Arc::new(InMemoryCredentialStore::new());
    let state = AppState::new(test_config(), store.clone(), "memory");
    TestApp {
        router: create_router(Arc::new(state)),
        store,
    }
}

impl TestApp {
    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = serde_json::from_slice(&body).unwrap_or(Value::Null);
        (status, json)
    }

    async fn register_alice(&self) -> Value {
        let (status, body) = self
            .send(json_request("POST", "/auth/register", None, alice()))
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body
    }

    async fn login(&self, username: &str, password: &str) -> (StatusCode, Value) {
        self.send(json_request(
            "POST",
            "/auth/login",
            None,
            json!({ "username": username, "password": password }),
        ))
        .await
    }

    /// Store an identity directly, bypassing registration
    async fn seed(&self, username: &str, password: &str, role: Role) {
        let config = PasswordConfig::from(&test_config().security);
        let hash = hash_password_with_config(password, &config).unwrap();
        self.store
            .save(
                Identity::new(username, format!("{username}@x.com"), hash, "Seed", "User")
                    .with_role(role),
            )
            .await
            .unwrap();
    }
}

fn alice() -> Value {
    json!({
        "username": "alice",
        "email": "alice@x.com",
        "password": "Passw0rd!",
        "firstName": "Alice",
        "lastName": "A"
    })
}

fn json_request(method: &str, uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder
        .body(Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap()
}

fn get(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::empty()).unwrap()
}

fn token(body: &Value, field: &str) -> String {
    body[field].as_str().unwrap().to_string()
}

// =============================================================================
// Public endpoints
// =============================================================================

#[tokio::test]
async fn test_health_check() {
    let app = test_app();
    let (status, body) = app.send(get("/health", None)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert!(body["version"].is_string());
}

#[tokio::test]
async fn test_readiness_check() {
    let app = test_app();
    let (status, body) = app.send(get("/ready", None)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ready"], true);
    assert_eq!(body["credential_store"], "memory");
}

#[tokio::test]
async fn test_openapi_document_is_public() {
    let app = test_app();
    let (status, body) = app.send(get("/api-docs/openapi.json", None)).await;

    assert_eq!(status, StatusCode::OK);
    assert!(body["paths"]["/auth/login"].is_object());
}

#[tokio::test]
async fn test_public_route_ignores_garbage_credentials() {
    let app = test_app();
    app.register_alice().await;

    let request = Request::builder()
        .method("POST")
        .uri("/auth/login")
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::AUTHORIZATION, "Bearer not.a.token")
        .body(Body::from(
            json!({ "username": "alice", "password": "Passw0rd!" }).to_string(),
        ))
        .unwrap();
    let (status, _) = app.send(request).await;

    assert_eq!(status, StatusCode::OK);
}

// =============================================================================
// Registration
// =============================================================================

#[tokio::test]
async fn test_register_returns_token_envelope() {
    let app = test_app();
    let body = app.register_alice().await;

    assert!(!token(&body, "accessToken").is_empty());
    assert!(!token(&body, "refreshToken").is_empty());
    assert_eq!(body["tokenType"], "Bearer");
    assert_eq!(body["expiresIn"], 86_400);
    assert_eq!(body["user"]["username"], "alice");
    assert_eq!(body["user"]["role"], "USER");
    assert_eq!(body["user"]["isActive"], true);
    assert_eq!(body["user"]["isVerified"], true);
    assert!(body["user"].get("passwordHash").is_none());
}

#[tokio::test]
async fn test_register_duplicate_username_and_email() {
    let app = test_app();
    app.register_alice().await;

    let (status, body) = app
        .send(json_request("POST", "/auth/register", None, alice()))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "DUPLICATE_USERNAME");

    let mut same_email = alice();
    same_email["username"] = json!("alice2");
    let (status, body) = app
        .send(json_request("POST", "/auth/register", None, same_email))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "DUPLICATE_EMAIL");

    assert_eq!(app.store.len().await, 1);
}

#[tokio::test]
async fn test_register_validation_errors() {
    let app = test_app();
    let mut invalid = alice();
    invalid["username"] = json!("al");
    invalid["email"] = json!("not-an-email");
    invalid["password"] = json!("password");

    let (status, body) = app
        .send(json_request("POST", "/auth/register", None, invalid))
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");
    assert!(body["fields"]["username"].is_array());
    assert!(body["fields"]["email"].is_array());
    assert!(body["fields"]["password"].is_array());
    assert!(app.store.is_empty().await);
}

// =============================================================================
// Login
// =============================================================================

#[tokio::test]
async fn test_login_wrong_password() {
    let app = test_app();
    app.register_alice().await;

    let (status, body) = app.login("alice", "wrongpass").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "INVALID_CREDENTIALS");

    let stored = app.store.find_by_username("alice").await.unwrap().unwrap();
    assert!(stored.last_login.is_none());
}

#[tokio::test]
async fn test_login_unknown_user_looks_like_wrong_password() {
    let app = test_app();
    let (status, body) = app.login("ghost", "Passw0rd!").await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "INVALID_CREDENTIALS");
}

#[tokio::test]
async fn test_login_issues_fresh_tokens() {
    let app = test_app();
    let registered = app.register_alice().await;

    let (status, body) = app.login("alice", "Passw0rd!").await;
    assert_eq!(status, StatusCode::OK);
    assert_ne!(token(&body, "accessToken"), token(&registered, "accessToken"));
    assert_ne!(token(&body, "refreshToken"), token(&registered, "refreshToken"));
    assert!(body["user"]["lastLogin"].is_string());
}

#[tokio::test]
async fn test_login_disabled_account() {
    let app = test_app();
    let registered = app.register_alice().await;
    let access = token(&registered, "accessToken");

    let mut stored = app.store.find_by_username("alice").await.unwrap().unwrap();
    stored.is_active = false;
    app.store.save(stored).await.unwrap();

    let (status, body) = app.login("alice", "Passw0rd!").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "ACCOUNT_DISABLED");

    // Tokens issued before the account was disabled no longer authenticate
    let (status, _) = app.send(get("/auth/profile", Some(&access))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

// =============================================================================
// Profile and request authentication
// =============================================================================

#[tokio::test]
async fn test_profile_requires_valid_access_token() {
    let app = test_app();
    let registered = app.register_alice().await;

    let (status, body) = app
        .send(get("/auth/profile", Some(&token(&registered, "accessToken"))))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["username"], "alice");
    assert_eq!(body["email"], "alice@x.com");
    assert_eq!(body["firstName"], "Alice");

    let (status, body) = app.send(get("/auth/profile", None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "UNAUTHORIZED");

    let (status, _) = app.send(get("/auth/profile", Some("garbage"))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // A refresh token is not an access token
    let (status, _) = app
        .send(get("/auth/profile", Some(&token(&registered, "refreshToken"))))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_authorization_header_without_bearer_prefix() {
    let app = test_app();
    let registered = app.register_alice().await;

    let request = Request::builder()
        .uri("/auth/profile")
        .header(header::AUTHORIZATION, token(&registered, "accessToken"))
        .body(Body::empty())
        .unwrap();
    let (status, _) = app.send(request).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_unknown_route_requires_authentication() {
    let app = test_app();
    let (status, _) = app.send(get("/expenses", None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

// =============================================================================
// Refresh
// =============================================================================

#[tokio::test]
async fn test_refresh_rotates_token_pair() {
    let app = test_app();
    let registered = app.register_alice().await;
    let refresh = token(&registered, "refreshToken");

    let (status, body) = app
        .send(json_request(
            "POST",
            "/auth/refresh-token",
            None,
            json!({ "refreshToken": refresh }),
        ))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_ne!(token(&body, "accessToken"), token(&registered, "accessToken"));
    assert_ne!(token(&body, "refreshToken"), refresh);
    assert_eq!(body["user"]["username"], "alice");

    let (status, _) = app
        .send(get("/auth/profile", Some(&token(&body, "accessToken"))))
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_refresh_rejects_invalid_tokens() {
    let app = test_app();
    let registered = app.register_alice().await;

    for candidate in ["not-a-token".to_string(), token(&registered, "accessToken")] {
        let (status, body) = app
            .send(json_request(
                "POST",
                "/auth/refresh-token",
                None,
                json!({ "refreshToken": candidate }),
            ))
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["code"], "INVALID_TOKEN");
    }
}

#[tokio::test]
async fn test_refresh_for_deleted_user() {
    let app = test_app();
    let registered = app.register_alice().await;
    app.store.remove("alice").await;

    let (status, body) = app
        .send(json_request(
            "POST",
            "/auth/refresh-token",
            None,
            json!({ "refreshToken": token(&registered, "refreshToken") }),
        ))
        .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "INVALID_TOKEN");
}

// =============================================================================
// Password change
// =============================================================================

#[tokio::test]
async fn test_change_password_with_wrong_current_password() {
    let app = test_app();
    let registered = app.register_alice().await;
    let before = app.store.find_by_username("alice").await.unwrap().unwrap();

    let (status, body) = app
        .send(json_request(
            "PUT",
            "/auth/change-password",
            Some(&token(&registered, "accessToken")),
            json!({ "currentPassword": "Wr0ngPass!", "newPassword": "N3wPassw0rd!" }),
        ))
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INCORRECT_PASSWORD");

    let after = app.store.find_by_username("alice").await.unwrap().unwrap();
    assert_eq!(before.password_hash, after.password_hash);
}

#[tokio::test]
async fn test_change_password_swaps_credentials() {
    let app = test_app();
    let registered = app.register_alice().await;

    let (status, body) = app
        .send(json_request(
            "PUT",
            "/auth/change-password",
            Some(&token(&registered, "accessToken")),
            json!({ "currentPassword": "Passw0rd!", "newPassword": "N3wPassw0rd!" }),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["message"].is_string());

    let (status, _) = app.login("alice", "Passw0rd!").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = app.login("alice", "N3wPassw0rd!").await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_change_password_enforces_policy_on_new_password() {
    let app = test_app();
    let registered = app.register_alice().await;

    let (status, body) = app
        .send(json_request(
            "PUT",
            "/auth/change-password",
            Some(&token(&registered, "accessToken")),
            json!({ "currentPassword": "Passw0rd!", "newPassword": "short" }),
        ))
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["fields"]["newPassword"].is_array());
}

// =============================================================================
// Logout
// =============================================================================

#[tokio::test]
async fn test_logout() {
    let app = test_app();
    let registered = app.register_alice().await;
    let access = token(&registered, "accessToken");

    let (status, body) = app
        .send(json_request("POST", "/auth/logout", Some(&access), json!({})))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["message"].is_string());

    // No server-side revocation: the token keeps working until it expires
    let (status, _) = app.send(get("/auth/profile", Some(&access))).await;
    assert_eq!(status, StatusCode::OK);

}

#[tokio::test]
async fn test_logout_succeeds_without_a_valid_token() {
    let app = test_app();

    let (status, body) = app
        .send(json_request("POST", "/auth/logout", None, json!({})))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["message"].is_string());

    let (status, _) = app
        .send(json_request(
            "POST",
            "/auth/logout",
            Some("not.a.token"),
            json!({})
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
}

// =============================================================================
// Access control
// =============================================================================

#[tokio::test]
async fn test_admin_route_denied_for_user_role() {
    let app = test_app();
    let registered = app.register_alice().await;

    let (status, body) = app
        .send(get("/admin/users/alice", Some(&token(&registered, "accessToken"))))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "FORBIDDEN");

    let (status, _) = app.send(get("/admin/users/alice", None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_admin_route_allowed_for_admin_role() {
    let app = test_app();
    app.register_alice().await;
    app.seed("root", "Adm1nPass!", Role::Admin).await;

    let (status, login) = app.login("root", "Adm1nPass!").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(login["user"]["role"], "ADMIN");
    let access = token(&login, "accessToken");

    let (status, body) = app.send(get("/admin/users/alice", Some(&access))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["username"], "alice");

    let (status, body) = app.send(get("/admin/users/ghost", Some(&access))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_role_change_applies_to_existing_tokens() {
    let app = test_app();
    let registered = app.register_alice().await;
    let access = token(&registered, "accessToken");

    let mut stored = app.store.find_by_username("alice").await.unwrap().unwrap();
    stored.role = Role::Admin;
    app.store.save(stored).await.unwrap();

    // Roles are read from the store on every request, not from the token
    let (status, _) = app.send(get("/admin/users/alice", Some(&access))).await;
    assert_eq!(status, StatusCode::OK);
}
