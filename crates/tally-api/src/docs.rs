//! OpenAPI document
//!
//! Served as JSON at `/api-docs/openapi.json`.

use crate::auth::{
    AuthResponse, ChangePasswordRequest, LoginRequest, MessageResponse, RefreshRequest,
    RegisterRequest, UserInfo,
};
use crate::error::ApiError;
use crate::handlers::{admin, auth, health};
use axum::Json;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

#[derive(OpenApi)]
#[openapi(
    info(title = "Tally API", description = "Identity and access control"),
    paths(
        auth::register_handler,
        auth::login_handler,
        auth::refresh_handler,
        auth::profile_handler,
        auth::change_password_handler,
        auth::logout_handler,
        admin::get_user_handler,
        health::health_check,
        health::readiness_check,
    ),
    components(schemas(
        RegisterRequest,
        LoginRequest,
        RefreshRequest,
        ChangePasswordRequest,
        AuthResponse,
        UserInfo,
        MessageResponse,
        ApiError,
        health::HealthResponse,
        health::ReadinessResponse,
    )),
    modifiers(&BearerAuth),
    tags(
        (name = "auth", description = "Registration, login and session endpoints"),
        (name = "admin", description = "Administrative endpoints"),
        (name = "health", description = "Liveness and readiness probes"),
    )
)]
pub struct ApiDoc;

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

pub async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_lists_routes() {
        let doc = ApiDoc::openapi();
        let paths: Vec<&String> = doc.paths.paths.keys().collect();

        for expected in [
            "/auth/register",
            "/auth/login",
            "/auth/refresh-token",
            "/auth/profile",
            "/auth/change-password",
            "/auth/logout",
            "/admin/users/{username}",
            "/health",
        ] {
            assert!(
                paths.iter().any(|p| p.as_str() == expected),
                "missing {expected}"
            );
        }
    }

    #[test]
    fn test_profile_documents_not_found() {
        let doc = ApiDoc::openapi();
        for path in ["/auth/profile", "/auth/change-password"] {
            let item = doc.paths.paths.get(path).unwrap();
            let operation = item.operations.values().next().unwrap();
            assert!(
                operation.responses.responses.contains_key("404"),
                "{path} should document 404"
            );
        }
    }

    #[test]
    fn test_bearer_scheme_registered() {
        let doc = ApiDoc::openapi();
        let components = doc.components.unwrap();
        assert!(components.security_schemes.contains_key("bearer_auth"));
    }
}
