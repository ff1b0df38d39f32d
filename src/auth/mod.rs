//! Authentication and role context.
//!
//! Transport access is guarded by a PSK compared in constant time. Identity
//! and role are resolved upstream and forwarded as headers; handlers receive
//! them as an explicit [`AuthContext`] instead of reading ambient state.

use axum::{
    extract::{FromRequestParts, Request},
    http::{header, request::Parts},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;

use crate::errors::AppError;

/// Header name for the API key.
pub const API_KEY_HEADER: &str = "x-api-key";
/// Header carrying the resolved user identity.
pub const USER_HEADER: &str = "x-user-id";
/// Header carrying the resolved role.
pub const ROLE_HEADER: &str = "x-user-role";

/// PSK authentication layer function that takes the expected PSK as a parameter.
pub async fn psk_auth_layer(
    expected_psk: Option<String>,
    request: Request,
    next: Next,
) -> Response {
    // If no PSK is configured, allow all requests (dev mode)
    let Some(expected) = expected_psk else {
        return next.run(request).await;
    };

    let provided = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string());

    match provided {
        Some(provided_key) => {
            if constant_time_compare(&provided_key, &expected) {
                next.run(request).await
            } else {
                unauthorized_response("Invalid API key")
            }
        }
        None => {
            // Also check Authorization header as bearer token
            let bearer = request
                .headers()
                .get(header::AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.strip_prefix("Bearer "))
                .map(|s| s.to_string());

            match bearer {
                Some(bearer_key) if constant_time_compare(&bearer_key, &expected) => {
                    next.run(request).await
                }
                _ => unauthorized_response("Missing or invalid API key"),
            }
        }
    }
}

/// Perform constant-time string comparison.
fn constant_time_compare(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

fn unauthorized_response(message: &str) -> Response {
    AppError::Unauthorized(message.to_string()).into_response()
}

/// Role resolved by the upstream identity provider.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Teacher,
    Student,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Teacher => "teacher",
            Role::Student => "student",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Some(Role::Admin),
            "teacher" => Some(Role::Teacher),
            "student" => Some(Role::Student),
            _ => None,
        }
    }
}

/// Roles allowed to edit attendance and read reports.
pub const STAFF: &[Role] = &[Role::Admin, Role::Teacher];
/// Roles allowed to change group metadata.
pub const ADMIN_ONLY: &[Role] = &[Role::Admin];
/// Any resolved role.
pub const ANY_ROLE: &[Role] = &[Role::Admin, Role::Teacher, Role::Student];

/// The `{currentUser, role}` fact for one request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthContext {
    pub current_user: Option<String>,
    pub role: Option<Role>,
}

impl AuthContext {
    pub fn new(current_user: Option<String>, role: Option<Role>) -> Self {
        Self { current_user, role }
    }

    /// Fail with `Forbidden` unless the resolved role is one of `allowed`.
    pub fn require(&self, action: &str, allowed: &[Role]) -> Result<(), AppError> {
        match self.role {
            Some(role) if allowed.contains(&role) => Ok(()),
            Some(role) => Err(AppError::Forbidden(format!(
                "Role {} may not {}",
                role.as_str(),
                action
            ))),
            None => Err(AppError::Forbidden(format!(
                "A resolved role is required to {}",
                action
            ))),
        }
    }
}

impl<S> FromRequestParts<S> for AuthContext
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header_value = |name: &str| {
            parts
                .headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| s.to_string())
        };

        let current_user = header_value(USER_HEADER);
        let role = header_value(ROLE_HEADER).and_then(|r| Role::parse(&r));

        Ok(AuthContext::new(current_user, role))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::StatusCode, middleware, routing::get, Router};
    use tower::ServiceExt;

    #[test]
    fn test_constant_time_compare_equal() {
        assert!(constant_time_compare("test-key-123", "test-key-123"));
    }

    #[test]
    fn test_constant_time_compare_not_equal() {
        assert!(!constant_time_compare("test-key-123", "test-key-124"));
    }

    #[test]
    fn test_constant_time_compare_different_lengths() {
        assert!(!constant_time_compare("short", "much-longer-key"));
    }

    #[test]
    fn test_role_parse() {
        assert_eq!(Role::parse("Admin"), Some(Role::Admin));
        assert_eq!(Role::parse(" teacher "), Some(Role::Teacher));
        assert_eq!(Role::parse("student"), Some(Role::Student));
        assert_eq!(Role::parse("janitor"), None);
    }

    #[test]
    fn test_require_role() {
        let teacher = AuthContext::new(Some("t1".into()), Some(Role::Teacher));
        assert!(teacher.require("submit attendance", STAFF).is_ok());
        assert!(matches!(
            teacher.require("delete a class", ADMIN_ONLY),
            Err(AppError::Forbidden(_))
        ));

        let anonymous = AuthContext::default();
        assert!(matches!(
            anonymous.require("list classes", ANY_ROLE),
            Err(AppError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn test_psk_layer_rejects_wrong_bearer() {
        let app = Router::new()
            .route("/", get(|| async { "ok" }))
            .layer(middleware::from_fn(|req, next| {
                psk_auth_layer(Some("secret".to_string()), req, next)
            }));

        let resp = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/")
                    .header(header::AUTHORIZATION, "Bearer nope")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let resp = app
            .oneshot(
                Request::builder()
                    .uri("/")
                    .header(header::AUTHORIZATION, "Bearer secret")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_context_extracted_from_headers() {
        let request = Request::builder()
            .uri("/")
            .header(USER_HEADER, "teacher-7")
            .header(ROLE_HEADER, "teacher")
            .body(Body::empty())
            .unwrap();
        let (mut parts, _) = request.into_parts();

        let ctx = AuthContext::from_request_parts(&mut parts, &()).await.unwrap();
        assert_eq!(ctx.current_user.as_deref(), Some("teacher-7"));
        assert_eq!(ctx.role, Some(Role::Teacher));
    }
}
