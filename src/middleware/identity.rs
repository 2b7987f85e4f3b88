//! Identity extractors for Axum
//!
//! Reads the login token from the `termcast_session` cookie and resolves it
//! through the `Identity` registered as a request extension.

use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::sync::Arc;
use termcast_core::{Identity, SESSION_COOKIE};

/// JSON error response for identity failures
#[derive(Debug, Serialize)]
struct IdentityErrorResponse {
    success: bool,
    error: String,
    code: String,
}

/// Identity rejection type
pub struct IdentityRejection {
    status: StatusCode,
    body: IdentityErrorResponse,
}

impl IdentityRejection {
    fn new(status: StatusCode, error: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            status,
            body: IdentityErrorResponse {
                success: false,
                error: error.into(),
                code: code.into(),
            },
        }
    }

    fn unauthorized() -> Self {
        Self::new(
            StatusCode::UNAUTHORIZED,
            "Login required",
            "UNAUTHORIZED",
        )
    }

    fn not_configured() -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Identity provider not configured",
            "INTERNAL_ERROR",
        )
    }
}

impl IntoResponse for IdentityRejection {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

/// Value of a named cookie in the request headers
pub fn cookie_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.trim_matches('"'))
}

fn resolve(parts: &Parts) -> Result<Option<String>, IdentityRejection> {
    let identity = parts
        .extensions
        .get::<Arc<dyn Identity>>()
        .ok_or_else(IdentityRejection::not_configured)?;
    Ok(cookie_value(&parts.headers, SESSION_COOKIE).and_then(|token| identity.resolve(token)))
}

// ============================================================================
// Extractors
// ============================================================================

/// Axum extractor that requires a logged-in user.
///
/// Rejects with 401 when the cookie is missing, unknown or expired.
pub struct RequireIdentity(pub String);

#[async_trait::async_trait]
impl<S> FromRequestParts<S> for RequireIdentity
where
    S: Send + Sync,
{
    type Rejection = IdentityRejection;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> std::result::Result<Self, Self::Rejection> {
        resolve(parts)?
            .map(RequireIdentity)
            .ok_or_else(IdentityRejection::unauthorized)
    }
}

/// Axum extractor for endpoints open to anonymous callers.
pub struct MaybeIdentity(pub Option<String>);

#[async_trait::async_trait]
impl<S> FromRequestParts<S> for MaybeIdentity
where
    S: Send + Sync,
{
    type Rejection = IdentityRejection;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> std::result::Result<Self, Self::Rejection> {
        Ok(MaybeIdentity(resolve(parts)?))
    }
}
