//! Login endpoints
//!
//! POST /api/auth/login  - Check credentials and set the session cookie
//! POST /api/auth/logout - Forget the token and clear the cookie
//! GET  /api/auth/me     - Current username

use axum::{
    extract::State,
    http::{header, HeaderMap, HeaderValue},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use termcast_core::SESSION_COOKIE;

use super::response::{ok, ApiError, ApiResponse, ApiResult};
use crate::middleware::identity::{cookie_value, RequireIdentity};
use crate::server::AppState;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub username: String,
}

fn session_cookie(token: &str, max_age_secs: i64) -> Result<HeaderValue, ApiError> {
    HeaderValue::from_str(&format!(
        "{SESSION_COOKIE}={token}; HttpOnly; SameSite=Lax; Path=/; Max-Age={max_age_secs}"
    ))
    .map_err(|_| ApiError::bad_request("invalid token"))
}

async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> Result<(HeaderMap, Json<ApiResponse<UserResponse>>), ApiError> {
    let token = state
        .identity
        .login(&request.username, &request.password)
        .map_err(|_| ApiError::unauthorized("invalid username or password"))?;

    let mut headers = HeaderMap::new();
    headers.insert(
        header::SET_COOKIE,
        session_cookie(&token, state.identity.token_ttl().num_seconds())?,
    );
    Ok((
        headers,
        Json(ApiResponse::success(UserResponse {
            username: request.username,
        })),
    ))
}

async fn logout(
    State(state): State<AppState>,
    request_headers: HeaderMap,
) -> Result<(HeaderMap, Json<ApiResponse<UserResponse>>), ApiError> {
    if let Some(token) = cookie_value(&request_headers, SESSION_COOKIE) {
        state.identity.logout(token);
    }

    let mut headers = HeaderMap::new();
    headers.insert(header::SET_COOKIE, session_cookie("", 0)?);
    Ok((
        headers,
        Json(ApiResponse::success(UserResponse {
            username: String::new(),
        })),
    ))
}

async fn me(RequireIdentity(username): RequireIdentity) -> ApiResult<UserResponse> {
    ok(UserResponse { username })
}

/// Create auth routes.
pub fn auth_routes(state: AppState) -> Router {
    Router::new()
        .route("/api/auth/login", post(login))
        .route("/api/auth/logout", post(logout))
        .route("/api/auth/me", get(me))
        .with_state(state)
}
