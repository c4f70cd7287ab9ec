//! Admin login and session cookie routes

use axum::{extract::State, response::IntoResponse, routing::{get, post}, Json, Router};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use crate::auth::{self, ADMIN_LOGIN_PATH};
use crate::{AppState, Result, StoreError};

const ACCESS_TTL_SECS: u64 = 60 * 60;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/auth/login", post(login))
        .route("/api/auth/session", post(set_session).delete(clear_session))
        .route(ADMIN_LOGIN_PATH, get(login_page))
}

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(length(min = 1, max = 64))]
    pub username: String,
    #[validate(length(min = 1, max = 256))]
    pub password: String,
}

/// Username/password login. Repeated failures lock the username out, and
/// while locked even the right password is refused.
async fn login(State(s): State<AppState>, Json(r): Json<LoginRequest>) -> Result<impl IntoResponse> {
    r.validate()?;
    let settings = &s.config.auth;
    let ok = auth::credentials_match(r.username.trim(), &settings.admin_username) & auth::credentials_match(&r.password, &settings.admin_password);
    s.login.attempt(&r.username, ok).await?;

    let access = auth::issue_admin_token(r.username.trim(), &settings.jwt_secret, ACCESS_TTL_SECS)
        .map_err(|e| StoreError::Validation(format!("could not issue session token: {e}")))?;
    let refresh = Uuid::new_v4().simple().to_string();
    let headers = auth::set_cookie_headers(auth::session_cookies(&access, &refresh, ACCESS_TTL_SECS, settings.secure_cookies))?;
    tracing::info!(username = %r.username, "admin logged in");
    Ok((headers, Json(serde_json::json!({ "ok": true, "expires_in": ACCESS_TTL_SECS }))))
}

#[derive(Debug, Deserialize, Validate)]
pub struct SessionRequest {
    #[validate(length(min = 1))]
    pub access_token: String,
    #[validate(length(min = 1))]
    pub refresh_token: String,
    pub expires_in: Option<u64>,
}

/// Stores tokens from the identity service as HttpOnly cookies.
async fn set_session(State(s): State<AppState>, Json(r): Json<SessionRequest>) -> Result<impl IntoResponse> {
    r.validate()?;
    let cookies = auth::session_cookies(&r.access_token, &r.refresh_token, r.expires_in.unwrap_or(ACCESS_TTL_SECS), s.config.auth.secure_cookies);
    Ok((auth::set_cookie_headers(cookies)?, Json(serde_json::json!({ "ok": true }))))
}

async fn clear_session(State(s): State<AppState>) -> Result<impl IntoResponse> {
    Ok((auth::set_cookie_headers(auth::cleared_cookies(s.config.auth.secure_cookies))?, Json(serde_json::json!({ "ok": true }))))
}

async fn login_page() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "login": "/api/auth/login", "session": "/api/auth/session" }))
}
