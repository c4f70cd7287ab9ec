//! Admin access: login lockout, session cookies and the `/admin` guard.

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, HeaderValue},
    middleware::Next,
    response::{AppendHeaders, IntoResponse, Redirect, Response},
};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::{AppState, StoreError};

pub const ACCESS_COOKIE: &str = "sb-access-token";
pub const REFRESH_COOKIE: &str = "sb-refresh-token";
pub const ADMIN_LOGIN_PATH: &str = "/admin/login";
const REFRESH_MAX_AGE_SECS: u64 = 60 * 60 * 24 * 30;

// =============================================================================
// Login lockout
// =============================================================================

const MAX_TRACKED_USERNAMES: usize = 10_000;

#[derive(Debug, Clone)]
struct FailureEntry { failures: u32, last_failure: Instant, locked_until: Option<Instant> }

impl FailureEntry {
    /// A lock ends when it elapses; an unlocked counter is forgotten one
    /// lockout period after its last failure.
    fn expired(&self, now: Instant, lockout: Duration) -> bool {
        match self.locked_until {
            Some(until) => now >= until,
            None => now.duration_since(self.last_failure) >= lockout,
        }
    }
}

/// Counts failed logins per username. Once `max_attempts` failures pile up
/// every attempt is refused until the lockout elapses, whatever the
/// credentials.
pub struct LoginGuard {
    max_attempts: u32,
    lockout: Duration,
    entries: Mutex<HashMap<String, FailureEntry>>,
}

impl LoginGuard {
    pub fn new(max_attempts: u32, lockout: Duration) -> Self {
        Self { max_attempts: max_attempts.max(1), lockout, entries: Mutex::new(HashMap::new()) }
    }

    fn key(username: &str) -> String { username.trim().to_lowercase() }

    /// Checks the lock and records the outcome under one lock acquisition.
    ///
    /// Returns [`StoreError::LoginLocked`] while locked (even when `ok`),
    /// [`StoreError::InvalidCredentials`] for a counted failure.
    pub async fn attempt(&self, username: &str, ok: bool) -> Result<(), StoreError> {
        let now = Instant::now();
        let key = Self::key(username);
        let mut entries = self.entries.lock().await;
        if entries.get(&key).is_some_and(|e| e.expired(now, self.lockout)) {
            entries.remove(&key);
        }
        if let Some(until) = entries.get(&key).and_then(|e| e.locked_until) {
            return Err(StoreError::LoginLocked { remaining_secs: until.duration_since(now).as_secs().max(1) });
        }
        if ok {
            entries.remove(&key);
            return Ok(());
        }

        if !entries.contains_key(&key) && entries.len() >= MAX_TRACKED_USERNAMES {
            Self::prune(&mut entries, now, self.lockout);
            let oldest = entries.iter()
                .filter(|(_, e)| e.locked_until.is_none())
                .min_by_key(|(_, e)| e.last_failure)
                .map(|(k, _)| k.clone());
            if let (true, Some(oldest)) = (entries.len() >= MAX_TRACKED_USERNAMES, oldest) {
                entries.remove(&oldest);
            }
        }
        let entry = entries.entry(key).or_insert(FailureEntry { failures: 0, last_failure: now, locked_until: None });
        entry.failures += 1;
        entry.last_failure = now;
        let left = self.max_attempts.saturating_sub(entry.failures);
        if left == 0 {
            entry.locked_until = Some(now + self.lockout);
            tracing::warn!(username, lockout_secs = self.lockout.as_secs(), "admin login locked");
        } else {
            tracing::warn!(username, attempts_left = left, "admin login failed");
        }
        Err(StoreError::InvalidCredentials)
    }

    fn prune(entries: &mut HashMap<String, FailureEntry>, now: Instant, lockout: Duration) {
        entries.retain(|_, e| !e.expired(now, lockout));
    }

    /// Drops elapsed locks and stale counters; returns how many went.
    pub async fn sweep(&self) -> usize {
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        Self::prune(&mut entries, Instant::now(), self.lockout);
        let removed = before - entries.len();
        if removed > 0 { tracing::debug!(removed, tracked = entries.len(), "login guard swept"); }
        removed
    }

    pub async fn tracked(&self) -> usize { self.entries.lock().await.len() }
}

/// Byte comparison that does not stop at the first mismatch.
pub fn credentials_match(given: &str, expected: &str) -> bool {
    let (a, b) = (given.as_bytes(), expected.as_bytes());
    let mut diff = a.len() ^ b.len();
    for i in 0..a.len().max(b.len()) {
        diff |= usize::from(a.get(i).copied().unwrap_or(0) ^ b.get(i).copied().unwrap_or(0));
    }
    diff == 0
}

// =============================================================================
// Session cookies
// =============================================================================

pub fn session_cookie(name: &str, value: &str, max_age_secs: u64, secure: bool) -> String {
    let mut cookie = format!("{name}={value}; Path=/; HttpOnly; SameSite=Lax; Max-Age={max_age_secs}");
    if secure { cookie.push_str("; Secure"); }
    cookie
}

/// The two `Set-Cookie` values for a fresh session.
pub fn session_cookies(access_token: &str, refresh_token: &str, expires_in: u64, secure: bool) -> [String; 2] {
    [
        session_cookie(ACCESS_COOKIE, access_token, expires_in, secure),
        session_cookie(REFRESH_COOKIE, refresh_token, REFRESH_MAX_AGE_SECS, secure),
    ]
}

pub fn cleared_cookies(secure: bool) -> [String; 2] {
    [session_cookie(ACCESS_COOKIE, "", 0, secure), session_cookie(REFRESH_COOKIE, "", 0, secure)]
}

pub fn read_cookie<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get_all(header::COOKIE).iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(k, _)| *k == name)
        .map(|(_, v)| v)
        .filter(|v| !v.is_empty())
}

// =============================================================================
// Admin guard
// =============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoleMetadata { pub role: Option<String> }

/// Access-token claims issued by the identity service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub app_metadata: Option<RoleMetadata>,
}

impl Claims {
    pub fn is_admin(&self) -> bool {
        self.role.as_deref() == Some("admin")
            || self.app_metadata.as_ref().and_then(|m| m.role.as_deref()) == Some("admin")
    }
}

/// Admin identity injected into request extensions by [`require_admin`].
#[derive(Debug, Clone)]
pub struct AdminUser { pub id: String, pub email: Option<String> }

pub fn verify_token(token: &str, secret: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
    let validation = Validation::new(Algorithm::HS256);
    decode::<Claims>(token, &DecodingKey::from_secret(secret.as_bytes()), &validation).map(|d| d.claims)
}

/// Signs an admin access token for a local username/password login.
pub fn issue_admin_token(username: &str, secret: &str, ttl_secs: u64) -> Result<String, jsonwebtoken::errors::Error> {
    let exp = chrono::Utc::now().timestamp().max(0) as usize + ttl_secs as usize;
    let claims = Claims { sub: username.to_string(), exp, email: None, role: Some("admin".into()), app_metadata: None };
    encode(&Header::new(Algorithm::HS256), &claims, &EncodingKey::from_secret(secret.as_bytes()))
}

fn bearer(headers: &HeaderMap) -> Option<&str> {
    headers.get(header::AUTHORIZATION)?.to_str().ok()?.strip_prefix("Bearer ").map(str::trim)
}

/// Lets `/admin/*` through only for tokens carrying the admin role;
/// everyone else is sent to the login page.
pub async fn require_admin(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    let path = req.uri().path().to_string();
    if path == ADMIN_LOGIN_PATH || path.starts_with("/admin/login/") {
        return next.run(req).await;
    }

    let token = read_cookie(req.headers(), ACCESS_COOKIE).or_else(|| bearer(req.headers())).map(str::to_string);
    let Some(token) = token else {
        tracing::debug!(path = %path, "admin request without session");
        return Redirect::to(ADMIN_LOGIN_PATH).into_response();
    };

    match verify_token(&token, &state.config.auth.jwt_secret) {
        Ok(claims) if claims.is_admin() => {
            req.extensions_mut().insert(AdminUser { id: claims.sub, email: claims.email });
            next.run(req).await
        }
        Ok(claims) => {
            tracing::warn!(path = %path, user = %claims.sub, "non-admin token on admin route");
            Redirect::to(ADMIN_LOGIN_PATH).into_response()
        }
        Err(e) => {
            tracing::warn!(path = %path, error = %e, "rejected admin token");
            Redirect::to(ADMIN_LOGIN_PATH).into_response()
        }
    }
}

/// Both cookies as appended `Set-Cookie` headers.
pub fn set_cookie_headers(cookies: [String; 2]) -> Result<AppendHeaders<[(header::HeaderName, HeaderValue); 2]>, StoreError> {
    let [a, b] = cookies;
    let value = |c: String| HeaderValue::from_str(&c).map_err(|_| StoreError::Validation("token contains characters not allowed in a cookie".into()));
    Ok(AppendHeaders([(header::SET_COOKIE, value(a)?), (header::SET_COOKIE, value(b)?)]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_lockout_after_five_failures() {
        let guard = LoginGuard::new(5, Duration::from_secs(300));
        for _ in 0..5 {
            assert!(matches!(guard.attempt("Admin ", false).await, Err(StoreError::InvalidCredentials)));
        }
        assert!(matches!(guard.attempt("admin", true).await, Err(StoreError::LoginLocked { remaining_secs: 300 })));
        tokio::time::advance(Duration::from_secs(299)).await;
        assert!(guard.attempt("ADMIN", true).await.is_err());
        tokio::time::advance(Duration::from_secs(2)).await;
        guard.attempt("admin", true).await.unwrap();
        assert_eq!(guard.tracked().await, 0);
    }

    #[tokio::test]
    async fn test_success_resets_counter() {
        let guard = LoginGuard::new(5, Duration::from_secs(300));
        for _ in 0..4 { let _ = guard.attempt("ops", false).await; }
        guard.attempt("ops", true).await.unwrap();
        for _ in 0..4 { let _ = guard.attempt("ops", false).await; }
        guard.attempt("ops", true).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_counter_forgotten() {
        let guard = LoginGuard::new(5, Duration::from_secs(300));
        for _ in 0..4 { let _ = guard.attempt("ops", false).await; }
        tokio::time::advance(Duration::from_secs(301)).await;
        for _ in 0..4 { let _ = guard.attempt("ops", false).await; }
        guard.attempt("ops", true).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_drops_expired_entries() {
        let guard = LoginGuard::new(2, Duration::from_secs(300));
        let _ = guard.attempt("typo", false).await;
        for _ in 0..2 { let _ = guard.attempt("owner", false).await; }
        for i in 0..50 { let _ = guard.attempt(&format!("spray{i}"), false).await; }
        assert_eq!(guard.tracked().await, 52);
        assert_eq!(guard.sweep().await, 0);

        tokio::time::advance(Duration::from_secs(300)).await;
        assert_eq!(guard.sweep().await, 52);
        assert_eq!(guard.tracked().await, 0);
    }

    #[test]
    fn test_credentials_match() {
        assert!(credentials_match("s3cret", "s3cret"));
        assert!(!credentials_match("s3cret", "s3cret!"));
        assert!(!credentials_match("", "x"));
    }

    #[test]
    fn test_cookie_roundtrip() {
        let [access, refresh] = session_cookies("aaa", "rrr", 3600, true);
        assert_eq!(access, "sb-access-token=aaa; Path=/; HttpOnly; SameSite=Lax; Max-Age=3600; Secure");
        assert!(refresh.starts_with("sb-refresh-token=rrr;"));
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_static("theme=dark; sb-access-token=aaa"));
        assert_eq!(read_cookie(&headers, ACCESS_COOKIE), Some("aaa"));
        assert_eq!(read_cookie(&headers, REFRESH_COOKIE), None);
    }

    #[test]
    fn test_issued_token_verifies_as_admin() {
        let token = issue_admin_token("owner", "secret", 3600).unwrap();
        let claims = verify_token(&token, "secret").unwrap();
        assert!(claims.is_admin());
        assert_eq!(claims.sub, "owner");
        assert!(verify_token(&token, "other").is_err());
    }

    #[test]
    fn test_admin_role_claims() {
        let mut claims = Claims { sub: "u1".into(), exp: 0, email: None, role: Some("authenticated".into()), app_metadata: None };
        assert!(!claims.is_admin());
        claims.app_metadata = Some(RoleMetadata { role: Some("admin".into()) });
        assert!(claims.is_admin());
    }
}
