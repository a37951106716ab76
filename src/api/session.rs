//! Cookie-bound session extraction (§4.7: session binding) and the client-IP helper used
//! by the auth rate limiter. A custom extractor keeps handlers `async fn(...) -> ...`
//! instead of hand-rolling the cookie lookup in each one.

use axum::{extract::FromRequestParts, http::request::Parts};
use axum_extra::extract::cookie::CookieJar;

use crate::api::server::AppState;
use crate::error::AppError;
use crate::store::Session;

/// Extracts and validates the session bound to the `SESSION_COOKIE_NAME` cookie, rejecting
/// with `401 Unauthenticated` when the cookie is absent, unknown, or expired.
pub struct AuthSession(pub Session);

#[axum::async_trait]
impl FromRequestParts<AppState> for AuthSession {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let jar = CookieJar::from_headers(&parts.headers);
        let token = jar
            .get(&state.config.session_cookie_name)
            .map(|c| c.value().to_string())
            .ok_or(AppError::Unauthenticated)?;
        let session = state.store.get_session(&token).ok_or(AppError::Unauthenticated)?;
        Ok(AuthSession(session))
    }
}

/// Prefers the first hop of `X-Forwarded-For` (the client, when behind a reverse proxy),
/// falling back to a constant bucket key when unavailable — this gateway does not bind to
/// `ConnectInfo<SocketAddr>` since it is typically deployed behind a proxy in practice.
pub fn client_ip(headers: &axum::http::HeaderMap) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}
