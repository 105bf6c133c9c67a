//! Session extraction for handlers.
//!
//! The token is read from the `session_id` cookie first and from an
//! `Authorization: Bearer <token>` header second. A bearer token is still
//! tried when the cookie no longer resolves. Identity and role are
//! resolved server-side through [`crate::service::SessionService`]; nothing
//! the client sends besides the token is trusted.

use std::convert::Infallible;

use axum::extract::FromRequestParts;
use axum::http::header::{AUTHORIZATION, COOKIE};
use axum::http::request::Parts;
use axum::http::{HeaderMap, HeaderValue};

use crate::app_state::AppState;
use crate::domain::Principal;
use crate::error::ServiceError;

/// Name of the session cookie.
pub const SESSION_COOKIE: &str = "session_id";

/// Returns every distinct session token carried by `headers`, cookie
/// first.
#[must_use]
pub fn token_candidates(headers: &HeaderMap) -> Vec<String> {
    let from_cookie = headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, value)| *name == SESSION_COOKIE && !value.is_empty())
        .map(|(_, value)| value.to_string());

    let from_bearer = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(str::to_string);

    let mut tokens: Vec<String> = from_cookie.into_iter().collect();
    if let Some(bearer) = from_bearer.filter(|b| !tokens.contains(b)) {
        tokens.push(bearer);
    }
    tokens
}

/// Returns the preferred session token carried by `headers`, if any.
#[must_use]
pub fn token_from_headers(headers: &HeaderMap) -> Option<String> {
    token_candidates(headers).into_iter().next()
}

/// `Set-Cookie` value starting a session that lasts `max_age_secs`.
#[must_use]
pub fn session_cookie(token: &str, max_age_secs: u64) -> Option<HeaderValue> {
    HeaderValue::from_str(&format!(
        "{SESSION_COOKIE}={token}; HttpOnly; SameSite=Lax; Path=/; Max-Age={max_age_secs}"
    ))
    .ok()
}

/// `Set-Cookie` value clearing the session cookie.
#[must_use]
pub fn clear_session_cookie() -> HeaderValue {
    HeaderValue::from_static("session_id=; HttpOnly; SameSite=Lax; Path=/; Max-Age=0")
}

/// The raw session token, if the request carries one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionToken(pub Option<String>);

impl<S> FromRequestParts<S> for SessionToken
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self(token_from_headers(&parts.headers)))
    }
}

/// An authenticated caller.
///
/// Rejects the request with `401` when the token is missing, unknown or
/// expired.
#[derive(Debug, Clone)]
pub struct AuthUser {
    /// Identity and role.
    pub principal: Principal,
    /// The token the caller authenticated with.
    pub token: String,
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ServiceError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let mut failure = ServiceError::Unauthenticated("missing session token".to_string());
        for token in token_candidates(&parts.headers) {
            match state.sessions.authenticate(&token).await {
                Ok(principal) => return Ok(Self { principal, token }),
                Err(e) => failure = e,
            }
        }
        Err(failure)
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.append(*name, HeaderValue::from_static(value));
        }
        map
    }

    #[test]
    fn cookie_wins_over_bearer() {
        let map = headers(&[
            ("cookie", "theme=dark; session_id=from-cookie"),
            ("authorization", "Bearer from-header"),
        ]);
        assert_eq!(token_from_headers(&map), Some("from-cookie".to_string()));
    }

    #[test]
    fn both_credentials_are_candidates() {
        let map = headers(&[
            ("cookie", "session_id=stale"),
            ("authorization", "Bearer fresh"),
        ]);
        assert_eq!(
            token_candidates(&map),
            vec!["stale".to_string(), "fresh".to_string()]
        );

        let same = headers(&[
            ("cookie", "session_id=tok"),
            ("authorization", "Bearer tok"),
        ]);
        assert_eq!(token_candidates(&same), vec!["tok".to_string()]);
    }

    #[test]
    fn bearer_is_used_without_cookie() {
        let map = headers(&[("authorization", "Bearer abc")]);
        assert_eq!(token_from_headers(&map), Some("abc".to_string()));
    }

    #[test]
    fn empty_or_foreign_credentials_are_ignored() {
        assert_eq!(token_from_headers(&headers(&[("cookie", "session_id=")])), None);
        assert_eq!(
            token_from_headers(&headers(&[("authorization", "Basic dXNlcg==")])),
            None
        );
        assert_eq!(token_from_headers(&HeaderMap::new()), None);
    }

    #[test]
    fn cookie_carries_max_age() {
        let Some(value) = session_cookie("tok", 60) else {
            panic!("cookie should be a valid header value");
        };
        let text = value.to_str().unwrap_or_default();
        assert!(text.starts_with("session_id=tok;"));
        assert!(text.contains("Max-Age=60"));
        assert!(text.contains("HttpOnly"));
    }
}
