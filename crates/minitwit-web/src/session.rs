use std::convert::Infallible;

use axum::{
    extract::FromRequestParts,
    http::{HeaderMap, header, request::Parts},
};
use jsonwebtoken::{DecodingKey, Validation, decode};
use tracing::debug;

use minitwit_types::session::{SESSION_COOKIE, SESSION_TTL_SECS, SessionClaims};

use crate::WebState;
use crate::error::WebError;

/// The signed-in user, recovered from the session cookie. `token` is the
/// API-issued token and is forwarded as a Bearer credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub user_id: i64,
    pub username: String,
    pub token: String,
}

/// `Set-Cookie` value storing `token` for the lifetime of the session.
pub fn session_cookie(token: &str) -> String {
    format!(
        "{}={}; HttpOnly; Path=/; Max-Age={}; SameSite=Strict",
        SESSION_COOKIE, token, SESSION_TTL_SECS
    )
}

/// `Set-Cookie` value that makes the browser drop the session.
pub fn clear_cookie() -> String {
    format!("{}=; HttpOnly; Path=/; Max-Age=0; SameSite=Strict", SESSION_COOKIE)
}

/// Value of cookie `name` across all `Cookie` headers.
pub fn read_cookie<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value)
}

/// Decode the session cookie. Expired, tampered or missing cookies all read
/// as signed out.
pub fn current_session(headers: &HeaderMap, secret: &str) -> Option<Session> {
    let token = read_cookie(headers, SESSION_COOKIE).filter(|t| !t.is_empty())?;

    match decode::<SessionClaims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    ) {
        Ok(data) => Some(Session {
            user_id: data.claims.sub,
            username: data.claims.username,
            token: token.to_string(),
        }),
        Err(e) => {
            debug!("Ignoring session cookie: {}", e);
            None
        }
    }
}

/// Session if there is one. Never rejects.
#[derive(Debug, Clone, Default)]
pub struct MaybeSession(pub Option<Session>);

impl FromRequestParts<WebState> for MaybeSession {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &WebState) -> Result<Self, Self::Rejection> {
        Ok(MaybeSession(current_session(&parts.headers, &state.session_secret)))
    }
}

impl FromRequestParts<WebState> for Session {
    type Rejection = WebError;

    async fn from_request_parts(parts: &mut Parts, state: &WebState) -> Result<Self, Self::Rejection> {
        current_session(&parts.headers, &state.session_secret).ok_or(WebError::Unauthorized)
    }
}
