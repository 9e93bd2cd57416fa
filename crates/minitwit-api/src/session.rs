use std::convert::Infallible;

use axum::{
    extract::FromRequestParts,
    http::{HeaderMap, header, request::Parts},
};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as B64;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use tracing::{debug, warn};

use minitwit_types::session::{SESSION_TTL_SECS, SessionClaims};

use crate::AppState;
use crate::error::ApiError;
use crate::users::User;

/// Who is making a protected request.
///
/// Two parallel trust paths: a signed session naming one user, or the
/// simulator's shared secret, which may act for any user named in the path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallerIdentity {
    SessionUser { user_id: i64, username: String },
    TrustedAutomation,
}

impl CallerIdentity {
    /// Check that this caller may write on behalf of `target`.
    pub fn authorize_for(&self, target: &User) -> Result<(), ApiError> {
        match self {
            Self::TrustedAutomation => Ok(()),
            Self::SessionUser { user_id, .. } if *user_id == target.user_id => Ok(()),
            Self::SessionUser { username, .. } => {
                warn!("Session user {} tried to act as {}", username, target.username);
                Err(ApiError::Forbidden)
            }
        }
    }
}

/// Build the `Authorization` value the simulator sends (HTTP Basic).
pub fn simulator_authorization(user: &str, password: &str) -> String {
    format!("Basic {}", B64.encode(format!("{}:{}", user, password)))
}

pub fn issue_token(secret: &str, user_id: i64, username: &str) -> anyhow::Result<String> {
    issue_token_at(secret, user_id, username, chrono::Utc::now().timestamp())
}

/// Issue a token as if at `issued_at` (seconds since epoch).
pub fn issue_token_at(
    secret: &str,
    user_id: i64,
    username: &str,
    issued_at: i64,
) -> anyhow::Result<String> {
    let claims = SessionClaims {
        sub: user_id,
        username: username.to_string(),
        iat: issued_at,
        exp: issued_at + SESSION_TTL_SECS,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}

/// Check signature and expiry. There is no revocation list: a token stays
/// valid until `exp` no matter what happened to the session since.
pub fn verify_token(secret: &str, token: &str) -> jsonwebtoken::errors::Result<SessionClaims> {
    let data = decode::<SessionClaims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )?;
    Ok(data.claims)
}

/// Resolve the caller from the `Authorization` header, if it carries a
/// credential this service accepts.
pub fn identify(headers: &HeaderMap, session_secret: &str, simulator_auth: &str) -> Option<CallerIdentity> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;

    if value == simulator_auth {
        return Some(CallerIdentity::TrustedAutomation);
    }

    let token = value.strip_prefix("Bearer ")?;
    match verify_token(session_secret, token) {
        Ok(claims) => Some(CallerIdentity::SessionUser {
            user_id: claims.sub,
            username: claims.username,
        }),
        Err(e) => {
            debug!("Rejected session token: {}", e);
            None
        }
    }
}

impl FromRequestParts<AppState> for CallerIdentity {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        identify(&parts.headers, &state.session_secret, &state.simulator_auth).ok_or_else(|| {
            warn!("Unauthorized {} {}", parts.method, parts.uri.path());
            ApiError::Forbidden
        })
    }
}

/// Optional session viewer for read endpoints that decorate their output
/// for a signed-in user. Never rejects.
#[derive(Debug, Clone, Default)]
pub struct Viewer(pub Option<i64>);

impl FromRequestParts<AppState> for Viewer {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let viewer = match identify(&parts.headers, &state.session_secret, &state.simulator_auth) {
            Some(CallerIdentity::SessionUser { user_id, .. }) => Some(user_id),
            _ => None,
        };
        Ok(Viewer(viewer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    const SECRET: &str = "test-secret";

    fn headers(auth: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_str(auth).unwrap());
        headers
    }

    #[test]
    fn simulator_credential_matches_legacy_header() {
        assert_eq!(
            simulator_authorization("simulator", "super_safe!"),
            "Basic c2ltdWxhdG9yOnN1cGVyX3NhZmUh"
        );
    }

    #[test]
    fn token_round_trips_identity() {
        let token = issue_token(SECRET, 7, "foo").unwrap();
        let claims = verify_token(SECRET, &token).unwrap();
        assert_eq!(claims.sub, 7);
        assert_eq!(claims.username, "foo");
        assert_eq!(claims.exp - claims.iat, SESSION_TTL_SECS);
    }

    #[test]
    fn token_rejected_after_ttl_or_with_other_secret() {
        let issued = chrono::Utc::now().timestamp() - SESSION_TTL_SECS - 3600;
        let stale = issue_token_at(SECRET, 7, "foo", issued).unwrap();
        assert!(verify_token(SECRET, &stale).is_err());

        let token = issue_token(SECRET, 7, "foo").unwrap();
        assert!(verify_token("another-secret", &token).is_err());
    }

    #[test]
    fn identify_distinguishes_trust_paths() {
        let sim = simulator_authorization("simulator", "super_safe!");

        assert_eq!(
            identify(&headers(&sim), SECRET, &sim),
            Some(CallerIdentity::TrustedAutomation)
        );

        let token = issue_token(SECRET, 3, "bar").unwrap();
        assert_eq!(
            identify(&headers(&format!("Bearer {}", token)), SECRET, &sim),
            Some(CallerIdentity::SessionUser {
                user_id: 3,
                username: "bar".into()
            })
        );

        assert_eq!(identify(&headers("Basic bm9wZTpub3Bl"), SECRET, &sim), None);
        assert_eq!(identify(&headers("Bearer garbage"), SECRET, &sim), None);
        assert_eq!(identify(&HeaderMap::new(), SECRET, &sim), None);
    }
}
