use serde::{Deserialize, Serialize};

/// Lifetime of a session token and of the cookie that carries it: 16 hours.
pub const SESSION_TTL_SECS: i64 = 16 * 60 * 60;

/// Name of the front-end cookie holding the session token.
pub const SESSION_COOKIE: &str = "minitwit_session";

/// Claims carried by a session token.
///
/// Issued by the API service on login and verified by both services with the
/// shared secret.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    pub sub: i64,
    pub username: String,
    pub iat: i64,
    pub exp: i64,
}
