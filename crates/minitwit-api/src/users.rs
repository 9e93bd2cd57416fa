use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{self, SaltString, rand_core::OsRng},
};
use axum::{
    Json,
    extract::{
        Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use thiserror::Error;
use tracing::{info, warn};

use minitwit_db::Database;
use minitwit_db::models::{NewUser, UserRow};
use minitwit_types::api::{LoginRequest, LoginResponse, RegisterRequest, UserDetails};

use crate::error::ApiError;
use crate::{AppState, run_blocking, session};

/// A registered user. The password hash never leaves this module.
#[derive(Debug, Clone)]
pub struct User {
    pub user_id: i64,
    pub username: String,
    pub email: String,
    pw_hash: String,
}

impl User {
    pub fn details(&self) -> UserDetails {
        UserDetails {
            user_id: self.user_id,
            username: self.username.clone(),
            email: self.email.clone(),
        }
    }
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        Self {
            user_id: row.user_id,
            username: row.username,
            email: row.email,
            pw_hash: row.pw_hash,
        }
    }
}

#[derive(Debug, Error)]
pub enum RegisterError {
    #[error("You have to enter a username")]
    MissingUsername,
    #[error("You have to enter a valid email address")]
    InvalidEmail,
    #[error("You have to enter a password")]
    MissingPassword,
    #[error("The username is already taken")]
    UsernameTaken,
    #[error("The email address is already registered")]
    EmailTaken,
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

impl From<RegisterError> for ApiError {
    fn from(e: RegisterError) -> Self {
        match e {
            RegisterError::MissingUsername
            | RegisterError::InvalidEmail
            | RegisterError::MissingPassword => ApiError::Validation(e.to_string()),
            RegisterError::UsernameTaken | RegisterError::EmailTaken => {
                ApiError::Conflict(e.to_string())
            }
            RegisterError::Store(e) => ApiError::Store(e),
        }
    }
}

/// Both credential failures look the same to the caller apart from the
/// status code; the variants exist for diagnostics.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("unknown username")]
    NotFound,
    #[error("password does not match")]
    InvalidPassword,
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

impl From<AuthError> for ApiError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::NotFound => ApiError::InvalidCredentials {
                unknown_identity: true,
            },
            AuthError::InvalidPassword => ApiError::InvalidCredentials {
                unknown_identity: false,
            },
            AuthError::Store(e) => ApiError::Store(e),
        }
    }
}

// -- Directory operations --

pub fn register(
    db: &Database,
    username: &str,
    email: &str,
    password: &str,
) -> Result<i64, RegisterError> {
    if username.is_empty() {
        return Err(RegisterError::MissingUsername);
    }
    if email.is_empty() || !email.contains('@') {
        return Err(RegisterError::InvalidEmail);
    }
    if password.is_empty() {
        return Err(RegisterError::MissingPassword);
    }

    // Skip hashing for a taken name; the insert re-checks under the lock
    if db.get_user_by_username(username)?.is_some() {
        return Err(RegisterError::UsernameTaken);
    }

    let pw_hash = hash_password(password)?;

    match db.create_user(username, email, &pw_hash)? {
        NewUser::Created(user_id) => {
            info!("Registered user {} ({})", username, user_id);
            Ok(user_id)
        }
        NewUser::UsernameTaken => Err(RegisterError::UsernameTaken),
        NewUser::EmailTaken => Err(RegisterError::EmailTaken),
    }
}

pub fn lookup_by_username(db: &Database, username: &str) -> anyhow::Result<Option<User>> {
    Ok(db.get_user_by_username(username)?.map(User::from))
}

pub fn lookup_by_id(db: &Database, user_id: i64) -> anyhow::Result<Option<User>> {
    Ok(db.get_user_by_id(user_id)?.map(User::from))
}

pub fn verify_credentials(db: &Database, username: &str, password: &str) -> Result<User, AuthError> {
    let user = lookup_by_username(db, username)?.ok_or(AuthError::NotFound)?;

    if verify_password(password, &user.pw_hash)? {
        Ok(user)
    } else {
        Err(AuthError::InvalidPassword)
    }
}

/// Argon2id with the crate defaults and a fresh random salt.
fn hash_password(password: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("password hashing failed: {}", e))?;
    Ok(hash.to_string())
}

fn verify_password(password: &str, pw_hash: &str) -> anyhow::Result<bool> {
    let parsed = PasswordHash::new(pw_hash)
        .map_err(|e| anyhow::anyhow!("stored password hash is corrupt: {}", e))?;

    match Argon2::default().verify_password(password.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(password_hash::Error::Password) => Ok(false),
        Err(e) => Err(anyhow::anyhow!("password verification failed: {}", e)),
    }
}

// -- Handlers --

#[derive(Debug, Deserialize)]
pub struct UserDetailsQuery {
    pub user_id: Option<String>,
    pub username: Option<String>,
}

/// POST /register
pub async fn post_register(
    State(state): State<AppState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = payload?;

    run_blocking(&state, move |db| {
        register(db, &req.username, &req.email, &req.pwd)?;
        Ok(())
    })
    .await?;

    Ok(StatusCode::NO_CONTENT)
}

/// POST /login. Verifies credentials and issues a session token.
pub async fn post_login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = payload?;

    let user = run_blocking(&state, move |db| {
        verify_credentials(db, &req.username, &req.password).map_err(|e| {
            warn!("Login rejected for {:?}: {}", req.username, e);
            ApiError::from(e)
        })
    })
    .await?;

    let token = session::issue_token(&state.session_secret, user.user_id, &user.username)?;
    info!("User {} logged in", user.username);

    Ok(Json(LoginResponse {
        user_id: user.user_id,
        username: user.username,
        token,
    }))
}

/// GET /getUserDetails?user_id=|username=. `user_id` wins when both are given.
pub async fn get_user_details(
    State(state): State<AppState>,
    query: Result<Query<UserDetailsQuery>, QueryRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Query(query) = query?;

    let user = match (query.user_id, query.username) {
        (Some(id), _) if !id.is_empty() => {
            let user_id: i64 = id
                .trim()
                .parse()
                .map_err(|_| ApiError::Validation(format!("Invalid user_id {:?}", id)))?;
            run_blocking(&state, move |db| Ok(lookup_by_id(db, user_id)?)).await?
        }
        (_, Some(username)) if !username.is_empty() => {
            run_blocking(&state, move |db| Ok(lookup_by_username(db, &username)?)).await?
        }
        _ => {
            return Err(ApiError::Validation(
                "Either user_id or username is required".into(),
            ));
        }
    };

    let user = user.ok_or_else(|| ApiError::NotFound("Cannot find user".into()))?;
    Ok(Json(user.details()))
}
