use axum::{
    Json,
    extract::{Path, Query, State, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
};
use thiserror::Error;
use tracing::{debug, warn};

use minitwit_db::Database;
use minitwit_db::models::FeedRow;
use minitwit_types::api::{FeedItem, PostMessageRequest};

use crate::error::ApiError;
use crate::session::CallerIdentity;
use crate::users::{self, User};
use crate::{AppState, DEFAULT_PAGE_SIZE, PageQuery, run_blocking};

#[derive(Debug, Error)]
pub enum PostError {
    #[error("Cannot find user")]
    AuthorNotFound,
    #[error("Message cannot be empty")]
    EmptyContent,
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

impl From<PostError> for ApiError {
    fn from(e: PostError) -> Self {
        match e {
            PostError::AuthorNotFound => ApiError::NotFound(e.to_string()),
            PostError::EmptyContent => ApiError::Validation(e.to_string()),
            PostError::Store(e) => ApiError::Store(e),
        }
    }
}

pub(crate) fn to_item(row: FeedRow) -> FeedItem {
    FeedItem {
        content: row.text,
        pub_date: row.pub_date,
        user: row.username,
    }
}

// -- Store operations --

/// Publish `text` as `author_id`. The text is stored verbatim; the publish
/// time is taken here, never from the caller.
pub fn post(db: &Database, author_id: i64, text: &str) -> Result<i64, PostError> {
    if users::lookup_by_id(db, author_id)?.is_none() {
        return Err(PostError::AuthorNotFound);
    }
    if text.trim().is_empty() {
        return Err(PostError::EmptyContent);
    }

    let message_id = db.insert_message(author_id, text, chrono::Utc::now().timestamp())?;
    debug!("User {} posted message {}", author_id, message_id);
    Ok(message_id)
}

/// Visible messages of every author, newest first.
pub fn list_all(db: &Database, limit: u32) -> anyhow::Result<Vec<FeedItem>> {
    Ok(db
        .get_public_messages(limit)?
        .into_iter()
        .map(to_item)
        .collect())
}

/// Visible messages of one author, newest first.
pub fn list_by_author(db: &Database, username: &str, limit: u32) -> Result<Vec<FeedItem>, PostError> {
    let author = users::lookup_by_username(db, username)?.ok_or(PostError::AuthorNotFound)?;
    list_for(db, &author, limit).map_err(PostError::from)
}

pub(crate) fn list_for(db: &Database, author: &User, limit: u32) -> anyhow::Result<Vec<FeedItem>> {
    Ok(db
        .get_messages_by_author(author.user_id, limit)?
        .into_iter()
        .map(to_item)
        .collect())
}

// -- Handlers --

/// GET /msgs/{username}?no=N
pub async fn get_user_messages(
    State(state): State<AppState>,
    Path(username): Path<String>,
    Query(page): Query<PageQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let limit = page.limit(DEFAULT_PAGE_SIZE);
    let items = run_blocking(&state, move |db| Ok(list_by_author(db, &username, limit)?)).await?;
    Ok(Json(items))
}

/// POST /msgs/{username}
pub async fn post_message(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(username): Path<String>,
    payload: Result<Json<PostMessageRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    run_blocking(&state, move |db| {
        let author = users::lookup_by_username(db, &username)?.ok_or_else(|| {
            warn!("Cannot post as unknown user {}", username);
            PostError::AuthorNotFound
        })?;
        caller.authorize_for(&author)?;

        let Json(req) = payload?;
        post(db, author.user_id, &req.content)?;
        Ok(())
    })
    .await?;

    Ok(StatusCode::NO_CONTENT)
}
