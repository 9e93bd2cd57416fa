//! Feed composition: the public timeline, a user's personal timeline
//! (own messages plus those of everyone they follow) and a profile page.
//!
//! All three are pulled on demand. Items are ordered by `pub_date`
//! descending with the message id breaking ties, so two messages published
//! in the same second come back in reverse insertion order.

use axum::{
    Json,
    extract::{Path, Query, State, rejection::QueryRejection},
    response::IntoResponse,
};
use serde::Deserialize;
use thiserror::Error;

use minitwit_db::Database;
use minitwit_types::api::{FeedItem, ProfileResponse};

use crate::error::ApiError;
use crate::session::Viewer;
use crate::users::{self, User};
use crate::{
    AppState, DEFAULT_PAGE_SIZE, PageQuery, TIMELINE_PAGE_SIZE, follows, messages, run_blocking,
};

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("Cannot find user")]
    UserNotFound,
    #[error("Cannot find viewer")]
    ViewerNotFound,
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

impl From<FeedError> for ApiError {
    fn from(e: FeedError) -> Self {
        match e {
            FeedError::UserNotFound | FeedError::ViewerNotFound => ApiError::NotFound(e.to_string()),
            FeedError::Store(e) => ApiError::Store(e),
        }
    }
}

/// A profile page: one author's messages, plus whether the viewer follows
/// them when there is a viewer.
#[derive(Debug)]
pub struct ProfileFeed {
    pub user: User,
    pub items: Vec<FeedItem>,
    /// `None` for anonymous views, not `Some(false)`.
    pub followed: Option<bool>,
}

impl ProfileFeed {
    pub fn into_response_body(self) -> ProfileResponse {
        ProfileResponse {
            user: self.user.details(),
            messages: self.items,
            followed: self.followed,
        }
    }
}

/// True when no item is newer than the one before it.
pub fn is_newest_first(items: &[FeedItem]) -> bool {
    items.windows(2).all(|w| w[0].pub_date >= w[1].pub_date)
}

pub fn public_feed(db: &Database, limit: u32) -> Result<Vec<FeedItem>, FeedError> {
    let items = messages::list_all(db, limit)?;
    debug_assert!(is_newest_first(&items));
    Ok(items)
}

/// Visible messages authored by `user_id` or by anyone `user_id` follows.
pub fn personal_feed(db: &Database, user_id: i64, limit: u32) -> Result<Vec<FeedItem>, FeedError> {
    if users::lookup_by_id(db, user_id)?.is_none() {
        return Err(FeedError::UserNotFound);
    }

    let items: Vec<FeedItem> = db
        .get_personal_feed(user_id, limit)?
        .into_iter()
        .map(messages::to_item)
        .collect();

    debug_assert!(is_newest_first(&items));
    Ok(items)
}

pub fn profile_feed(
    db: &Database,
    username: &str,
    viewer: Option<i64>,
    limit: u32,
) -> Result<ProfileFeed, FeedError> {
    let user = users::lookup_by_username(db, username)?.ok_or(FeedError::UserNotFound)?;

    let followed = match viewer {
        Some(viewer_id) => {
            if users::lookup_by_id(db, viewer_id)?.is_none() {
                return Err(FeedError::ViewerNotFound);
            }
            Some(follows::is_following(db, viewer_id, user.user_id)?)
        }
        None => None,
    };

    let items = messages::list_for(db, &user, limit)?;
    debug_assert!(is_newest_first(&items));

    Ok(ProfileFeed {
        user,
        items,
        followed,
    })
}

// -- Handlers --

#[derive(Debug, Deserialize)]
pub struct FollowingQuery {
    pub userid: Option<String>,
    pub no: Option<String>,
}

/// GET /msgs?no=N
pub async fn get_public_messages(
    State(state): State<AppState>,
    Query(page): Query<PageQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let limit = page.limit(DEFAULT_PAGE_SIZE);
    let items = run_blocking(&state, move |db| Ok(public_feed(db, limit)?)).await?;
    Ok(Json(items))
}

/// GET /followingmsgs?userid=ID
pub async fn get_following_messages(
    State(state): State<AppState>,
    query: Result<Query<FollowingQuery>, QueryRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Query(query) = query?;

    let raw = query
        .userid
        .ok_or_else(|| ApiError::Validation("userid is required".into()))?;
    let user_id: i64 = raw
        .trim()
        .parse()
        .map_err(|_| ApiError::Validation(format!("Invalid userid {:?}", raw)))?;
    let limit = PageQuery { no: query.no }.limit(TIMELINE_PAGE_SIZE);

    let items = run_blocking(&state, move |db| Ok(personal_feed(db, user_id, limit)?)).await?;
    Ok(Json(items))
}

/// GET /profile/{username}?no=N
pub async fn get_profile(
    State(state): State<AppState>,
    Viewer(viewer): Viewer,
    Path(username): Path<String>,
    Query(page): Query<PageQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let limit = page.limit(DEFAULT_PAGE_SIZE);

    let profile =
        run_blocking(&state, move |db| Ok(profile_feed(db, &username, viewer, limit)?)).await?;
    Ok(Json(profile.into_response_body()))
}
