use axum::{
    Json,
    extract::{Path, Query, State, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use thiserror::Error;
use tracing::{info, warn};

use minitwit_db::Database;
use minitwit_types::api::{FollowRequest, FollowsResponse};

use crate::error::ApiError;
use crate::session::CallerIdentity;
use crate::users;
use crate::{AppState, DEFAULT_PAGE_SIZE, PageQuery, run_blocking};

#[derive(Debug, Error)]
pub enum FollowError {
    #[error("You cannot follow yourself")]
    SelfFollow,
    #[error("The target user cannot be found")]
    TargetNotFound,
    #[error("You are already following this user")]
    AlreadyFollowing,
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

impl From<FollowError> for ApiError {
    fn from(e: FollowError) -> Self {
        match e {
            FollowError::SelfFollow => ApiError::Validation(e.to_string()),
            FollowError::TargetNotFound => ApiError::NotFound(e.to_string()),
            FollowError::AlreadyFollowing => ApiError::Conflict(e.to_string()),
            FollowError::Store(e) => ApiError::Store(e),
        }
    }
}

// -- Graph operations --

pub fn follow(db: &Database, who_id: i64, whom_id: i64) -> Result<(), FollowError> {
    if who_id == whom_id {
        return Err(FollowError::SelfFollow);
    }
    if users::lookup_by_id(db, whom_id)?.is_none() {
        return Err(FollowError::TargetNotFound);
    }

    // Existence check and insert are one statement under the writer lock
    if !db.insert_follower(who_id, whom_id)? {
        return Err(FollowError::AlreadyFollowing);
    }
    Ok(())
}

/// Removing an edge that does not exist is a successful no-op.
pub fn unfollow(db: &Database, who_id: i64, whom_id: i64) -> Result<(), FollowError> {
    if users::lookup_by_id(db, whom_id)?.is_none() {
        return Err(FollowError::TargetNotFound);
    }

    db.delete_follower(who_id, whom_id)?;
    Ok(())
}

pub fn is_following(db: &Database, who_id: i64, whom_id: i64) -> anyhow::Result<bool> {
    if who_id == whom_id {
        return Ok(false);
    }
    db.is_following(who_id, whom_id)
}

pub fn list_followees(db: &Database, who_id: i64, limit: u32) -> anyhow::Result<Vec<String>> {
    db.get_followees(who_id, limit)
}

// -- Handlers --

#[derive(Debug, Deserialize)]
pub struct IsFollowingQuery {
    #[serde(rename = "whoUsername", default)]
    pub who_username: String,
    #[serde(rename = "whomUsername", default)]
    pub whom_username: String,
}

/// GET /fllws/{username}?no=N
pub async fn get_follows(
    State(state): State<AppState>,
    Path(username): Path<String>,
    Query(page): Query<PageQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let limit = page.limit(DEFAULT_PAGE_SIZE);

    let follows = run_blocking(&state, move |db| {
        let user = users::lookup_by_username(db, &username)?
            .ok_or_else(|| ApiError::NotFound("Cannot find user".into()))?;
        Ok(list_followees(db, user.user_id, limit)?)
    })
    .await?;

    Ok(Json(FollowsResponse { follows }))
}

/// POST /fllws/{username} with `{"follow": target}` or `{"unfollow": target}`
pub async fn post_follow(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(username): Path<String>,
    payload: Result<Json<FollowRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    run_blocking(&state, move |db| {
        let who = users::lookup_by_username(db, &username)?.ok_or_else(|| {
            warn!("Follow change requested for unknown user {}", username);
            ApiError::NotFound("Cannot find user".into())
        })?;
        caller.authorize_for(&who)?;

        let Json(req) = payload?;
        let (target, following) = match &req {
            FollowRequest::Follow(target) => (target, true),
            FollowRequest::Unfollow(target) => (target, false),
        };

        let whom = users::lookup_by_username(db, target)?.ok_or(FollowError::TargetNotFound)?;
        if following {
            follow(db, who.user_id, whom.user_id)?;
            info!("{} now follows {}", who.username, whom.username);
        } else {
            unfollow(db, who.user_id, whom.user_id)?;
            info!("{} no longer follows {}", who.username, whom.username);
        }
        Ok(())
    })
    .await?;

    Ok(StatusCode::NO_CONTENT)
}

/// GET /isfollowing?whoUsername=&whomUsername=. Unknown names read as `false`.
pub async fn get_is_following(
    State(state): State<AppState>,
    Query(query): Query<IsFollowingQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let following = run_blocking(&state, move |db| {
        let who = users::lookup_by_username(db, &query.who_username)?;
        let whom = users::lookup_by_username(db, &query.whom_username)?;
        Ok(match (who, whom) {
            (Some(who), Some(whom)) => is_following(db, who.user_id, whom.user_id)?,
            _ => false,
        })
    })
    .await?;

    Ok(Json(following))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (Database, i64, i64) {
        let db = Database::open_in_memory().unwrap();
        let a = users::register(&db, "a", "a@example.com", "pw").unwrap();
        let b = users::register(&db, "b", "b@example.com", "pw").unwrap();
        (db, a, b)
    }

    #[test]
    fn follow_then_unfollow() {
        let (db, a, b) = setup();

        follow(&db, a, b).unwrap();
        assert!(is_following(&db, a, b).unwrap());
        assert!(!is_following(&db, b, a).unwrap());
        assert_eq!(list_followees(&db, a, 10).unwrap(), vec!["b"]);

        unfollow(&db, a, b).unwrap();
        assert!(!is_following(&db, a, b).unwrap());

        // Idempotent
        unfollow(&db, a, b).unwrap();
    }

    #[test]
    fn self_follow_is_rejected() {
        let (db, a, _) = setup();
        assert!(matches!(follow(&db, a, a), Err(FollowError::SelfFollow)));
        assert!(!is_following(&db, a, a).unwrap());
    }

    #[test]
    fn duplicate_follow_is_an_error() {
        let (db, a, b) = setup();
        follow(&db, a, b).unwrap();
        assert!(matches!(follow(&db, a, b), Err(FollowError::AlreadyFollowing)));
        assert_eq!(list_followees(&db, a, 10).unwrap().len(), 1);
    }

    #[test]
    fn concurrent_follows_insert_one_edge() {
        use std::sync::Barrier;

        const WRITERS: usize = 8;
        let (db, a, b) = setup();
        let barrier = Barrier::new(WRITERS);

        let results: Vec<_> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..WRITERS)
                .map(|_| {
                    let (db, barrier) = (&db, &barrier);
                    s.spawn(move || {
                        barrier.wait();
                        follow(db, a, b)
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert_eq!(
            results
                .iter()
                .filter(|r| matches!(r, Err(FollowError::AlreadyFollowing)))
                .count(),
            WRITERS - 1
        );
        assert_eq!(list_followees(&db, a, 10).unwrap(), vec!["b"]);
    }

    #[test]
    fn unknown_target_is_an_error() {
        let (db, a, b) = setup();
        assert!(matches!(follow(&db, a, b + 50), Err(FollowError::TargetNotFound)));
        assert!(matches!(unfollow(&db, a, b + 50), Err(FollowError::TargetNotFound)));
        assert!(!is_following(&db, a, b + 50).unwrap());
    }
}
