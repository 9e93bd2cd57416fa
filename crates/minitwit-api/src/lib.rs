pub mod error;
pub mod feed;
pub mod follows;
pub mod latest;
pub mod messages;
pub mod session;
pub mod users;

use std::sync::Arc;

use axum::{
    Router, middleware,
    routing::{get, post},
};
use serde::Deserialize;
use tower_http::trace::TraceLayer;
use tracing::error;

use minitwit_db::Database;

use crate::error::ApiError;
use crate::latest::LatestTracker;

/// Page size used when a listing request carries no usable `no`.
pub const DEFAULT_PAGE_SIZE: u32 = 100;

/// Page size of the personal timeline, kept from the HTML front-end.
pub const TIMELINE_PAGE_SIZE: u32 = 30;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub session_secret: String,
    /// Full `Authorization` header value expected from the simulator.
    pub simulator_auth: String,
    pub latest: Arc<dyn LatestTracker>,
}

/// `?no=N` on listing endpoints. Absent or unparsable values fall back to
/// the endpoint's default.
#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub no: Option<String>,
}

impl PageQuery {
    pub fn limit(&self, default: u32) -> u32 {
        self.no
            .as_deref()
            .and_then(|n| n.trim().parse().ok())
            .unwrap_or(default)
    }
}

/// Build the API router with every endpoint and the router-wide layers.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/latest", get(latest::get_latest))
        .route("/register", post(users::post_register))
        .route("/login", post(users::post_login))
        .route("/getUserDetails", get(users::get_user_details))
        .route("/msgs", get(feed::get_public_messages))
        .route(
            "/msgs/{username}",
            get(messages::get_user_messages).post(messages::post_message),
        )
        .route(
            "/fllws/{username}",
            get(follows::get_follows).post(follows::post_follow),
        )
        .route("/isfollowing", get(follows::get_is_following))
        .route("/followingmsgs", get(feed::get_following_messages))
        .route("/profile/{username}", get(feed::get_profile))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            latest::track_latest,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Run store work off the async runtime.
pub(crate) async fn run_blocking<F, T>(state: &AppState, f: F) -> Result<T, ApiError>
where
    F: FnOnce(&Database) -> Result<T, ApiError> + Send + 'static,
    T: Send + 'static,
{
    let state = state.clone();
    tokio::task::spawn_blocking(move || f(&state.db))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::Store(anyhow::anyhow!("worker task failed: {}", e))
        })?
}
