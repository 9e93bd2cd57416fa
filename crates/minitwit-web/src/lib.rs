pub mod client;
pub mod error;
pub mod flash;
pub mod routes;
pub mod session;
pub mod views;

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use crate::client::ApiClient;

pub type WebState = Arc<WebStateInner>;

pub struct WebStateInner {
    pub api: ApiClient,
    /// Must match the API service's secret: the cookie carries its token.
    pub session_secret: String,
}

pub fn router(state: WebState) -> Router {
    Router::new()
        .route("/", get(routes::timeline))
        .route("/public_timeline", get(routes::public_timeline))
        .route("/user_timeline/{username}", get(routes::user_timeline))
        .route("/add_message", post(routes::add_message))
        .route("/register", get(routes::register_form).post(routes::register))
        .route("/login", get(routes::login_form).post(routes::login))
        .route("/logout", get(routes::logout))
        .route("/{username}/follow", get(routes::follow))
        .route("/{username}/unfollow", get(routes::unfollow))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
