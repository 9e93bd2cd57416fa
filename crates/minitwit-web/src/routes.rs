use axum::{
    Form, Json,
    extract::{Path, State, rejection::FormRejection},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use minitwit_types::api::{FeedItem, FollowRequest, RegisterRequest};

use crate::WebState;
use crate::error::WebError;
use crate::flash::Flashes;
use crate::session::{MaybeSession, Session, clear_cookie, session_cookie};
use crate::views::{Endpoint, FormPage, MessageView, TimelinePage, UserView};

/// Avatar size next to the signed-in user's name.
const USER_AVATAR: u32 = 48;
/// Avatar size in a profile header.
const PROFILE_AVATAR: u32 = 80;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RegisterForm {
    pub username: String,
    pub email: String,
    pub password: String,
    pub password2: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct MessageForm {
    pub text: String,
}

/// 302 to `location`.
fn found(location: &str) -> Response {
    found_with(location, Vec::new())
}

/// 302 to `location`, setting each of `cookies`.
fn found_with(location: &str, cookies: Vec<String>) -> Response {
    let mut resp = (StatusCode::FOUND, [(header::LOCATION, location.to_string())]).into_response();
    for cookie in cookies {
        match HeaderValue::from_str(&cookie) {
            Ok(value) => {
                resp.headers_mut().append(header::SET_COOKIE, value);
            }
            Err(e) => warn!("Dropping unencodable cookie: {}", e),
        }
    }
    resp
}

/// Redirect and queue `message` behind any confirmations still pending.
fn found_with_flash(location: &str, mut flashes: Flashes, message: String, mut cookies: Vec<String>) -> Response {
    flashes.push(message);
    cookies.push(flashes.into_cookie());
    found_with(location, cookies)
}

/// `page` as JSON, clearing the flash cookie its messages came from.
fn render<T: Serialize>(status: StatusCode, page: T, clear_flash: Option<String>) -> Response {
    let mut resp = (status, Json(page)).into_response();
    if let Some(value) = clear_flash.and_then(|c| HeaderValue::from_str(&c).ok()) {
        resp.headers_mut().append(header::SET_COOKIE, value);
    }
    resp
}

fn messages(items: Vec<FeedItem>) -> Vec<MessageView> {
    items.into_iter().map(MessageView::from).collect()
}

async fn signed_in_user(state: &WebState, session: &Session) -> Result<UserView, WebError> {
    let details = state.api.user_details(session.user_id).await?;
    Ok(UserView::new(details, USER_AVATAR))
}

// -- Timelines --

/// GET /, the signed-in user's own timeline.
pub async fn timeline(
    State(state): State<WebState>,
    MaybeSession(session): MaybeSession,
    flashes: Flashes,
) -> Result<Response, WebError> {
    // Pending flashes stay queued for the public timeline
    let Some(session) = session else {
        return Ok(found("/public_timeline"));
    };

    let (user, items) = tokio::try_join!(
        signed_in_user(&state, &session),
        state.api.personal_timeline(session.user_id),
    )?;

    let (flashes, clear) = flashes.take();
    let page = TimelinePage {
        endpoint: Endpoint::Timeline,
        user: Some(user),
        profile_user: None,
        followed: None,
        messages: messages(items),
        flashes,
    };
    Ok(render(StatusCode::OK, page, clear))
}

/// GET /public_timeline
pub async fn public_timeline(
    State(state): State<WebState>,
    MaybeSession(session): MaybeSession,
    flashes: Flashes,
) -> Result<Response, WebError> {
    let items = state.api.public_timeline().await?;
    let user = match &session {
        Some(session) => Some(signed_in_user(&state, session).await?),
        None => None,
    };

    let (flashes, clear) = flashes.take();
    let page = TimelinePage {
        endpoint: Endpoint::PublicTimeline,
        user,
        profile_user: None,
        followed: None,
        messages: messages(items),
        flashes,
    };
    Ok(render(StatusCode::OK, page, clear))
}

/// GET /user_timeline/{username}
pub async fn user_timeline(
    State(state): State<WebState>,
    MaybeSession(session): MaybeSession,
    flashes: Flashes,
    Path(username): Path<String>,
) -> Result<Response, WebError> {
    let token = session.as_ref().map(|s| s.token.as_str());
    let profile = state.api.profile(&username, token).await?;
    let user = match &session {
        Some(session) => Some(signed_in_user(&state, session).await?),
        None => None,
    };

    let (flashes, clear) = flashes.take();
    let page = TimelinePage {
        endpoint: Endpoint::UserTimeline,
        user,
        profile_user: Some(UserView::new(profile.user, PROFILE_AVATAR)),
        followed: profile.followed,
        messages: messages(profile.messages),
        flashes,
    };
    Ok(render(StatusCode::OK, page, clear))
}

// -- Writes --

/// POST /add_message
pub async fn add_message(
    State(state): State<WebState>,
    session: Session,
    flashes: Flashes,
    form: Result<Form<MessageForm>, FormRejection>,
) -> Result<Response, WebError> {
    let Form(form) = form?;
    state
        .api
        .post_message(&session.token, &session.username, &form.text)
        .await?;

    info!("{} posted a message", session.username);
    Ok(found_with_flash("/", flashes, "Your message was recorded".into(), Vec::new()))
}

/// GET /{username}/follow
pub async fn follow(
    State(state): State<WebState>,
    session: Session,
    flashes: Flashes,
    Path(username): Path<String>,
) -> Result<Response, WebError> {
    change_follow(state, session, flashes, FollowRequest::Follow(username)).await
}

/// GET /{username}/unfollow
pub async fn unfollow(
    State(state): State<WebState>,
    session: Session,
    flashes: Flashes,
    Path(username): Path<String>,
) -> Result<Response, WebError> {
    change_follow(state, session, flashes, FollowRequest::Unfollow(username)).await
}

async fn change_follow(
    state: WebState,
    session: Session,
    flashes: Flashes,
    change: FollowRequest,
) -> Result<Response, WebError> {
    // The edge always starts at the signed-in user
    state
        .api
        .change_follow(&session.token, &session.username, &change)
        .await?;

    let (target, message) = match &change {
        FollowRequest::Follow(target) => (target, format!("You are now following {}", target)),
        FollowRequest::Unfollow(target) => (target, format!("You are no longer following {}", target)),
    };
    Ok(found_with_flash(
        &format!("/user_timeline/{}", target),
        flashes,
        message,
        Vec::new(),
    ))
}

// -- Accounts --

fn form_page(flashes: Flashes, error: Option<String>, username: String, email: String) -> (FormPage, Option<String>) {
    let (flashes, clear) = flashes.take();
    let page = FormPage {
        error,
        flashes,
        username,
        email,
    };
    (page, clear)
}

/// GET /register
pub async fn register_form(MaybeSession(session): MaybeSession, flashes: Flashes) -> Response {
    if session.is_some() {
        return found("/");
    }
    let (page, clear) = form_page(flashes, None, String::new(), String::new());
    render(StatusCode::OK, page, clear)
}

/// POST /register
pub async fn register(
    State(state): State<WebState>,
    MaybeSession(session): MaybeSession,
    flashes: Flashes,
    form: Result<Form<RegisterForm>, FormRejection>,
) -> Result<Response, WebError> {
    if session.is_some() {
        return Ok(found("/"));
    }
    let Form(form) = form?;

    let rejected = |flashes: Flashes, status: StatusCode, message: String| {
        let (page, clear) = form_page(flashes, Some(message), form.username.clone(), form.email.clone());
        render(status, page, clear)
    };

    if form.password != form.password2 {
        return Ok(rejected(
            flashes,
            StatusCode::BAD_REQUEST,
            "The two passwords do not match".into(),
        ));
    }

    let request = RegisterRequest {
        username: form.username.clone(),
        email: form.email.clone(),
        pwd: form.password.clone(),
    };
    match state.api.register(&request).await {
        Ok(()) => {
            info!("Registered {}", form.username);
            Ok(found_with_flash(
                "/login",
                flashes,
                "You were successfully registered and can login now".into(),
                Vec::new(),
            ))
        }
        Err(WebError::Api { status, message }) => Ok(rejected(flashes, status, message)),
        Err(e) => Err(e),
    }
}

/// GET /login
pub async fn login_form(MaybeSession(session): MaybeSession, flashes: Flashes) -> Response {
    if session.is_some() {
        return found("/");
    }
    let (page, clear) = form_page(flashes, None, String::new(), String::new());
    render(StatusCode::OK, page, clear)
}

/// POST /login
pub async fn login(
    State(state): State<WebState>,
    flashes: Flashes,
    form: Result<Form<LoginForm>, FormRejection>,
) -> Result<Response, WebError> {
    let Form(form) = form?;

    match state.api.login(&form.username, &form.password).await {
        Ok(login) => {
            info!("{} signed in", login.username);
            Ok(found_with_flash(
                "/",
                flashes,
                "You were logged in".into(),
                vec![session_cookie(&login.token)],
            ))
        }
        Err(WebError::Api { status, message })
            if status == StatusCode::UNAUTHORIZED || status == StatusCode::NOT_FOUND =>
        {
            warn!("Failed login for {}: {}", form.username, message);
            let (page, clear) = form_page(flashes, Some("Invalid credentials".into()), form.username, String::new());
            Ok(render(StatusCode::UNAUTHORIZED, page, clear))
        }
        Err(e) => Err(e),
    }
}

/// GET /logout
pub async fn logout(flashes: Flashes) -> Response {
    found_with_flash("/", flashes, "You were logged out".into(), vec![clear_cookie()])
}
