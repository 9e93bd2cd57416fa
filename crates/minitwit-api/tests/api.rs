use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

use minitwit_api::latest::MemoryLatestTracker;
use minitwit_api::session::simulator_authorization;
use minitwit_api::{AppStateInner, router};
use minitwit_db::Database;

const SECRET: &str = "integration-secret";

fn sim_auth() -> String {
    simulator_authorization("simulator", "super_safe!")
}

fn app() -> Router {
    router(Arc::new(AppStateInner {
        db: Database::open_in_memory().expect("in-memory db"),
        session_secret: SECRET.into(),
        simulator_auth: sim_auth(),
        latest: Arc::new(MemoryLatestTracker::default()),
    }))
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let resp = app.clone().oneshot(req).await.expect("router is infallible");
    let status = resp.status();
    let bytes = resp.into_body().collect().await.expect("body").to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into()))
    };
    (status, body)
}

fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, auth: Option<&str>, body: Value) -> Request<Body> {
    let mut req = Request::post(uri).header(header::CONTENT_TYPE, "application/json");
    if let Some(auth) = auth {
        req = req.header(header::AUTHORIZATION, auth);
    }
    req.body(Body::from(body.to_string())).unwrap()
}

async fn register(app: &Router, username: &str) {
    let (status, _) = send(
        app,
        post_json(
            "/register",
            None,
            json!({"username": username, "email": format!("{username}@example.com"), "pwd": "default"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}

async fn user_id(app: &Router, username: &str) -> i64 {
    let (status, body) = send(app, get(&format!("/getUserDetails?username={username}"))).await;
    assert_eq!(status, StatusCode::OK);
    body["user_id"].as_i64().expect("user_id")
}

fn contents(body: &Value) -> Vec<String> {
    body.as_array()
        .expect("feed array")
        .iter()
        .map(|m| m["content"].as_str().unwrap().to_string())
        .collect()
}

#[tokio::test]
async fn duplicate_registration_is_rejected() {
    let app = app();
    register(&app, "foo").await;

    let (status, body) = send(
        &app,
        post_json(
            "/register",
            None,
            json!({"username": "foo", "email": "foo2@example.com", "pwd": "default"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], 400);
    assert_eq!(body["error_msg"], "The username is already taken");

    let (status, body) = send(
        &app,
        post_json("/register", None, json!({"username": "meh", "email": "broken", "pwd": "x"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error_msg"], "You have to enter a valid email address");
}

#[tokio::test]
async fn follow_unfollow_shapes_personal_feed() {
    let app = app();
    let sim = sim_auth();
    register(&app, "foo").await;
    register(&app, "bar").await;

    let (status, _) = send(&app, post_json("/msgs/foo", Some(&sim), json!({"content": "hello"}))).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send(&app, post_json("/fllws/bar", Some(&sim), json!({"follow": "foo"}))).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, follows) = send(&app, get("/fllws/bar")).await;
    assert_eq!(follows, json!({"follows": ["foo"]}));

    let bar = user_id(&app, "bar").await;
    let (status, feed) = send(&app, get(&format!("/followingmsgs?userid={bar}"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(contents(&feed), vec!["hello"]);
    assert_eq!(feed[0]["user"], "foo");
    assert!(feed[0]["pub_date"].is_i64());

    let (status, _) = send(&app, post_json("/fllws/bar", Some(&sim), json!({"unfollow": "foo"}))).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, feed) = send(&app, get(&format!("/followingmsgs?userid={bar}"))).await;
    assert!(contents(&feed).is_empty());

    let (_, public) = send(&app, get("/msgs")).await;
    assert_eq!(contents(&public), vec!["hello"]);

    // Unfollowing again is still a success
    let (status, _) = send(&app, post_json("/fllws/bar", Some(&sim), json!({"unfollow": "foo"}))).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn follow_errors_map_to_statuses() {
    let app = app();
    let sim = sim_auth();
    register(&app, "bar").await;
    register(&app, "foo").await;

    let (status, body) = send(&app, post_json("/fllws/unknownuser", Some(&sim), json!({"follow": "bar"}))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["status"], 404);

    let (status, _) = send(&app, post_json("/fllws/bar", Some(&sim), json!({"follow": "ghost"}))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app, post_json("/fllws/bar", Some(&sim), json!({"follow": "bar"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    send(&app, post_json("/fllws/bar", Some(&sim), json!({"follow": "foo"}))).await;
    let (status, body) = send(&app, post_json("/fllws/bar", Some(&sim), json!({"follow": "foo"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error_msg"], "You are already following this user");

    let (status, _) = send(&app, post_json("/fllws/bar", Some(&sim), json!({"block": "foo"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, following) = send(&app, get("/isfollowing?whoUsername=bar&whomUsername=foo")).await;
    assert_eq!(following, json!(true));
    let (_, following) = send(&app, get("/isfollowing?whoUsername=bar&whomUsername=ghost")).await;
    assert_eq!(following, json!(false));
}

#[tokio::test]
async fn protected_writes_need_a_credential() {
    let app = app();
    register(&app, "foo").await;

    let (status, body) = send(&app, post_json("/msgs/foo", None, json!({"content": "hi"}))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(
        body,
        json!({"status": 403, "error_msg": "You are not authorized to use this resource!"})
    );

    let (status, _) = send(&app, post_json("/msgs/foo", Some("Basic Zm9vOmJhcg=="), json!({"content": "hi"}))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(&app, post_json("/fllws/foo", None, json!({"follow": "foo"}))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(&app, post_json("/msgs/foo", Some(&sim_auth()), json!({"content": "  "}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, msgs) = send(&app, get("/msgs/foo")).await;
    assert!(contents(&msgs).is_empty());
}

#[tokio::test]
async fn session_token_acts_only_for_its_user() {
    let app = app();
    register(&app, "foo").await;
    register(&app, "bar").await;

    let (status, login) = send(&app, post_json("/login", None, json!({"username": "foo", "password": "default"}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(login["username"], "foo");
    let bearer = format!("Bearer {}", login["token"].as_str().unwrap());

    let (status, _) = send(&app, post_json("/msgs/foo", Some(&bearer), json!({"content": "as foo"}))).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send(&app, post_json("/msgs/bar", Some(&bearer), json!({"content": "as bar"}))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(&app, post_json("/fllws/foo", Some(&bearer), json!({"follow": "bar"}))).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, msgs) = send(&app, get("/msgs/foo?no=1")).await;
    assert_eq!(contents(&msgs), vec!["as foo"]);
}

#[tokio::test]
async fn login_failures_are_invalid_credentials() {
    let app = app();
    register(&app, "foo").await;

    let (status, body) = send(&app, post_json("/login", None, json!({"username": "foo", "password": "nope"}))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error_msg"], "Invalid credentials");

    let (status, body) = send(&app, post_json("/login", None, json!({"username": "ghost", "password": "default"}))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error_msg"], "Invalid credentials");
}

#[tokio::test]
async fn latest_is_recorded_on_every_outcome() {
    let app = app();

    let (status, body) = send(&app, get("/latest")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"latest": -1}));

    send(&app, get("/latest?latest=42")).await;
    let (_, body) = send(&app, get("/latest")).await;
    assert_eq!(body, json!({"latest": 42}));

    // Rejected write still moves the marker
    let (status, _) = send(&app, post_json("/msgs/nobody?latest=43", None, json!({"content": "x"}))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (_, body) = send(&app, get("/latest")).await;
    assert_eq!(body, json!({"latest": 43}));

    // Unknown user, still recorded
    let (status, _) = send(&app, get("/msgs/nobody?latest=44")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (_, body) = send(&app, get("/latest?latest=oops")).await;
    assert_eq!(body, json!({"latest": 44}));
}

#[tokio::test]
async fn profile_carries_follow_state_for_sessions_only() {
    let app = app();
    let sim = sim_auth();
    register(&app, "foo").await;
    register(&app, "bar").await;
    send(&app, post_json("/msgs/foo", Some(&sim), json!({"content": "hello"}))).await;
    send(&app, post_json("/fllws/bar", Some(&sim), json!({"follow": "foo"}))).await;

    let (status, anon) = send(&app, get("/profile/foo")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(anon["user"]["username"], "foo");
    assert!(anon.get("followed").is_none());
    assert_eq!(contents(&anon["messages"]), vec!["hello"]);

    let (_, login) = send(&app, post_json("/login", None, json!({"username": "bar", "password": "default"}))).await;
    let bearer = format!("Bearer {}", login["token"].as_str().unwrap());
    let req = Request::get("/profile/foo")
        .header(header::AUTHORIZATION, bearer)
        .body(Body::empty())
        .unwrap();
    let (_, viewed) = send(&app, req).await;
    assert_eq!(viewed["followed"], json!(true));

    let (status, _) = send(&app, get("/profile/ghost")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn user_details_lookup() {
    let app = app();
    register(&app, "foo").await;

    let id = user_id(&app, "foo").await;
    let (status, body) = send(&app, get(&format!("/getUserDetails?user_id={id}"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"user_id": id, "username": "foo", "email": "foo@example.com"}));

    let (status, _) = send(&app, get("/getUserDetails")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = send(&app, get("/getUserDetails?user_id=abc")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = send(&app, get("/getUserDetails?username=ghost")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = send(&app, get("/followingmsgs?userid=999")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn malformed_body_gets_the_error_envelope() {
    let app = app();
    let req = Request::post("/register")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], 400);
}
