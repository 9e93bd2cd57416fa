use serde::{Deserialize, Serialize};

// -- Errors --

/// Uniform error envelope returned by every failing API call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub status: u16,
    pub error_msg: String,
}

// -- Users --

/// Missing fields deserialize as empty strings so they surface as
/// validation messages rather than body rejections.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub pwd: String,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginResponse {
    pub user_id: i64,
    pub username: String,
    pub token: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserDetails {
    pub user_id: i64,
    pub username: String,
    pub email: String,
}

// -- Messages --

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PostMessageRequest {
    pub content: String,
}

/// One entry of any feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedItem {
    pub content: String,
    /// Seconds since the Unix epoch.
    pub pub_date: i64,
    pub user: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileResponse {
    pub user: UserDetails,
    pub messages: Vec<FeedItem>,
    /// Only present when the request identified a viewer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub followed: Option<bool>,
}

// -- Follows --

/// `{"follow": "name"}` or `{"unfollow": "name"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FollowRequest {
    Follow(String),
    Unfollow(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FollowsResponse {
    pub follows: Vec<String>,
}

// -- Sync marker --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LatestResponse {
    pub latest: i64,
}
