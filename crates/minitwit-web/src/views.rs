//! View models handed to the presentation layer. They carry everything a
//! template needs (display dates, avatar URLs) so rendering stays dumb.

use md5::{Digest, Md5};
use serde::Serialize;

use minitwit_types::api::{FeedItem, UserDetails};

#[derive(Debug, Clone, Serialize)]
pub struct UserView {
    pub user_id: i64,
    pub username: String,
    pub email: String,
    pub gravatar: String,
}

impl UserView {
    pub fn new(details: UserDetails, avatar_size: u32) -> Self {
        let gravatar = gravatar(&details.email, avatar_size);
        Self {
            user_id: details.user_id,
            username: details.username,
            email: details.email,
            gravatar,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MessageView {
    pub text: String,
    pub username: String,
    pub pub_date: i64,
    pub published: String,
}

impl From<FeedItem> for MessageView {
    fn from(item: FeedItem) -> Self {
        Self {
            published: format_datetime(item.pub_date),
            text: item.content,
            username: item.user,
            pub_date: item.pub_date,
        }
    }
}

/// Which timeline a page shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Endpoint {
    Timeline,
    PublicTimeline,
    UserTimeline,
}

#[derive(Debug, Clone, Serialize)]
pub struct TimelinePage {
    pub endpoint: Endpoint,
    /// The signed-in user, if any.
    pub user: Option<UserView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile_user: Option<UserView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub followed: Option<bool>,
    pub messages: Vec<MessageView>,
    /// Confirmations queued by the request that redirected here.
    pub flashes: Vec<String>,
}

/// Login and registration forms, echoed back with an error on failure.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FormPage {
    pub error: Option<String>,
    pub flashes: Vec<String>,
    pub username: String,
    pub email: String,
}

/// Gravatar identicon URL for `email`.
pub fn gravatar(email: &str, size: u32) -> String {
    let digest = Md5::digest(email.trim().to_lowercase().as_bytes());
    format!(
        "https://www.gravatar.com/avatar/{}?d=identicon&s={}",
        hex::encode(digest),
        size
    )
}

/// `Nov 14, 2023 at 10:13PM` (UTC).
pub fn format_datetime(timestamp: i64) -> String {
    chrono::DateTime::from_timestamp(timestamp, 0)
        .map(|dt| dt.format("%b %-d, %Y at %-I:%M%p").to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gravatar_normalizes_email() {
        let expected =
            "https://www.gravatar.com/avatar/b48def645758b95537d4424c84d1a9ff?d=identicon&s=48";
        assert_eq!(gravatar("foo@example.com", 48), expected);
        assert_eq!(gravatar("  Foo@Example.COM ", 48), expected);
    }

    #[test]
    fn dates_render_like_the_templates_expect() {
        assert_eq!(format_datetime(1_700_000_000), "Nov 14, 2023 at 10:13PM");
        assert_eq!(format_datetime(0), "Jan 1, 1970 at 12:00AM");
    }

    #[test]
    fn anonymous_timeline_omits_profile_state() {
        let page = TimelinePage {
            endpoint: Endpoint::PublicTimeline,
            user: None,
            profile_user: None,
            followed: None,
            messages: vec![],
            flashes: vec![],
        };
        let json = serde_json::to_value(&page).unwrap();
        assert_eq!(json["endpoint"], "public_timeline");
        assert!(json.get("followed").is_none());
    }
}
