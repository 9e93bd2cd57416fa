use reqwest::{Client, RequestBuilder, Response, Url, header};
use serde::de::DeserializeOwned;
use tracing::debug;

use minitwit_types::api::{
    ErrorBody, FeedItem, FollowRequest, LoginRequest, LoginResponse, PostMessageRequest,
    ProfileResponse, RegisterRequest, UserDetails,
};

use crate::error::WebError;

/// Number of messages a rendered timeline shows.
pub const PER_PAGE: u32 = 30;

/// Typed calls against the MiniTwit API. The front end never touches the
/// store directly.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: Client,
    base: Url,
}

impl ApiClient {
    pub fn new(endpoint: &str) -> anyhow::Result<Self> {
        let base = Url::parse(endpoint)?;
        if base.cannot_be_a_base() {
            anyhow::bail!("API endpoint {:?} cannot be used as a base URL", endpoint);
        }
        Ok(Self {
            http: Client::new(),
            base,
        })
    }

    /// Join `segments` onto the base, percent-encoding each one.
    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    pub async fn public_timeline(&self) -> Result<Vec<FeedItem>, WebError> {
        let req = self
            .http
            .get(self.url(&["msgs"]))
            .query(&[("no", PER_PAGE)]);
        json(req).await
    }

    pub async fn personal_timeline(&self, user_id: i64) -> Result<Vec<FeedItem>, WebError> {
        let req = self
            .http
            .get(self.url(&["followingmsgs"]))
            .query(&[("userid", user_id.to_string()), ("no", PER_PAGE.to_string())]);
        json(req).await
    }

    /// Profile of `username`; with a token the API also reports whether the
    /// token's user follows them.
    pub async fn profile(&self, username: &str, token: Option<&str>) -> Result<ProfileResponse, WebError> {
        let mut req = self
            .http
            .get(self.url(&["profile", username]))
            .query(&[("no", PER_PAGE)]);
        if let Some(token) = token {
            req = req.bearer_auth(token);
        }
        json(req).await
    }

    pub async fn user_details(&self, user_id: i64) -> Result<UserDetails, WebError> {
        let req = self
            .http
            .get(self.url(&["getUserDetails"]))
            .query(&[("user_id", user_id)]);
        json(req).await
    }

    pub async fn register(&self, body: &RegisterRequest) -> Result<(), WebError> {
        let req = self.http.post(self.url(&["register"])).json(body);
        send(req).await.map(drop)
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<LoginResponse, WebError> {
        let body = LoginRequest {
            username: username.to_string(),
            password: password.to_string(),
        };
        let req = self.http.post(self.url(&["login"])).json(&body);
        json(req).await
    }

    pub async fn post_message(&self, token: &str, username: &str, text: &str) -> Result<(), WebError> {
        let body = PostMessageRequest {
            content: text.to_string(),
        };
        let req = self
            .http
            .post(self.url(&["msgs", username]))
            .bearer_auth(token)
            .json(&body);
        send(req).await.map(drop)
    }

    /// Follow or unfollow on behalf of `username`, the token's own user.
    pub async fn change_follow(&self, token: &str, username: &str, change: &FollowRequest) -> Result<(), WebError> {
        let req = self
            .http
            .post(self.url(&["fllws", username]))
            .bearer_auth(token)
            .json(change);
        send(req).await.map(drop)
    }
}

async fn send(req: RequestBuilder) -> Result<Response, WebError> {
    let resp = req.header(header::ACCEPT, "application/json").send().await?;
    check(resp).await
}

async fn json<T: DeserializeOwned>(req: RequestBuilder) -> Result<T, WebError> {
    Ok(send(req).await?.json().await?)
}

/// Turn a non-success response into `WebError::Api`, keeping the API's own
/// status and message.
async fn check(resp: Response) -> Result<Response, WebError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let url = resp.url().clone();
    let message = match resp.json::<ErrorBody>().await {
        Ok(body) => body.error_msg,
        Err(_) => status.canonical_reason().unwrap_or("Request failed").to_string(),
    };
    debug!("API {} answered {}: {}", url.path(), status, message);

    Err(WebError::Api { status, message })
}
