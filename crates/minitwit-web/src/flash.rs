//! One-shot confirmation messages carried across a redirect.
//!
//! A state change queues its message in the `minitwit_flash` cookie and
//! redirects; the next page that renders shows the queued messages and
//! clears the cookie.

use std::convert::Infallible;

use axum::{
    extract::FromRequestParts,
    http::{HeaderMap, request::Parts},
};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD as B64;
use tracing::debug;

use crate::session::read_cookie;

pub const FLASH_COOKIE: &str = "minitwit_flash";

/// Messages queued by earlier requests.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Flashes {
    messages: Vec<String>,
    /// The request carried a flash cookie, even an unreadable one.
    from_cookie: bool,
}

impl Flashes {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let Some(raw) = read_cookie(headers, FLASH_COOKIE) else {
            return Self::default();
        };

        let messages = B64
            .decode(raw)
            .ok()
            .and_then(|bytes| serde_json::from_slice::<Vec<String>>(&bytes).ok())
            .unwrap_or_else(|| {
                debug!("Dropping unreadable flash cookie");
                Vec::new()
            });

        Self {
            messages,
            from_cookie: true,
        }
    }

    pub fn push(&mut self, message: impl Into<String>) {
        self.messages.push(message.into());
    }

    pub fn messages(&self) -> &[String] {
        &self.messages
    }

    /// Hand the messages to a page. The returned cookie, if any, must be
    /// sent with that page so they are not shown twice.
    pub fn take(self) -> (Vec<String>, Option<String>) {
        let clear = self.from_cookie.then(clear_flash_cookie);
        (self.messages, clear)
    }

    /// `Set-Cookie` value queueing every message for the next page.
    pub fn into_cookie(self) -> String {
        let json = serde_json::to_vec(&self.messages).unwrap_or_default();
        format!(
            "{}={}; HttpOnly; Path=/; SameSite=Strict",
            FLASH_COOKIE,
            B64.encode(json)
        )
    }
}

pub fn clear_flash_cookie() -> String {
    format!("{}=; HttpOnly; Path=/; Max-Age=0; SameSite=Strict", FLASH_COOKIE)
}

impl<S: Send + Sync> FromRequestParts<S> for Flashes {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self::from_headers(&parts.headers))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderValue, header};

    fn headers_for(set_cookie: &str) -> HeaderMap {
        let pair = set_cookie.split(';').next().unwrap();
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_str(pair).unwrap());
        headers
    }

    #[test]
    fn queued_messages_survive_the_redirect() {
        let mut flashes = Flashes::default();
        flashes.push("You were logged in");
        flashes.push("Your message was recorded; \"quoted\" = fine");

        let next = Flashes::from_headers(&headers_for(&flashes.into_cookie()));
        assert_eq!(
            next.messages(),
            ["You were logged in", "Your message was recorded; \"quoted\" = fine"]
        );

        let (messages, clear) = next.take();
        assert_eq!(messages.len(), 2);
        assert!(clear.unwrap().contains("Max-Age=0"));
    }

    #[test]
    fn no_cookie_means_nothing_to_clear() {
        let (messages, clear) = Flashes::from_headers(&HeaderMap::new()).take();
        assert!(messages.is_empty());
        assert!(clear.is_none());
    }

    #[test]
    fn garbage_cookie_is_cleared_without_messages() {
        let flashes = Flashes::from_headers(&headers_for("minitwit_flash=%%%"));
        assert!(flashes.messages().is_empty());
        assert!(flashes.take().1.is_some());
    }
}
