use axum::{
    Json,
    extract::rejection::FormRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::error;

use minitwit_types::api::ErrorBody;

#[derive(Debug, Error)]
pub enum WebError {
    #[error("You need to be logged in")]
    Unauthorized,

    #[error("{0}")]
    Validation(String),

    /// The API answered with a non-success status.
    #[error("{message}")]
    Api { status: StatusCode, message: String },

    #[error("API request failed: {0}")]
    Upstream(#[from] reqwest::Error),
}

impl WebError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Api { status, .. } => *status,
            Self::Upstream(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl From<FormRejection> for WebError {
    fn from(e: FormRejection) -> Self {
        Self::Validation(e.body_text())
    }
}

impl IntoResponse for WebError {
    fn into_response(self) -> Response {
        let status = self.status();
        if let Self::Upstream(e) = &self {
            error!("API unreachable: {}", e);
        }

        (
            status,
            Json(ErrorBody {
                status: status.as_u16(),
                error_msg: self.to_string(),
            }),
        )
            .into_response()
    }
}
