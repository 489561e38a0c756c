//! HTTP collaborator errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("request failed: {0}")]
    Request(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("parse error: {0}")]
    Parse(String),
}

impl HttpError {
    /// Turn a non-success response into an error, keeping the body for context.
    pub(crate) async fn from_response(response: reqwest::Response) -> Self {
        let status = response.status().as_u16();
        let message = response.text().await.unwrap_or_default();
        HttpError::Api { status, message }
    }
}

impl From<reqwest::Error> for HttpError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            HttpError::Parse(e.to_string())
        } else {
            HttpError::Request(e.to_string())
        }
    }
}
