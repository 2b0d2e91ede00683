//! Crate error model and HTTP mapping helpers.
//! Configuration problems surface at construction time; request-side problems
//! (malformed pagination/filter input) map to plain-text HTTP responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum Error {
    /// Rejected configuration, e.g. an invalid cookie name or path.
    #[error("invalid configuration: {0}")]
    Config(String),
    /// Malformed request input, e.g. a bad `limit` or `filter` parameter.
    #[error("invalid request: {0}")]
    Validation(String),
}

impl Error {
    pub fn config(message: impl Into<String>) -> Self {
        Error::Config(message.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Error::Validation(message.into())
    }

    /// Map the error to the HTTP status it should answer with.
    pub fn http_status(&self) -> StatusCode {
        match self {
            Error::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Error::Validation(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        (self.http_status(), self.to_string()).into_response()
    }
}
