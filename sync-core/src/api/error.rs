use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Classification of a failed request to the remote API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SubmitErrorKind {
    /// The resource URL does not exist (HTTP 404) or cannot be parsed
    InvalidUrl,
    /// Credentials or bearer token rejected (HTTP 401)
    Unauthorized,
    /// Internal server error (HTTP 500)
    ServerError,
    /// Any other non-success status
    OtherHttpError(u16),
    /// The configured domain lacks `http://` or `https://`
    MissingScheme,
    /// The server could not be reached
    ConnectionError,
}

impl fmt::Display for SubmitErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubmitErrorKind::InvalidUrl => write!(f, "The API domain URL is not valid"),
            SubmitErrorKind::Unauthorized => write!(f, "Invalid credentials"),
            SubmitErrorKind::ServerError => write!(f, "Internal server error (500)"),
            SubmitErrorKind::OtherHttpError(status) => {
                write!(f, "The request failed with HTTP status {}", status)
            }
            SubmitErrorKind::MissingScheme => write!(
                f,
                "The domain is not valid, check that it includes 'http://' or 'https://'"
            ),
            SubmitErrorKind::ConnectionError => write!(
                f,
                "Connection error, check the network connection and try again"
            ),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind}{}", detail_suffix(.detail))]
pub struct SubmitError {
    pub kind: SubmitErrorKind,
    pub http_status: Option<u16>,
    pub detail: String,
}

fn detail_suffix(detail: &str) -> String {
    if detail.is_empty() {
        String::new()
    } else {
        format!(" ({})", detail)
    }
}

impl SubmitError {
    pub fn new(kind: SubmitErrorKind, detail: impl Into<String>) -> Self {
        let http_status = match kind {
            SubmitErrorKind::InvalidUrl
            | SubmitErrorKind::MissingScheme
            | SubmitErrorKind::ConnectionError => None,
            SubmitErrorKind::Unauthorized => Some(401),
            SubmitErrorKind::ServerError => Some(500),
            SubmitErrorKind::OtherHttpError(status) => Some(status),
        };

        Self {
            kind,
            http_status,
            detail: detail.into(),
        }
    }

    /// Build the error for a non-success HTTP status
    pub fn from_status(status: u16, detail: impl Into<String>) -> Self {
        let kind = match status {
            404 => SubmitErrorKind::InvalidUrl,
            401 => SubmitErrorKind::Unauthorized,
            500 => SubmitErrorKind::ServerError,
            other => SubmitErrorKind::OtherHttpError(other),
        };

        Self {
            kind,
            http_status: Some(status),
            detail: detail.into(),
        }
    }
}

impl From<reqwest::Error> for SubmitError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_builder() {
            SubmitError::new(SubmitErrorKind::InvalidUrl, error.to_string())
        } else if let Some(status) = error.status() {
            SubmitError::from_status(status.as_u16(), error.to_string())
        } else {
            SubmitError::new(SubmitErrorKind::ConnectionError, error.to_string())
        }
    }
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    Request(#[from] SubmitError),

    #[error("Invalid token response: {0}")]
    InvalidTokenResponse(String),
}

impl ApiError {
    /// The request classification, when the error came from the HTTP layer
    pub fn kind(&self) -> Option<SubmitErrorKind> {
        match self {
            ApiError::Request(error) => Some(error.kind),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ApiError>;
