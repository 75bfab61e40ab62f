use std::time::Duration;

use http::StatusCode;

/// Errors surfaced by a [`StorageApi`](crate::api::StorageApi) call.
///
/// Only [`ApiError::Status`] carries an HTTP status. The retry layers treat
/// [`ApiError::Connection`] as a connection-level failure and everything
/// else without a status as fatal.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ApiError {
    #[error("connection error: {0}")]
    Connection(String),
    #[error("invalid response: {0}")]
    Decode(String),
    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),
    #[error("HTTP status {status} ({code}): {message}")]
    Status {
        status: StatusCode,
        code: String,
        message: String,
        /// Value of the `Retry-After` header, if the server sent one
        retry_after: Option<Duration>,
    },
}

impl ApiError {
    /// Build a status error without a `Retry-After` hint.
    pub fn http(status: StatusCode, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Status {
            status,
            code: code.into(),
            message: message.into(),
            retry_after: None,
        }
    }

    /// Attach a `Retry-After` hint (whole seconds) to a status error.
    pub fn with_retry_after(self, seconds: u64) -> Self {
        match self {
            Self::Status {
                status,
                code,
                message,
                ..
            } => Self::Status {
                status,
                code,
                message,
                retry_after: Some(Duration::from_secs(seconds)),
            },
            other => other,
        }
    }

    pub fn status_code(&self) -> Option<StatusCode> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Status { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_decode() {
            return Self::Decode(error.to_string());
        }
        match error.status() {
            Some(status) => Self::http(status, "http_error", error.to_string()),
            None => Self::Connection(error.to_string()),
        }
    }
}
