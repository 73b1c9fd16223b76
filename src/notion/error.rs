use std::time::Duration;
use thiserror::Error;

/// HTTP statuses worth another attempt: rate limiting and gateway hiccups.
pub const TRANSIENT_STATUSES: [u16; 4] = [429, 502, 503, 504];

const MAX_BODY_CHARS: usize = 200;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("API request failed ({status}): {body}")]
    Status {
        status: u16,
        body: String,
        retry_after: Option<Duration>,
    },

    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Unexpected API response: {0}")]
    Decode(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("File is {size} bytes, over the {limit} byte single-part upload limit")]
    TooLarge { size: u64, limit: u64 },
}

impl ApiError {
    pub fn status(status: u16, body: &str) -> Self {
        Self::status_with_retry_after(status, body, None)
    }

    pub fn status_with_retry_after(status: u16, body: &str, retry_after: Option<Duration>) -> Self {
        ApiError::Status {
            status,
            body: body.chars().take(MAX_BODY_CHARS).collect(),
            retry_after,
        }
    }

    /// Whether the request may succeed if sent again unchanged.
    pub fn is_transient(&self) -> bool {
        match self {
            ApiError::Status { status, .. } => TRANSIENT_STATUSES.contains(status),
            ApiError::Transport(err) => err.is_timeout() || err.is_connect(),
            _ => false,
        }
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            ApiError::Status { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}
