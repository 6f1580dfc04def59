//! Outbound channel for formatted deliveries.

use async_trait::async_trait;
use reqwest::StatusCode;

pub mod telegram;

/// Most images a single album may carry.
pub const MAX_ALBUM: usize = 10;

#[async_trait]
pub trait ChannelSink: Send + Sync {
    async fn send_text(&self, destination: &str, message: &str) -> Result<(), SinkError>;

    /// Photo with `message` as its caption.
    async fn send_image(&self, destination: &str, message: &str, image: &str) -> Result<(), SinkError>;

    /// Album of up to [`MAX_ALBUM`] photos; only the first carries the caption.
    async fn send_album(&self, destination: &str, message: &str, images: &[String]) -> Result<(), SinkError>;
}

#[derive(Debug)]
pub enum SinkError {
    MissingToken,
    Http(reqwest::Error),
    Timeout,
    Api { status: StatusCode, description: String },
    /// The channel refused the attached media; a text-only send may still work.
    MediaRejected { description: String },
    RateLimited { retry_after: Option<u64> },
}

impl SinkError {
    pub(crate) fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            SinkError::Timeout
        } else {
            // request URLs carry the bot token
            SinkError::Http(err.without_url())
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            SinkError::Timeout | SinkError::Http(_) | SinkError::RateLimited { .. } => true,
            SinkError::Api { status, .. } => status.is_server_error(),
            SinkError::MissingToken | SinkError::MediaRejected { .. } => false,
        }
    }
}

impl std::fmt::Display for SinkError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SinkError::MissingToken => write!(f, "TELEGRAM_BOT_TOKEN is not set"),
            SinkError::Http(err) => write!(f, "http error: {err}"),
            SinkError::Timeout => write!(f, "request timed out"),
            SinkError::Api { status, description } => write!(f, "api error {status}: {description}"),
            SinkError::MediaRejected { description } => write!(f, "media rejected: {description}"),
            SinkError::RateLimited { retry_after: Some(secs) } => write!(f, "rate limited, retry after {secs}s"),
            SinkError::RateLimited { retry_after: None } => write!(f, "rate limited"),
        }
    }
}

impl std::error::Error for SinkError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SinkError::Http(err) => Some(err),
            _ => None,
        }
    }
}
