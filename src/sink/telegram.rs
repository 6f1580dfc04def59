use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client as HttpClient, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::{ChannelSink, SinkError, MAX_ALBUM};

const DEFAULT_API_BASE: &str = "https://api.telegram.org";
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_MAX_RETRIES: u8 = 3;
/// Upper bound on a server-requested wait before the next attempt.
const MAX_RETRY_AFTER_SECS: u64 = 60;
const PARSE_MODE: &str = "HTML";

/// Bot API error descriptions that mean the attached media, not the chat, was the problem.
const MEDIA_HINTS: [&str; 7] = ["file", "url", "photo", "image", "media", "web page content", "caption"];

#[derive(Clone, Debug)]
pub struct TelegramConfig {
    pub token: Option<String>,
    pub api_base: String,
    pub timeout: Duration,
    pub max_retries: u8,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            token: None,
            api_base: DEFAULT_API_BASE.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

impl TelegramConfig {
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        cfg.token = std::env::var("TELEGRAM_BOT_TOKEN").ok().filter(|t| !t.trim().is_empty());
        if let Ok(base) = std::env::var("TELEGRAM_API_BASE") {
            cfg.api_base = base;
        }
        cfg
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[derive(Clone)]
pub struct TelegramSink {
    http: HttpClient,
    token: String,
    cfg: TelegramConfig,
}

impl TelegramSink {
    pub fn new(cfg: TelegramConfig) -> Result<Self, SinkError> {
        let token = cfg.token.clone().ok_or(SinkError::MissingToken)?;
        let http = HttpClient::builder()
            .timeout(cfg.timeout)
            .build()
            .map_err(SinkError::from_reqwest)?;
        Ok(Self { http, token, cfg })
    }

    fn endpoint(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.cfg.api_base.trim_end_matches('/'), self.token, method)
    }

    /// One Bot API call with exponential backoff on retryable failures.
    async fn call<P: Serialize + Sync>(&self, method: &str, payload: &P) -> Result<(), SinkError> {
        let mut attempt: u8 = 0;
        loop {
            attempt += 1;
            match self.post_once(method, payload).await {
                Ok(()) => return Ok(()),
                Err(err) if err.is_retryable() && attempt < self.cfg.max_retries => {
                    let mut wait = Duration::from_millis(500u64 << (attempt - 1));
                    if let SinkError::RateLimited { retry_after: Some(secs) } = &err {
                        wait = wait.max(Duration::from_secs((*secs).min(MAX_RETRY_AFTER_SECS)));
                    }
                    warn!(method, attempt, error = %err, "telegram call failed, retrying");
                    tokio::time::sleep(wait).await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn post_once<P: Serialize + Sync>(&self, method: &str, payload: &P) -> Result<(), SinkError> {
        let response = self
            .http
            .post(self.endpoint(method))
            .json(payload)
            .send()
            .await
            .map_err(SinkError::from_reqwest)?;

        let status = response.status();
        let bytes = response.bytes().await.map_err(SinkError::from_reqwest)?;
        if status.is_success() {
            return Ok(());
        }
        let body = serde_json::from_slice::<ApiResponse>(&bytes).ok();
        Err(classify_failure(method, status, body))
    }
}

#[async_trait]
impl ChannelSink for TelegramSink {
    async fn send_text(&self, destination: &str, message: &str) -> Result<(), SinkError> {
        self.call("sendMessage", &SendMessage::new(destination, message)).await
    }

    async fn send_image(&self, destination: &str, message: &str, image: &str) -> Result<(), SinkError> {
        self.call("sendPhoto", &SendPhoto::new(destination, message, image)).await
    }

    async fn send_album(&self, destination: &str, message: &str, images: &[String]) -> Result<(), SinkError> {
        self.call("sendMediaGroup", &SendMediaGroup::new(destination, message, images)).await
    }
}

fn classify_failure(method: &str, status: StatusCode, body: Option<ApiResponse>) -> SinkError {
    let description = body
        .as_ref()
        .and_then(|b| b.description.clone())
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("unknown error").to_string());

    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after = body.and_then(|b| b.parameters).and_then(|p| p.retry_after);
        return SinkError::RateLimited { retry_after };
    }

    let carries_media = matches!(method, "sendPhoto" | "sendMediaGroup");
    if carries_media && status == StatusCode::BAD_REQUEST {
        let lower = description.to_lowercase();
        if MEDIA_HINTS.iter().any(|h| lower.contains(h)) && !lower.contains("chat") {
            return SinkError::MediaRejected { description };
        }
    }
    SinkError::Api { status, description }
}

#[derive(Debug, Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'static str,
    disable_web_page_preview: bool,
}

impl<'a> SendMessage<'a> {
    fn new(chat_id: &'a str, text: &'a str) -> Self {
        Self { chat_id, text, parse_mode: PARSE_MODE, disable_web_page_preview: false }
    }
}

#[derive(Debug, Serialize)]
struct SendPhoto<'a> {
    chat_id: &'a str,
    photo: &'a str,
    caption: &'a str,
    parse_mode: &'static str,
}

impl<'a> SendPhoto<'a> {
    fn new(chat_id: &'a str, caption: &'a str, photo: &'a str) -> Self {
        Self { chat_id, photo, caption, parse_mode: PARSE_MODE }
    }
}

#[derive(Debug, Serialize)]
struct SendMediaGroup<'a> {
    chat_id: &'a str,
    media: Vec<InputMediaPhoto<'a>>,
}

#[derive(Debug, Serialize)]
struct InputMediaPhoto<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    media: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    caption: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    parse_mode: Option<&'static str>,
}

impl<'a> SendMediaGroup<'a> {
    fn new(chat_id: &'a str, caption: &'a str, images: &'a [String]) -> Self {
        let media = images
            .iter()
            .take(MAX_ALBUM)
            .enumerate()
            .map(|(i, url)| InputMediaPhoto {
                kind: "photo",
                media: url,
                caption: (i == 0).then_some(caption),
                parse_mode: (i == 0).then_some(PARSE_MODE),
            })
            .collect();
        Self { chat_id, media }
    }
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    parameters: Option<ResponseParameters>,
}

#[derive(Debug, Deserialize)]
struct ResponseParameters {
    #[serde(default)]
    retry_after: Option<u64>,
}
