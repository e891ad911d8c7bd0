//! Claude API client for the AI website editor.
//!
//! Supports a buffered completion call and a token-streamed call that
//! accumulates SSE deltas into one reply buffer. Streaming only changes how
//! the reply text arrives; callers treat both the same.

use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};
use futures_util::StreamExt;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

const CLAUDE_API_URL: &str = "https://api.anthropic.com/v1/messages";
const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";
const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Debug, Clone, Error)]
pub enum ClaudeApiError {
    #[error("network error: {0}")]
    Transport(String),
    #[error("timeout")]
    Timeout,
    #[error("http {status}: {body}")]
    Http { status: u16, body: String },
    #[error("rate limited")]
    RateLimited,
    #[error("invalid api key")]
    InvalidApiKey,
    #[error("json error: {0}")]
    Serde(String),
    #[error("missing api key: ANTHROPIC_API_KEY environment variable not set")]
    MissingApiKey,
    #[error("no text content in response")]
    EmptyResponse,
}

impl ClaudeApiError {
    /// Returns true if the error is transient and should be retried.
    pub fn should_retry(&self) -> bool {
        match self {
            Self::Transport(_) | Self::Timeout | Self::RateLimited => true,
            Self::Http { status, .. } => (500..=599).contains(status),
            _ => false,
        }
    }
}

/// A message in the conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// Request body for the messages endpoint
#[derive(Debug, Serialize)]
struct ClaudeRequest {
    model: String,
    max_tokens: u32,
    messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
}

/// Content block in a buffered response
#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
pub enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
}

/// Buffered response from the messages endpoint
#[derive(Debug, Deserialize)]
pub struct ClaudeResponse {
    pub content: Vec<ContentBlock>,
    pub stop_reason: Option<String>,
}

impl ClaudeResponse {
    fn text(&self) -> Option<&str> {
        self.content.iter().find_map(|block| match block {
            ContentBlock::Text { text } => Some(text.as_str()),
        })
    }
}

/// One server-sent event frame in a streamed response. Everything except
/// text deltas is ignored.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum StreamEvent {
    ContentBlockDelta { delta: StreamDelta },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum StreamDelta {
    TextDelta { text: String },
    #[serde(other)]
    Other,
}

/// Claude API client
#[derive(Debug, Clone)]
pub struct ClaudeApiClient {
    http: Client,
    api_key: String,
    model: String,
}

impl ClaudeApiClient {
    const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

    /// Create a new client using the ANTHROPIC_API_KEY environment variable
    pub fn from_env() -> Result<Self, ClaudeApiError> {
        let api_key =
            std::env::var("ANTHROPIC_API_KEY").map_err(|_| ClaudeApiError::MissingApiKey)?;
        let model = std::env::var("CLAUDE_MODEL").ok();
        Self::new(api_key, model)
    }

    pub fn new(api_key: String, model: Option<String>) -> Result<Self, ClaudeApiError> {
        let http = Client::builder()
            .timeout(Self::REQUEST_TIMEOUT)
            .user_agent(concat!("site-editor/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ClaudeApiError::Transport(e.to_string()))?;

        Ok(Self {
            http,
            api_key,
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
        })
    }

    /// Request a completion and return the full reply text. With
    /// `stream = true` the reply is accumulated from SSE text deltas.
    pub async fn complete_text(
        &self,
        messages: Vec<Message>,
        system: Option<String>,
        max_tokens: u32,
        stream: bool,
    ) -> Result<String, ClaudeApiError> {
        let request = ClaudeRequest {
            model: self.model.clone(),
            max_tokens,
            messages,
            system,
            stream,
        };

        (|| async {
            if stream {
                self.send_streaming(&request).await
            } else {
                self.send_buffered(&request).await
            }
        })
        .retry(
            &ExponentialBuilder::default()
                .with_min_delay(Duration::from_secs(1))
                .with_max_delay(Duration::from_secs(30))
                .with_max_times(3)
                .with_jitter(),
        )
        .when(|e: &ClaudeApiError| e.should_retry())
        .notify(|e, dur| {
            warn!(
                "Claude API call failed, retrying after {:.2}s: {}",
                dur.as_secs_f64(),
                e
            )
        })
        .await
    }

    async fn send(&self, request: &ClaudeRequest) -> Result<reqwest::Response, ClaudeApiError> {
        let res = self
            .http
            .post(CLAUDE_API_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(request)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        match res.status() {
            s if s.is_success() => Ok(res),
            StatusCode::UNAUTHORIZED => Err(ClaudeApiError::InvalidApiKey),
            StatusCode::TOO_MANY_REQUESTS => Err(ClaudeApiError::RateLimited),
            s => {
                let status = s.as_u16();
                let body = res.text().await.unwrap_or_default();
                Err(ClaudeApiError::Http { status, body })
            }
        }
    }

    async fn send_buffered(&self, request: &ClaudeRequest) -> Result<String, ClaudeApiError> {
        let response: ClaudeResponse = self
            .send(request)
            .await?
            .json()
            .await
            .map_err(|e| ClaudeApiError::Serde(e.to_string()))?;

        response
            .text()
            .map(str::to_string)
            .ok_or(ClaudeApiError::EmptyResponse)
    }

    async fn send_streaming(&self, request: &ClaudeRequest) -> Result<String, ClaudeApiError> {
        let res = self.send(request).await?;
        let mut body = res.bytes_stream();

        let mut acc = SseAccumulator::default();
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(map_reqwest_error)?;
            acc.push_chunk(&String::from_utf8_lossy(&chunk));
        }
        let reply = acc.finish();

        if reply.is_empty() {
            return Err(ClaudeApiError::EmptyResponse);
        }
        Ok(reply)
    }
}

/// Reassembles SSE frames from arbitrary byte-chunk boundaries and collects
/// the text deltas.
#[derive(Default)]
struct SseAccumulator {
    pending: String,
    reply: String,
}

impl SseAccumulator {
    fn push_chunk(&mut self, chunk: &str) {
        self.pending.push_str(chunk);

        // SSE frames are separated by a blank line.
        while let Some(end) = self.pending.find("\n\n") {
            let frame: String = self.pending.drain(..end + 2).collect();
            Self::absorb_frame(&frame, &mut self.reply);
        }
    }

    /// Drain any unterminated trailing frame and return the reply text.
    fn finish(mut self) -> String {
        if !self.pending.is_empty() {
            Self::absorb_frame(&self.pending, &mut self.reply);
        }
        self.reply
    }

    fn absorb_frame(frame: &str, reply: &mut String) {
        for line in frame.lines() {
            let Some(data) = line.strip_prefix("data: ") else {
                continue;
            };
            if let Ok(StreamEvent::ContentBlockDelta {
                delta: StreamDelta::TextDelta { text },
            }) = serde_json::from_str::<StreamEvent>(data)
            {
                reply.push_str(&text);
            }
        }
    }
}

fn map_reqwest_error(e: reqwest::Error) -> ClaudeApiError {
    if e.is_timeout() {
        ClaudeApiError::Timeout
    } else {
        ClaudeApiError::Transport(e.to_string())
    }
}
