//! LLM Client: the single point of entry for hosted-model calls in the studio.
//!
//! ARCHITECTURAL RULE: No other module may call the model API directly.
//! The relay talks to the model only through the `ChatModel` trait.
//!
//! Model: claude-sonnet-4-5 (hardcoded, not configurable)

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, BoxStream, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

pub mod sse;

use sse::{SseDecoder, StreamSignal};

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
/// The model used for every relay call.
/// This is intentionally hardcoded to prevent accidental drift.
pub const MODEL: &str = "claude-sonnet-4-5";
const MAX_TOKENS: u32 = 8192;
const TEMPERATURE: f32 = 0.7;
const MAX_RETRIES: u32 = 3;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Rate limited after {retries} retries")]
    RateLimited { retries: u32 },

    #[error("Stream interrupted: {0}")]
    Stream(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

/// One message of a conversation. Same shape on the wire to the browser
/// client and to the model API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub content: String,
}

impl ChatTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChatRequest {
    pub system: Option<String>,
    pub turns: Vec<ChatTurn>,
}

/// Text chunks in arrival order. An `Err` item ends the stream abnormally.
pub type ChunkStream = BoxStream<'static, Result<String, LlmError>>;

/// A hosted model that streams its reply. Carried in `AppState` as
/// `Arc<dyn ChatModel>` so tests can swap in a scripted model.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn stream_chat(&self, request: ChatRequest) -> Result<ChunkStream, LlmError>;
}

#[derive(Debug, Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    messages: &'a [ChatTurn],
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct AnthropicError {
    error: AnthropicErrorBody,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AnthropicErrorBody {
    message: String,
}

/// Wraps the Anthropic Messages API in streaming mode.
/// Retries happen only while opening the stream; once the first byte has
/// been read, failures end the stream.
#[derive(Clone)]
pub struct LlmClient {
    client: Client,
    api_key: String,
    api_url: String,
    retry_base: Duration,
}

impl LlmClient {
    pub fn new(api_key: String) -> Result<Self, LlmError> {
        Ok(Self {
            client: Client::builder()
                .connect_timeout(Duration::from_secs(10))
                .build()?,
            api_key,
            api_url: ANTHROPIC_API_URL.to_string(),
            retry_base: Duration::from_millis(1000),
        })
    }

    /// Points the client at another Messages-compatible endpoint.
    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }

    pub fn with_retry_base(mut self, retry_base: Duration) -> Self {
        self.retry_base = retry_base;
        self
    }

    /// Opens the stream, retrying on 429, 5xx and connection errors with
    /// exponential backoff.
    async fn open(&self, request: &ChatRequest) -> Result<reqwest::Response, LlmError> {
        let body = AnthropicRequest {
            model: MODEL,
            max_tokens: MAX_TOKENS,
            temperature: TEMPERATURE,
            system: request.system.as_deref().filter(|s| !s.is_empty()),
            messages: &request.turns,
            stream: true,
        };

        let mut last_error: Option<LlmError> = None;

        for attempt in 0..MAX_RETRIES {
            if attempt > 0 {
                // Exponential backoff: 1s, 2s, 4s
                let delay = self.retry_base * (1 << (attempt - 1));
                warn!(
                    "LLM stream attempt {} failed, retrying after {}ms...",
                    attempt,
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
            }

            let response = self
                .client
                .post(&self.api_url)
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", ANTHROPIC_VERSION)
                .header("content-type", "application/json")
                .json(&body)
                .send()
                .await;

            let response = match response {
                Ok(r) => r,
                Err(e) => {
                    last_error = Some(LlmError::Http(e));
                    continue;
                }
            };

            let status = response.status();

            if status.as_u16() == 429 || status.is_server_error() {
                let body = response.text().await.unwrap_or_default();
                warn!("LLM API returned {}: {}", status, body);
                last_error = Some(LlmError::Api {
                    status: status.as_u16(),
                    message: body,
                });
                continue;
            }

            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                let message = serde_json::from_str::<AnthropicError>(&body)
                    .map(|e| e.error.message)
                    .unwrap_or(body);
                return Err(LlmError::Api {
                    status: status.as_u16(),
                    message,
                });
            }

            return Ok(response);
        }

        Err(last_error.unwrap_or(LlmError::RateLimited {
            retries: MAX_RETRIES,
        }))
    }
}

#[async_trait]
impl ChatModel for LlmClient {
    async fn stream_chat(&self, request: ChatRequest) -> Result<ChunkStream, LlmError> {
        let response = self.open(&request).await?;
        debug!(
            "LLM stream opened: {} turns, system prompt: {}",
            request.turns.len(),
            request.system.is_some()
        );
        Ok(text_chunks(response.bytes_stream().boxed()))
    }
}

struct DecodeState {
    body: BoxStream<'static, reqwest::Result<Bytes>>,
    decoder: SseDecoder,
    pending: VecDeque<Result<String, LlmError>>,
    finished: bool,
}

/// Turns the raw SSE body into text chunks. A body that ends without a
/// `message_stop` event is reported as an interrupted stream.
fn text_chunks(body: BoxStream<'static, reqwest::Result<Bytes>>) -> ChunkStream {
    let state = DecodeState {
        body,
        decoder: SseDecoder::default(),
        pending: VecDeque::new(),
        finished: false,
    };

    stream::unfold(state, |mut st| async move {
        loop {
            if let Some(item) = st.pending.pop_front() {
                return Some((item, st));
            }
            if st.finished {
                return None;
            }

            match st.body.next().await {
                Some(Ok(bytes)) => {
                    for payload in st.decoder.push(&bytes) {
                        match sse::interpret(&payload) {
                            Ok(StreamSignal::Text(text)) if !text.is_empty() => {
                                st.pending.push_back(Ok(text))
                            }
                            Ok(StreamSignal::Stop) => {
                                st.finished = true;
                                break;
                            }
                            Ok(_) => {}
                            Err(e) => {
                                st.pending.push_back(Err(e));
                                st.finished = true;
                                break;
                            }
                        }
                    }
                }
                Some(Err(e)) => {
                    st.pending.push_back(Err(LlmError::Http(e)));
                    st.finished = true;
                }
                None => {
                    st.pending.push_back(Err(LlmError::Stream(
                        "model stream ended before message_stop".to_string(),
                    )));
                    st.finished = true;
                }
            }
        }
    })
    .boxed()
}
