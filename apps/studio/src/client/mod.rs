//! HTTP client for the studio API, plus the per-view session state machine
//! that drives it.
//!
//! Streaming uses one producer task per invocation: it reads the response
//! body and pushes decoded text into a bounded channel. Dropping the
//! receiver is the only cancellation; the producer stops as soon as the
//! receiver is gone, even while it is waiting on the network.

pub mod session;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use reqwest::{header, redirect, Client, Response, StatusCode};
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::auth::SESSION_COOKIE;
use crate::relay::GenerateRequest;
use crate::schema::{GeneratorDefinition, GeneratorSummary};
use crate::templates::{TemplateError, TemplateSource};

pub use session::StudioSession;

/// Chunks buffered between the network read loop and the consumer.
const STREAM_BUFFER: usize = 64;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("login succeeded but no session cookie was issued")]
    MissingSessionCookie,

    #[error("stream interrupted: {0}")]
    Stream(String),
}

pub type ChunkReceiver = mpsc::Receiver<Result<String, ClientError>>;

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

#[derive(Debug, Clone)]
pub struct StudioClient {
    client: Client,
    base_url: String,
    /// `name=value` pair replayed in the `Cookie` header.
    session: Option<String>,
}

impl StudioClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ClientError> {
        // The gate answers with redirects; surface them as status errors.
        let client = Client::builder()
            .redirect(redirect::Policy::none())
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            session: None,
        })
    }

    pub fn is_logged_in(&self) -> bool {
        self.session.is_some()
    }

    /// POST /api/login and keep the session cookie for later calls.
    pub async fn login(&mut self, password: &str) -> Result<(), ClientError> {
        let response = self
            .client
            .post(self.url("/api/login"))
            .json(&serde_json::json!({ "password": password }))
            .send()
            .await?;
        let response = ensure_success(response).await?;

        let prefix = format!("{SESSION_COOKIE}=");
        let cookie = response
            .headers()
            .get_all(header::SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .filter_map(|v| v.split(';').next())
            .map(str::trim)
            .find(|pair| pair.starts_with(&prefix))
            .ok_or(ClientError::MissingSessionCookie)?;

        self.session = Some(cookie.to_string());
        info!("Logged in to {}", self.base_url);
        Ok(())
    }

    pub async fn generators(&self) -> Result<Vec<GeneratorSummary>, ClientError> {
        let response = ensure_success(self.get("/api/generators").await?).await?;
        Ok(response.json().await?)
    }

    pub async fn generator(&self, id: &str) -> Result<GeneratorDefinition, ClientError> {
        let response = ensure_success(self.get(&format!("/api/generators/{id}")).await?).await?;
        Ok(response.json().await?)
    }

    /// Reference context text. A missing resource reads as empty.
    pub async fn context_text(&self) -> Result<String, ClientError> {
        let response = self.get("/context").await?;
        if !response.status().is_success() {
            warn!("Context unavailable ({}), using empty text", response.status());
            return Ok(String::new());
        }
        Ok(response.text().await?)
    }

    /// Starts a relay invocation. The status is checked before any chunk is
    /// delivered; afterwards failures arrive as an `Err` item and end the
    /// stream.
    pub async fn open_stream(&self, request: &GenerateRequest) -> Result<ChunkReceiver, ClientError> {
        let response = self
            .with_session(self.client.post(self.url("/api/generate")))
            .json(request)
            .send()
            .await?;
        let response = ensure_success(response).await?;

        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        spawn_producer(response.bytes_stream().boxed(), tx);
        Ok(rx)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn with_session(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.session {
            Some(cookie) => builder.header(header::COOKIE, cookie),
            None => builder,
        }
    }

    async fn get(&self, path: &str) -> Result<Response, ClientError> {
        Ok(self
            .with_session(self.client.get(self.url(path)))
            .send()
            .await?)
    }
}

#[async_trait]
impl TemplateSource for StudioClient {
    async fn fetch(&self, name: &str) -> Result<String, TemplateError> {
        let unavailable = |message: String| TemplateError::Unavailable {
            name: name.to_string(),
            message,
        };

        let response = self
            .get(&format!("/templates/{name}"))
            .await
            .map_err(|e| unavailable(e.to_string()))?;
        match response.status() {
            StatusCode::NOT_FOUND => Err(TemplateError::NotFound(name.to_string())),
            status if status.is_success() => {
                response.text().await.map_err(|e| unavailable(e.to_string()))
            }
            status => Err(unavailable(format!("status {status}"))),
        }
    }
}

/// Maps a non-success response onto `ClientError::Status`, preferring the
/// server's `{ error: { message } }` text.
async fn ensure_success(response: Response) -> Result<Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorEnvelope>(&body)
        .map(|e| e.error.message)
        .unwrap_or(body);
    Err(ClientError::Status {
        status: status.as_u16(),
        message,
    })
}

/// Reads `body` into `tx` until the body ends, fails, or the receiver is
/// dropped. Dropping the task drops `body`, which closes the connection.
fn spawn_producer<S, E>(mut body: S, tx: mpsc::Sender<Result<String, ClientError>>) -> JoinHandle<()>
where
    S: Stream<Item = Result<Bytes, E>> + Send + Unpin + 'static,
    E: std::fmt::Display + Send + 'static,
{
    tokio::spawn(async move {
        let mut decoder = Utf8Decoder::default();
        loop {
            let next = tokio::select! {
                _ = tx.closed() => {
                    debug!("Stream consumer went away, stopping producer");
                    return;
                }
                next = body.next() => next,
            };
            let Some(item) = next else { break };

            let item = match item {
                Ok(bytes) => {
                    let text = decoder.push(&bytes);
                    if text.is_empty() {
                        continue;
                    }
                    Ok(text)
                }
                Err(e) => Err(ClientError::Stream(e.to_string())),
            };
            let failed = item.is_err();
            if tx.send(item).await.is_err() {
                debug!("Stream consumer went away, stopping producer");
                return;
            }
            if failed {
                return;
            }
        }
        let tail = decoder.finish();
        if !tail.is_empty() {
            let _ = tx.send(Ok(tail)).await;
        }
    })
}

/// Decodes UTF-8 text from arbitrarily split byte chunks. An incomplete
/// trailing sequence is held back until the next chunk completes it.
#[derive(Debug, Default)]
struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    /// Invalid bytes become U+FFFD; decoding carries on past them.
    fn push(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);
        let mut text = String::new();
        let mut start = 0;
        loop {
            match std::str::from_utf8(&self.pending[start..]) {
                Ok(valid) => {
                    text.push_str(valid);
                    start = self.pending.len();
                    break;
                }
                Err(e) => {
                    let valid_end = start + e.valid_up_to();
                    text.push_str(&String::from_utf8_lossy(&self.pending[start..valid_end]));
                    match e.error_len() {
                        Some(invalid) => {
                            text.push(char::REPLACEMENT_CHARACTER);
                            start = valid_end + invalid;
                        }
                        None => {
                            start = valid_end;
                            break;
                        }
                    }
                }
            }
        }
        self.pending.drain(..start);
        text
    }

    fn finish(&mut self) -> String {
        let text = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        text
    }
}
