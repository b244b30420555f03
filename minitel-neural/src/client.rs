//! Direct HTTP client for OpenAI or any OpenAI-compatible server.

use crate::error::ApiError;
use crate::sse::{SseEvent, SseParser, completion_content};
use crate::{ChatBackend, ChatRequest, FragmentStream};
use anyhow::Result;
use futures::StreamExt;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::{info, warn};

const MAX_RETRIES: u32 = 3;
const INITIAL_BACKOFF: Duration = Duration::from_secs(2);
const CHANNEL_DEPTH: usize = 64;
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
/// Longest silence tolerated between two reads of a response body.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(60);

/// The client does its HTTP work on a tokio runtime; the caller consumes the
/// response synchronously through a [`FragmentStream`].
#[derive(Clone)]
pub struct OpenAiClient {
    http: Client,
    base_url: String,
    api_key: String,
    runtime: Handle,
    max_retries: u32,
    initial_backoff: Duration,
}

impl std::fmt::Debug for OpenAiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiClient")
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl OpenAiClient {
    pub fn new(base_url: &str, api_key: &str, runtime: Handle) -> Result<Self, ApiError> {
        if api_key.trim().is_empty() {
            return Err(ApiError::MissingKey);
        }
        let http = http_client(DEFAULT_READ_TIMEOUT)?;

        info!("Chat client targeting: {}", base_url);

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.trim().to_string(),
            runtime,
            max_retries: MAX_RETRIES,
            initial_backoff: INITIAL_BACKOFF,
        })
    }

    pub fn with_retries(mut self, max_retries: u32, initial_backoff: Duration) -> Self {
        self.max_retries = max_retries;
        self.initial_backoff = initial_backoff;
        self
    }

    /// A stalled response ends with a timeout error after `timeout` of silence.
    pub fn with_read_timeout(mut self, timeout: Duration) -> Result<Self, ApiError> {
        self.http = http_client(timeout)?;
        Ok(self)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn send(&self, body: &Value) -> Result<reqwest::Response, ApiError> {
        let url = format!("{}/chat/completions", self.base_url);
        let resp = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(ApiError::Status {
                status,
                body: text.chars().take(200).collect(),
            });
        }
        Ok(resp)
    }

    /// Connect with retries, then forward fragments until the body ends.
    async fn pump(self, body: Value, stream: bool, tx: mpsc::Sender<Result<String>>) {
        let mut delay = self.initial_backoff;
        let mut attempt = 0;

        let resp = loop {
            match self.send(&body).await {
                Ok(resp) => break resp,
                Err(e) if e.is_transient() && attempt < self.max_retries => {
                    attempt += 1;
                    warn!("Transient API error, retry {} in {:?}: {}", attempt, delay, e);
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                }
                Err(e) => {
                    warn!("API error: {}", e);
                    let _ = tx.send(Err(e.into())).await;
                    return;
                }
            }
        };

        if stream {
            forward_stream(resp, &tx).await;
        } else {
            let result: Result<String> = match resp.json::<Value>().await {
                Ok(value) => completion_content(&value)
                    .ok_or_else(|| ApiError::Malformed("no message content".into()).into()),
                Err(e) => Err(ApiError::from(e).into()),
            };
            let _ = tx.send(result).await;
        }
    }
}

fn http_client(read_timeout: Duration) -> Result<Client, ApiError> {
    Ok(Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .read_timeout(read_timeout)
        .build()?)
}

async fn forward_stream(resp: reqwest::Response, tx: &mpsc::Sender<Result<String>>) {
    let mut parser = SseParser::default();
    let mut body = resp.bytes_stream();

    while let Some(chunk) = body.next().await {
        let chunk = match chunk {
            Ok(c) => c,
            Err(e) => {
                let _ = tx.send(Err(ApiError::from(e).into())).await;
                return;
            }
        };
        for event in parser.feed(&chunk) {
            match event {
                SseEvent::Delta(text) => {
                    if tx.send(Ok(text)).await.is_err() {
                        // Consumer gone; stop reading.
                        return;
                    }
                }
                SseEvent::Done => return,
            }
        }
    }
}

impl ChatBackend for OpenAiClient {
    fn complete(&self, request: &ChatRequest) -> Result<FragmentStream> {
        let (tx, rx) = mpsc::channel(CHANNEL_DEPTH);
        let body = request.body();
        let stream = request.stream;
        self.runtime.spawn(self.clone().pump(body, stream, tx));
        Ok(FragmentStream::from_channel(rx))
    }
}
