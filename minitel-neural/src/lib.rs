use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

pub mod client;
pub mod error;
pub mod sse;

pub use client::OpenAiClient;
pub use error::ApiError;

pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "system" => Some(Role::System),
            "user" => Some(Role::User),
            "assistant" => Some(Role::Assistant),
            _ => None,
        }
    }
}

/// One message of a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

impl Turn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// Everything the backend needs for one exchange.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub model: String,
    pub system: Option<String>,
    pub history: Vec<Turn>,
    pub prompt: String,
    pub stream: bool,
}

impl ChatRequest {
    /// Messages in API order: system, prior turns, then the new prompt.
    pub fn messages(&self) -> Vec<Value> {
        let mut messages = Vec::with_capacity(self.history.len() + 2);
        if let Some(system) = &self.system {
            messages.push(json!({ "role": "system", "content": system }));
        }
        for turn in &self.history {
            messages.push(json!({ "role": turn.role.as_str(), "content": turn.content }));
        }
        messages.push(json!({ "role": "user", "content": self.prompt }));
        messages
    }

    pub fn body(&self) -> Value {
        json!({
            "model": self.model,
            "messages": self.messages(),
            "stream": self.stream
        })
    }
}

/// The lazy, finite, one-shot sequence of text fragments of a response.
///
/// A complete (non-streamed) answer is just a stream of one fragment.
pub struct FragmentStream {
    inner: Box<dyn Iterator<Item = Result<String>> + Send>,
}

impl std::fmt::Debug for FragmentStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FragmentStream").finish()
    }
}

impl FragmentStream {
    pub fn new(inner: impl Iterator<Item = Result<String>> + Send + 'static) -> Self {
        Self {
            inner: Box::new(inner),
        }
    }

    /// A whole response delivered at once.
    pub fn complete(text: impl Into<String>) -> Self {
        Self::new(std::iter::once(Ok(text.into())))
    }

    /// Drain a channel fed by an async producer. Must not be polled from
    /// inside a tokio runtime thread.
    pub fn from_channel(rx: tokio::sync::mpsc::Receiver<Result<String>>) -> Self {
        Self::new(ChannelFragments { rx: Some(rx) })
    }
}

impl Iterator for FragmentStream {
    type Item = Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }
}

struct ChannelFragments {
    rx: Option<tokio::sync::mpsc::Receiver<Result<String>>>,
}

impl Iterator for ChannelFragments {
    type Item = Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        let rx = self.rx.as_mut()?;
        let item = rx.blocking_recv();
        if item.is_none() {
            self.rx = None;
        }
        item
    }
}

/// The interface for any chat-completion backend.
pub trait ChatBackend: Send {
    fn complete(&self, request: &ChatRequest) -> Result<FragmentStream>;
}

impl<B: ChatBackend + ?Sized + Sync> ChatBackend for std::sync::Arc<B> {
    fn complete(&self, request: &ChatRequest) -> Result<FragmentStream> {
        (**self).complete(request)
    }
}

impl<B: ChatBackend + ?Sized> ChatBackend for Box<B> {
    fn complete(&self, request: &ChatRequest) -> Result<FragmentStream> {
        (**self).complete(request)
    }
}
