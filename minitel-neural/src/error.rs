use reqwest::StatusCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("no API key (set OPENAI_API_KEY)")]
    MissingKey,

    #[error("API returned {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error("transport: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("malformed response: {0}")]
    Malformed(String),
}

impl ApiError {
    /// Rate limits, overloaded upstreams and dropped connections are worth another try.
    pub fn is_transient(&self) -> bool {
        match self {
            ApiError::Status { status, .. } => matches!(status.as_u16(), 429 | 500 | 502 | 503 | 504),
            ApiError::Transport(e) => e.is_timeout() || e.is_connect(),
            ApiError::MissingKey | ApiError::Malformed(_) => false,
        }
    }

    /// A short tag suitable for a 40-column screen.
    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::MissingKey => "AuthError",
            ApiError::Status { status, .. } => match status.as_u16() {
                401 | 403 => "AuthError",
                429 => "RateLimitError",
                s if s >= 500 => "ServerError",
                _ => "APIError",
            },
            ApiError::Transport(e) if e.is_timeout() => "Timeout",
            ApiError::Transport(_) => "ConnectionError",
            ApiError::Malformed(_) => "DecodeError",
        }
    }
}
