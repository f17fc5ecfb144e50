use buddy_protocol::ProtocolError;
use thiserror::Error;

/// Errors surfaced by the chat client core.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("a turn is already streaming on thread {0}")]
    SessionActive(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("backend returned {status}: {body}")]
    Http { status: u16, body: String },

    #[error("decode error: {0}")]
    Decode(#[from] ProtocolError),

    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error("stream task failed: {0}")]
    Task(String),
}

impl From<reqwest::Error> for ChatError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => Self::Http {
                status: status.as_u16(),
                body: err.to_string(),
            },
            None => Self::Transport(err.to_string()),
        }
    }
}

impl From<url::ParseError> for ChatError {
    fn from(err: url::ParseError) -> Self {
        Self::InvalidUrl(err.to_string())
    }
}
