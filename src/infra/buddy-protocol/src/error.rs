use thiserror::Error;

/// Protocol-level errors.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("frame is not valid utf-8")]
    InvalidUtf8,

    #[error("event stream line exceeds {limit} bytes")]
    LineTooLong { limit: usize },

    #[error("frame `{event_type}` has no data field")]
    MissingData { event_type: String },

    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}
