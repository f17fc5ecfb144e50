use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{parse_timestamp, LogEntry, ProtocolError, Role};

/// Body of `POST /threads/{id}/stream`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamRequest {
    pub content: String,
}

/// Row of `GET /threads`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadSummary {
    pub thread_id: String,
    pub created_at: String,
    pub message_count: u64,
    pub summary: String,
}

/// Reply of `POST /threads`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedThread {
    pub thread_id: String,
    pub created_at: String,
}

/// One message of `GET /threads/{id}/detailed`, as the backend sends it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetailedMessage {
    #[serde(default)]
    pub id: Option<String>,
    pub role: Role,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub metadata: Value,
}

/// Full reply of `GET /threads/{id}/detailed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreadDetail {
    pub thread_id: String,
    pub created_at: String,
    #[serde(default)]
    pub messages: Vec<DetailedMessage>,
}

impl ThreadDetail {
    /// Convert the wire messages into log entries.
    ///
    /// Entries without an id get `{thread_id}:{index}`. Entries without a
    /// timestamp inherit the previous one (the thread creation time for the
    /// first), keeping the log non-decreasing.
    pub fn into_entries(self) -> Result<Vec<LogEntry>, ProtocolError> {
        let mut last: DateTime<Utc> = parse_timestamp(&self.created_at)?;
        let mut entries = Vec::with_capacity(self.messages.len());
        for (index, message) in self.messages.into_iter().enumerate() {
            let timestamp = match message.timestamp.as_deref() {
                Some(raw) => parse_timestamp(raw)?,
                None => last,
            };
            last = timestamp;
            let id = message
                .id
                .filter(|id| !id.is_empty())
                .unwrap_or_else(|| format!("{}:{index}", self.thread_id));
            entries.push(LogEntry {
                id,
                thread_id: self.thread_id.clone(),
                role: message.role,
                content: message.content,
                timestamp,
            });
        }
        Ok(entries)
    }
}
