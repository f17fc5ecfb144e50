use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ProtocolError;

/// Role of a persisted log entry.
///
/// The backend may emit roles outside the recognized set (`system`,
/// `task_created`); those land in `Other` and are skipped by consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Status,
    Disambiguation,
    Classification,
    Extraction,
    TaskSuccess,
    TaskFailed,
    TaskSkipped,
    Assistant,
    Clarification,
    #[serde(other)]
    Other,
}

/// Outcome of one executed task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskOutcome {
    Success,
    Failed,
    Skipped,
}

impl TaskOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }
}

/// Pipeline progress that belongs to the currently open turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StepKind {
    Status,
    Disambiguation,
    Classification,
    Extraction,
    Task(TaskOutcome),
}

/// Entry kinds that close a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplyKind {
    Assistant,
    Clarification,
}

/// Structural classification of a role inside a thread log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    User,
    Step(StepKind),
    Reply(ReplyKind),
    Other,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Status => "status",
            Self::Disambiguation => "disambiguation",
            Self::Classification => "classification",
            Self::Extraction => "extraction",
            Self::TaskSuccess => "task_success",
            Self::TaskFailed => "task_failed",
            Self::TaskSkipped => "task_skipped",
            Self::Assistant => "assistant",
            Self::Clarification => "clarification",
            Self::Other => "other",
        }
    }

    pub fn from_label(s: &str) -> Self {
        match s {
            "user" => Self::User,
            "status" => Self::Status,
            "disambiguation" => Self::Disambiguation,
            "classification" => Self::Classification,
            "extraction" => Self::Extraction,
            "task_success" => Self::TaskSuccess,
            "task_failed" => Self::TaskFailed,
            "task_skipped" => Self::TaskSkipped,
            "assistant" => Self::Assistant,
            "clarification" => Self::Clarification,
            _ => Self::Other,
        }
    }

    pub fn kind(&self) -> EntryKind {
        match self {
            Self::User => EntryKind::User,
            Self::Status => EntryKind::Step(StepKind::Status),
            Self::Disambiguation => EntryKind::Step(StepKind::Disambiguation),
            Self::Classification => EntryKind::Step(StepKind::Classification),
            Self::Extraction => EntryKind::Step(StepKind::Extraction),
            Self::TaskSuccess => EntryKind::Step(StepKind::Task(TaskOutcome::Success)),
            Self::TaskFailed => EntryKind::Step(StepKind::Task(TaskOutcome::Failed)),
            Self::TaskSkipped => EntryKind::Step(StepKind::Task(TaskOutcome::Skipped)),
            Self::Assistant => EntryKind::Reply(ReplyKind::Assistant),
            Self::Clarification => EntryKind::Reply(ReplyKind::Clarification),
            Self::Other => EntryKind::Other,
        }
    }
}

/// One entry of a thread's persisted, append-only log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: String,
    pub thread_id: String,
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl LogEntry {
    pub fn new(
        id: impl Into<String>,
        thread_id: impl Into<String>,
        role: Role,
        content: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            thread_id: thread_id.into(),
            role,
            content: content.into(),
            timestamp,
        }
    }
}

/// Parse an ISO-8601 timestamp. Values without an offset are read as UTC,
/// which is how the backend writes them.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, ProtocolError> {
    let trimmed = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(|_| ProtocolError::InvalidTimestamp(trimmed.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn role_kind_covers_turn_structure() {
        assert_eq!(Role::User.kind(), EntryKind::User);
        assert_eq!(
            Role::TaskFailed.kind(),
            EntryKind::Step(StepKind::Task(TaskOutcome::Failed))
        );
        assert_eq!(
            Role::Clarification.kind(),
            EntryKind::Reply(ReplyKind::Clarification)
        );
        assert_eq!(Role::Other.kind(), EntryKind::Other);
    }

    #[test]
    fn unknown_role_deserializes_as_other() {
        let role: Role = serde_json::from_str("\"task_created\"").unwrap();
        assert_eq!(role, Role::Other);
        let role: Role = serde_json::from_str("\"task_skipped\"").unwrap();
        assert_eq!(role, Role::TaskSkipped);
    }

    #[test]
    fn role_labels_match_wire_names() {
        for role in [
            Role::User,
            Role::Status,
            Role::Extraction,
            Role::TaskSuccess,
            Role::Assistant,
        ] {
            let json = serde_json::to_string(&role).unwrap();
            assert_eq!(json, format!("\"{}\"", role.as_str()));
            assert_eq!(Role::from_label(role.as_str()), role);
        }
    }

    #[test]
    fn naive_timestamp_is_read_as_utc() {
        let ts = parse_timestamp("2025-03-01T10:15:30.250000").unwrap();
        let expected = Utc.with_ymd_and_hms(2025, 3, 1, 10, 15, 30).unwrap()
            + chrono::Duration::milliseconds(250);
        assert_eq!(ts, expected);
    }

    #[test]
    fn offset_timestamp_is_normalized() {
        let ts = parse_timestamp("2025-03-01T12:00:00+02:00").unwrap();
        assert_eq!(ts, Utc.with_ymd_and_hms(2025, 3, 1, 10, 0, 0).unwrap());
    }

    #[test]
    fn garbage_timestamp_is_rejected() {
        assert!(parse_timestamp("yesterday").is_err());
    }
}
