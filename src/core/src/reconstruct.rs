//! Rebuild rendered turns from a thread's flat log.
//!
//! A `user` entry opens a turn, step entries accumulate under it, and the
//! next `assistant` or `clarification` entry closes it. The function is pure:
//! the same entries always produce the same turns, which is what lets the
//! reconciliation path replace a live projection without visible churn.

use buddy_protocol::{strip_reply_label, EntryKind, LogEntry, ReplyKind};
use chrono::{DateTime, Utc};

use crate::steps::AgentSteps;
use crate::turn::{Turn, UserMessage};

pub fn reconstruct(entries: &[LogEntry]) -> Vec<Turn> {
    let mut output = Vec::new();
    let mut open: Option<OpenTurn<'_>> = None;

    for entry in entries {
        match entry.role.kind() {
            EntryKind::User => {
                if let Some(interrupted) = open.take() {
                    output.push(interrupted.into_incomplete());
                }
                open = Some(OpenTurn::with_user(entry));
            }
            EntryKind::Step(_) => {
                open.get_or_insert_with(|| OpenTurn::headless(entry))
                    .pending
                    .push(entry);
            }
            EntryKind::Reply(kind) => {
                let turn = open.take().unwrap_or_else(|| OpenTurn::headless(entry));
                output.push(turn.close(kind, entry));
            }
            EntryKind::Other => {
                tracing::debug!(entry_id = %entry.id, "skipping log entry with unrecognized role");
            }
        }
    }

    if let Some(trailing) = open {
        output.push(trailing.into_incomplete());
    }
    output
}

struct OpenTurn<'a> {
    user: Option<UserMessage>,
    first_id: String,
    opened_at: DateTime<Utc>,
    pending: Vec<&'a LogEntry>,
}

impl<'a> OpenTurn<'a> {
    fn with_user(entry: &LogEntry) -> Self {
        Self {
            user: Some(UserMessage {
                id: entry.id.clone(),
                content: entry.content.clone(),
                timestamp: entry.timestamp,
            }),
            first_id: entry.id.clone(),
            opened_at: entry.timestamp,
            pending: Vec::new(),
        }
    }

    fn headless(entry: &LogEntry) -> Self {
        Self {
            user: None,
            first_id: entry.id.clone(),
            opened_at: entry.timestamp,
            pending: Vec::new(),
        }
    }

    fn close(self, kind: ReplyKind, reply: &LogEntry) -> Turn {
        Turn {
            id: reply.id.clone(),
            user: self.user,
            content: strip_reply_label(&reply.content),
            end: Some(kind.into()),
            agent_steps: AgentSteps::from_entries(self.pending),
            is_streaming: false,
            timestamp: reply.timestamp,
        }
    }

    fn into_incomplete(self) -> Turn {
        Turn {
            id: self.first_id,
            user: self.user,
            content: String::new(),
            end: None,
            agent_steps: AgentSteps::from_entries(self.pending),
            is_streaming: false,
            timestamp: self.opened_at,
        }
    }
}
