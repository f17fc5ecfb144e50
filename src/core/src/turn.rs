use buddy_protocol::ReplyKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::steps::AgentSteps;

/// Content shown when a turn is cancelled.
pub const CANCELLED_MESSAGE: &str = "Generation stopped by user";

/// How a turn ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnEnd {
    Assistant,
    Clarification,
    Cancelled,
    Error,
}

impl From<ReplyKind> for TurnEnd {
    fn from(kind: ReplyKind) -> Self {
        match kind {
            ReplyKind::Assistant => Self::Assistant,
            ReplyKind::Clarification => Self::Clarification,
        }
    }
}

/// The user submission that opened a turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserMessage {
    pub id: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// One rendered exchange: user input, pipeline steps, and the reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub id: String,
    pub user: Option<UserMessage>,
    /// Reply text, cancellation sentinel, or error message. Empty while the
    /// turn is open.
    pub content: String,
    pub end: Option<TurnEnd>,
    pub agent_steps: AgentSteps,
    pub is_streaming: bool,
    pub timestamp: DateTime<Utc>,
}

impl Turn {
    /// Placeholder for a turn that is about to stream.
    pub fn placeholder(id: String, user: UserMessage) -> Self {
        let timestamp = user.timestamp;
        Self {
            id,
            user: Some(user),
            content: String::new(),
            end: None,
            agent_steps: AgentSteps::new(),
            is_streaming: true,
            timestamp,
        }
    }

    /// True once an assistant or clarification reply closed the turn.
    pub fn is_answered(&self) -> bool {
        matches!(self.end, Some(TurnEnd::Assistant | TurnEnd::Clarification))
    }

    /// Ended without a reply and not streaming: the log stops mid-turn.
    pub fn is_incomplete(&self) -> bool {
        self.end.is_none() && !self.is_streaming
    }
}
