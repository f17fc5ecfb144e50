use crate::session::SessionState;
use crate::turn::Turn;

/// Updates emitted by the chat service to whoever renders threads.
#[derive(Debug, Clone)]
pub enum ChatUpdate {
    /// Snapshot of the in-progress turn after a state change.
    Turn {
        thread_id: String,
        state: SessionState,
        turn: Turn,
    },
    Title {
        thread_id: String,
        title: String,
    },
    /// Authoritative turns rebuilt from the persisted log.
    Reconciled {
        thread_id: String,
        turns: Vec<Turn>,
    },
    /// Re-fetch failed; the live turn stays as last shown.
    ReconcileFailed {
        thread_id: String,
        error: String,
    },
    /// The session is gone and the thread accepts new input.
    Closed {
        thread_id: String,
        state: SessionState,
    },
}

impl ChatUpdate {
    pub fn turn(thread_id: impl Into<String>, state: SessionState, turn: Turn) -> Self {
        Self::Turn {
            thread_id: thread_id.into(),
            state,
            turn,
        }
    }

    pub fn thread_id(&self) -> &str {
        match self {
            Self::Turn { thread_id, .. }
            | Self::Title { thread_id, .. }
            | Self::Reconciled { thread_id, .. }
            | Self::ReconcileFailed { thread_id, .. }
            | Self::Closed { thread_id, .. } => thread_id,
        }
    }
}
