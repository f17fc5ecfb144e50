use crate::{ReplyKind, SseFrame, StepKind, TaskOutcome};

/// Typed view of one event-stream frame.
///
/// This is the closed set the session state machine dispatches on; anything
/// the client does not recognize lands in `Unknown` and is ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    Step { kind: StepKind, data: String },
    Reply { kind: ReplyKind, content: String },
    Done(String),
    Cancelled(String),
    Error(String),
    Title(String),
    Unknown { event_type: String, data: String },
}

impl StreamEvent {
    pub fn from_frame(frame: SseFrame) -> Self {
        let SseFrame { event_type, data } = frame;
        match event_type.as_str() {
            "status" => Self::step(StepKind::Status, data),
            "disambiguation" => Self::step(StepKind::Disambiguation, data),
            "classification" => Self::step(StepKind::Classification, data),
            "extraction" => Self::step(StepKind::Extraction, data),
            "task_success" => Self::step(StepKind::Task(TaskOutcome::Success), data),
            "task_failed" => Self::step(StepKind::Task(TaskOutcome::Failed), data),
            "task_skipped" => Self::step(StepKind::Task(TaskOutcome::Skipped), data),
            "assistant" => Self::Reply {
                kind: ReplyKind::Assistant,
                content: data,
            },
            "clarification" => Self::Reply {
                kind: ReplyKind::Clarification,
                content: data,
            },
            "done" => Self::Done(data),
            "cancelled" => Self::Cancelled(data),
            "error" => Self::Error(data),
            "title" => Self::Title(data),
            _ => Self::Unknown { event_type, data },
        }
    }

    /// Wire name of the event type.
    pub fn event_type(&self) -> &str {
        match self {
            Self::Step { kind, .. } => step_event_type(*kind),
            Self::Reply {
                kind: ReplyKind::Assistant,
                ..
            } => "assistant",
            Self::Reply {
                kind: ReplyKind::Clarification,
                ..
            } => "clarification",
            Self::Done(_) => "done",
            Self::Cancelled(_) => "cancelled",
            Self::Error(_) => "error",
            Self::Title(_) => "title",
            Self::Unknown { event_type, .. } => event_type,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done(_) | Self::Cancelled(_) | Self::Error(_))
    }

    fn step(kind: StepKind, data: String) -> Self {
        Self::Step { kind, data }
    }
}

pub fn step_event_type(kind: StepKind) -> &'static str {
    match kind {
        StepKind::Status => "status",
        StepKind::Disambiguation => "disambiguation",
        StepKind::Classification => "classification",
        StepKind::Extraction => "extraction",
        StepKind::Task(TaskOutcome::Success) => "task_success",
        StepKind::Task(TaskOutcome::Failed) => "task_failed",
        StepKind::Task(TaskOutcome::Skipped) => "task_skipped",
    }
}

/// Labels each stage puts in front of its text, in the persisted log and on
/// the live stream.
fn step_labels(kind: StepKind) -> &'static [&'static str] {
    match kind {
        StepKind::Status => &["Status:"],
        StepKind::Disambiguation => &["Disambiguation Agent:", "Disambiguated input:"],
        StepKind::Classification => &["Classification Agent:", "Classification:"],
        StepKind::Extraction => &["Extraction Agent:", "Extraction:"],
        StepKind::Task(_) => &[],
    }
}

const REPLY_LABELS: &[&str] = &["Summarization Agent:"];

/// Remove a stage label from step text. Task payloads are returned as-is;
/// `TaskPayload::parse` owns their framing.
pub fn strip_step_label(kind: StepKind, text: &str) -> String {
    if matches!(kind, StepKind::Task(_)) {
        return text.to_string();
    }
    strip_any(step_labels(kind), text)
}

/// Remove the agent-name label from a reply before display.
pub fn strip_reply_label(text: &str) -> String {
    strip_any(REPLY_LABELS, text)
}

fn strip_any(labels: &[&str], text: &str) -> String {
    let trimmed = text.trim();
    for label in labels {
        if let Some(rest) = trimmed.strip_prefix(label) {
            return rest.trim().to_string();
        }
    }
    trimmed.to_string()
}
