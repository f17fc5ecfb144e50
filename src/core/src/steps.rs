use buddy_protocol::{strip_step_label, EntryKind, LogEntry, StepKind, TaskOutcome, TaskPayload};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single piece of stage output with the time it was observed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepRecord {
    pub data: String,
    pub timestamp: DateTime<Utc>,
}

/// One executed task as shown under a turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskStep {
    pub id: String,
    pub name: String,
    pub status: TaskOutcome,
    pub result: String,
    pub tools: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

/// Structured projection of a turn's step entries.
///
/// Built incrementally while a turn streams and in one pass when a turn is
/// reconstructed from the log. Both paths go through [`AgentSteps::apply`],
/// so the two projections of the same entries are equal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentSteps {
    pub status: Vec<StepRecord>,
    pub disambiguation: Option<StepRecord>,
    pub classification: Option<StepRecord>,
    pub extraction: Option<StepRecord>,
    pub tasks: Vec<TaskStep>,
}

impl AgentSteps {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one step into the projection.
    ///
    /// Status and task steps keep their arrival order; disambiguation,
    /// classification and extraction keep the last value seen.
    pub fn apply(&mut self, kind: StepKind, data: &str, timestamp: DateTime<Utc>) {
        match kind {
            StepKind::Status => self.status.push(record(kind, data, timestamp)),
            StepKind::Disambiguation => self.disambiguation = Some(record(kind, data, timestamp)),
            StepKind::Classification => self.classification = Some(record(kind, data, timestamp)),
            StepKind::Extraction => self.extraction = Some(record(kind, data, timestamp)),
            StepKind::Task(status) => {
                let payload = TaskPayload::parse(data);
                self.tasks.push(TaskStep {
                    id: payload.id,
                    name: payload.name,
                    status,
                    result: payload.result,
                    tools: payload.tools,
                    timestamp,
                });
            }
        }
    }

    /// Fold the step entries of a finished turn. Non-step entries are skipped.
    pub fn from_entries<'a>(entries: impl IntoIterator<Item = &'a LogEntry>) -> Self {
        let mut steps = Self::new();
        for entry in entries {
            if let EntryKind::Step(kind) = entry.role.kind() {
                steps.apply(kind, &entry.content, entry.timestamp);
            }
        }
        steps
    }

    pub fn is_empty(&self) -> bool {
        self.status.is_empty()
            && self.disambiguation.is_none()
            && self.classification.is_none()
            && self.extraction.is_none()
            && self.tasks.is_empty()
    }

    pub fn last_status(&self) -> Option<&str> {
        self.status.last().map(|s| s.data.as_str())
    }
}

fn record(kind: StepKind, data: &str, timestamp: DateTime<Utc>) -> StepRecord {
    StepRecord {
        data: strip_step_label(kind, data),
        timestamp,
    }
}
