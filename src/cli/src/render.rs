use buddy_core::{AgentSteps, TaskStep, Turn, TurnEnd};
use buddy_protocol::{TaskOutcome, ThreadSummary};

/// Tracks which parts of a live turn were already printed, so each snapshot
/// only prints what is new.
#[derive(Debug, Default)]
pub struct Progress {
    status: usize,
    disambiguation: bool,
    classification: bool,
    extraction: bool,
    tasks: usize,
}

impl Progress {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lines that became visible since the previous snapshot.
    pub fn advance(&mut self, steps: &AgentSteps) -> Vec<String> {
        let mut lines = Vec::new();
        for record in steps.status.iter().skip(self.status) {
            lines.push(format!("  · {}", record.data));
        }
        self.status = steps.status.len();

        for (label, record, shown) in [
            ("disambiguated", &steps.disambiguation, &mut self.disambiguation),
            ("classified", &steps.classification, &mut self.classification),
            ("extracted", &steps.extraction, &mut self.extraction),
        ] {
            if let (Some(record), false) = (record, *shown) {
                lines.push(format!("  · {label}: {}", record.data));
                *shown = true;
            }
        }

        for task in steps.tasks.iter().skip(self.tasks) {
            lines.push(task_line(task));
        }
        self.tasks = steps.tasks.len();
        lines
    }
}

pub fn task_line(task: &TaskStep) -> String {
    let mark = match task.status {
        TaskOutcome::Success => "ok",
        TaskOutcome::Failed => "failed",
        TaskOutcome::Skipped => "skipped",
    };
    let mut line = format!("  [{mark}] {}", task.name);
    if !task.result.is_empty() {
        line.push_str(&format!(": {}", task.result));
    }
    if !task.tools.is_empty() {
        line.push_str(&format!(" ({})", task.tools.join(", ")));
    }
    line
}

pub fn reply_line(turn: &Turn) -> Option<String> {
    let prefix = match turn.end? {
        TurnEnd::Assistant => "buddy",
        TurnEnd::Clarification => "buddy?",
        TurnEnd::Cancelled | TurnEnd::Error => "!",
    };
    Some(format!("{prefix}> {}", turn.content))
}

/// Full rendering of a finished or reconstructed turn.
pub fn turn_lines(turn: &Turn) -> Vec<String> {
    let mut lines = Vec::new();
    if let Some(user) = &turn.user {
        lines.push(format!("you> {}", user.content));
    }
    lines.extend(Progress::new().advance(&turn.agent_steps));
    match reply_line(turn) {
        Some(reply) => lines.push(reply),
        None if turn.is_streaming => lines.push("  … still running".to_string()),
        None => lines.push("  (no reply recorded)".to_string()),
    }
    lines
}

pub fn thread_line(thread: &ThreadSummary) -> String {
    let summary = if thread.summary.is_empty() {
        "(empty)"
    } else {
        thread.summary.as_str()
    };
    format!(
        "{}  {}  {:>3} msgs  {}",
        thread.thread_id, thread.created_at, thread.message_count, summary
    )
}
