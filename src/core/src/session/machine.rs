use buddy_protocol::{strip_reply_label, SseDecoder, SseFrame, StreamEvent};
use chrono::{DateTime, Utc};
use tracing::{debug, trace, warn};
use uuid::Uuid;

use super::state::SessionState;
use crate::turn::{Turn, TurnEnd, UserMessage, CANCELLED_MESSAGE};

/// Effect of feeding one input to a [`StreamSession`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Applied {
    /// Nothing observable changed.
    Ignored,
    /// The in-progress turn changed and should be republished.
    Updated,
    /// The session reached a terminal state.
    Finished(SessionState),
    /// The backend named the thread.
    Title(String),
}

/// One in-flight turn on one thread.
///
/// Owns the decoder for its byte stream and the placeholder turn whose
/// `agent_steps` is the live accumulator. Pure state: the async driver in
/// `service` feeds it chunks and publishes snapshots.
#[derive(Debug)]
pub struct StreamSession {
    thread_id: String,
    state: SessionState,
    turn: Turn,
    decoder: SseDecoder,
    title: Option<String>,
    log_frames: bool,
}

impl StreamSession {
    pub fn new(thread_id: impl Into<String>, content: impl Into<String>, now: DateTime<Utc>) -> Self {
        let user = UserMessage {
            id: Uuid::new_v4().to_string(),
            content: content.into(),
            timestamp: now,
        };
        Self {
            thread_id: thread_id.into(),
            state: SessionState::Connecting,
            turn: Turn::placeholder(Uuid::new_v4().to_string(), user),
            decoder: SseDecoder::new(),
            title: None,
            log_frames: false,
        }
    }

    /// Trace every decoded frame.
    pub fn with_frame_logging(mut self, enabled: bool) -> Self {
        self.log_frames = enabled;
        self
    }

    pub fn thread_id(&self) -> &str {
        &self.thread_id
    }

    pub fn placeholder_turn_id(&self) -> &str {
        &self.turn.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    pub fn turn(&self) -> &Turn {
        &self.turn
    }

    pub fn snapshot(&self) -> Turn {
        self.turn.clone()
    }

    /// Decode a chunk into frames. Malformed frames are dropped with a warning.
    pub fn decode(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        let decoded = self.decoder.push(chunk);
        let mut frames = Vec::with_capacity(decoded.len());
        for result in decoded {
            match result {
                Ok(frame) => frames.push(frame),
                Err(err) => {
                    warn!(thread_id = %self.thread_id, error = %err, "dropping malformed frame")
                }
            }
        }
        frames
    }

    /// Flush the decoder once the transport has closed.
    pub fn decode_end(&mut self) -> Option<SseFrame> {
        match self.decoder.finish()? {
            Ok(frame) => Some(frame),
            Err(err) => {
                warn!(thread_id = %self.thread_id, error = %err, "dropping malformed trailing frame");
                None
            }
        }
    }

    pub fn apply(&mut self, frame: SseFrame, now: DateTime<Utc>) -> Applied {
        if self.log_frames {
            trace!(thread_id = %self.thread_id, event_type = %frame.event_type, data = %frame.data, "frame");
        }
        self.apply_event(StreamEvent::from_frame(frame), now)
    }

    pub fn apply_event(&mut self, event: StreamEvent, now: DateTime<Utc>) -> Applied {
        if self.state.is_terminal() {
            debug!(
                thread_id = %self.thread_id,
                state = %self.state,
                event_type = event.event_type(),
                "ignoring frame after terminal state"
            );
            return Applied::Ignored;
        }
        if self.state == SessionState::Connecting {
            self.state = SessionState::Streaming;
        }

        match event {
            StreamEvent::Step { kind, data } => {
                self.turn.agent_steps.apply(kind, &data, now);
                Applied::Updated
            }
            StreamEvent::Reply { kind, content } => {
                self.turn.content = strip_reply_label(&content);
                self.turn.end = Some(kind.into());
                self.turn.timestamp = now;
                self.state = SessionState::Finalizing;
                Applied::Updated
            }
            StreamEvent::Done(_) => self.finish(SessionState::Done),
            StreamEvent::Cancelled(_) => self.finish_cancelled(),
            StreamEvent::Error(message) => self.finish_errored(&message),
            StreamEvent::Title(title) => {
                self.title = Some(title.clone());
                Applied::Title(title)
            }
            StreamEvent::Unknown { event_type, .. } => {
                warn!(thread_id = %self.thread_id, %event_type, "ignoring unknown event type");
                Applied::Ignored
            }
        }
    }

    /// Local abort. A turn whose reply already arrived completes instead of
    /// being downgraded; a finished turn is left alone.
    pub fn cancel(&mut self) -> Applied {
        match self.state {
            SessionState::Connecting | SessionState::Streaming => self.finish_cancelled(),
            SessionState::Finalizing => self.finish(SessionState::Done),
            _ => Applied::Ignored,
        }
    }

    /// Transport failure that was not a deliberate cancellation.
    pub fn fail(&mut self, message: &str) -> Applied {
        if self.state.is_terminal() {
            return Applied::Ignored;
        }
        self.finish_errored(message)
    }

    /// The byte stream closed. Without a terminal frame the turn errors,
    /// unless the reply was already received.
    pub fn end_of_stream(&mut self) -> Applied {
        match self.state {
            SessionState::Finalizing => self.finish(SessionState::Done),
            SessionState::Connecting | SessionState::Streaming => {
                self.finish_errored("stream closed before the turn completed")
            }
            _ => Applied::Ignored,
        }
    }

    fn finish(&mut self, state: SessionState) -> Applied {
        self.state = state;
        self.turn.is_streaming = false;
        Applied::Finished(state)
    }

    fn finish_cancelled(&mut self) -> Applied {
        self.turn.content = CANCELLED_MESSAGE.to_string();
        self.turn.end = Some(TurnEnd::Cancelled);
        self.finish(SessionState::Cancelled)
    }

    fn finish_errored(&mut self, message: &str) -> Applied {
        let message = message.trim();
        self.turn.content = if message.is_empty() {
            "Error: the backend reported an error".to_string()
        } else {
            format!("Error: {message}")
        };
        self.turn.end = Some(TurnEnd::Error);
        self.finish(SessionState::Errored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use buddy_protocol::TaskOutcome;
    use chrono::TimeZone;

    fn at(sec: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 4, 2, 18, 30, sec).unwrap()
    }

    fn session() -> StreamSession {
        StreamSession::new("th-1", "mute track 1", at(0))
    }

    fn feed(session: &mut StreamSession, frames: &[SseFrame]) -> Vec<Applied> {
        frames
            .iter()
            .enumerate()
            .map(|(i, f)| session.apply(f.clone(), at(i as u32 + 1)))
            .collect()
    }

    #[test]
    fn completed_turn_carries_reply_and_tasks() {
        let mut s = session();
        assert_eq!(s.state(), SessionState::Connecting);
        let applied = feed(
            &mut s,
            &[
                SseFrame::new("status", "Processing"),
                SseFrame::new("classification", "track"),
                SseFrame::new("task_success", "t1\nMute Track\nTrack 1 muted\n"),
                SseFrame::new("assistant", "Done."),
            ],
        );
        assert!(applied.iter().all(|a| *a == Applied::Updated));
        assert_eq!(s.state(), SessionState::Finalizing);
        assert!(s.turn().is_streaming);

        let done = s.apply(SseFrame::new("done", "Complete"), at(9));
        assert_eq!(done, Applied::Finished(SessionState::Done));

        let turn = s.snapshot();
        assert_eq!(turn.content, "Done.");
        assert_eq!(turn.end, Some(TurnEnd::Assistant));
        assert!(!turn.is_streaming);
        let task = &turn.agent_steps.tasks[0];
        assert_eq!(task.id, "t1");
        assert_eq!(task.name, "Mute Track");
        assert_eq!(task.status, TaskOutcome::Success);
        assert_eq!(task.result, "Track 1 muted");
        assert!(task.tools.is_empty());
    }

    #[test]
    fn first_frame_moves_connecting_to_streaming() {
        let mut s = session();
        s.apply(SseFrame::new("status", "Processing"), at(1));
        assert_eq!(s.state(), SessionState::Streaming);
        assert!(s.turn().is_streaming);
        assert_eq!(s.turn().content, "");
    }

    #[test]
    fn unknown_event_does_not_touch_steps() {
        let mut s = session();
        s.apply(SseFrame::new("status", "Processing"), at(1));
        let before = s.snapshot();
        let applied = s.apply(SseFrame::new("unknown_v2", "{\"x\":1}"), at(2));
        assert_eq!(applied, Applied::Ignored);
        assert_eq!(s.snapshot(), before);
        assert_eq!(s.state(), SessionState::Streaming);
    }

    #[test]
    fn stream_end_without_terminal_frame_errors_and_keeps_steps() {
        let mut s = session();
        s.apply(SseFrame::new("status", "Processing"), at(1));
        assert_eq!(s.end_of_stream(), Applied::Finished(SessionState::Errored));
        assert_eq!(s.turn().end, Some(TurnEnd::Error));
        assert!(s.turn().content.starts_with("Error: "));
        assert_eq!(s.turn().agent_steps.last_status(), Some("Processing"));
    }

    #[test]
    fn stream_end_after_reply_completes() {
        let mut s = session();
        s.apply(SseFrame::new("assistant", "All set."), at(1));
        assert_eq!(s.end_of_stream(), Applied::Finished(SessionState::Done));
        assert_eq!(s.turn().content, "All set.");
    }

    #[test]
    fn local_cancel_sets_sentinel_and_keeps_steps() {
        let mut s = session();
        s.apply(SseFrame::new("status", "Processing"), at(1));
        assert_eq!(s.cancel(), Applied::Finished(SessionState::Cancelled));
        assert_eq!(s.turn().content, CANCELLED_MESSAGE);
        assert_eq!(s.turn().agent_steps.status.len(), 1);
        assert_eq!(
            s.apply(SseFrame::new("status", "late"), at(2)),
            Applied::Ignored
        );
        assert_eq!(s.turn().agent_steps.status.len(), 1);
    }

    #[test]
    fn cancel_after_reply_does_not_downgrade() {
        let mut s = session();
        s.apply(SseFrame::new("assistant", "Done."), at(1));
        assert_eq!(s.cancel(), Applied::Finished(SessionState::Done));
        assert_eq!(s.turn().content, "Done.");
        assert_eq!(s.turn().end, Some(TurnEnd::Assistant));

        let mut finished = session();
        finished.apply(SseFrame::new("assistant", "Done."), at(1));
        finished.apply(SseFrame::new("done", ""), at(2));
        assert_eq!(finished.cancel(), Applied::Ignored);
        assert_eq!(finished.state(), SessionState::Done);
    }

    #[test]
    fn backend_cancellation_frame_overrides_reply() {
        let mut s = session();
        let applied = feed(
            &mut s,
            &[
                SseFrame::new("status", "Processing"),
                SseFrame::new("assistant", "Generation stopped by user"),
                SseFrame::new("cancelled", "Generation stopped by user"),
                SseFrame::new("done", "Cancelled"),
            ],
        );
        assert_eq!(applied[2], Applied::Finished(SessionState::Cancelled));
        assert_eq!(applied[3], Applied::Ignored);
        assert_eq!(s.state(), SessionState::Cancelled);
        assert_eq!(s.turn().end, Some(TurnEnd::Cancelled));
    }

    #[test]
    fn error_frame_is_terminal_content() {
        let mut s = session();
        s.apply(SseFrame::new("status", "Processing"), at(1));
        let applied = s.apply(SseFrame::new("error", "Thread not found"), at(2));
        assert_eq!(applied, Applied::Finished(SessionState::Errored));
        assert_eq!(s.turn().content, "Error: Thread not found");
        assert_eq!(s.turn().agent_steps.status.len(), 1);
        assert_eq!(s.fail("boom"), Applied::Ignored);
    }

    #[test]
    fn title_is_recorded_without_touching_the_turn() {
        let mut s = session();
        let before = s.snapshot();
        let applied = s.apply(SseFrame::new("title", "Muting drums"), at(1));
        assert_eq!(applied, Applied::Title("Muting drums".into()));
        assert_eq!(s.title(), Some("Muting drums"));
        assert_eq!(s.snapshot(), before);
    }

    #[test]
    fn decode_drops_malformed_frames() {
        let mut s = session();
        let frames = s.decode(b"event: status\n\nevent: status\ndata: ok\n\n");
        assert_eq!(frames, vec![SseFrame::new("status", "ok")]);
        assert!(s.decode_end().is_none());
    }
}
