use crate::ProtocolError;

/// Longest line the decoder buffers before dropping its frame.
pub const MAX_LINE_BYTES: usize = 64 * 1024;

/// Event type used when a frame carries no `event:` line.
pub const DEFAULT_EVENT_TYPE: &str = "message";

/// One decoded server-sent event. `data` is forwarded untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseFrame {
    pub event_type: String,
    pub data: String,
}

impl SseFrame {
    pub fn new(event_type: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            data: data.into(),
        }
    }

    /// Encode the frame in wire form, one `data:` line per payload line.
    pub fn encode(&self) -> String {
        let mut out = format!("event: {}\n", self.event_type);
        for line in self.data.split('\n') {
            out.push_str("data: ");
            out.push_str(line);
            out.push('\n');
        }
        out.push('\n');
        out
    }
}

/// Incremental `text/event-stream` decoder.
///
/// Holds raw bytes until a full line is available, so lines and multi-byte
/// characters split across transport chunks decode correctly. Frames come out
/// in arrival order; a malformed frame yields an `Err` and decoding resumes at
/// the next frame. A line longer than [`MAX_LINE_BYTES`] drops its frame the
/// same way, without buffering the rest of it.
#[derive(Debug, Default)]
pub struct SseDecoder {
    line: Vec<u8>,
    event_type: Option<String>,
    data: Vec<String>,
    malformed: bool,
    /// Inside an oversized line; bytes are dropped until its newline.
    oversized: bool,
    /// Inside a dropped frame; lines are dropped until a blank one.
    skipping: bool,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the next chunk of bytes; returns every frame completed by it.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Result<SseFrame, ProtocolError>> {
        let mut out = Vec::new();
        let mut rest = chunk;
        while let Some(pos) = rest.iter().position(|b| *b == b'\n') {
            let head = &rest[..pos];
            rest = &rest[pos + 1..];
            if std::mem::take(&mut self.oversized) {
                continue;
            }
            self.line.extend_from_slice(head);
            if self.line.len() > MAX_LINE_BYTES {
                out.push(Err(self.drop_frame()));
                continue;
            }
            let mut line = std::mem::take(&mut self.line);
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            if self.skipping {
                self.skipping = !line.is_empty();
                continue;
            }
            if let Some(frame) = self.process_line(&line) {
                out.push(frame);
            }
        }
        if !self.oversized {
            self.line.extend_from_slice(rest);
            if self.line.len() > MAX_LINE_BYTES {
                out.push(Err(self.drop_frame()));
                self.oversized = true;
            }
        }
        out
    }

    /// Flush state at end of stream. A trailing frame whose lines arrived but
    /// whose closing blank line did not is still dispatched.
    pub fn finish(&mut self) -> Option<Result<SseFrame, ProtocolError>> {
        self.oversized = false;
        if std::mem::take(&mut self.skipping) {
            self.line.clear();
            return None;
        }
        if !self.line.is_empty() {
            let mut line = std::mem::take(&mut self.line);
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            if let Some(frame) = self.process_line(&line) {
                return Some(frame);
            }
        }
        self.dispatch()
    }

    /// True when no partial line or frame is buffered.
    pub fn is_idle(&self) -> bool {
        self.line.is_empty()
            && self.event_type.is_none()
            && self.data.is_empty()
            && !self.malformed
            && !self.skipping
    }

    /// Discard the frame holding an oversized line; its remaining lines are
    /// skipped up to the next blank line.
    fn drop_frame(&mut self) -> ProtocolError {
        self.line = Vec::new();
        self.event_type = None;
        self.data.clear();
        self.malformed = false;
        self.skipping = true;
        ProtocolError::LineTooLong {
            limit: MAX_LINE_BYTES,
        }
    }

    fn process_line(&mut self, line: &[u8]) -> Option<Result<SseFrame, ProtocolError>> {
        if line.is_empty() {
            return self.dispatch();
        }
        let Ok(text) = std::str::from_utf8(line) else {
            self.malformed = true;
            return None;
        };
        if text.starts_with(':') {
            return None;
        }
        let (field, value) = match text.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (text, ""),
        };
        match field {
            "event" => self.event_type = Some(value.to_string()),
            "data" => self.data.push(value.to_string()),
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<Result<SseFrame, ProtocolError>> {
        let event_type = self.event_type.take();
        let data = std::mem::take(&mut self.data);
        if std::mem::take(&mut self.malformed) {
            return Some(Err(ProtocolError::InvalidUtf8));
        }
        match (event_type, data.is_empty()) {
            (None, true) => None,
            (Some(event_type), true) => Some(Err(ProtocolError::MissingData { event_type })),
            (event_type, false) => Some(Ok(SseFrame {
                event_type: event_type
                    .filter(|t| !t.is_empty())
                    .unwrap_or_else(|| DEFAULT_EVENT_TYPE.to_string()),
                data: data.join("\n"),
            })),
        }
    }
}
