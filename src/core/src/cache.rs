use std::collections::HashMap;
use std::sync::Mutex;

use tracing::debug;

use crate::backend::Backend;
use crate::error::ChatError;
use crate::reconstruct::reconstruct;
use crate::turn::Turn;

/// Last known turns of one thread.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transcript {
    pub turns: Vec<Turn>,
    /// True when `turns` is exactly the reconstruction of the persisted log.
    pub fresh: bool,
}

/// Read-through cache of reconstructed transcripts, keyed by thread id.
///
/// Live turns are upserted while they stream so readers see progress; any
/// live write marks the transcript stale, and the next [`turns`] call
/// re-fetches the log.
///
/// [`turns`]: TranscriptCache::turns
#[derive(Debug, Default)]
pub struct TranscriptCache {
    threads: Mutex<HashMap<String, Transcript>>,
}

impl TranscriptCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, thread_id: &str) -> Option<Transcript> {
        let threads = self.threads.lock().unwrap_or_else(|p| p.into_inner());
        threads.get(thread_id).cloned()
    }

    /// Replace the thread's turns with an authoritative reconstruction.
    pub fn store(&self, thread_id: &str, turns: Vec<Turn>) {
        let mut threads = self.threads.lock().unwrap_or_else(|p| p.into_inner());
        threads.insert(thread_id.to_string(), Transcript { turns, fresh: true });
    }

    /// Keep the cached turns but force the next read to re-fetch.
    pub fn invalidate(&self, thread_id: &str) {
        let mut threads = self.threads.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(transcript) = threads.get_mut(thread_id) {
            transcript.fresh = false;
        }
    }

    /// Insert or replace a live turn, matched by id.
    pub fn apply_live(&self, thread_id: &str, turn: &Turn) {
        let mut threads = self.threads.lock().unwrap_or_else(|p| p.into_inner());
        let transcript = threads.entry(thread_id.to_string()).or_default();
        transcript.fresh = false;
        match transcript.turns.iter_mut().find(|t| t.id == turn.id) {
            Some(existing) => *existing = turn.clone(),
            None => transcript.turns.push(turn.clone()),
        }
    }

    /// Turns of a thread, fetching and reconstructing the log when the cached
    /// copy is stale or missing. Turns still streaming locally are kept after
    /// the reconstructed ones until the log catches up with them, replacing
    /// the log's own unterminated last turn.
    pub async fn turns(&self, backend: &dyn Backend, thread_id: &str) -> Result<Vec<Turn>, ChatError> {
        if let Some(transcript) = self.get(thread_id) {
            if transcript.fresh {
                return Ok(transcript.turns);
            }
        }

        debug!(%thread_id, "transcript stale; fetching log");
        let entries = backend.fetch_entries(thread_id).await?;
        let mut turns = reconstruct(&entries);

        let mut threads = self.threads.lock().unwrap_or_else(|p| p.into_inner());
        let live: Vec<Turn> = threads
            .get(thread_id)
            .map(|t| {
                t.turns
                    .iter()
                    .filter(|turn| turn.is_streaming)
                    .filter(|turn| !turns.iter().any(|r| r.id == turn.id))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        let fresh = live.is_empty();
        // The log's open last turn is the live turn's own request.
        if turns
            .last()
            .is_some_and(|last| last.end.is_none() && live.iter().any(|turn| same_request(turn, last)))
        {
            turns.pop();
        }
        turns.extend(live);
        threads.insert(
            thread_id.to_string(),
            Transcript {
                turns: turns.clone(),
                fresh,
            },
        );
        Ok(turns)
    }
}

fn same_request(a: &Turn, b: &Turn) -> bool {
    match (&a.user, &b.user) {
        (Some(a), Some(b)) => a.content == b.content,
        _ => false,
    }
}
