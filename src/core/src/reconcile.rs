//! Post-turn reconciliation: once a session ends, the persisted log replaces
//! the live projection.
//!
//! The backend persists a turn's final entries shortly after its stream
//! closes, so the first fetch can miss them. Fetches repeat after the same
//! delay while the log's last turn has no terminal entry, up to a bounded
//! number of attempts; the last result wins.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::backend::Backend;
use crate::cache::TranscriptCache;
use crate::config::StreamConfig;
use crate::error::ChatError;
use crate::reconstruct::reconstruct;
use crate::turn::Turn;

#[derive(Clone)]
pub struct Reconciler {
    backend: Arc<dyn Backend>,
    cache: Arc<TranscriptCache>,
    delay: Duration,
    attempts: u32,
}

impl Reconciler {
    pub fn new(backend: Arc<dyn Backend>, cache: Arc<TranscriptCache>, config: &StreamConfig) -> Self {
        Self {
            backend,
            cache,
            delay: config.reconcile_delay(),
            attempts: config.reconcile_attempts.max(1),
        }
    }

    /// Re-fetch and reconstruct the thread, then store the result in the
    /// cache. On a fetch failure the cached live turns stay in place, marked
    /// stale, and the error is returned.
    pub async fn reconcile(&self, thread_id: &str) -> Result<Vec<Turn>, ChatError> {
        self.cache.invalidate(thread_id);

        let mut turns = Vec::new();
        for attempt in 1..=self.attempts {
            tokio::time::sleep(self.delay).await;
            let entries = match self.backend.fetch_entries(thread_id).await {
                Ok(entries) => entries,
                Err(err) => {
                    warn!(%thread_id, attempt, error = %err, "reconciliation fetch failed");
                    return Err(err);
                }
            };
            turns = reconstruct(&entries);
            if settled(&turns) {
                break;
            }
            debug!(%thread_id, attempt, "log has an unterminated last turn");
        }

        info!(%thread_id, turns = turns.len(), "thread reconciled");
        self.cache.store(thread_id, turns.clone());
        Ok(turns)
    }
}

fn settled(turns: &[Turn]) -> bool {
    turns.last().map_or(true, |turn| turn.end.is_some())
}
