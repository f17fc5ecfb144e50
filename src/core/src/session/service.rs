use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use futures::StreamExt;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::machine::{Applied, StreamSession};
use super::state::SessionState;
use crate::backend::{Backend, ByteStream};
use crate::cache::TranscriptCache;
use crate::cancel::{abort_pair, AbortHandle, AbortSignal, CancelCoordinator};
use crate::config::StreamConfig;
use crate::error::ChatError;
use crate::outbound::ChatUpdate;
use crate::reconcile::Reconciler;
use crate::turn::Turn;

struct OpenSession {
    abort: AbortHandle,
    state: watch::Receiver<SessionState>,
}

/// Final result of one streamed turn.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub thread_id: String,
    pub state: SessionState,
    /// The live turn as it stood when the session ended.
    pub turn: Turn,
    pub title: Option<String>,
    /// Authoritative turns after reconciliation, if the re-fetch succeeded.
    pub reconciled: Option<Vec<Turn>>,
}

/// Handle to a turn that is streaming in the background.
#[derive(Debug)]
pub struct StreamTicket {
    pub thread_id: String,
    pub placeholder_turn_id: String,
    handle: JoinHandle<TurnOutcome>,
}

impl StreamTicket {
    /// Wait for the session to end and reconciliation to finish.
    pub async fn wait(self) -> Result<TurnOutcome, ChatError> {
        self.handle
            .await
            .map_err(|err| ChatError::Task(err.to_string()))
    }
}

/// Entry point for sending turns. At most one session is open per thread.
///
/// Updates go out on a bounded channel; the receiver returned by
/// [`ChatService::new`] must be drained or the stream drivers stall.
#[derive(Clone)]
pub struct ChatService {
    backend: Arc<dyn Backend>,
    cache: Arc<TranscriptCache>,
    reconciler: Reconciler,
    canceller: CancelCoordinator,
    sessions: Arc<Mutex<HashMap<String, OpenSession>>>,
    updates: mpsc::Sender<ChatUpdate>,
    config: StreamConfig,
}

impl ChatService {
    pub fn new(backend: Arc<dyn Backend>, config: StreamConfig) -> (Self, mpsc::Receiver<ChatUpdate>) {
        let (updates, rx) = mpsc::channel(config.update_buffer.max(1));
        let cache = Arc::new(TranscriptCache::new());
        let service = Self {
            reconciler: Reconciler::new(backend.clone(), cache.clone(), &config),
            canceller: CancelCoordinator::new(backend.clone()),
            backend,
            cache,
            sessions: Arc::new(Mutex::new(HashMap::new())),
            updates,
            config,
        };
        (service, rx)
    }

    pub fn cache(&self) -> &Arc<TranscriptCache> {
        &self.cache
    }

    /// Start a turn on `thread_id`. Fails with [`ChatError::SessionActive`]
    /// while the thread still has an open session, including the
    /// reconciliation window after its stream ended.
    pub fn send(&self, thread_id: &str, content: &str) -> Result<StreamTicket, ChatError> {
        let session = StreamSession::new(thread_id, content, Utc::now())
            .with_frame_logging(self.config.log_frames);
        let (abort, signal) = abort_pair();
        let (state_tx, state_rx) = watch::channel(session.state());

        {
            let mut sessions = self.sessions.lock().unwrap_or_else(|p| p.into_inner());
            if sessions.contains_key(thread_id) {
                return Err(ChatError::SessionActive(thread_id.to_string()));
            }
            sessions.insert(
                thread_id.to_string(),
                OpenSession {
                    abort,
                    state: state_rx,
                },
            );
        }

        info!(%thread_id, turn_id = %session.placeholder_turn_id(), "sending turn");
        let placeholder_turn_id = session.placeholder_turn_id().to_string();
        let driver = Driver {
            service: self.clone(),
            thread_id: thread_id.to_string(),
            content: content.to_string(),
            session,
            signal,
            state_tx,
        };
        let handle = tokio::spawn(driver.run());
        Ok(StreamTicket {
            thread_id: thread_id.to_string(),
            placeholder_turn_id,
            handle,
        })
    }

    /// Stop the thread's streaming turn: abort locally and ask the backend to
    /// stop generating. Returns `false` when nothing is streaming.
    pub fn cancel(&self, thread_id: &str) -> bool {
        let abort = {
            let sessions = self.sessions.lock().unwrap_or_else(|p| p.into_inner());
            match sessions.get(thread_id) {
                Some(open) if !open.state.borrow().is_terminal() => open.abort.clone(),
                _ => return false,
            }
        };
        if !abort.abort() {
            return false;
        }
        info!(%thread_id, "cancelling turn");
        self.canceller.request_remote_stop(thread_id);
        true
    }

    /// State of the thread's open session, if any.
    pub fn state(&self, thread_id: &str) -> Option<SessionState> {
        let sessions = self.sessions.lock().unwrap_or_else(|p| p.into_inner());
        sessions.get(thread_id).map(|open| *open.state.borrow())
    }

    pub fn is_busy(&self, thread_id: &str) -> bool {
        self.state(thread_id).is_some()
    }

    /// Turns of the thread, served from the cache or rebuilt from the log.
    pub async fn history(&self, thread_id: &str) -> Result<Vec<Turn>, ChatError> {
        self.cache.turns(self.backend.as_ref(), thread_id).await
    }

    async fn publish(&self, update: ChatUpdate) {
        if self.updates.send(update).await.is_err() {
            debug!("update receiver dropped");
        }
    }

    fn close(&self, thread_id: &str) {
        let mut sessions = self.sessions.lock().unwrap_or_else(|p| p.into_inner());
        sessions.remove(thread_id);
    }
}

enum Read {
    Aborted,
    Chunk(Option<Result<Vec<u8>, ChatError>>),
}

/// Owns one session for the lifetime of its background task.
struct Driver {
    service: ChatService,
    thread_id: String,
    content: String,
    session: StreamSession,
    signal: AbortSignal,
    state_tx: watch::Sender<SessionState>,
}

impl Driver {
    async fn run(mut self) -> TurnOutcome {
        self.publish(Applied::Updated).await;

        let backend = self.service.backend.clone();
        let opened = tokio::select! {
            biased;
            _ = self.signal.aborted() => None,
            result = backend.open_stream(&self.thread_id, &self.content) => Some(result),
        };
        match opened {
            None => {
                let applied = self.session.cancel();
                self.publish(applied).await;
            }
            Some(Err(err)) => {
                warn!(thread_id = %self.thread_id, error = %err, "failed to open event stream");
                let applied = self.session.fail(&err.to_string());
                self.publish(applied).await;
            }
            Some(Ok(stream)) => self.pump(stream).await,
        }

        self.finish().await
    }

    async fn pump(&mut self, mut stream: ByteStream) {
        loop {
            let read = tokio::select! {
                biased;
                _ = self.signal.aborted() => Read::Aborted,
                chunk = stream.next() => Read::Chunk(chunk),
            };
            match read {
                Read::Aborted => {
                    let applied = self.session.cancel();
                    self.publish(applied).await;
                    return;
                }
                Read::Chunk(Some(Ok(bytes))) => {
                    for frame in self.session.decode(&bytes) {
                        if self.signal.is_aborted() {
                            let applied = self.session.cancel();
                            self.publish(applied).await;
                            return;
                        }
                        let applied = self.session.apply(frame, Utc::now());
                        self.publish(applied).await;
                        if self.session.state().is_terminal() {
                            return;
                        }
                    }
                }
                Read::Chunk(Some(Err(err))) => {
                    let applied = if self.signal.is_aborted() {
                        self.session.cancel()
                    } else {
                        warn!(thread_id = %self.thread_id, error = %err, "event stream failed");
                        self.session.fail(&err.to_string())
                    };
                    self.publish(applied).await;
                    return;
                }
                Read::Chunk(None) => {
                    if let Some(frame) = self.session.decode_end() {
                        let applied = if self.signal.is_aborted() {
                            self.session.cancel()
                        } else {
                            self.session.apply(frame, Utc::now())
                        };
                        self.publish(applied).await;
                        if self.session.state().is_terminal() {
                            return;
                        }
                    }
                    let applied = self.session.end_of_stream();
                    self.publish(applied).await;
                    return;
                }
            }
        }
    }

    async fn publish(&mut self, applied: Applied) {
        self.state_tx.send_replace(self.session.state());
        match applied {
            Applied::Ignored => {}
            Applied::Title(title) => {
                self.service
                    .publish(ChatUpdate::Title {
                        thread_id: self.thread_id.clone(),
                        title,
                    })
                    .await;
            }
            Applied::Updated | Applied::Finished(_) => {
                let turn = self.session.snapshot();
                self.service.cache.apply_live(&self.thread_id, &turn);
                self.service
                    .publish(ChatUpdate::turn(&self.thread_id, self.session.state(), turn))
                    .await;
            }
        }
    }

    async fn finish(self) -> TurnOutcome {
        let state = self.session.state();
        info!(thread_id = %self.thread_id, %state, "turn ended");
        self.service.cache.invalidate(&self.thread_id);

        let reconciled = match self.service.reconciler.reconcile(&self.thread_id).await {
            Ok(turns) => {
                self.service
                    .publish(ChatUpdate::Reconciled {
                        thread_id: self.thread_id.clone(),
                        turns: turns.clone(),
                    })
                    .await;
                Some(turns)
            }
            Err(err) => {
                self.service
                    .publish(ChatUpdate::ReconcileFailed {
                        thread_id: self.thread_id.clone(),
                        error: err.to_string(),
                    })
                    .await;
                None
            }
        };

        self.service.close(&self.thread_id);
        self.service
            .publish(ChatUpdate::Closed {
                thread_id: self.thread_id.clone(),
                state,
            })
            .await;

        TurnOutcome {
            thread_id: self.thread_id,
            state,
            title: self.session.title().map(str::to_string),
            turn: self.session.snapshot(),
            reconciled,
        }
    }
}
