//! Two-phase cancellation: a local abort that stops frame processing at once,
//! and a best-effort remote stop for the backend's generator. The two are
//! issued together but fail independently.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::backend::Backend;
use crate::error::ChatError;

/// Local half: flips a flag the stream driver checks before every frame.
#[derive(Debug, Clone)]
pub struct AbortHandle {
    tx: Arc<watch::Sender<bool>>,
}

/// Receiving side of an [`AbortHandle`], owned by the stream driver.
#[derive(Debug)]
pub struct AbortSignal {
    rx: watch::Receiver<bool>,
}

pub fn abort_pair() -> (AbortHandle, AbortSignal) {
    let (tx, rx) = watch::channel(false);
    (AbortHandle { tx: Arc::new(tx) }, AbortSignal { rx })
}

impl AbortHandle {
    /// Request the abort. Returns `false` if it was already requested.
    pub fn abort(&self) -> bool {
        self.tx.send_if_modified(|aborted| {
            if *aborted {
                false
            } else {
                *aborted = true;
                true
            }
        })
    }

    pub fn is_aborted(&self) -> bool {
        *self.tx.borrow()
    }
}

impl AbortSignal {
    pub fn is_aborted(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once the abort is requested. Never resolves if every handle
    /// was dropped without aborting.
    pub async fn aborted(&mut self) {
        if self.rx.wait_for(|aborted| *aborted).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Remote half: asks the backend to stop generating for a thread.
#[derive(Clone)]
pub struct CancelCoordinator {
    backend: Arc<dyn Backend>,
}

impl CancelCoordinator {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }

    /// Issue the stop request and wait for it.
    pub async fn stop_remote(&self, thread_id: &str) -> Result<(), ChatError> {
        self.backend.cancel_stream(thread_id).await
    }

    /// Fire-and-forget stop request. Failures are logged and never touch the
    /// local session.
    pub fn request_remote_stop(&self, thread_id: &str) -> JoinHandle<()> {
        let this = self.clone();
        let thread_id = thread_id.to_string();
        tokio::spawn(async move {
            match this.stop_remote(&thread_id).await {
                Ok(()) => debug!(%thread_id, "remote stop acknowledged"),
                Err(err) => warn!(%thread_id, error = %err, "remote stop failed"),
            }
        })
    }
}
