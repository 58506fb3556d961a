//! Supervised background tasks.
//!
//! Every long-running worker (serial reader, BLE scan, notification
//! forwarding, observation pipeline) runs behind a [`TaskHandle`] so the
//! caller can cancel it, check whether it finished, and collect its result.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::error::{Error, Result};

/// Cooperative cancellation flag shared between a handle and its worker.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag {
    cancelled: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl CancelFlag {
    /// Create a new, un-cancelled flag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Resolve once cancellation is requested.
    pub async fn cancelled(&self) {
        loop {
            let notified = self.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

/// Handle to a supervised background task.
pub struct TaskHandle {
    name: String,
    cancel: CancelFlag,
    handle: Option<JoinHandle<Result<()>>>,
}

impl TaskHandle {
    /// Spawn an async worker. The worker receives the cancel flag it should honor.
    pub fn spawn<F, Fut>(name: impl Into<String>, worker: F) -> Self
    where
        F: FnOnce(CancelFlag) -> Fut,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let name = name.into();
        let cancel = CancelFlag::new();
        debug!("Spawning task '{}'", name);
        let handle = tokio::spawn(worker(cancel.clone()));

        Self {
            name,
            cancel,
            handle: Some(handle),
        }
    }

    /// Spawn a blocking worker on the blocking thread pool.
    pub fn spawn_blocking<F>(name: impl Into<String>, worker: F) -> Self
    where
        F: FnOnce(CancelFlag) -> Result<()> + Send + 'static,
    {
        let name = name.into();
        let cancel = CancelFlag::new();
        debug!("Spawning blocking task '{}'", name);
        let flag = cancel.clone();
        let handle = tokio::task::spawn_blocking(move || worker(flag));

        Self {
            name,
            cancel,
            handle: Some(handle),
        }
    }

    /// The task name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Request cooperative cancellation.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Whether the worker has run to completion.
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, |h| h.is_finished())
    }

    /// Wait for the worker and return its result.
    ///
    /// # Errors
    ///
    /// Returns the worker's own error, or [`Error::TaskFailed`] if it panicked
    /// or was aborted.
    pub async fn join(mut self) -> Result<()> {
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };

        match handle.await {
            Ok(result) => result,
            Err(e) => Err(Error::TaskFailed {
                name: self.name.clone(),
                reason: e.to_string(),
            }),
        }
    }

    /// Cancel the worker and wait for it to finish.
    pub async fn shutdown(self) -> Result<()> {
        self.cancel();
        self.join().await
    }
}

impl std::fmt::Debug for TaskHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskHandle")
            .field("name", &self.name)
            .field("finished", &self.is_finished())
            .finish()
    }
}

impl Drop for TaskHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
