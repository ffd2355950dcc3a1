use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;

/// Runs a task once activity has been quiet for a fixed period.
///
/// Every `schedule` cancels the pending task and starts a new timer, so a
/// burst of triggers yields a single run after the last one.
pub struct Debouncer {
    quiet: Duration,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl Debouncer {
    pub fn new(quiet: Duration) -> Self {
        Self {
            quiet,
            pending: Mutex::new(None),
        }
    }

    /// Must be called from within a tokio runtime.
    pub fn schedule<F>(&self, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let quiet = self.quiet;
        let handle = tokio::spawn(async move {
            tokio::time::sleep(quiet).await;
            task();
        });

        if let Some(previous) = self.pending.lock().replace(handle) {
            previous.abort();
        }
    }

    pub fn cancel(&self) {
        if let Some(previous) = self.pending.lock().take() {
            previous.abort();
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending
            .lock()
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl fmt::Debug for Debouncer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Debouncer")
            .field("quiet", &self.quiet)
            .field("pending", &self.is_pending())
            .finish()
    }
}

/// Drains mutation batches and re-runs `on_quiet` after each burst settles.
pub struct MutationWatcher {
    debouncer: Arc<Debouncer>,
    listener: JoinHandle<()>,
}

impl MutationWatcher {
    /// Must be called from within a tokio runtime.
    pub fn spawn<B, F>(mut batches: UnboundedReceiver<B>, quiet: Duration, on_quiet: F) -> Self
    where
        B: Send + 'static,
        F: Fn() + Send + Sync + 'static,
    {
        let debouncer = Arc::new(Debouncer::new(quiet));
        let on_quiet = Arc::new(on_quiet);

        let listener = {
            let debouncer = debouncer.clone();
            tokio::spawn(async move {
                while batches.recv().await.is_some() {
                    let on_quiet = on_quiet.clone();
                    debouncer.schedule(move || (*on_quiet)());
                }
                tracing::trace!("mutation source closed");
            })
        };

        Self {
            debouncer,
            listener,
        }
    }

    /// Stops observing and drops any pending re-scan.
    pub fn disconnect(&self) {
        self.listener.abort();
        self.debouncer.cancel();
    }

    pub fn has_pending_scan(&self) -> bool {
        self.debouncer.is_pending()
    }
}

impl Drop for MutationWatcher {
    fn drop(&mut self) {
        self.disconnect();
    }
}
