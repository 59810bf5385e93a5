use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

use tokio::task::JoinHandle;

/// Trailing-edge debouncer with a single pending-timer slot.
///
/// Each [`schedule`](Debouncer::schedule) cancels the pending timer and
/// starts a new one; only the task scheduled last in a quiet window runs.
/// Once a timer fires its task is detached, so cancelling never interrupts
/// work that has already started.
pub struct Debouncer {
    delay: Duration,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: Mutex::new(None),
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Run `task` after the delay unless another task is scheduled first.
    /// Must be called from within a tokio runtime.
    pub fn schedule<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let delay = self.delay;
        let timer = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            tokio::spawn(task);
        });

        let previous = self.pending.lock().expect("debouncer mutex").replace(timer);
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    /// Drop the pending timer. Returns whether one was waiting.
    pub fn cancel(&self) -> bool {
        match self.pending.lock().expect("debouncer mutex").take() {
            Some(timer) if !timer.is_finished() => {
                timer.abort();
                true
            }
            _ => false,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending
            .lock()
            .expect("debouncer mutex")
            .as_ref()
            .map_or(false, |timer| !timer.is_finished())
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        if let Ok(mut pending) = self.pending.lock() {
            if let Some(timer) = pending.take() {
                timer.abort();
            }
        }
    }
}
