//! Debounced, cancelable snapshot flushes.
//!
//! Every call to [`FlushScheduler::schedule`] cancels the pending flush (if
//! any) and starts a new quiet-period timer, so a burst of mutations results
//! in a single disk write. Replacing the pending task happens under one lock,
//! so a cancellation can never be lost to a concurrent reschedule. The
//! flush itself runs on the blocking pool.

use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Default quiet period before a dirty database is written.
pub const DEFAULT_FLUSH_DELAY: Duration = Duration::from_secs(30);

struct PendingFlush {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

/// Owns at most one deferred flush task.
pub struct FlushScheduler {
    delay: Duration,
    pending: Mutex<Option<PendingFlush>>,
}

impl FlushScheduler {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: Mutex::new(None),
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Replace any pending flush with `flush`, run after the quiet period.
    ///
    /// Outside a tokio runtime there is nothing to defer onto, so `flush`
    /// runs immediately on the caller's thread.
    pub fn schedule<F>(&self, flush: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let mut pending = self.pending.lock();
        if let Some(previous) = pending.take() {
            previous.token.cancel();
        }

        let runtime = match Handle::try_current() {
            Ok(runtime) => runtime,
            Err(_) => {
                drop(pending);
                debug!("No async runtime, flushing synchronously");
                flush();
                return;
            }
        };

        let token = CancellationToken::new();
        let cancelled = token.clone();
        let delay = self.delay;
        let handle = runtime.spawn(async move {
            tokio::select! {
                _ = cancelled.cancelled() => {
                    debug!("Pending flush superseded");
                }
                _ = tokio::time::sleep(delay) => {
                    if let Err(e) = tokio::task::spawn_blocking(flush).await {
                        warn!(error = %e, "Flush task panicked");
                    }
                }
            }
        });

        *pending = Some(PendingFlush { token, handle });
        debug!(delay_ms = delay.as_millis() as u64, "Scheduled flush");
    }

    /// Cancel the pending flush. Returns whether one was waiting.
    pub fn cancel(&self) -> bool {
        match self.pending.lock().take() {
            Some(previous) => {
                let waiting = !previous.handle.is_finished();
                previous.token.cancel();
                waiting
            }
            None => false,
        }
    }

    /// Whether a flush is scheduled and has not completed yet.
    pub fn is_pending(&self) -> bool {
        self.pending
            .lock()
            .as_ref()
            .is_some_and(|p| !p.handle.is_finished())
    }

    /// Wait until the pending flush (if any) has fired or been cancelled.
    pub async fn wait_idle(&self) {
        let handle = self.pending.lock().take().map(|p| p.handle);
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }
}

impl Default for FlushScheduler {
    fn default() -> Self {
        Self::new(DEFAULT_FLUSH_DELAY)
    }
}

impl std::fmt::Debug for FlushScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlushScheduler")
            .field("delay", &self.delay)
            .field("pending", &self.is_pending())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counter() -> (Arc<AtomicUsize>, impl Fn() -> Box<dyn FnOnce() + Send>) {
        let count = Arc::new(AtomicUsize::new(0));
        let shared = count.clone();
        let make = move || {
            let shared = shared.clone();
            Box::new(move || {
                shared.fetch_add(1, Ordering::SeqCst);
            }) as Box<dyn FnOnce() + Send>
        };
        (count, make)
    }

    #[tokio::test(start_paused = true)]
    async fn test_flush_fires_after_delay() {
        let scheduler = FlushScheduler::new(Duration::from_millis(30));
        let (count, make) = counter();

        scheduler.schedule(make());
        assert!(scheduler.is_pending());
        assert_eq!(count.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);

        scheduler.wait_idle().await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(!scheduler.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_coalesces_into_one_flush() {
        let scheduler = FlushScheduler::new(Duration::from_millis(30));
        let (count, make) = counter();

        for _ in 0..5 {
            scheduler.schedule(make());
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        scheduler.wait_idle().await;

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_prevents_flush() {
        let scheduler = FlushScheduler::new(Duration::from_millis(30));
        let (count, make) = counter();

        scheduler.schedule(make());
        assert!(scheduler.cancel());
        assert!(!scheduler.cancel());

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_flush_runs_off_the_async_thread() {
        let scheduler = FlushScheduler::new(Duration::from_millis(30));
        let caller = std::thread::current().id();
        let seen = Arc::new(parking_lot::Mutex::new(None));
        let slot = seen.clone();

        scheduler.schedule(move || {
            *slot.lock() = Some(std::thread::current().id());
        });
        scheduler.wait_idle().await;

        let flushed_on = seen.lock().take();
        assert!(flushed_on.is_some());
        assert_ne!(flushed_on, Some(caller));
    }

    #[test]
    fn test_without_runtime_flushes_immediately() {
        let scheduler = FlushScheduler::new(Duration::from_secs(3600));
        let (count, make) = counter();

        scheduler.schedule(make());
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(!scheduler.is_pending());
    }
}
