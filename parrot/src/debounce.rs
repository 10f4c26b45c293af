//! Trailing-edge debounce over a fixed action.
//!
//! Coalesces rapid triggers into one run of the action after a quiet
//! period. The pending run can be cancelled or flushed; dropping the
//! debouncer cancels it, so no action can fire after disposal.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;

/// Debounced runner for a single action.
///
/// Requires a Tokio runtime; `schedule` spawns the timer task.
pub struct Debounce {
    delay: Duration,
    action: Arc<dyn Fn() + Send + Sync>,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl Debounce {
    /// Create a debouncer running `action` after `delay` of quiet.
    pub fn new(delay: Duration, action: impl Fn() + Send + Sync + 'static) -> Self {
        Self {
            delay,
            action: Arc::new(action),
            pending: Mutex::new(None),
        }
    }

    /// Start (or restart) the quiet-period timer.
    pub fn schedule(&self) {
        let mut pending = self.pending.lock().unwrap();
        if let Some(task) = pending.take() {
            task.abort();
        }

        let action = Arc::clone(&self.action);
        let delay = self.delay;
        *pending = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            action();
        }));
    }

    /// Cancel any pending run and execute the action immediately.
    ///
    /// Does nothing when no run is pending.
    pub fn flush(&self) {
        let task = self.pending.lock().unwrap().take();
        if let Some(task) = task {
            task.abort();
            if !task.is_finished() {
                (self.action)();
            }
        }
    }

    /// Cancel any pending run without executing the action.
    pub fn cancel(&self) {
        if let Some(task) = self.pending.lock().unwrap().take() {
            task.abort();
        }
    }

    /// Whether a run is currently scheduled.
    pub fn is_pending(&self) -> bool {
        self.pending
            .lock()
            .unwrap()
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }
}

impl Drop for Debounce {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting(delay_ms: u64) -> (Arc<AtomicUsize>, Debounce) {
        let count = Arc::new(AtomicUsize::new(0));
        let fired = Arc::clone(&count);
        let debounce = Debounce::new(Duration::from_millis(delay_ms), move || {
            fired.fetch_add(1, Ordering::SeqCst);
        });
        (count, debounce)
    }

    async fn settle() {
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_fires_once_after_quiet_period() {
        let (count, debounce) = counting(250);

        debounce.schedule();
        debounce.schedule();
        debounce.schedule();
        settle().await;

        tokio::time::advance(Duration::from_millis(249)).await;
        settle().await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert!(debounce.is_pending());

        tokio::time::advance(Duration::from_millis(2)).await;
        settle().await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(!debounce.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reschedule_restarts_the_timer() {
        let (count, debounce) = counting(250);

        debounce.schedule();
        settle().await;
        tokio::time::advance(Duration::from_millis(200)).await;
        settle().await;

        debounce.schedule();
        settle().await;
        tokio::time::advance(Duration::from_millis(200)).await;
        settle().await;
        assert_eq!(count.load(Ordering::SeqCst), 0);

        tokio::time::advance(Duration::from_millis(60)).await;
        settle().await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_flush_runs_immediately() {
        let (count, debounce) = counting(250);

        debounce.schedule();
        debounce.flush();
        assert_eq!(count.load(Ordering::SeqCst), 1);

        // Nothing pending afterwards, so a second flush is a no-op.
        debounce.flush();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_and_drop_suppress_the_action() {
        let (count, debounce) = counting(250);

        debounce.schedule();
        settle().await;
        debounce.cancel();
        tokio::time::advance(Duration::from_millis(300)).await;
        settle().await;
        assert_eq!(count.load(Ordering::SeqCst), 0);

        debounce.schedule();
        settle().await;
        drop(debounce);
        tokio::time::advance(Duration::from_millis(300)).await;
        settle().await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }
}
