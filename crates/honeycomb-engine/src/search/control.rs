//! Search control — cooperative stop flag and deadline.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

/// Granularity of the interruptible sleep used for the think-time floor.
const SLEEP_SLICE: Duration = Duration::from_millis(5);

/// Controls when a search aborts.
///
/// Polled at every node entry and after every child return. Three layered
/// signals: the shared stop flag (external [`request_stop`](Self::request_stop)
/// or a fired deadline), the monotonic deadline itself, and an optional
/// per-split cancel flag used by the parallel searcher to retire siblings
/// after a cutoff. Once the deadline fires the stop flag is latched so later
/// polls never consult the clock again.
#[derive(Debug, Clone)]
pub struct SearchControl {
    stopped: Arc<AtomicBool>,
    cancel: Option<Arc<AtomicBool>>,
    deadline: Option<Instant>,
}

impl SearchControl {
    /// Control without a deadline; only responds to the stop flag.
    pub fn unbounded(stopped: Arc<AtomicBool>) -> Self {
        Self {
            stopped,
            cancel: None,
            deadline: None,
        }
    }

    /// Control from a time budget. A zero budget means no deadline; a budget
    /// too large for the clock saturates to "no deadline".
    pub fn from_budget(stopped: Arc<AtomicBool>, budget: Duration) -> Self {
        let deadline = if budget.is_zero() {
            None
        } else {
            Instant::now().checked_add(budget)
        };
        Self {
            stopped,
            cancel: None,
            deadline,
        }
    }

    /// Derive a control that additionally aborts when `cancel` is raised.
    ///
    /// The cancel flag never latches the shared stop flag, so retiring one
    /// split's siblings does not end the whole search.
    pub(crate) fn with_cancel(&self, cancel: Arc<AtomicBool>) -> Self {
        Self {
            stopped: Arc::clone(&self.stopped),
            cancel: Some(cancel),
            deadline: self.deadline,
        }
    }

    /// Check whether the search should abort.
    pub fn should_abort(&self) -> bool {
        if self.stopped.load(Ordering::Relaxed) {
            return true;
        }

        if let Some(cancel) = &self.cancel
            && cancel.load(Ordering::Relaxed)
        {
            return true;
        }

        if let Some(deadline) = self.deadline
            && Instant::now() >= deadline
        {
            self.stopped.store(true, Ordering::Release);
            return true;
        }

        false
    }

    /// Request an abort from outside the search.
    pub fn request_stop(&self) {
        self.stopped.store(true, Ordering::Release);
    }

    /// Clear the stop flag. Called once when a new search begins.
    pub fn clear(&self) {
        self.stopped.store(false, Ordering::Release);
    }

    /// Whether the stop flag is set (deadline fired or stop requested).
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Relaxed)
    }

    /// Reference to the shared stop flag.
    pub fn stop_flag(&self) -> &Arc<AtomicBool> {
        &self.stopped
    }

    /// Sleep for `duration`, waking early when the stop flag is raised.
    pub fn interruptible_sleep(&self, duration: Duration) {
        let Some(end) = Instant::now().checked_add(duration) else {
            return;
        };
        loop {
            if self.stopped.load(Ordering::Relaxed) {
                return;
            }
            let now = Instant::now();
            if now >= end {
                return;
            }
            thread::sleep((end - now).min(SLEEP_SLICE));
        }
    }
}
