//! Counter-based fan-out join barrier.

use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::Notify;

/// Joins a set of concurrent sub-operations back into one completion.
///
/// Call [`register`](JoinBarrier::register) before issuing each
/// sub-operation and [`complete`](JoinBarrier::complete) as each one
/// finishes; [`done`](JoinBarrier::done) resolves once every registered
/// sub-operation has completed. The barrier refuses to fire before the
/// first registration, so a caller that races `done()` against an empty
/// setup phase cannot observe a spurious completion.
///
/// The counters are atomics only so branch futures can share `&self`
/// across await points; all calls happen on the drain-loop task.
#[derive(Debug, Default)]
pub(crate) struct JoinBarrier {
    registered: AtomicUsize,
    outstanding: AtomicUsize,
    notify: Notify,
}

impl JoinBarrier {
    pub fn new() -> Self {
        JoinBarrier::default()
    }

    /// Record one sub-operation about to be issued.
    pub fn register(&self) {
        self.registered.fetch_add(1, Ordering::AcqRel);
        self.outstanding.fetch_add(1, Ordering::AcqRel);
    }

    /// Record one sub-operation finished. The final completion wakes
    /// `done()` waiters.
    ///
    /// # Panics
    ///
    /// Panics if called more times than `register`.
    pub fn complete(&self) {
        let previous = self.outstanding.fetch_sub(1, Ordering::AcqRel);
        assert!(previous > 0, "complete() without matching register()");
        if previous == 1 {
            self.notify.notify_waiters();
        }
    }

    /// True once at least one sub-operation was registered and all of
    /// them have completed.
    pub fn is_done(&self) -> bool {
        self.registered.load(Ordering::Acquire) > 0
            && self.outstanding.load(Ordering::Acquire) == 0
    }

    /// Wait for the barrier to fire.
    pub async fn done(&self) {
        loop {
            // Arm the notification before checking, so a complete() that
            // lands between the check and the await still wakes us.
            let notified = self.notify.notified();
            if self.is_done() {
                return;
            }
            notified.await;
        }
    }
}
