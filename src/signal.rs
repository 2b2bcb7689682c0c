//! Completion and cancellation signalling primitives
//!
//! Every request reports its final outcome through a [`CompletionSignal`],
//! a single-assignment cell that resolves exactly once. Cancellable requests
//! additionally carry a [`CancelSignal`], a one-shot broadcast flag that
//! cooperative checkpoints observe.

use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Notify;

/// Final outcome of a request
///
/// Cancellation is a first-class outcome, distinct from failure, so callers
/// can tell "this was asked to stop" apart from "this broke".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// The request ran to completion
    Completed,
    /// The request failed; the payload is the formatted failure message
    Failed(String),
    /// The request was cancelled (or rejected) before it could complete
    Cancelled,
}

impl RunOutcome {
    /// Whether this outcome represents a failure
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(self, RunOutcome::Failed(_))
    }

    /// Whether this outcome represents cancellation
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, RunOutcome::Cancelled)
    }
}

#[derive(Debug)]
struct CompletionInner {
    outcome: Mutex<Option<RunOutcome>>,
    resolved: Notify,
}

/// Single-assignment future carrying a request's final outcome
///
/// The signal starts unresolved, accepts exactly one [`RunOutcome`], and
/// wakes every current and future waiter once resolved. Clones share the
/// same underlying cell.
#[derive(Debug, Clone)]
pub struct CompletionSignal {
    inner: Arc<CompletionInner>,
}

impl CompletionSignal {
    /// Create an unresolved signal
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(CompletionInner {
                outcome: Mutex::new(None),
                resolved: Notify::new(),
            }),
        }
    }

    /// Resolve the signal with `outcome`
    ///
    /// Returns `true` if this call performed the resolution, `false` if the
    /// signal was already resolved (the new outcome is discarded).
    pub fn resolve(&self, outcome: RunOutcome) -> bool {
        {
            let mut slot = self.inner.outcome.lock();
            if slot.is_some() {
                return false;
            }
            *slot = Some(outcome);
        }
        self.inner.resolved.notify_waiters();
        true
    }

    /// Whether the signal has been resolved
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.inner.outcome.lock().is_some()
    }

    /// Current outcome, if resolved
    #[must_use]
    pub fn peek(&self) -> Option<RunOutcome> {
        self.inner.outcome.lock().clone()
    }

    /// Wait until the signal resolves and return the outcome
    pub async fn wait(&self) -> RunOutcome {
        loop {
            // Register for the wakeup before checking, so a resolve that
            // lands between the check and the await is not missed.
            let notified = self.inner.resolved.notified();
            if let Some(outcome) = self.peek() {
                return outcome;
            }
            notified.await;
        }
    }
}

impl Default for CompletionSignal {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug)]
struct CancelInner {
    triggered: AtomicBool,
    notify: Notify,
}

/// One-shot cancellation flag shared between a request and its canceller
///
/// Triggering is idempotent and wakes every task parked on [`cancelled`].
/// Observation is cooperative: request code checks the flag at its own
/// suspension points, there is no preemption.
///
/// [`cancelled`]: CancelSignal::cancelled
#[derive(Debug, Clone)]
pub struct CancelSignal {
    inner: Arc<CancelInner>,
}

impl CancelSignal {
    /// Create an untriggered signal
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(CancelInner {
                triggered: AtomicBool::new(false),
                notify: Notify::new(),
            }),
        }
    }

    /// Trigger the signal
    ///
    /// Returns `true` on the first call, `false` on repeats.
    pub fn trigger(&self) -> bool {
        let first = !self.inner.triggered.swap(true, Ordering::SeqCst);
        if first {
            self.inner.notify.notify_waiters();
        }
        first
    }

    /// Whether cancellation has been requested
    #[must_use]
    pub fn is_triggered(&self) -> bool {
        self.inner.triggered.load(Ordering::SeqCst)
    }

    /// Wait until the signal is triggered
    ///
    /// Completes immediately if cancellation was already requested. Intended
    /// for `tokio::select!` arms alongside queue waits and pacing delays.
    pub async fn cancelled(&self) {
        loop {
            let notified = self.inner.notify.notified();
            if self.is_triggered() {
                return;
            }
            notified.await;
        }
    }
}

impl Default for CancelSignal {
    fn default() -> Self {
        Self::new()
    }
}
