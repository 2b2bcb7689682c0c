//! Shared per-request lifecycle state
//!
//! `RequestCore` is the piece every concrete request kind composes: the id,
//! the mutex-guarded state cell, the completion signal and the optional
//! cancellation signal. All transition rules live in
//! [`set_status`](RequestCore::set_status); request kinds never touch the
//! state fields directly.

use parking_lot::Mutex;
use serde::Serialize;
use std::fmt;

use crate::run_log::RunLogHandle;
use crate::signal::{CancelSignal, CompletionSignal, RunOutcome};

use super::error::RequestError;
use super::state::RequestState;

/// Concrete request kinds the grid knows about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    /// Runs a step sequence against a pooled browser page
    TestRun,
    /// Cancels another in-flight request
    CancelRun,
}

impl RequestKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestKind::TestRun => "test_run",
            RequestKind::CancelRun => "cancel_run",
        }
    }
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time view of a request, for the operational listing
#[derive(Debug, Clone, Serialize)]
pub struct RequestSnapshot {
    pub id: String,
    pub kind: RequestKind,
    pub state: RequestState,
    pub message: String,
}

#[derive(Debug)]
struct StatusCell {
    state: RequestState,
    message: String,
    stack_trace: Option<String>,
}

/// Lifecycle state shared by every request kind
#[derive(Debug)]
pub struct RequestCore {
    id: String,
    kind: RequestKind,
    status: Mutex<StatusCell>,
    completion: CompletionSignal,
    cancel: Option<CancelSignal>,
    log: RunLogHandle,
}

impl RequestCore {
    /// Create a core in the `Received` state
    ///
    /// # Arguments
    /// * `id` - Unique request id, also the run-log folder name
    /// * `kind` - Concrete request kind
    /// * `cancel` - Cancellation signal; `None` makes the request
    ///   non-cancellable
    /// * `log` - The request's run-log handle
    #[must_use]
    pub fn new(
        id: String,
        kind: RequestKind,
        cancel: Option<CancelSignal>,
        log: RunLogHandle,
    ) -> Self {
        Self {
            id,
            kind,
            status: Mutex::new(StatusCell {
                state: RequestState::Received,
                message: RequestState::Received.to_string(),
                stack_trace: None,
            }),
            completion: CompletionSignal::new(),
            cancel,
            log,
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn kind(&self) -> RequestKind {
        self.kind
    }

    /// Current state, read under the status mutex
    #[must_use]
    pub fn state(&self) -> RequestState {
        self.status.lock().state
    }

    /// Last status text
    #[must_use]
    pub fn message(&self) -> String {
        self.status.lock().message.clone()
    }

    /// Captured failure trace, if the request failed
    #[must_use]
    pub fn stack_trace(&self) -> Option<String> {
        self.status.lock().stack_trace.clone()
    }

    #[must_use]
    pub fn completion(&self) -> &CompletionSignal {
        &self.completion
    }

    #[must_use]
    pub fn cancel_signal(&self) -> Option<&CancelSignal> {
        self.cancel.as_ref()
    }

    #[must_use]
    pub fn is_cancellable(&self) -> bool {
        self.cancel.is_some()
    }

    #[must_use]
    pub fn log_handle(&self) -> &RunLogHandle {
        &self.log
    }

    #[must_use]
    pub fn snapshot(&self) -> RequestSnapshot {
        let status = self.status.lock();
        RequestSnapshot {
            id: self.id.clone(),
            kind: self.kind,
            state: status.state,
            message: status.message.clone(),
        }
    }

    /// Fire the cancellation signal
    ///
    /// Idempotent; returns `true` the first time, `false` on repeats or for
    /// non-cancellable kinds.
    pub fn cancel(&self) -> bool {
        let Some(signal) = &self.cancel else {
            return false;
        };
        let first = signal.trigger();
        if first {
            log::info!("request {}: cancellation requested", self.id);
            self.log.append("cancellation requested");
        }
        first
    }

    /// Cooperative cancellation checkpoint
    ///
    /// Request code calls this at every suspension point; the error maps to
    /// the `Cancelled` terminal state in the drive template.
    pub fn check_cancelled(&self) -> Result<(), RequestError> {
        match &self.cancel {
            Some(signal) if signal.is_triggered() => Err(RequestError::Cancelled),
            _ => Ok(()),
        }
    }

    /// Transition the lifecycle state
    ///
    /// No-op once the completion signal is resolved, which makes terminal
    /// states absorbing. An `error` resolves the signal as failed no matter
    /// which `new_state` was passed; without an error, `Failure` resolves as
    /// failed with a synthesized message, `Cancelled` and `Rejected` resolve
    /// as cancelled, `Completed` resolves as success, and every other state
    /// is a progress update. Each transition appends a log line; `Rejected`
    /// flushes immediately because a rejected request has no later lifecycle
    /// hook to flush on.
    pub async fn set_status(
        &self,
        new_state: RequestState,
        message: Option<String>,
        error: Option<&RequestError>,
    ) {
        let needs_flush = {
            let mut status = self.status.lock();
            if self.completion.is_resolved() {
                return;
            }
            let mut text = match message {
                Some(m) if !m.is_empty() => m,
                _ => new_state.to_string(),
            };
            let outcome = if let Some(err) = error {
                text = format!("{text}: {err}");
                status.stack_trace = Some(err.trace());
                Some(RunOutcome::Failed(text.clone()))
            } else {
                match new_state {
                    RequestState::Failure => Some(RunOutcome::Failed(text.clone())),
                    RequestState::Cancelled | RequestState::Rejected => {
                        Some(RunOutcome::Cancelled)
                    }
                    RequestState::Completed => Some(RunOutcome::Completed),
                    _ => None,
                }
            };
            status.state = new_state;
            status.message = text.clone();
            let over_threshold = self.log.append(&format!("[{new_state}] {text}"));
            log::debug!("request {}: [{new_state}] {text}", self.id);
            if let Some(outcome) = outcome {
                self.completion.resolve(outcome);
            }
            over_threshold || new_state == RequestState::Rejected
        };
        if needs_flush {
            if let Err(e) = self.log.flush().await {
                log::warn!("request {}: log flush failed: {e:#}", self.id);
            }
        }
    }
}
