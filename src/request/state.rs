//! Request lifecycle states

use serde::{Deserialize, Serialize};
use std::fmt;

/// States a request moves through between submission and resolution
///
/// Terminal states are absorbing: once the request's completion signal has
/// resolved, further transitions are no-ops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestState {
    /// Accepted for processing, nothing has run yet
    Received,
    /// Turned away at the admission gate (capacity or shutdown)
    Rejected,
    /// Parked waiting for a pooled resource
    Queued,
    /// Pre-flight checks in progress
    Validating,
    /// The request's work is running
    Processing,
    /// The work raised an error
    Failure,
    /// The work finished
    Completed,
    /// Cancellation was observed at a checkpoint
    Cancelled,
}

impl RequestState {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestState::Received => "received",
            RequestState::Rejected => "rejected",
            RequestState::Queued => "queued",
            RequestState::Validating => "validating",
            RequestState::Processing => "processing",
            RequestState::Failure => "failure",
            RequestState::Completed => "completed",
            RequestState::Cancelled => "cancelled",
        }
    }

    /// Whether this state ends the lifecycle
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RequestState::Rejected
                | RequestState::Failure
                | RequestState::Completed
                | RequestState::Cancelled
        )
    }
}

impl fmt::Display for RequestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
