//! Request error taxonomy
//!
//! Callers distinguish "system too busy" (`Rejected`), "request malformed"
//! (`Validation`), "asked to stop" (`Cancelled`) and "request broke"
//! (`Processing`); the handler and pools never collapse these into one bucket.

use thiserror::Error;

use crate::pool::PoolError;

/// Errors a request can resolve with
#[derive(Debug, Error)]
pub enum RequestError {
    /// Admission gate exhausted or shutdown in progress; retry later
    #[error("request rejected: {0}")]
    Rejected(String),

    /// The request itself is malformed; retrying the same payload will fail
    /// again
    #[error("validation failed: {0}")]
    Validation(String),

    /// Cooperative cancellation observed at a checkpoint
    #[error("operation cancelled")]
    Cancelled,

    /// Registry lookup miss
    #[error("request {0} not found")]
    NotFound(String),

    /// Everything else that breaks during execution, including resource
    /// creation failures
    #[error(transparent)]
    Processing(#[from] anyhow::Error),
}

impl RequestError {
    /// Whether this is the cancellation outcome
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, RequestError::Cancelled)
    }

    /// Formatted cause chain, captured as the failure's stack trace
    #[must_use]
    pub fn trace(&self) -> String {
        format!("{self:?}")
    }
}

impl From<PoolError> for RequestError {
    fn from(e: PoolError) -> Self {
        match e {
            PoolError::ShuttingDown => {
                RequestError::Rejected("resource pools are shutting down".to_string())
            }
            other => RequestError::Processing(anyhow::Error::new(other)),
        }
    }
}
