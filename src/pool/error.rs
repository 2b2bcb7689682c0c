//! Error types for the pool scheduler

use thiserror::Error;

/// Errors surfaced to a demand waiting on a pooled resource
#[derive(Debug, Clone, Error)]
pub enum PoolError {
    /// Creating the resource for this key failed; every demand queued at the
    /// time of failure receives this error (no automatic retry)
    #[error("resource creation for key {key} failed: {message}")]
    CreationFailed { key: String, message: String },

    /// The pool stopped admitting demand
    #[error("pool is shutting down")]
    ShuttingDown,

    /// The demand's hand-off channel was dropped without a verdict
    #[error("resource demand abandoned")]
    Abandoned,
}
