//! Client requests and their lifecycle
//!
//! A request is the unit of work the grid admits, tracks and resolves. Every
//! kind composes a [`RequestCore`] for its id, state machine, completion and
//! cancellation signals, and implements [`Request`] with its own validate and
//! execute phases; [`drive`] is the shared template that runs the phases,
//! classifies the outcome and guarantees a final log flush.

pub mod cancel;
pub mod core;
pub mod error;
pub mod state;
pub mod test_run;

pub use cancel::CancelRunRequest;
pub use core::{RequestCore, RequestKind, RequestSnapshot};
pub use error::RequestError;
pub use state::RequestState;
pub use test_run::{TestRunRequest, TestRunSpec};

use std::sync::Arc;

/// A concrete request kind
///
/// Implementations keep `validate` free of side effects beyond status
/// transitions and call
/// [`check_cancelled`](RequestCore::check_cancelled) at every suspension
/// point so cancellation stays prompt.
pub trait Request: Send + Sync + 'static {
    /// Shared lifecycle state
    fn core(&self) -> &Arc<RequestCore>;

    /// Pre-flight checks, run before any resource is acquired
    fn validate(&self) -> impl Future<Output = Result<(), RequestError>> + Send;

    /// The request's work
    fn execute(&self) -> impl Future<Output = Result<(), RequestError>> + Send;
}

/// Run a request's phases and resolve its completion signal
///
/// Validate first; execute only if validation passed and nothing resolved
/// the completion signal in between. A [`RequestError::Cancelled`] escaping
/// either phase lands in the `Cancelled` state, any other error in `Failure`,
/// success in `Completed`. The run log is flushed no matter which way the
/// request went.
pub(crate) async fn drive<R: Request>(request: &R) -> Result<(), RequestError> {
    let core = request.core();
    let result = run_phases(request).await;
    match &result {
        Ok(()) => {
            core.set_status(RequestState::Completed, None, None).await;
        }
        Err(RequestError::Cancelled) => {
            core.set_status(RequestState::Cancelled, None, None).await;
        }
        Err(err) => {
            core.set_status(RequestState::Failure, None, Some(err)).await;
        }
    }
    if let Err(e) = core.log_handle().flush().await {
        log::warn!("request {}: final log flush failed: {e:#}", core.id());
    }
    result
}

async fn run_phases<R: Request>(request: &R) -> Result<(), RequestError> {
    let core = request.core();
    core.set_status(RequestState::Validating, None, None).await;
    request.validate().await?;
    if core.completion().is_resolved() {
        return Ok(());
    }
    request.execute().await
}
