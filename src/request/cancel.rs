//! Cancellation request
//!
//! Looks up a target request in the handler's registry, fires its
//! cancellation signal and waits for the target's completion signal to
//! resolve. Cancellation is a best-effort race: if the target completed or
//! failed first, this request fails with a descriptive "too late" error so
//! the caller knows which outcome won. Cancellation requests are themselves
//! non-cancellable.

use std::sync::{Arc, OnceLock};
use uuid::Uuid;

use crate::handler::RequestRegistry;
use crate::run_log::RunLogStore;
use crate::signal::RunOutcome;

use super::core::{RequestCore, RequestKind};
use super::error::RequestError;
use super::state::RequestState;
use super::Request;

/// Non-cancellable request that cancels another in-flight request
pub struct CancelRunRequest {
    core: Arc<RequestCore>,
    target_id: String,
    registry: Arc<RequestRegistry>,
    /// Resolved during validation so execution works against the same entry
    /// even if the registry changes in between
    target: OnceLock<Arc<RequestCore>>,
}

impl CancelRunRequest {
    /// Build a request with a fresh id and its own run-log folder
    #[must_use]
    pub fn new(
        target_id: impl Into<String>,
        registry: Arc<RequestRegistry>,
        logs: &RunLogStore,
    ) -> Self {
        let id = Uuid::new_v4().to_string();
        let log = logs.create(&id);
        let core = Arc::new(RequestCore::new(id, RequestKind::CancelRun, None, log));
        Self {
            core,
            target_id: target_id.into(),
            registry,
            target: OnceLock::new(),
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        self.core.id()
    }

    #[must_use]
    pub fn target_id(&self) -> &str {
        &self.target_id
    }
}

impl Request for CancelRunRequest {
    fn core(&self) -> &Arc<RequestCore> {
        &self.core
    }

    async fn validate(&self) -> Result<(), RequestError> {
        let target = self
            .registry
            .get(&self.target_id)
            .ok_or_else(|| RequestError::NotFound(self.target_id.clone()))?;
        if !target.is_cancellable() {
            return Err(RequestError::Validation(format!(
                "request {} is a {} and cannot be cancelled",
                target.id(),
                target.kind()
            )));
        }
        let _ = self.target.set(target);
        Ok(())
    }

    async fn execute(&self) -> Result<(), RequestError> {
        let Some(target) = self.target.get() else {
            return Err(RequestError::Processing(anyhow::anyhow!(
                "cancellation executed without a validated target"
            )));
        };
        target.cancel();
        if target.state() == RequestState::Queued {
            // The trigger above already woke the target's queue wait; the
            // branch exists so the interruption is visible in this log.
            log::info!(
                "request {}: target {} was queued, its queue wait was interrupted",
                self.core.id(),
                target.id()
            );
        }
        self.core
            .set_status(
                RequestState::Processing,
                Some(format!("waiting for {} to resolve", target.id())),
                None,
            )
            .await;
        match target.completion().wait().await {
            RunOutcome::Cancelled => Ok(()),
            RunOutcome::Completed => Err(RequestError::Processing(anyhow::anyhow!(
                "request {} completed before the cancellation was processed",
                target.id()
            ))),
            RunOutcome::Failed(msg) => Err(RequestError::Processing(anyhow::anyhow!(
                "request {} failed before the cancellation was processed: {msg}",
                target.id()
            ))),
        }
    }
}
