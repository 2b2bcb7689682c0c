//! Test-run request
//!
//! Acquires one browser from the pool hierarchy, walks down to a live page
//! and hands the step sequence to the test engine. Every wait on pool
//! capacity races against the run's cancellation signal, so a queued run
//! unblocks the moment it is cancelled instead of waiting for a resource.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::driver::{BrowserDriver, BrowserKey};
use crate::engine::{TestEngine, TestStep};
use crate::pool::BrowserPool;
use crate::run_log::RunLogStore;
use crate::signal::CancelSignal;

use super::core::{RequestCore, RequestKind};
use super::error::RequestError;
use super::state::RequestState;
use super::Request;

/// What a test run should do, as posted by the caller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestRunSpec {
    /// Browser the run wants; runs with equal keys share a live process
    pub browser: BrowserKey,
    /// Steps to drive against the page, in order
    pub steps: Vec<TestStep>,
}

/// Cancellable request that runs a step sequence on a pooled page
pub struct TestRunRequest<D: BrowserDriver, E: TestEngine<D::Page>> {
    core: Arc<RequestCore>,
    cancel: CancelSignal,
    spec: TestRunSpec,
    browsers: BrowserPool<D>,
    engine: Arc<E>,
}

impl<D: BrowserDriver, E: TestEngine<D::Page>> TestRunRequest<D, E> {
    /// Build a request with a fresh id and its own run-log folder
    #[must_use]
    pub fn new(
        spec: TestRunSpec,
        browsers: BrowserPool<D>,
        engine: Arc<E>,
        logs: &RunLogStore,
    ) -> Self {
        let id = Uuid::new_v4().to_string();
        let log = logs.create(&id);
        let cancel = CancelSignal::new();
        let core = Arc::new(RequestCore::new(
            id,
            RequestKind::TestRun,
            Some(cancel.clone()),
            log,
        ));
        Self {
            core,
            cancel,
            spec,
            browsers,
            engine,
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        self.core.id()
    }

    #[must_use]
    pub fn spec(&self) -> &TestRunSpec {
        &self.spec
    }
}

impl<D: BrowserDriver, E: TestEngine<D::Page>> Request for TestRunRequest<D, E> {
    fn core(&self) -> &Arc<RequestCore> {
        &self.core
    }

    async fn validate(&self) -> Result<(), RequestError> {
        self.core.check_cancelled()?;
        if self.spec.browser.version.trim().is_empty() {
            return Err(RequestError::Validation(
                "browser version must not be empty".to_string(),
            ));
        }
        if self.spec.steps.is_empty() {
            return Err(RequestError::Validation(
                "test run has no steps".to_string(),
            ));
        }
        for (idx, step) in self.spec.steps.iter().enumerate() {
            step.validate()
                .map_err(|msg| RequestError::Validation(format!("step {}: {msg}", idx + 1)))?;
        }
        self.core.check_cancelled()?;
        Ok(())
    }

    async fn execute(&self) -> Result<(), RequestError> {
        let key = self.spec.browser.clone();
        self.core
            .set_status(
                RequestState::Queued,
                Some(format!("waiting for browser {key}")),
                None,
            )
            .await;
        let browser = tokio::select! {
            () = self.cancel.cancelled() => return Err(RequestError::Cancelled),
            acquired = self.browsers.acquire(key.clone()) => acquired?,
        };

        self.core
            .set_status(
                RequestState::Processing,
                Some(format!("browser {key} live, opening context")),
                None,
            )
            .await;
        let context = tokio::select! {
            () = self.cancel.cancelled() => return Err(RequestError::Cancelled),
            leased = browser.resource().lease_context() => leased?,
        };
        let page = tokio::select! {
            () = self.cancel.cancelled() => return Err(RequestError::Cancelled),
            leased = context.resource().lease_main_page() => leased?,
        };
        self.core.check_cancelled()?;

        self.core
            .set_status(
                RequestState::Processing,
                Some(format!("page ready, running {} step(s)", self.spec.steps.len())),
                None,
            )
            .await;
        let run = self
            .engine
            .run(
                page.resource().handle(),
                &self.spec.steps,
                self.core.log_handle(),
                &self.cancel,
            )
            .await;

        // Bottom-up release regardless of the run's outcome, so capacity
        // frees deterministically and queued keys can advance.
        page.release().await;
        context.release().await;
        browser.release().await;
        run
    }
}
