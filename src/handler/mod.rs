//! Admission control and request processing
//!
//! The handler owns the process-wide admission gate (one counting semaphore
//! plus a shutdown flag), the registry of in-flight requests and the browser
//! pool hierarchy. Every request goes through [`process`]: acquire a slot
//! within the configured timeout or be rejected, run the request's lifecycle
//! to a terminal state, then release the slot and retire the run log.
//!
//! [`process`]: RequestHandler::process

pub mod registry;

pub use registry::RequestRegistry;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Semaphore;

use crate::config::GridConfig;
use crate::driver::{BrowserDriver, cdp::CdpDriver};
use crate::engine::{TestEngine, cdp::CdpEngine};
use crate::pool::BrowserPool;
use crate::request::{
    CancelRunRequest, Request, RequestCore, RequestError, RequestKind, RequestSnapshot,
    RequestState, TestRunRequest, TestRunSpec, drive,
};
use crate::run_log::RunLogStore;

/// Entry point of the grid: admits, tracks and runs requests
pub struct RequestHandler<D: BrowserDriver, E: TestEngine<D::Page>> {
    config: GridConfig,
    gate: Arc<Semaphore>,
    shutdown: AtomicBool,
    registry: Arc<RequestRegistry>,
    browsers: BrowserPool<D>,
    engine: Arc<E>,
    logs: Arc<RunLogStore>,
}

impl<D: BrowserDriver, E: TestEngine<D::Page>> RequestHandler<D, E> {
    /// Build a handler from its collaborators
    ///
    /// Nothing is launched here; browsers come up lazily on first demand.
    #[must_use]
    pub fn new(config: GridConfig, driver: Arc<D>, engine: Arc<E>) -> Arc<Self> {
        let logs = Arc::new(RunLogStore::new(
            config.log_root().to_path_buf(),
            config.log_flush_threshold_bytes(),
        ));
        let browsers = BrowserPool::new(driver, &config);
        Arc::new(Self {
            gate: Arc::new(Semaphore::new(config.admission_capacity())),
            shutdown: AtomicBool::new(false),
            registry: Arc::new(RequestRegistry::new()),
            browsers,
            engine,
            logs,
            config,
        })
    }

    /// Build a test-run request bound to this handler's pools and engine
    #[must_use]
    pub fn test_run(&self, spec: TestRunSpec) -> TestRunRequest<D, E> {
        TestRunRequest::new(
            spec,
            self.browsers.clone(),
            Arc::clone(&self.engine),
            &self.logs,
        )
    }

    /// Build a cancellation request targeting `target_id`
    #[must_use]
    pub fn cancel_run(&self, target_id: impl Into<String>) -> CancelRunRequest {
        CancelRunRequest::new(target_id, Arc::clone(&self.registry), &self.logs)
    }

    /// Admit and run a request to its terminal state
    ///
    /// Waits up to the configured admission timeout for a slot; a timeout or
    /// an in-progress shutdown resolves the request as `Rejected`, which is
    /// "system too busy", not a defect. Any other outcome comes from the
    /// request's own lifecycle. The registry entry exists exactly for the
    /// duration of this call past admission.
    pub async fn process<R: Request>(&self, request: R) -> Result<(), RequestError> {
        let core = Arc::clone(request.core());
        if self.shutdown.load(Ordering::SeqCst) {
            return self.reject(&core, "shutting down, not admitting requests").await;
        }

        let acquired = tokio::time::timeout(
            self.config.admission_timeout(),
            Arc::clone(&self.gate).acquire_owned(),
        )
        .await;
        let permit = match acquired {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) => {
                return self.reject(&core, "admission gate closed").await;
            }
            Err(_) => {
                let reason = format!(
                    "no admission slot within {:?} ({} in flight)",
                    self.config.admission_timeout(),
                    self.config.admission_capacity()
                );
                return self.reject(&core, &reason).await;
            }
        };

        self.registry.insert(Arc::clone(&core));
        // Slot acquisition and registration are not atomic; re-checking here
        // closes the window where a shutdown starts between the two.
        if self.shutdown.load(Ordering::SeqCst) {
            self.registry.remove(core.id());
            drop(permit);
            return self.reject(&core, "shutting down, not admitting requests").await;
        }

        core.set_status(RequestState::Received, Some("admitted".to_string()), None)
            .await;
        let result = drive(&request).await;

        self.registry.remove(core.id());
        let final_line = format!("final state: {}", core.state());
        if let Err(e) = self.logs.flush_and_remove(core.id(), &final_line).await {
            log::warn!("request {}: retiring run log failed: {e:#}", core.id());
        }
        drop(permit);
        result
    }

    async fn reject(&self, core: &RequestCore, reason: &str) -> Result<(), RequestError> {
        core.set_status(RequestState::Rejected, Some(reason.to_string()), None)
            .await;
        if let Err(e) = self
            .logs
            .flush_and_remove(core.id(), "final state: rejected")
            .await
        {
            log::warn!("request {}: retiring run log failed: {e:#}", core.id());
        }
        Err(RequestError::Rejected(reason.to_string()))
    }

    /// Look up a live request
    pub fn get(&self, id: &str) -> Result<Arc<RequestCore>, RequestError> {
        self.registry
            .get(id)
            .ok_or_else(|| RequestError::NotFound(id.to_string()))
    }

    /// Snapshot live requests, optionally filtered by kind
    #[must_use]
    pub fn list(&self, kind: Option<RequestKind>) -> Vec<RequestSnapshot> {
        self.registry.list(kind)
    }

    /// Number of requests currently between admission and completion
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.registry.len()
    }

    /// Browser pool, exposed for instrumentation
    #[must_use]
    pub fn browser_pool(&self) -> &BrowserPool<D> {
        &self.browsers
    }

    /// Run-log store backing every request of this handler
    #[must_use]
    pub fn log_store(&self) -> &Arc<RunLogStore> {
        &self.logs
    }

    /// Whether shutdown has been signalled
    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// Stop admitting work, cancel in-flight requests and drain
    ///
    /// Order: flip the admission flag, fire every live cancellable request's
    /// cancellation signal, then wait for the gate to return to full
    /// capacity, which the runtime wakes precisely when the last in-flight
    /// request releases its slot. Pools and logs are torn down after the
    /// drain. Idempotent; later calls return once the first finishes its
    /// sweep.
    pub async fn shutdown(&self) {
        if self.shutdown.swap(true, Ordering::SeqCst) {
            return;
        }
        log::info!("handler: shutting down, cancelling in-flight requests");
        for core in self.registry.cancellable() {
            core.cancel();
        }
        let capacity = u32::try_from(self.config.admission_capacity()).unwrap_or(u32::MAX);
        match self.gate.acquire_many(capacity).await {
            Ok(all) => drop(all),
            Err(_) => log::warn!("handler: admission gate closed during drain"),
        }
        self.browsers.shutdown().await;
        self.logs.flush_all().await;
        log::info!("handler: drained");
    }
}

impl RequestHandler<CdpDriver, CdpEngine> {
    /// Production wiring: chromiumoxide driver and engine from one config
    #[must_use]
    pub fn with_chromium(config: GridConfig) -> Arc<Self> {
        let driver = Arc::new(CdpDriver::new(&config));
        let engine = Arc::new(CdpEngine::new(&config));
        Self::new(config, driver, engine)
    }
}
