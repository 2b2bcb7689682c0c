//! Admission-controlled scheduler for browser test runs over pooled
//! Chromium instances.
//!
//! The grid multiplexes many concurrent test runs over a bounded hierarchy
//! of expensive resources: browser processes, browser contexts and pages.
//! Each level is a capacity-limited keyed pool that queues excess demand and
//! tears resources down safely under concurrency; every run is wrapped in a
//! request lifecycle with cooperative cancellation and an exactly-once
//! completion signal.
//!
//! ```no_run
//! use kodegen_tools_testgrid::{
//!     BrowserKey, BrowserKind, GridConfig, RequestHandler, TestRunSpec, TestStep,
//! };
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let config = GridConfig::builder().log_root("/var/log/testgrid").build()?;
//! let handler = RequestHandler::with_chromium(config);
//!
//! let run = handler.test_run(TestRunSpec {
//!     browser: BrowserKey::new(BrowserKind::Chromium, "stable"),
//!     steps: vec![TestStep::Navigate {
//!         url: "https://example.com".to_string(),
//!     }],
//! });
//! handler.process(run).await?;
//! handler.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod driver;
pub mod engine;
pub mod handler;
pub mod pool;
pub mod request;
pub mod run_log;
pub mod signal;

pub use config::{GridConfig, GridConfigBuilder};
pub use driver::{
    BrowserDriver, BrowserHandle, BrowserKey, BrowserKind, ContextHandle, PageHandle,
};
pub use engine::{TestEngine, TestStep};
pub use handler::{RequestHandler, RequestRegistry};
pub use pool::{BrowserPool, KeyedPool, PoolError, PoolGuard, ResourceFactory};
pub use request::{
    CancelRunRequest, Request, RequestCore, RequestError, RequestKind, RequestSnapshot,
    RequestState, TestRunRequest, TestRunSpec,
};
pub use run_log::{RunLogHandle, RunLogStore};
pub use signal::{CancelSignal, CompletionSignal, RunOutcome};
