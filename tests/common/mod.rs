//! Shared fakes for integration tests
//!
//! An instrumented in-memory driver and engine so the scheduler's
//! concurrency properties can be exercised without a real browser.

#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use kodegen_tools_testgrid::driver::{
    BrowserDriver, BrowserHandle, BrowserKey, BrowserKind, ContextHandle, PageHandle,
};
use kodegen_tools_testgrid::engine::{TestEngine, TestStep};
use kodegen_tools_testgrid::request::RequestError;
use kodegen_tools_testgrid::run_log::RunLogHandle;
use kodegen_tools_testgrid::signal::CancelSignal;
use kodegen_tools_testgrid::{GridConfig, RequestHandler};

/// Counters shared between a fake driver and the assertions
#[derive(Debug, Default)]
pub struct DriverCounters {
    pub launches: AtomicUsize,
    pub live_browsers: AtomicUsize,
    pub max_live_browsers: AtomicUsize,
    pub contexts_opened: AtomicUsize,
    pub pages_opened: AtomicUsize,
    /// Demands that observed an already-closed handle; must stay zero
    pub closed_observations: AtomicUsize,
}

impl DriverCounters {
    fn browser_up(&self) {
        self.launches.fetch_add(1, Ordering::SeqCst);
        let live = self.live_browsers.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_live_browsers.fetch_max(live, Ordering::SeqCst);
    }

    fn browser_down(&self) {
        self.live_browsers.fetch_sub(1, Ordering::SeqCst);
    }
}

/// In-memory driver with configurable launch latency and failure injection
pub struct FakeDriver {
    pub counters: Arc<DriverCounters>,
    pub launch_delay: Duration,
    pub fail_launches: AtomicBool,
}

impl FakeDriver {
    pub fn new(counters: Arc<DriverCounters>) -> Self {
        Self {
            counters,
            launch_delay: Duration::from_millis(20),
            fail_launches: AtomicBool::new(false),
        }
    }
}

pub struct FakeBrowser {
    pub ordinal: usize,
    closed: AtomicBool,
    counters: Arc<DriverCounters>,
}

pub struct FakeContext {
    closed: AtomicBool,
    counters: Arc<DriverCounters>,
}

pub struct FakePage {
    closed: AtomicBool,
    counters: Arc<DriverCounters>,
}

impl FakePage {
    pub fn note_if_closed(&self) -> bool {
        if self.closed.load(Ordering::SeqCst) {
            self.counters.closed_observations.fetch_add(1, Ordering::SeqCst);
            return true;
        }
        false
    }
}

impl BrowserDriver for FakeDriver {
    type Browser = FakeBrowser;
    type Context = FakeContext;
    type Page = FakePage;

    async fn launch(&self, key: &BrowserKey) -> anyhow::Result<FakeBrowser> {
        tokio::time::sleep(self.launch_delay).await;
        if self.fail_launches.load(Ordering::SeqCst) {
            anyhow::bail!("injected launch failure for {key}");
        }
        let ordinal = self.counters.launches.load(Ordering::SeqCst);
        self.counters.browser_up();
        Ok(FakeBrowser {
            ordinal,
            closed: AtomicBool::new(false),
            counters: Arc::clone(&self.counters),
        })
    }
}

impl BrowserHandle for FakeBrowser {
    type Context = FakeContext;

    async fn new_context(&self) -> anyhow::Result<FakeContext> {
        if self.is_closed() {
            self.counters.closed_observations.fetch_add(1, Ordering::SeqCst);
            anyhow::bail!("context requested on a closed browser");
        }
        self.counters.contexts_opened.fetch_add(1, Ordering::SeqCst);
        Ok(FakeContext {
            closed: AtomicBool::new(false),
            counters: Arc::clone(&self.counters),
        })
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    async fn close(&self) -> anyhow::Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        self.counters.browser_down();
        Ok(())
    }
}

impl ContextHandle for FakeContext {
    type Page = FakePage;

    async fn new_page(&self) -> anyhow::Result<FakePage> {
        if self.is_closed() {
            self.counters.closed_observations.fetch_add(1, Ordering::SeqCst);
            anyhow::bail!("page requested on a closed context");
        }
        self.counters.pages_opened.fetch_add(1, Ordering::SeqCst);
        Ok(FakePage {
            closed: AtomicBool::new(false),
            counters: Arc::clone(&self.counters),
        })
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    async fn close(&self) -> anyhow::Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

impl PageHandle for FakePage {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    async fn close(&self) -> anyhow::Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Engine that sleeps per step instead of driving a browser
///
/// With `ignore_cancel` set it never observes the cancellation signal, which
/// lets tests force the "target completed before cancellation was processed"
/// race deterministically.
pub struct FakeEngine {
    pub step_delay: Duration,
    pub ignore_cancel: bool,
}

impl FakeEngine {
    pub fn instant() -> Self {
        Self {
            step_delay: Duration::ZERO,
            ignore_cancel: false,
        }
    }

    pub fn slow(step_delay: Duration) -> Self {
        Self {
            step_delay,
            ignore_cancel: false,
        }
    }
}

impl TestEngine<FakePage> for FakeEngine {
    async fn run(
        &self,
        page: &FakePage,
        steps: &[TestStep],
        log: &RunLogHandle,
        cancel: &CancelSignal,
    ) -> Result<(), RequestError> {
        for (idx, step) in steps.iter().enumerate() {
            if !self.ignore_cancel && cancel.is_triggered() {
                return Err(RequestError::Cancelled);
            }
            if page.note_if_closed() {
                return Err(RequestError::Processing(anyhow::anyhow!(
                    "step ran against a closed page"
                )));
            }
            log.append(&format!("step {}: {}", idx + 1, step.describe()));
            if self.ignore_cancel {
                tokio::time::sleep(self.step_delay).await;
            } else {
                tokio::select! {
                    () = cancel.cancelled() => return Err(RequestError::Cancelled),
                    () = tokio::time::sleep(self.step_delay) => {}
                }
            }
        }
        Ok(())
    }
}

/// The fake-backed handler type every integration test drives
pub type FakeGrid = RequestHandler<FakeDriver, FakeEngine>;

/// Install the test logger; later calls are no-ops
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Build a handler over the fakes
pub fn grid(
    config: GridConfig,
    counters: Arc<DriverCounters>,
    engine: FakeEngine,
) -> Arc<FakeGrid> {
    init_logging();
    RequestHandler::new(
        config,
        Arc::new(FakeDriver::new(counters)),
        Arc::new(engine),
    )
}

/// Config with fast pacing rooted at `log_root`
pub fn test_config(log_root: &Path) -> GridConfig {
    GridConfig::builder()
        .log_root(log_root)
        .step_pacing_ms(0)
        .build()
        .expect("test config should validate")
}

/// A one-step spec against the default chrome key
pub fn simple_spec() -> kodegen_tools_testgrid::TestRunSpec {
    kodegen_tools_testgrid::TestRunSpec {
        browser: BrowserKey::new(BrowserKind::Chrome, "120"),
        steps: vec![TestStep::Navigate {
            url: "https://example.test/login".to_string(),
        }],
    }
}

/// Poll until `check` passes or the deadline expires
pub async fn wait_until(what: &str, timeout: Duration, check: impl Fn() -> bool) {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if check() {
            return;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for {what}"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
