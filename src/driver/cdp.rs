//! chromiumoxide implementation of the driver traits
//!
//! Browsers are launched through [`launch`](super::launch); contexts are
//! created and disposed with raw CDP target-domain commands so each test run
//! gets cookie and storage isolation without a second process; pages are CDP
//! targets opened inside their context.

use anyhow::{Context as _, Result};
use chromiumoxide::Page;
use chromiumoxide::cdp::browser_protocol::browser::BrowserContextId;
use chromiumoxide::cdp::browser_protocol::target::{
    CreateBrowserContextParams, CreateTargetParams, DisposeBrowserContextParams,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;
use tracing::warn;

use crate::config::GridConfig;

use super::launch::{LaunchedBrowser, launch_browser};
use super::{BrowserDriver, BrowserHandle, BrowserKey, ContextHandle, PageHandle};

struct BrowserShared {
    /// `None` once the process has been closed; contexts hold this shared
    /// state so a child operation on a torn-down parent fails cleanly
    inner: Mutex<Option<LaunchedBrowser>>,
    closed: AtomicBool,
}

/// A live Chromium process
pub struct CdpBrowser {
    shared: Arc<BrowserShared>,
}

impl BrowserHandle for CdpBrowser {
    type Context = CdpContext;

    async fn new_context(&self) -> Result<CdpContext> {
        let guard = self.shared.inner.lock().await;
        let Some(launched) = guard.as_ref() else {
            anyhow::bail!("browser is already closed");
        };
        let response = launched
            .browser
            .execute(CreateBrowserContextParams::default())
            .await
            .context("creating browser context")?;
        let context_id = response.result.browser_context_id.clone();
        drop(guard);
        Ok(CdpContext {
            browser: Arc::clone(&self.shared),
            context_id,
            closed: AtomicBool::new(false),
        })
    }

    fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }

    async fn close(&self) -> Result<()> {
        self.shared.closed.store(true, Ordering::SeqCst);
        let Some(mut launched) = self.shared.inner.lock().await.take() else {
            return Ok(());
        };
        if let Err(e) = launched.browser.close().await {
            warn!("Failed to close browser cleanly: {e}");
        }
        // Wait for the process to exit before the profile dir is removed;
        // Windows cannot delete files the process still holds open.
        if let Err(e) = launched.browser.wait().await {
            warn!("Failed to wait for browser exit: {e}");
        }
        launched.handler_task.abort();
        drop(launched.profile_dir);
        Ok(())
    }
}

/// An isolated browser context inside one live process
pub struct CdpContext {
    browser: Arc<BrowserShared>,
    context_id: BrowserContextId,
    closed: AtomicBool,
}

impl ContextHandle for CdpContext {
    type Page = CdpPage;

    async fn new_page(&self) -> Result<CdpPage> {
        if self.is_closed() {
            anyhow::bail!("context is already closed");
        }
        let guard = self.browser.inner.lock().await;
        let Some(launched) = guard.as_ref() else {
            anyhow::bail!("parent browser is already closed");
        };
        let params = CreateTargetParams::builder()
            .url("about:blank")
            .browser_context_id(self.context_id.clone())
            .build()
            .map_err(|e| anyhow::anyhow!("building target params: {e}"))?;
        let page = launched
            .browser
            .new_page(params)
            .await
            .context("opening page in context")?;
        drop(guard);
        Ok(CdpPage {
            page,
            closed: AtomicBool::new(false),
        })
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst) || self.browser.closed.load(Ordering::SeqCst)
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        let guard = self.browser.inner.lock().await;
        let Some(launched) = guard.as_ref() else {
            // Parent already torn down; the context died with it.
            return Ok(());
        };
        launched
            .browser
            .execute(DisposeBrowserContextParams::new(self.context_id.clone()))
            .await
            .context("disposing browser context")?;
        Ok(())
    }
}

/// A live page (CDP target)
pub struct CdpPage {
    page: Page,
    closed: AtomicBool,
}

impl CdpPage {
    /// The underlying chromiumoxide page, for the engine's element ops
    #[must_use]
    pub fn page(&self) -> &Page {
        &self.page
    }
}

impl PageHandle for CdpPage {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        self.page.clone().close().await.context("closing page")?;
        Ok(())
    }
}

/// Driver that launches real Chromium processes
pub struct CdpDriver {
    config: GridConfig,
}

impl CdpDriver {
    #[must_use]
    pub fn new(config: &GridConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }
}

impl BrowserDriver for CdpDriver {
    type Browser = CdpBrowser;
    type Context = CdpContext;
    type Page = CdpPage;

    async fn launch(&self, key: &BrowserKey) -> Result<CdpBrowser> {
        let launched = launch_browser(&self.config, key).await?;
        Ok(CdpBrowser {
            shared: Arc::new(BrowserShared {
                inner: Mutex::new(Some(launched)),
                closed: AtomicBool::new(false),
            }),
        })
    }
}
