//! Context level of the pool hierarchy
//!
//! Unlike browsers, contexts are not shared: every demand gets its own
//! isolated context, identified by an ordinal key the parent browser hands
//! out. The per-browser capacity still bounds how many are live at once,
//! with excess demand queued by the same scheduler machinery.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::driver::{BrowserDriver, BrowserHandle, ContextHandle};

use super::error::PoolError;
use super::page::{PageFactory, PageGuard, PageKey};
use super::scheduler::{KeyedPool, PoolGuard, PoolResource, ResourceFactory};

/// Ordinal identity of a context within its browser
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextKey(u64);

impl ContextKey {
    #[must_use]
    pub fn new(ordinal: u64) -> Self {
        Self(ordinal)
    }
}

impl fmt::Display for ContextKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ctx-{}", self.0)
    }
}

/// A live context plus its child page pool
pub struct PooledContext<D: BrowserDriver> {
    context: Arc<D::Context>,
    pages: KeyedPool<PageFactory<D>>,
    next_tab: AtomicU64,
}

impl<D: BrowserDriver> PooledContext<D> {
    /// Native context handle
    #[must_use]
    pub fn handle(&self) -> &D::Context {
        &self.context
    }

    /// Claim the context's main page, opening it on first use
    ///
    /// Repeat claims attach to the same live page.
    pub async fn lease_main_page(&self) -> Result<PageGuard<D>, PoolError> {
        self.pages.acquire(PageKey::MAIN).await
    }

    /// Open an auxiliary tab
    pub async fn lease_tab(&self) -> Result<PageGuard<D>, PoolError> {
        let key = PageKey::tab(self.next_tab.fetch_add(1, Ordering::SeqCst));
        self.pages.acquire(key).await
    }

    /// Child pool, exposed for instrumentation
    #[must_use]
    pub fn page_pool(&self) -> &KeyedPool<PageFactory<D>> {
        &self.pages
    }
}

impl<D: BrowserDriver> PoolResource for PooledContext<D> {
    fn close(&self) -> impl Future<Output = anyhow::Result<()>> + Send {
        async move {
            self.pages.shutdown().await;
            self.context.close().await
        }
    }
}

/// Opens contexts inside one live browser
///
/// Captures the parent's native handle at pool-construction time, which is
/// exactly when the browser went live.
pub struct ContextFactory<D: BrowserDriver> {
    browser: Arc<D::Browser>,
    pages_per_context: usize,
}

impl<D: BrowserDriver> ContextFactory<D> {
    #[must_use]
    pub fn new(browser: Arc<D::Browser>, pages_per_context: usize) -> Self {
        Self {
            browser,
            pages_per_context,
        }
    }
}

impl<D: BrowserDriver> ResourceFactory for ContextFactory<D> {
    type Key = ContextKey;
    type Resource = PooledContext<D>;

    fn create(
        &self,
        _key: &Self::Key,
    ) -> impl Future<Output = anyhow::Result<Self::Resource>> + Send {
        let browser = Arc::clone(&self.browser);
        let pages_per_context = self.pages_per_context;
        async move {
            let context = Arc::new(browser.new_context().await?);
            let pages = KeyedPool::new(
                "page",
                pages_per_context,
                PageFactory::new(Arc::clone(&context)),
            );
            Ok(PooledContext {
                context,
                pages,
                next_tab: AtomicU64::new(0),
            })
        }
    }
}

/// Claim on a live context
pub type ContextGuard<D> = PoolGuard<ContextFactory<D>>;
