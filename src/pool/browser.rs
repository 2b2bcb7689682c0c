//! Browser level of the pool hierarchy
//!
//! Browsers are keyed by `(kind, version)` and shared: concurrent runs that
//! ask for the same key ride the same live process. Each live browser owns
//! the context pool for its children.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::config::GridConfig;
use crate::driver::{BrowserDriver, BrowserHandle, BrowserKey};

use super::context::{ContextFactory, ContextGuard, ContextKey};
use super::error::PoolError;
use super::scheduler::{KeyedPool, PoolGuard, PoolResource, ResourceFactory};

/// A live browser process plus its child context pool
pub struct PooledBrowser<D: BrowserDriver> {
    key: BrowserKey,
    browser: Arc<D::Browser>,
    contexts: KeyedPool<ContextFactory<D>>,
    next_context: AtomicU64,
}

impl<D: BrowserDriver> PooledBrowser<D> {
    /// Native browser handle
    #[must_use]
    pub fn handle(&self) -> &D::Browser {
        &self.browser
    }

    /// Key this browser was launched for
    #[must_use]
    pub fn key(&self) -> &BrowserKey {
        &self.key
    }

    /// Claim a fresh context in this browser
    ///
    /// Every call gets its own context; the per-browser context capacity
    /// queues excess demand.
    pub async fn lease_context(&self) -> Result<ContextGuard<D>, PoolError> {
        let key = ContextKey::new(self.next_context.fetch_add(1, Ordering::SeqCst));
        self.contexts.acquire(key).await
    }

    /// Child pool, exposed for instrumentation
    #[must_use]
    pub fn context_pool(&self) -> &KeyedPool<ContextFactory<D>> {
        &self.contexts
    }
}

impl<D: BrowserDriver> PoolResource for PooledBrowser<D> {
    fn close(&self) -> impl Future<Output = anyhow::Result<()>> + Send {
        async move {
            // Children first, so no context outlives its parent process.
            self.contexts.shutdown().await;
            self.browser.close().await
        }
    }
}

/// Launches pooled browsers through the injected driver
pub struct BrowserFactory<D: BrowserDriver> {
    driver: Arc<D>,
    contexts_per_browser: usize,
    pages_per_context: usize,
}

impl<D: BrowserDriver> ResourceFactory for BrowserFactory<D> {
    type Key = BrowserKey;
    type Resource = PooledBrowser<D>;

    fn create(
        &self,
        key: &Self::Key,
    ) -> impl Future<Output = anyhow::Result<Self::Resource>> + Send {
        let driver = Arc::clone(&self.driver);
        let key = key.clone();
        let contexts_per_browser = self.contexts_per_browser;
        let pages_per_context = self.pages_per_context;
        async move {
            let browser = Arc::new(driver.launch(&key).await?);
            let contexts = KeyedPool::new(
                "context",
                contexts_per_browser,
                ContextFactory::new(Arc::clone(&browser), pages_per_context),
            );
            Ok(PooledBrowser {
                key,
                browser,
                contexts,
                next_context: AtomicU64::new(0),
            })
        }
    }
}

/// Claim on a live browser
pub type BrowserGuard<D> = PoolGuard<BrowserFactory<D>>;

/// Top level of the resource hierarchy
///
/// Bounded by `browser_capacity` live processes across all keys.
pub struct BrowserPool<D: BrowserDriver> {
    pool: KeyedPool<BrowserFactory<D>>,
}

impl<D: BrowserDriver> Clone for BrowserPool<D> {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
        }
    }
}

impl<D: BrowserDriver> BrowserPool<D> {
    /// Build the pool from configuration
    #[must_use]
    pub fn new(driver: Arc<D>, config: &GridConfig) -> Self {
        let factory = BrowserFactory {
            driver,
            contexts_per_browser: config.contexts_per_browser(),
            pages_per_context: config.pages_per_context(),
        };
        Self {
            pool: KeyedPool::new("browser", config.browser_capacity(), factory),
        }
    }

    /// Claim the browser for `key`, launching one if none is live
    pub async fn acquire(&self, key: BrowserKey) -> Result<BrowserGuard<D>, PoolError> {
        self.pool.acquire(key).await
    }

    /// Stop admitting demand and close idle browsers
    pub async fn shutdown(&self) {
        self.pool.shutdown().await;
    }

    /// Live browser processes right now
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.pool.live_count()
    }

    /// Launches waiting for a capacity permit
    #[must_use]
    pub fn queued_count(&self) -> usize {
        self.pool.queued_count()
    }

    /// Total launch attempts
    #[must_use]
    pub fn created_total(&self) -> usize {
        self.pool.created_total()
    }

    /// Total browsers closed
    #[must_use]
    pub fn closed_total(&self) -> usize {
        self.pool.closed_total()
    }
}
