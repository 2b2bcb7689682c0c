//! Page level of the pool hierarchy
//!
//! Each context effectively runs one main page plus a bounded number of
//! auxiliary tabs. The main page is a stable key so repeated claims attach
//! to the same live page; tabs get fresh ordinals.

use std::fmt;
use std::sync::Arc;

use crate::driver::{BrowserDriver, ContextHandle, PageHandle};

use super::scheduler::{KeyedPool, PoolGuard, PoolResource, ResourceFactory};

/// Identity of a page within its context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PageKey(u64);

impl PageKey {
    /// The context's main page
    pub const MAIN: PageKey = PageKey(0);

    /// An auxiliary tab; ordinals start at zero and never collide with
    /// [`MAIN`](PageKey::MAIN)
    #[must_use]
    pub fn tab(ordinal: u64) -> Self {
        Self(ordinal + 1)
    }
}

impl fmt::Display for PageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 == 0 {
            f.write_str("page-main")
        } else {
            write!(f, "page-tab-{}", self.0 - 1)
        }
    }
}

/// A live page
pub struct PooledPage<D: BrowserDriver> {
    page: D::Page,
}

impl<D: BrowserDriver> PooledPage<D> {
    /// Native page handle
    #[must_use]
    pub fn handle(&self) -> &D::Page {
        &self.page
    }
}

impl<D: BrowserDriver> PoolResource for PooledPage<D> {
    fn close(&self) -> impl Future<Output = anyhow::Result<()>> + Send {
        self.page.close()
    }
}

/// Opens pages inside one live context
pub struct PageFactory<D: BrowserDriver> {
    context: Arc<D::Context>,
}

impl<D: BrowserDriver> PageFactory<D> {
    #[must_use]
    pub fn new(context: Arc<D::Context>) -> Self {
        Self { context }
    }
}

impl<D: BrowserDriver> ResourceFactory for PageFactory<D> {
    type Key = PageKey;
    type Resource = PooledPage<D>;

    fn create(
        &self,
        _key: &Self::Key,
    ) -> impl Future<Output = anyhow::Result<Self::Resource>> + Send {
        let context = Arc::clone(&self.context);
        async move {
            let page = context.new_page().await?;
            Ok(PooledPage { page })
        }
    }
}

/// Claim on a live page
pub type PageGuard<D> = PoolGuard<PageFactory<D>>;

/// Page pool owned by one context
pub type PagePool<D> = KeyedPool<PageFactory<D>>;
