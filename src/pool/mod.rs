//! Hierarchical resource pool scheduler
//!
//! Three structurally identical levels (browser, context, page) built on one
//! generic [`KeyedPool`]. Each level bounds its live resources with a
//! capacity semaphore, queues cold-key demand behind a single creation task,
//! and tears resources down with a safe-to-close recheck under the key lock.

pub mod browser;
pub mod context;
pub mod error;
pub mod page;
pub mod scheduler;

pub use browser::{BrowserFactory, BrowserGuard, BrowserPool, PooledBrowser};
pub use context::{ContextFactory, ContextGuard, ContextKey, PooledContext};
pub use error::PoolError;
pub use page::{PageFactory, PageGuard, PageKey, PagePool, PooledPage};
pub use scheduler::{KeyedPool, PoolGuard, PoolKey, PoolResource, ResourceFactory};
