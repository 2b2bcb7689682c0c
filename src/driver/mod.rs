//! Browser-automation boundary
//!
//! The scheduler only needs four operations from the automation library:
//! launch a browser, open a context, open a page, close each. These traits
//! pin that surface so the pool hierarchy and the tests can run against a
//! fake, while production wires in the chromiumoxide implementation from
//! [`cdp`].

pub mod cdp;
pub mod launch;

use serde::{Deserialize, Serialize};
use std::fmt;

/// Browser families the grid can schedule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrowserKind {
    Chrome,
    Chromium,
}

impl BrowserKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            BrowserKind::Chrome => "chrome",
            BrowserKind::Chromium => "chromium",
        }
    }
}

impl fmt::Display for BrowserKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of a browser pool entry
///
/// Two runs asking for the same kind and version share one live browser
/// process; differing versions get separate processes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BrowserKey {
    pub kind: BrowserKind,
    pub version: String,
}

impl BrowserKey {
    #[must_use]
    pub fn new(kind: BrowserKind, version: impl Into<String>) -> Self {
        Self {
            kind,
            version: version.into(),
        }
    }
}

impl fmt::Display for BrowserKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.kind, self.version)
    }
}

/// A live browser process
pub trait BrowserHandle: Send + Sync + 'static {
    type Context;

    /// Open an isolated context inside this browser
    fn new_context(&self) -> impl Future<Output = anyhow::Result<Self::Context>> + Send;

    /// Whether the process already went away
    fn is_closed(&self) -> bool;

    /// Close the process
    fn close(&self) -> impl Future<Output = anyhow::Result<()>> + Send;
}

/// A live browser context
pub trait ContextHandle: Send + Sync + 'static {
    type Page;

    /// Open a page (tab) inside this context
    fn new_page(&self) -> impl Future<Output = anyhow::Result<Self::Page>> + Send;

    fn is_closed(&self) -> bool;

    fn close(&self) -> impl Future<Output = anyhow::Result<()>> + Send;
}

/// A live page
pub trait PageHandle: Send + Sync + 'static {
    fn is_closed(&self) -> bool;

    fn close(&self) -> impl Future<Output = anyhow::Result<()>> + Send;
}

/// Launches browsers for the pool's cold keys
pub trait BrowserDriver: Send + Sync + 'static {
    type Browser: BrowserHandle<Context = Self::Context>;
    type Context: ContextHandle<Page = Self::Page>;
    type Page: PageHandle;

    /// Launch a browser process matching `key`
    fn launch(&self, key: &BrowserKey)
    -> impl Future<Output = anyhow::Result<Self::Browser>> + Send;
}
