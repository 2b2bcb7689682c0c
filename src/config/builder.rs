//! Type-safe builder for `GridConfig` using the typestate pattern
//!
//! This module provides a fluent builder interface with compile-time
//! validation ensuring the log root is set before building a `GridConfig`.

use anyhow::{Result, anyhow};
use std::marker::PhantomData;
use std::path::PathBuf;

use super::types::GridConfig;

/// Default admission gate capacity
pub(crate) const DEFAULT_ADMISSION_CAPACITY: usize = 50;
/// Default admission timeout in seconds
pub(crate) const DEFAULT_ADMISSION_TIMEOUT_SECS: u64 = 30;
/// Default maximum concurrent browser processes
pub(crate) const DEFAULT_BROWSER_CAPACITY: usize = 3;
/// Default maximum contexts per browser
pub(crate) const DEFAULT_CONTEXTS_PER_BROWSER: usize = 10;
/// Default maximum pages per context
pub(crate) const DEFAULT_PAGES_PER_CONTEXT: usize = 4;

// Type states for the builder
pub struct WithLogRoot;

pub struct GridConfigBuilder<State = ()> {
    pub(crate) log_root: Option<PathBuf>,
    pub(crate) admission_capacity: usize,
    pub(crate) admission_timeout_secs: u64,
    pub(crate) browser_capacity: usize,
    pub(crate) contexts_per_browser: usize,
    pub(crate) pages_per_context: usize,
    pub(crate) step_pacing_ms: u64,
    pub(crate) page_load_timeout_secs: u64,
    pub(crate) navigation_timeout_secs: u64,
    pub(crate) log_flush_threshold_bytes: usize,
    pub(crate) headless: bool,
    pub(crate) browser_executable: Option<PathBuf>,
    pub(crate) allow_managed_download: bool,
    pub(crate) _phantom: PhantomData<State>,
}

impl Default for GridConfigBuilder<()> {
    fn default() -> Self {
        Self {
            log_root: None,
            admission_capacity: DEFAULT_ADMISSION_CAPACITY,
            admission_timeout_secs: DEFAULT_ADMISSION_TIMEOUT_SECS,
            browser_capacity: DEFAULT_BROWSER_CAPACITY,
            contexts_per_browser: DEFAULT_CONTEXTS_PER_BROWSER,
            pages_per_context: DEFAULT_PAGES_PER_CONTEXT,
            step_pacing_ms: 250,
            page_load_timeout_secs: 30,
            navigation_timeout_secs: 30,
            log_flush_threshold_bytes: 8192,
            headless: true,
            browser_executable: None,
            allow_managed_download: true,
            _phantom: PhantomData,
        }
    }
}

impl GridConfig {
    /// Create a builder for configuring a `GridConfig` with a fluent interface
    #[must_use]
    pub fn builder() -> GridConfigBuilder<()> {
        GridConfigBuilder::default()
    }
}

impl GridConfigBuilder<()> {
    pub fn log_root(self, dir: impl Into<PathBuf>) -> GridConfigBuilder<WithLogRoot> {
        GridConfigBuilder {
            log_root: Some(dir.into()),
            admission_capacity: self.admission_capacity,
            admission_timeout_secs: self.admission_timeout_secs,
            browser_capacity: self.browser_capacity,
            contexts_per_browser: self.contexts_per_browser,
            pages_per_context: self.pages_per_context,
            step_pacing_ms: self.step_pacing_ms,
            page_load_timeout_secs: self.page_load_timeout_secs,
            navigation_timeout_secs: self.navigation_timeout_secs,
            log_flush_threshold_bytes: self.log_flush_threshold_bytes,
            headless: self.headless,
            browser_executable: self.browser_executable,
            allow_managed_download: self.allow_managed_download,
            _phantom: PhantomData,
        }
    }
}

impl<State> GridConfigBuilder<State> {
    #[must_use]
    pub fn admission_capacity(mut self, capacity: usize) -> Self {
        self.admission_capacity = capacity;
        self
    }

    #[must_use]
    pub fn admission_timeout_secs(mut self, secs: u64) -> Self {
        self.admission_timeout_secs = secs;
        self
    }

    #[must_use]
    pub fn browser_capacity(mut self, capacity: usize) -> Self {
        self.browser_capacity = capacity;
        self
    }

    #[must_use]
    pub fn contexts_per_browser(mut self, capacity: usize) -> Self {
        self.contexts_per_browser = capacity;
        self
    }

    #[must_use]
    pub fn pages_per_context(mut self, capacity: usize) -> Self {
        self.pages_per_context = capacity;
        self
    }

    #[must_use]
    pub fn step_pacing_ms(mut self, millis: u64) -> Self {
        self.step_pacing_ms = millis;
        self
    }

    #[must_use]
    pub fn page_load_timeout_secs(mut self, secs: u64) -> Self {
        self.page_load_timeout_secs = secs;
        self
    }

    #[must_use]
    pub fn navigation_timeout_secs(mut self, secs: u64) -> Self {
        self.navigation_timeout_secs = secs;
        self
    }

    #[must_use]
    pub fn log_flush_threshold_bytes(mut self, bytes: usize) -> Self {
        self.log_flush_threshold_bytes = bytes;
        self
    }

    #[must_use]
    pub fn headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    #[must_use]
    pub fn browser_executable(mut self, path: impl Into<PathBuf>) -> Self {
        self.browser_executable = Some(path.into());
        self
    }

    #[must_use]
    pub fn allow_managed_download(mut self, allow: bool) -> Self {
        self.allow_managed_download = allow;
        self
    }
}

// Build method only available once the log root is set
impl GridConfigBuilder<WithLogRoot> {
    pub fn build(self) -> Result<GridConfig> {
        let log_root = self
            .log_root
            .ok_or_else(|| anyhow!("log_root is required"))?;

        // Normalize to an absolute path so sink folders are stable no matter
        // where the consumer process was started from.
        let log_root = if log_root.is_absolute() {
            log_root
        } else {
            std::env::current_dir()?.join(log_root)
        };

        if self.admission_capacity == 0 {
            return Err(anyhow!("admission_capacity must be at least 1"));
        }
        if self.admission_timeout_secs == 0 {
            return Err(anyhow!("admission_timeout_secs must be at least 1"));
        }
        if self.browser_capacity == 0 {
            return Err(anyhow!("browser_capacity must be at least 1"));
        }
        if self.contexts_per_browser == 0 {
            return Err(anyhow!("contexts_per_browser must be at least 1"));
        }
        if self.pages_per_context == 0 {
            return Err(anyhow!("pages_per_context must be at least 1"));
        }

        Ok(GridConfig {
            log_root,
            admission_capacity: self.admission_capacity,
            admission_timeout_secs: self.admission_timeout_secs,
            browser_capacity: self.browser_capacity,
            contexts_per_browser: self.contexts_per_browser,
            pages_per_context: self.pages_per_context,
            step_pacing_ms: self.step_pacing_ms,
            page_load_timeout_secs: self.page_load_timeout_secs,
            navigation_timeout_secs: self.navigation_timeout_secs,
            log_flush_threshold_bytes: self.log_flush_threshold_bytes,
            headless: self.headless,
            browser_executable: self.browser_executable,
            allow_managed_download: self.allow_managed_download,
        })
    }
}
