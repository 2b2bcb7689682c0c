//! Getter methods for `GridConfig`
//!
//! This module provides the accessor methods for retrieving configuration
//! values from a `GridConfig` instance.

use std::path::{Path, PathBuf};
use std::time::Duration;

use super::types::GridConfig;

impl GridConfig {
    #[must_use]
    pub fn log_root(&self) -> &Path {
        &self.log_root
    }

    #[must_use]
    pub fn admission_capacity(&self) -> usize {
        self.admission_capacity
    }

    /// Admission wait bound as a [`Duration`]
    #[must_use]
    pub fn admission_timeout(&self) -> Duration {
        Duration::from_secs(self.admission_timeout_secs)
    }

    #[must_use]
    pub fn browser_capacity(&self) -> usize {
        self.browser_capacity
    }

    #[must_use]
    pub fn contexts_per_browser(&self) -> usize {
        self.contexts_per_browser
    }

    #[must_use]
    pub fn pages_per_context(&self) -> usize {
        self.pages_per_context
    }

    /// Delay inserted between automation steps
    #[must_use]
    pub fn step_pacing(&self) -> Duration {
        Duration::from_millis(self.step_pacing_ms)
    }

    #[must_use]
    pub fn page_load_timeout(&self) -> Duration {
        Duration::from_secs(self.page_load_timeout_secs)
    }

    #[must_use]
    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_secs(self.navigation_timeout_secs)
    }

    #[must_use]
    pub fn log_flush_threshold_bytes(&self) -> usize {
        self.log_flush_threshold_bytes
    }

    #[must_use]
    pub fn headless(&self) -> bool {
        self.headless
    }

    #[must_use]
    pub fn browser_executable(&self) -> Option<&PathBuf> {
        self.browser_executable.as_ref()
    }

    #[must_use]
    pub fn allow_managed_download(&self) -> bool {
        self.allow_managed_download
    }
}
