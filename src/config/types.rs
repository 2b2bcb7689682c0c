//! Core configuration types for the test grid scheduler
//!
//! This module contains the main `GridConfig` struct that defines admission,
//! pool-capacity, logging and browser-launch parameters for a grid instance.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration for one grid instance
///
/// Built through [`GridConfig::builder`](crate::config::GridConfigBuilder);
/// all capacity fields are validated to be non-zero at build time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridConfig {
    /// Directory that per-run log folders are created under.
    ///
    /// **INVARIANT:** Always an absolute path (normalized in builder).
    pub(crate) log_root: PathBuf,

    /// Maximum number of requests in flight at once.
    ///
    /// This is the single global backpressure mechanism: once this many
    /// requests are admitted, further submissions wait up to
    /// `admission_timeout_secs` and are then rejected.
    ///
    /// Default: 50
    pub(crate) admission_capacity: usize,

    /// Seconds a submission waits for an admission slot before rejection.
    ///
    /// Default: 30 seconds
    pub(crate) admission_timeout_secs: u64,

    /// Maximum concurrent live browser processes across all browser keys.
    ///
    /// Default: 3
    pub(crate) browser_capacity: usize,

    /// Maximum concurrent live contexts per browser process.
    ///
    /// Default: 10
    pub(crate) contexts_per_browser: usize,

    /// Maximum concurrent open pages per context (main page plus
    /// auxiliary tabs).
    ///
    /// Default: 4
    pub(crate) pages_per_context: usize,

    /// Pacing delay between automation steps, in milliseconds.
    ///
    /// The delay is a cancellable suspension point, so a cancelled run
    /// stops at the next step boundary rather than sleeping it out.
    ///
    /// Default: 250
    pub(crate) step_pacing_ms: u64,

    /// Timeout in seconds for `page.goto()` operations.
    ///
    /// Prevents hangs on slow DNS, unresponsive servers, or streaming
    /// content.
    ///
    /// Default: 30 seconds
    pub(crate) page_load_timeout_secs: u64,

    /// Timeout in seconds for `page.wait_for_navigation()` operations.
    ///
    /// Default: 30 seconds
    pub(crate) navigation_timeout_secs: u64,

    /// Buffered byte count that triggers a run-log flush.
    ///
    /// Default: 8192
    pub(crate) log_flush_threshold_bytes: usize,

    /// Run browsers headless.
    ///
    /// Default: true
    pub(crate) headless: bool,

    /// Explicit browser executable, overriding discovery.
    pub(crate) browser_executable: Option<PathBuf>,

    /// Download a managed browser build when no executable is found.
    ///
    /// Default: true
    pub(crate) allow_managed_download: bool,
}
