//! chromiumoxide step runner
//!
//! Drives each step against the page's CDP target with a timeout, appends a
//! line per step to the run log and observes cancellation at every step
//! boundary and inside element polls.

use anyhow::{Context, anyhow};
use std::time::Duration;
use tokio::time::{Instant, timeout};

use crate::config::GridConfig;
use crate::driver::cdp::CdpPage;
use crate::request::RequestError;
use crate::run_log::RunLogHandle;
use crate::signal::CancelSignal;

use super::{TestEngine, TestStep, pace};

/// Interval between element-presence polls in `WaitFor`
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Step runner over a live chromiumoxide page
pub struct CdpEngine {
    pacing: Duration,
    page_load_timeout: Duration,
    navigation_timeout: Duration,
}

impl CdpEngine {
    #[must_use]
    pub fn new(config: &GridConfig) -> Self {
        Self {
            pacing: config.step_pacing(),
            page_load_timeout: config.page_load_timeout(),
            navigation_timeout: config.navigation_timeout(),
        }
    }

    async fn run_step(
        &self,
        page: &CdpPage,
        step: &TestStep,
        cancel: &CancelSignal,
    ) -> Result<(), RequestError> {
        let page = page.page();
        match step {
            TestStep::Navigate { url } => {
                timeout(self.page_load_timeout, page.goto(url.clone()))
                    .await
                    .map_err(|_| anyhow!("loading {url} timed out"))?
                    .with_context(|| format!("navigating to {url}"))?;
                timeout(self.navigation_timeout, page.wait_for_navigation())
                    .await
                    .map_err(|_| anyhow!("navigation to {url} did not settle"))?
                    .with_context(|| format!("waiting for navigation to {url}"))?;
            }
            TestStep::Click { selector } => {
                let element = page
                    .find_element(selector.clone())
                    .await
                    .with_context(|| format!("finding '{selector}'"))?;
                element
                    .click()
                    .await
                    .with_context(|| format!("clicking '{selector}'"))?;
            }
            TestStep::Fill { selector, value } => {
                let element = page
                    .find_element(selector.clone())
                    .await
                    .with_context(|| format!("finding '{selector}'"))?;
                element
                    .click()
                    .await
                    .with_context(|| format!("focusing '{selector}'"))?;
                element
                    .type_str(value.clone())
                    .await
                    .with_context(|| format!("typing into '{selector}'"))?;
            }
            TestStep::WaitFor { selector } => {
                let deadline = Instant::now() + self.page_load_timeout;
                loop {
                    if page.find_element(selector.clone()).await.is_ok() {
                        break;
                    }
                    if Instant::now() >= deadline {
                        return Err(RequestError::Processing(anyhow!(
                            "'{selector}' did not appear within {:?}",
                            self.page_load_timeout
                        )));
                    }
                    pace(POLL_INTERVAL, cancel).await?;
                }
            }
            TestStep::AssertText { selector, contains } => {
                let element = page
                    .find_element(selector.clone())
                    .await
                    .with_context(|| format!("finding '{selector}'"))?;
                let text = element
                    .inner_text()
                    .await
                    .with_context(|| format!("reading text of '{selector}'"))?
                    .unwrap_or_default();
                if !text.contains(contains) {
                    return Err(RequestError::Processing(anyhow!(
                        "'{selector}' text {text:?} does not contain {contains:?}"
                    )));
                }
            }
        }
        Ok(())
    }
}

impl TestEngine<CdpPage> for CdpEngine {
    async fn run(
        &self,
        page: &CdpPage,
        steps: &[TestStep],
        log: &RunLogHandle,
        cancel: &CancelSignal,
    ) -> Result<(), RequestError> {
        let total = steps.len();
        for (idx, step) in steps.iter().enumerate() {
            if cancel.is_triggered() {
                return Err(RequestError::Cancelled);
            }
            let over = log.append(&format!("step {}/{total}: {}", idx + 1, step.describe()));
            if over {
                if let Err(e) = log.flush().await {
                    log::warn!("run log flush failed: {e:#}");
                }
            }
            self.run_step(page, step, cancel).await?;
            if idx + 1 < total {
                pace(self.pacing, cancel).await?;
            }
        }
        Ok(())
    }
}
