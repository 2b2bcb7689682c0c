//! Test execution engine
//!
//! A test run is a sequence of [`TestStep`]s driven against one live page.
//! The engine contract is deliberately small: run the steps to completion,
//! observe the run's cancellation signal between steps, and report progress
//! into the run's log. Production uses the chromiumoxide implementation in
//! [`cdp`]; tests inject fakes.

pub mod cdp;

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::request::RequestError;
use crate::run_log::RunLogHandle;
use crate::signal::CancelSignal;

/// One automation step of a test run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum TestStep {
    /// Load `url` and wait for the navigation to settle
    Navigate { url: String },
    /// Click the first element matching `selector`
    Click { selector: String },
    /// Type `value` into the first element matching `selector`
    Fill { selector: String, value: String },
    /// Poll until an element matching `selector` appears
    WaitFor { selector: String },
    /// Assert that the text of the element matching `selector` contains
    /// `contains`
    AssertText { selector: String, contains: String },
}

impl TestStep {
    /// Static validity check, run before any resource is acquired
    pub fn validate(&self) -> Result<(), String> {
        match self {
            TestStep::Navigate { url } => {
                if url.trim().is_empty() {
                    return Err("navigate step has an empty url".to_string());
                }
                if !url.starts_with("http://") && !url.starts_with("https://") {
                    return Err(format!("navigate url '{url}' must be http(s)"));
                }
            }
            TestStep::Click { selector }
            | TestStep::WaitFor { selector }
            | TestStep::AssertText { selector, .. } => {
                if selector.trim().is_empty() {
                    return Err("step has an empty selector".to_string());
                }
            }
            TestStep::Fill { selector, .. } => {
                if selector.trim().is_empty() {
                    return Err("fill step has an empty selector".to_string());
                }
            }
        }
        Ok(())
    }

    /// Short human-readable form for log lines
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            TestStep::Navigate { url } => format!("navigate to {url}"),
            TestStep::Click { selector } => format!("click '{selector}'"),
            TestStep::Fill { selector, .. } => format!("fill '{selector}'"),
            TestStep::WaitFor { selector } => format!("wait for '{selector}'"),
            TestStep::AssertText { selector, contains } => {
                format!("assert '{selector}' contains \"{contains}\"")
            }
        }
    }
}

/// Runs a step sequence against a live page
pub trait TestEngine<P>: Send + Sync + 'static {
    /// Execute `steps` in order
    ///
    /// Implementations observe `cancel` between steps and surface
    /// [`RequestError::Cancelled`] rather than finishing the sequence.
    fn run(
        &self,
        page: &P,
        steps: &[TestStep],
        log: &RunLogHandle,
        cancel: &CancelSignal,
    ) -> impl Future<Output = Result<(), RequestError>> + Send;
}

/// Cancellable pacing delay between steps
pub(crate) async fn pace(delay: Duration, cancel: &CancelSignal) -> Result<(), RequestError> {
    if delay.is_zero() {
        if cancel.is_triggered() {
            return Err(RequestError::Cancelled);
        }
        return Ok(());
    }
    tokio::select! {
        () = cancel.cancelled() => Err(RequestError::Cancelled),
        () = tokio::time::sleep(delay) => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_model_round_trips_through_json() {
        let steps = vec![
            TestStep::Navigate {
                url: "https://example.test/login".to_string(),
            },
            TestStep::Fill {
                selector: "#user".to_string(),
                value: "admin".to_string(),
            },
            TestStep::Click {
                selector: "button[type=submit]".to_string(),
            },
            TestStep::AssertText {
                selector: ".banner".to_string(),
                contains: "Welcome".to_string(),
            },
        ];
        let json = serde_json::to_string(&steps).expect("steps serialize");
        assert!(json.contains("\"action\":\"navigate\""));
        let parsed: Vec<TestStep> = serde_json::from_str(&json).expect("steps parse");
        assert_eq!(parsed, steps);
    }

    #[test]
    fn empty_selector_fails_validation() {
        let step = TestStep::Click {
            selector: "  ".to_string(),
        };
        assert!(step.validate().is_err());
    }

    #[test]
    fn non_http_url_fails_validation() {
        let step = TestStep::Navigate {
            url: "ftp://example.test".to_string(),
        };
        assert!(step.validate().is_err());
    }

    #[tokio::test]
    async fn pace_aborts_on_cancellation() {
        let cancel = CancelSignal::new();
        cancel.trigger();
        let result = pace(Duration::from_secs(60), &cancel).await;
        assert!(matches!(result, Err(RequestError::Cancelled)));
    }
}
