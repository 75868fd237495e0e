//! Harness error type.

use silcore_core::SilError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("core error: {0}")]
    Core(#[from] SilError),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// The scenario could not run to completion (as opposed to running and
    /// reporting a failed check).
    #[error("scenario {scenario} aborted: {reason}")]
    Aborted {
        scenario: &'static str,
        reason: String,
    },
}

impl HarnessError {
    pub(crate) fn aborted(scenario: &'static str, reason: impl Into<String>) -> Self {
        Self::Aborted {
            scenario,
            reason: reason.into(),
        }
    }
}
