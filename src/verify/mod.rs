//! Screen-change verification.
//!
//! A tool call that reports success is not proof that anything happened on
//! screen: a click can land on the wrong element and still "succeed". Nodes
//! marked `verify_screen_change` are wrapped by [`verify_change`], which
//! captures the environment before and after the node's body and asks a
//! [`ChangeOracle`] whether it changed.
//!
//! # Flow
//! ```text
//! observe(before) --err--> ObservationFailed
//!       |
//!   run inner --Failure--> InnerFailed   (no after capture)
//!       |     --Replan---> Replan
//!       |
//!   settle, observe(after), compare --> Changed | Unchanged
//! ```
//!
//! The verdict is heuristic: subtle real changes and unrelated changes both
//! slip through, and callers treat a wrong verdict like any other failure.

mod screen;
mod vision;

pub use screen::{DigestComparator, ScreenComparator, ScreenshotOracle};
pub use vision::VisionComparator;

use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;

use crate::executor::Outcome;

/// One captured observation of the environment.
#[derive(Debug, Clone)]
pub struct Observation {
    /// Unique label, e.g. `verify_before_<uuid>`
    pub label: String,
    /// Where the capture was stored, if it was written to disk
    pub path: Option<PathBuf>,
    pub bytes: Vec<u8>,
}

/// Errors while observing or comparing.
#[derive(Debug, thiserror::Error)]
pub enum VerifyError {
    #[error("Capture failed: {0}")]
    Capture(String),

    #[error("Comparison failed: {0}")]
    Compare(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Source of before/after observations and the judge between them.
#[async_trait]
pub trait ChangeOracle: Send + Sync {
    /// Capture the environment under a unique label.
    async fn observe(&self, label: &str) -> Result<Observation, VerifyError>;

    /// Whether `after` differs meaningfully from `before`.
    async fn compare(&self, before: &Observation, after: &Observation) -> Result<bool, VerifyError>;

    /// How long to wait after the inner body before the second capture.
    fn settle_duration(&self) -> Duration;
}

/// Result of one verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Body succeeded and the environment changed
    Changed,
    /// Body succeeded but nothing visibly changed
    Unchanged,
    /// Body failed; no after capture was taken
    InnerFailed,
    /// Body asked for a new plan
    Replan,
    /// Capture or comparison failed
    ObservationFailed(String),
}

impl Verdict {
    /// Outcome the wrapped node should adopt.
    pub fn outcome(&self) -> Outcome {
        match self {
            Verdict::Changed => Outcome::Success,
            Verdict::Replan => Outcome::ReplanRequested,
            Verdict::Unchanged | Verdict::InnerFailed | Verdict::ObservationFailed(_) => {
                Outcome::Failure
            }
        }
    }
}

/// Unique label for one side of a verification.
pub fn observation_label(phase: &str) -> String {
    format!("verify_{}_{}", phase, uuid::Uuid::new_v4())
}

/// Run `inner` between two observations and judge the difference.
pub async fn verify_change<F>(oracle: &dyn ChangeOracle, inner: F) -> Verdict
where
    F: Future<Output = Outcome> + Send,
{
    let before = match oracle.observe(&observation_label("before")).await {
        Ok(observation) => observation,
        Err(e) => {
            tracing::warn!("Before capture failed: {}", e);
            return Verdict::ObservationFailed(e.to_string());
        }
    };

    match inner.await {
        Outcome::Success => {}
        Outcome::Failure => return Verdict::InnerFailed,
        Outcome::ReplanRequested => return Verdict::Replan,
    }

    tokio::time::sleep(oracle.settle_duration()).await;

    let after = match oracle.observe(&observation_label("after")).await {
        Ok(observation) => observation,
        Err(e) => {
            tracing::warn!("After capture failed: {}", e);
            return Verdict::ObservationFailed(e.to_string());
        }
    };

    match oracle.compare(&before, &after).await {
        Ok(true) => {
            tracing::debug!(before = %before.label, after = %after.label, "Screen changed");
            Verdict::Changed
        }
        Ok(false) => {
            tracing::info!(before = %before.label, after = %after.label, "No visible change detected");
            Verdict::Unchanged
        }
        Err(e) => {
            tracing::warn!("Comparison failed: {}", e);
            Verdict::ObservationFailed(e.to_string())
        }
    }
}
