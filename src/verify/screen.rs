//! Screenshot-based change oracle.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use super::{ChangeOracle, Observation, VerifyError};
use crate::tools::run_with_display;

/// Judges whether two screen captures differ.
#[async_trait]
pub trait ScreenComparator: Send + Sync {
    async fn differs(&self, before: &Observation, after: &Observation) -> Result<bool, VerifyError>;
}

/// Byte-level comparison: any pixel change counts.
///
/// Deterministic and offline. Blinking cursors and clocks count as change.
pub struct DigestComparator;

impl DigestComparator {
    pub fn digest(bytes: &[u8]) -> String {
        hex::encode(Sha256::digest(bytes))
    }
}

#[async_trait]
impl ScreenComparator for DigestComparator {
    async fn differs(&self, before: &Observation, after: &Observation) -> Result<bool, VerifyError> {
        if before.bytes.is_empty() || after.bytes.is_empty() {
            return Err(VerifyError::Compare("empty capture".to_string()));
        }
        Ok(Self::digest(&before.bytes) != Self::digest(&after.bytes))
    }
}

/// Captures the X display into `<workspace>/screenshots`.
pub struct ScreenshotOracle {
    screenshots_dir: PathBuf,
    display: String,
    settle: Duration,
    comparator: Arc<dyn ScreenComparator>,
}

impl ScreenshotOracle {
    pub fn new(
        workspace: &Path,
        display: impl Into<String>,
        settle: Duration,
        comparator: Arc<dyn ScreenComparator>,
    ) -> Self {
        Self {
            screenshots_dir: workspace.join("screenshots"),
            display: display.into(),
            settle,
            comparator,
        }
    }

    pub fn screenshots_dir(&self) -> &Path {
        &self.screenshots_dir
    }

    /// Take a full-screen capture with scrot, falling back to ImageMagick.
    async fn capture(&self, path: &Path) -> Result<(), VerifyError> {
        let target = path.to_string_lossy().to_string();

        let scrot = run_with_display(&self.display, "scrot", &["-o", &target], 30).await;
        let scrot_error = match scrot {
            Ok((_, _, 0)) => return Ok(()),
            Ok((_, stderr, code)) => format!("exit {}: {}", code, stderr.trim()),
            Err(e) => e.to_string(),
        };

        tracing::debug!("scrot failed ({}), trying import", scrot_error);
        match run_with_display(&self.display, "import", &["-window", "root", &target], 30).await {
            Ok((_, _, 0)) => Ok(()),
            Ok((_, stderr, code)) => Err(VerifyError::Capture(format!(
                "scrot: {}; import: exit {}: {}",
                scrot_error,
                code,
                stderr.trim()
            ))),
            Err(e) => Err(VerifyError::Capture(format!(
                "scrot: {}; import: {}",
                scrot_error, e
            ))),
        }
    }
}

#[async_trait]
impl ChangeOracle for ScreenshotOracle {
    async fn observe(&self, label: &str) -> Result<Observation, VerifyError> {
        tokio::fs::create_dir_all(&self.screenshots_dir).await?;
        let path = self.screenshots_dir.join(format!("{}.png", label));

        self.capture(&path).await?;
        let bytes = tokio::fs::read(&path).await?;
        tracing::debug!(path = %path.display(), bytes = bytes.len(), "Captured screen");

        Ok(Observation {
            label: label.to_string(),
            path: Some(path),
            bytes,
        })
    }

    async fn compare(&self, before: &Observation, after: &Observation) -> Result<bool, VerifyError> {
        self.comparator.differs(before, after).await
    }

    fn settle_duration(&self) -> Duration {
        self.settle
    }
}
