//! Planning collaborators: the [`Planner`] seam and the attempt [`History`].
//!
//! The driver owns a `History` and lends it to the planner on every attempt,
//! so the planner can continue a task after a replan instead of starting
//! over. The history never drives control flow itself.

mod llm;

pub use llm::{extract_json, LlmPlanner};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::task::{render_summary, TaskGraph};

/// Produces a task graph for an input.
#[async_trait]
pub trait Planner: Send + Sync {
    /// Generate a plan for `input`.
    ///
    /// Called with the same `input` on every attempt of one driver run;
    /// `history` holds the earlier attempts. `Ok(None)` means no plan.
    async fn generate(&self, input: &str, history: &History) -> anyhow::Result<Option<TaskGraph>>;
}

/// How one attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptResult {
    Succeeded,
    Failed,
    ReplanRequested,
}

impl std::fmt::Display for AttemptResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
            Self::ReplanRequested => write!(f, "needs replanning"),
        }
    }
}

/// One recorded attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub input: String,
    /// The plan with final statuses, as `{"tasks": [...]}`
    pub plan: Value,
    pub result: AttemptResult,
    /// Rendered status summary
    pub summary: String,
    pub recorded_at: DateTime<Utc>,
}

/// Append-only list of attempts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct History {
    entries: Vec<HistoryEntry>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the final state of `graph` for an attempt.
    pub fn record(&mut self, input: &str, graph: &TaskGraph, result: AttemptResult) {
        self.entries.push(HistoryEntry {
            input: input.to_string(),
            plan: graph.to_json(),
            result,
            summary: render_summary(graph),
            recorded_at: Utc::now(),
        });
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    pub fn last(&self) -> Option<&HistoryEntry> {
        self.entries.last()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
