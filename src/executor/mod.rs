//! Task graph scheduler.
//!
//! Runs one plan against the tool registry, strictly one node at a time:
//! real side effects (pointer focus, one shell, one browser page) are not
//! safe to parallelize.
//!
//! # Algorithm (per level)
//! ```text
//! pending = ids at this level that resolve and are not yet success
//! loop:
//!   ready = first pending node that is not running and whose
//!           dependencies all resolve to success
//!   none ready        -> mark pending blocked (stall), Failure
//!   run it:
//!     Success         -> delay, continue
//!     Failure         -> block remaining siblings + subtrees, Failure
//!     ReplanRequested -> return immediately, siblings untouched
//! pending empty -> Success
//! ```
//!
//! Composite nodes recurse into their subtasks with the same algorithm, so
//! the outcome of a nested level becomes the outcome of its parent node.
//!
//! # Invariants
//! - At most one node is `running` outside the chain of active ancestors
//! - A node that reached `success` is never run again in the same graph
//! - Tool errors are caught at the node boundary and never escape `execute`
//! - Cycles (dependency or subtask) end as a stall, never as a hang

mod progress;

pub use progress::{ProgressBoard, TaskProgress};

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_recursion::async_recursion;

use crate::task::{TaskGraph, TaskId, TaskKind, TaskStatus};
use crate::tools::ToolRegistry;
use crate::verify::{verify_change, ChangeOracle, Verdict};

/// Result of executing a graph or one level of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failure,
    /// A replan marker was reached somewhere below this level
    ReplanRequested,
}

impl Outcome {
    fn status(self) -> TaskStatus {
        match self {
            Outcome::Success => TaskStatus::Success,
            Outcome::Failure => TaskStatus::Error,
            Outcome::ReplanRequested => TaskStatus::Replan,
        }
    }
}

/// Scheduler settings.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Pause after every successful node
    pub step_delay: Duration,
    /// Default directory for tool calls
    pub working_dir: PathBuf,
    /// X display for desktop tools
    pub display: String,
    /// Refuse graphs with dangling subtask/dependency ids
    pub strict_graph: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            step_delay: Duration::from_millis(500),
            working_dir: PathBuf::from("."),
            display: ":0".to_string(),
            strict_graph: false,
        }
    }
}

/// Executes task graphs.
pub struct Scheduler {
    tools: Arc<ToolRegistry>,
    oracle: Arc<dyn ChangeOracle>,
    config: SchedulerConfig,
    progress: Option<ProgressBoard>,
}

impl Scheduler {
    pub fn new(
        tools: Arc<ToolRegistry>,
        oracle: Arc<dyn ChangeOracle>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            tools,
            oracle,
            config,
            progress: None,
        }
    }

    /// Mirror every status change into `board`.
    pub fn with_progress(mut self, board: ProgressBoard) -> Self {
        self.progress = Some(board);
        self
    }

    pub fn progress(&self) -> Option<&ProgressBoard> {
        self.progress.as_ref()
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Execute the whole graph, starting from its top-level ids.
    ///
    /// Mutates node statuses and outputs in place. Re-running a graph whose
    /// nodes are all `success` returns `Success` without invoking any tool.
    pub async fn execute(&self, graph: &mut TaskGraph) -> Outcome {
        let dangling = graph.dangling_references();
        for (owner, missing) in &dangling {
            tracing::warn!(task = %owner, missing = %missing, "Task references unknown task id");
        }
        if let (true, Err(e)) = (self.config.strict_graph, graph.ensure_no_dangling()) {
            for (owner, missing) in &dangling {
                if let Some(node) = graph.get_mut(*owner) {
                    node.set_stderr_once(format!("references unknown task {}", missing));
                }
                self.publish(graph, *owner).await;
            }
            tracing::error!(error = %e, count = dangling.len(), "Refusing graph with dangling references");
            return Outcome::Failure;
        }

        let top_level = graph.top_level_ids();
        tracing::info!(tasks = graph.len(), top_level = top_level.len(), "Executing task graph");

        let outcome = self.execute_level(graph, &top_level).await;
        tracing::info!(outcome = ?outcome, "Task graph finished");
        outcome
    }

    #[async_recursion]
    async fn execute_level(&self, graph: &mut TaskGraph, ids: &[TaskId]) -> Outcome {
        let mut pending: Vec<TaskId> = Vec::with_capacity(ids.len());
        for &id in ids {
            match graph.status(id) {
                None => tracing::warn!(task = %id, "Skipping unknown subtask id"),
                Some(TaskStatus::Success) => {}
                Some(_) if pending.contains(&id) => {}
                Some(_) => pending.push(id),
            }
        }

        while !pending.is_empty() {
            let Some(position) = pending.iter().position(|&id| is_ready(graph, id)) else {
                self.mark_stalled(graph, &pending).await;
                return Outcome::Failure;
            };
            let id = pending.remove(position);

            match self.run_node(graph, id).await {
                Outcome::Success => {
                    if !self.config.step_delay.is_zero() {
                        tokio::time::sleep(self.config.step_delay).await;
                    }
                }
                Outcome::Failure => {
                    self.block_after_failure(graph, &pending, id).await;
                    return Outcome::Failure;
                }
                Outcome::ReplanRequested => {
                    tracing::info!(task = %id, "Replan requested, unwinding");
                    return Outcome::ReplanRequested;
                }
            }
        }

        Outcome::Success
    }

    async fn run_node(&self, graph: &mut TaskGraph, id: TaskId) -> Outcome {
        let Some(node) = graph.get_mut(id) else {
            return Outcome::Failure;
        };
        node.status = TaskStatus::Running;
        node.stdout = None;
        node.stderr = None;
        let kind = node.kind;
        let verify = node.verify_screen_change && kind != TaskKind::Plan;
        tracing::info!(task = %id, name = %node.name, kind = ?kind, verify, "Starting task");
        self.publish(graph, id).await;

        let outcome = if verify {
            let verdict = verify_change(self.oracle.as_ref(), self.run_body(graph, id)).await;
            if let Some(node) = graph.get_mut(id) {
                match &verdict {
                    Verdict::Unchanged => node.set_stderr_once("no visible change detected"),
                    Verdict::ObservationFailed(reason) => {
                        node.set_stderr_once(format!("screen verification failed: {}", reason))
                    }
                    _ => {}
                }
            }
            tracing::debug!(task = %id, verdict = ?verdict, "Verification finished");
            verdict.outcome()
        } else {
            self.run_body(graph, id).await
        };

        if let Some(node) = graph.get_mut(id) {
            node.status = outcome.status();
            if outcome == Outcome::Failure && kind == TaskKind::Task {
                node.set_stderr_once("a subtask failed");
            }
            match outcome {
                Outcome::Success => tracing::info!(task = %id, "Task succeeded"),
                Outcome::Failure => tracing::warn!(
                    task = %id,
                    reason = node.stderr.as_deref().unwrap_or_default(),
                    "Task failed"
                ),
                Outcome::ReplanRequested => tracing::info!(task = %id, "Task needs replanning"),
            }
        }
        self.publish(graph, id).await;

        outcome
    }

    /// The node's own work: tool dispatch, subtask recursion, or replan.
    async fn run_body(&self, graph: &mut TaskGraph, id: TaskId) -> Outcome {
        let Some(node) = graph.get(id) else {
            return Outcome::Failure;
        };

        let kind = node.kind;
        let subtasks = node.subtasks.clone();

        match kind {
            TaskKind::Plan => Outcome::ReplanRequested,
            TaskKind::ToolCall => self.run_tool(graph, id).await,
            TaskKind::Task if subtasks.is_empty() => Outcome::Success,
            TaskKind::Task => self.execute_level(graph, &subtasks).await,
        }
    }

    async fn run_tool(&self, graph: &mut TaskGraph, id: TaskId) -> Outcome {
        let Some(node) = graph.get_mut(id) else {
            return Outcome::Failure;
        };

        match self
            .tools
            .dispatch(node, &self.config.working_dir, &self.config.display)
            .await
        {
            Ok(output) => {
                if let Some(stdout) = output.stdout {
                    node.set_stdout_once(stdout);
                }
                if let Some(stderr) = output.stderr {
                    node.set_stderr_once(stderr);
                }
                if output.success {
                    Outcome::Success
                } else {
                    node.set_stderr_once(match output.exit_code {
                        Some(code) => format!("tool exited with code {}", code),
                        None => "tool reported failure".to_string(),
                    });
                    Outcome::Failure
                }
            }
            Err(e) => {
                tracing::warn!(task = %id, error = %e, "Tool call raised");
                node.set_stderr_once(e.to_string());
                Outcome::Failure
            }
        }
    }

    /// No pending node can run: mark them blocked with the unmet dependencies.
    async fn mark_stalled(&self, graph: &mut TaskGraph, pending: &[TaskId]) {
        for &id in pending {
            let reason = match graph.get(id) {
                Some(node) if node.status != TaskStatus::Running => unmet_reason(graph, id),
                _ => continue,
            };
            tracing::warn!(task = %id, reason = %reason, "Task stalled");
            if let Some(node) = graph.get_mut(id) {
                node.status = TaskStatus::Blocked;
                node.set_stderr_once(reason);
            }
            self.publish(graph, id).await;
        }
    }

    /// Block the untouched siblings of a failed node and everything under them.
    async fn block_after_failure(&self, graph: &mut TaskGraph, remaining: &[TaskId], failed: TaskId) {
        let reason = format!("blocked by failure of task {}", failed);
        let mut visited = HashSet::new();
        let mut stack: Vec<TaskId> = remaining.iter().rev().copied().collect();

        while let Some(id) = stack.pop() {
            if !visited.insert(id) {
                continue;
            }
            let Some(node) = graph.get_mut(id) else {
                continue;
            };
            stack.extend(node.subtasks.iter().rev().copied());
            if node.status.is_finished() || node.status == TaskStatus::Running {
                continue;
            }
            node.status = TaskStatus::Blocked;
            node.set_stderr_once(reason.clone());
            tracing::debug!(task = %id, failed = %failed, "Task blocked by failure");
            self.publish(graph, id).await;
        }
    }

    async fn publish(&self, graph: &TaskGraph, id: TaskId) {
        if let (Some(board), Some(node)) = (&self.progress, graph.get(id)) {
            board.record(node).await;
        }
    }
}

/// A node may run when it is not already active and every dependency
/// resolves to a successful node.
fn is_ready(graph: &TaskGraph, id: TaskId) -> bool {
    let Some(node) = graph.get(id) else {
        return false;
    };
    node.status != TaskStatus::Running
        && node
            .dependencies
            .iter()
            .all(|dep| graph.status(*dep) == Some(TaskStatus::Success))
}

fn unmet_reason(graph: &TaskGraph, id: TaskId) -> String {
    let Some(node) = graph.get(id) else {
        return "stalled".to_string();
    };
    let unmet: Vec<String> = node
        .dependencies
        .iter()
        .filter_map(|dep| match graph.status(*dep) {
            Some(TaskStatus::Success) => None,
            Some(status) => Some(format!("task {} is {}", dep, status)),
            None => Some(format!("task {} does not exist", dep)),
        })
        .collect();

    if unmet.is_empty() {
        "stalled: an enclosing task is still running".to_string()
    } else {
        format!("waiting on unmet dependencies: {}", unmet.join(", "))
    }
}
