//! Retry/replan loop around the planner and the scheduler.

use std::sync::Arc;

use crate::executor::{Outcome, ProgressBoard, Scheduler};
use crate::planner::{AttemptResult, History, Planner};
use crate::task::{render_plan, render_summary};

pub struct Driver {
    planner: Arc<dyn Planner>,
    scheduler: Scheduler,
}

impl Driver {
    pub fn new(planner: Arc<dyn Planner>, scheduler: Scheduler) -> Self {
        Self { planner, scheduler }
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Per-task progress of the current attempt, when the scheduler has a board.
    pub fn progress(&self) -> Option<&ProgressBoard> {
        self.scheduler.progress()
    }

    /// Plan and execute `original_input` until it succeeds or
    /// `max_attempts` attempts are used up.
    ///
    /// Every attempt is planned from the same `original_input`; what
    /// happened before reaches the planner only through `history`. Attempts
    /// that produce no plan still count.
    pub async fn run(&self, original_input: &str, max_attempts: u32, history: &mut History) -> bool {
        for attempt in 0..max_attempts {
            tracing::info!(attempt = attempt + 1, max_attempts, "Planning attempt");

            let mut graph = match self.planner.generate(original_input, history).await {
                Ok(Some(graph)) if !graph.is_empty() => graph,
                Ok(_) => {
                    tracing::warn!(attempt = attempt + 1, "Planner produced no tasks");
                    continue;
                }
                Err(e) => {
                    tracing::warn!(attempt = attempt + 1, error = %e, "Planning failed");
                    continue;
                }
            };

            if let Some(board) = self.scheduler.progress() {
                board.reset(&graph).await;
            }
            tracing::info!("Plan:\n{}", render_plan(&graph));

            let outcome = self.scheduler.execute(&mut graph).await;
            tracing::info!("Status:\n{}", render_summary(&graph));

            match outcome {
                Outcome::Success => {
                    history.record(original_input, &graph, AttemptResult::Succeeded);
                    tracing::info!(attempt = attempt + 1, "Task completed");
                    return true;
                }
                Outcome::ReplanRequested => match graph.find_replan() {
                    Some(marker) => {
                        tracing::info!(task = %marker, "Replanning from marker");
                        history.record(original_input, &graph, AttemptResult::ReplanRequested);
                    }
                    None => {
                        tracing::warn!("Replan requested but no marker found, treating as failure");
                        history.record(original_input, &graph, AttemptResult::Failed);
                    }
                },
                Outcome::Failure => {
                    history.record(original_input, &graph, AttemptResult::Failed);
                    tracing::warn!(attempt = attempt + 1, "Attempt failed");
                }
            }
        }

        tracing::error!(max_attempts, "Giving up after all attempts");
        false
    }
}
