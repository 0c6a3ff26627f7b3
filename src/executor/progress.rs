//! Per-task progress map for external observers.
//!
//! A read-only projection of the graph: the scheduler pushes every status
//! transition here so a UI can poll without walking the graph. The graph
//! stays the source of truth.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::RwLock;

use crate::task::{TaskGraph, TaskId, TaskNode, TaskStatus};

/// Progress of one node.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct TaskProgress {
    pub status: TaskStatus,
    pub stdout: Vec<String>,
    pub stderr: Vec<String>,
}

/// Shared progress map keyed by task id.
#[derive(Debug, Clone, Default)]
pub struct ProgressBoard {
    tasks: Arc<RwLock<HashMap<TaskId, TaskProgress>>>,
}

impl ProgressBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the map with one `blocked` entry per node of `graph`.
    pub async fn reset(&self, graph: &TaskGraph) {
        let fresh: HashMap<TaskId, TaskProgress> = graph
            .nodes()
            .map(|node| (node.id, TaskProgress::default()))
            .collect();
        *self.tasks.write().await = fresh;
    }

    /// Mirror a node's current status and any new output.
    pub async fn record(&self, node: &TaskNode) {
        let mut tasks = self.tasks.write().await;
        let entry = tasks.entry(node.id).or_default();
        entry.status = node.status;
        push_new(&mut entry.stdout, node.stdout.as_deref());
        push_new(&mut entry.stderr, node.stderr.as_deref());
    }

    pub async fn get(&self, id: TaskId) -> Option<TaskProgress> {
        self.tasks.read().await.get(&id).cloned()
    }

    pub async fn snapshot(&self) -> HashMap<TaskId, TaskProgress> {
        self.tasks.read().await.clone()
    }
}

fn push_new(lines: &mut Vec<String>, text: Option<&str>) {
    if let Some(text) = text.filter(|t| !t.is_empty()) {
        if lines.last().map(String::as_str) != Some(text) {
            lines.push(text.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_reset_and_record() {
        let mut graph = TaskGraph::new(vec![
            TaskNode::task(0, vec![1]),
            TaskNode::tool_call(1, "noop", json!({})),
        ])
        .unwrap();
        let board = ProgressBoard::new();
        board.reset(&graph).await;
        assert_eq!(board.snapshot().await.len(), 2);
        assert_eq!(board.get(TaskId(1)).await.unwrap().status, TaskStatus::Blocked);

        let node = graph.get_mut(TaskId(1)).unwrap();
        node.status = TaskStatus::Success;
        node.stdout = Some("done".to_string());
        board.record(node).await;
        board.record(node).await;

        let progress = board.get(TaskId(1)).await.unwrap();
        assert_eq!(progress.status, TaskStatus::Success);
        assert_eq!(progress.stdout, vec!["done".to_string()]);
        assert!(progress.stderr.is_empty());
    }

    #[tokio::test]
    async fn test_reset_drops_previous_attempt() {
        let board = ProgressBoard::new();
        let first = TaskGraph::new(vec![TaskNode::plan(7)]).unwrap();
        board.reset(&first).await;

        let second = TaskGraph::new(vec![TaskNode::plan(1)]).unwrap();
        board.reset(&second).await;
        assert!(board.get(TaskId(7)).await.is_none());
        assert!(board.get(TaskId(1)).await.is_some());
    }
}
