//! Task graph arena - one flat owned store of nodes indexed by id.
//!
//! Every level of the scheduler works on a slice of ids plus a mutable handle
//! to this arena, so status changes made deep in a subtree are visible
//! everywhere else without nested mutable containers.
//!
//! # Invariants
//! - Node ids are unique
//! - `index[id]` is the position of that node in `nodes`
//! - `tool_call` nodes name a tool, `plan` nodes carry no subtasks

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::node::{default_name, TaskId, TaskKind, TaskNode, TaskStatus};

/// A planner-produced task collection.
#[derive(Debug, Clone, Default)]
pub struct TaskGraph {
    nodes: Vec<TaskNode>,
    index: HashMap<TaskId, usize>,
}

/// Document shape accepted from planners and task files.
#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum PlanDocument {
    Wrapped { tasks: Vec<TaskNode> },
    Bare(Vec<TaskNode>),
}

impl TaskGraph {
    /// Build a graph from nodes in declaration order.
    ///
    /// # Errors
    /// Returns `Err` for duplicate ids, tool calls without a tool name, and
    /// replan markers that declare subtasks. Dangling references are allowed
    /// here; see [`TaskGraph::dangling_references`].
    pub fn new(nodes: Vec<TaskNode>) -> Result<Self, GraphError> {
        let mut index = HashMap::with_capacity(nodes.len());
        let mut nodes = nodes;

        for (position, node) in nodes.iter_mut().enumerate() {
            if index.insert(node.id, position).is_some() {
                return Err(GraphError::DuplicateId(node.id));
            }
            if node.name.trim().is_empty() {
                node.name = default_name(node.id);
            }
            match node.kind {
                TaskKind::ToolCall if node.tool_name.as_deref().map_or(true, str::is_empty) => {
                    return Err(GraphError::MissingToolName(node.id));
                }
                TaskKind::Plan if !node.subtasks.is_empty() => {
                    return Err(GraphError::PlanWithSubtasks(node.id));
                }
                _ => {}
            }
        }

        Ok(Self { nodes, index })
    }

    /// Parse `{"tasks": [...]}` or a bare array of nodes.
    pub fn from_json(text: &str) -> Result<Self, GraphError> {
        let document: PlanDocument = serde_json::from_str(text)?;
        Self::from_document(document)
    }

    /// Same as [`TaskGraph::from_json`] for an already-parsed value.
    pub fn from_value(value: Value) -> Result<Self, GraphError> {
        let document: PlanDocument = serde_json::from_value(value)?;
        Self::from_document(document)
    }

    fn from_document(document: PlanDocument) -> Result<Self, GraphError> {
        let nodes = match document {
            PlanDocument::Wrapped { tasks } => tasks,
            PlanDocument::Bare(tasks) => tasks,
        };
        Self::new(nodes)
    }

    /// Serialize back to the `{"tasks": [...]}` document, including statuses.
    pub fn to_json(&self) -> Value {
        serde_json::json!({ "tasks": self.nodes })
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: TaskId) -> bool {
        self.index.contains_key(&id)
    }

    pub fn get(&self, id: TaskId) -> Option<&TaskNode> {
        self.index.get(&id).and_then(|&position| self.nodes.get(position))
    }

    pub fn get_mut(&mut self, id: TaskId) -> Option<&mut TaskNode> {
        let position = *self.index.get(&id)?;
        self.nodes.get_mut(position)
    }

    /// Status of a node, or `None` for an unknown id.
    pub fn status(&self, id: TaskId) -> Option<TaskStatus> {
        self.get(id).map(|node| node.status)
    }

    /// Nodes in declaration order.
    pub fn nodes(&self) -> impl Iterator<Item = &TaskNode> {
        self.nodes.iter()
    }

    /// Ids never listed as another node's subtask, in declaration order.
    ///
    /// Recomputed on every call; the graph does not store a root set.
    pub fn top_level_ids(&self) -> Vec<TaskId> {
        let children: HashSet<TaskId> = self
            .nodes
            .iter()
            .flat_map(|node| node.subtasks.iter().copied())
            .collect();

        self.nodes
            .iter()
            .map(|node| node.id)
            .filter(|id| !children.contains(id))
            .collect()
    }

    /// First node with status `Replan`, searching depth-first from the
    /// top-level ids through every composite's subtasks.
    pub fn find_replan(&self) -> Option<TaskId> {
        let mut visited = HashSet::new();
        let mut stack: Vec<TaskId> = self.top_level_ids().into_iter().rev().collect();

        while let Some(id) = stack.pop() {
            if !visited.insert(id) {
                continue;
            }
            let Some(node) = self.get(id) else {
                continue;
            };
            if node.kind == TaskKind::Plan && node.status == TaskStatus::Replan {
                return Some(id);
            }
            stack.extend(node.subtasks.iter().rev().copied());
        }

        None
    }

    /// `(owner, missing)` pairs for every subtask or dependency id that does
    /// not resolve in this graph.
    pub fn dangling_references(&self) -> Vec<(TaskId, TaskId)> {
        self.nodes
            .iter()
            .flat_map(|node| {
                node.subtasks
                    .iter()
                    .chain(node.dependencies.iter())
                    .filter(|id| !self.contains(**id))
                    .map(move |missing| (node.id, *missing))
            })
            .collect()
    }

    /// Reject any dangling reference.
    pub fn ensure_no_dangling(&self) -> Result<(), GraphError> {
        match self.dangling_references().first() {
            Some(&(owner, missing)) => Err(GraphError::DanglingReference { owner, missing }),
            None => Ok(()),
        }
    }

    /// Put every node back to `Blocked` with no captured output.
    pub fn reset(&mut self) {
        for node in &mut self.nodes {
            node.status = TaskStatus::Blocked;
            node.stdout = None;
            node.stderr = None;
        }
    }

    /// Number of nodes per status.
    pub fn status_counts(&self) -> HashMap<TaskStatus, usize> {
        let mut counts = HashMap::new();
        for node in &self.nodes {
            *counts.entry(node.status).or_insert(0) += 1;
        }
        counts
    }
}

/// Errors for malformed task collections.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error("Invalid task document: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Duplicate task id {0}")]
    DuplicateId(TaskId),

    #[error("Tool call {0} has no tool_name")]
    MissingToolName(TaskId),

    #[error("Replan marker {0} must not declare subtasks")]
    PlanWithSubtasks(TaskId),

    #[error("Task {owner} references unknown task {missing}")]
    DanglingReference { owner: TaskId, missing: TaskId },
}
