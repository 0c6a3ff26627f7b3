//! Task node - one entry in a plan's flat task collection.
//!
//! # Invariants
//! - `id` is unique within one `TaskGraph`
//! - `subtasks` is empty for `ToolCall` and `Plan` nodes
//! - `status` starts as `Blocked` and is mutated only by the scheduler

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Identifier of a node within one plan.
///
/// Ids are small integers chosen by the planner. They are lookup keys into the
/// owning `TaskGraph`, not global identities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub u32);

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for TaskId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

/// What a node does when the scheduler reaches it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    /// Composite node grouping subtasks
    #[default]
    Task,
    /// Leaf invocation of a registered tool
    ToolCall,
    /// Replan marker: terminal, childless, asks for a new plan
    Plan,
}

/// Execution status of a node.
///
/// # State Machine
/// ```text
/// Blocked -> Running -> Success
///                   \-> Error
///                   \-> Replan
/// Blocked (stays blocked when a stall or prior failure prevents it from running)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    #[default]
    Blocked,
    Running,
    Success,
    Error,
    Replan,
}

impl TaskStatus {
    /// Whether this status ends the node's current attempt.
    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Success | Self::Error | Self::Replan)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Blocked => write!(f, "blocked"),
            Self::Running => write!(f, "running"),
            Self::Success => write!(f, "success"),
            Self::Error => write!(f, "error"),
            Self::Replan => write!(f, "replan"),
        }
    }
}

/// A node in the plan graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskNode {
    pub id: TaskId,

    /// Human-readable label. Synthesized from the id when the planner omits it.
    #[serde(default)]
    pub name: String,

    #[serde(rename = "type", alias = "kind", default)]
    pub kind: TaskKind,

    /// Ids of child nodes, resolved against the same collection.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subtasks: Vec<TaskId>,

    /// Ids that must reach `Success` before this node may run.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<TaskId>,

    #[serde(default)]
    pub verify_screen_change: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,

    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub params: Map<String, Value>,

    #[serde(default)]
    pub status: TaskStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stdout: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stderr: Option<String>,
}

impl TaskNode {
    /// Create a composite task with the given subtasks.
    pub fn task(id: u32, subtasks: Vec<u32>) -> Self {
        Self::bare(id, TaskKind::Task).with_subtasks(subtasks)
    }

    /// Create a tool call leaf.
    pub fn tool_call(id: u32, tool_name: impl Into<String>, params: Value) -> Self {
        let mut node = Self::bare(id, TaskKind::ToolCall);
        node.tool_name = Some(tool_name.into());
        if let Value::Object(map) = params {
            node.params = map;
        }
        node
    }

    /// Create a replan marker.
    pub fn plan(id: u32) -> Self {
        Self::bare(id, TaskKind::Plan)
    }

    fn bare(id: u32, kind: TaskKind) -> Self {
        Self {
            id: TaskId(id),
            name: default_name(TaskId(id)),
            kind,
            subtasks: Vec::new(),
            dependencies: Vec::new(),
            verify_screen_change: false,
            tool_name: None,
            params: Map::new(),
            status: TaskStatus::Blocked,
            stdout: None,
            stderr: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_subtasks(mut self, subtasks: Vec<u32>) -> Self {
        self.subtasks = subtasks.into_iter().map(TaskId).collect();
        self
    }

    pub fn with_dependencies(mut self, dependencies: Vec<u32>) -> Self {
        self.dependencies = dependencies.into_iter().map(TaskId).collect();
        self
    }

    pub fn with_verification(mut self) -> Self {
        self.verify_screen_change = true;
        self
    }

    /// Record stdout unless a value is already present for this attempt.
    pub fn set_stdout_once(&mut self, text: impl Into<String>) {
        if self.stdout.is_none() {
            self.stdout = Some(text.into());
        }
    }

    /// Record stderr unless a value is already present for this attempt.
    pub fn set_stderr_once(&mut self, text: impl Into<String>) {
        if self.stderr.is_none() {
            self.stderr = Some(text.into());
        }
    }
}

/// Default label for a node without a name.
pub(crate) fn default_name(id: TaskId) -> String {
    format!("Task {}", id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_original_task_shape() {
        let node: TaskNode = serde_json::from_value(json!({
            "id": 1,
            "type": "tool_call",
            "tool_name": "hotkey",
            "params": {"keys": "ctrl+t"}
        }))
        .unwrap();

        assert_eq!(node.id, TaskId(1));
        assert_eq!(node.kind, TaskKind::ToolCall);
        assert_eq!(node.status, TaskStatus::Blocked);
        assert_eq!(node.params["keys"], "ctrl+t");
        assert!(node.subtasks.is_empty());
        assert!(!node.verify_screen_change);
    }

    #[test]
    fn test_kind_alias_and_default() {
        let plan: TaskNode = serde_json::from_value(json!({"id": 4, "kind": "plan"})).unwrap();
        assert_eq!(plan.kind, TaskKind::Plan);

        let composite: TaskNode =
            serde_json::from_value(json!({"id": 0, "subtasks": [1, 2]})).unwrap();
        assert_eq!(composite.kind, TaskKind::Task);
        assert_eq!(composite.subtasks, vec![TaskId(1), TaskId(2)]);
    }

    #[test]
    fn test_output_is_set_once() {
        let mut node = TaskNode::tool_call(2, "noop", json!({}));
        node.set_stderr_once("first");
        node.set_stderr_once("second");
        assert_eq!(node.stderr.as_deref(), Some("first"));
    }

    #[test]
    fn test_status_serialization() {
        assert_eq!(serde_json::to_value(TaskStatus::Replan).unwrap(), json!("replan"));
        assert!(TaskStatus::Error.is_finished());
        assert!(!TaskStatus::Blocked.is_finished());
    }
}
