//! Human-readable plan and status reports.

use std::collections::HashSet;
use std::fmt::Write;

use serde_json::Value;

use super::graph::TaskGraph;
use super::node::{TaskId, TaskKind, TaskNode, TaskStatus};

/// Render the plan as an indented tree rooted at the top-level ids.
pub fn render_plan(graph: &TaskGraph) -> String {
    let mut out = String::new();
    let mut visited = HashSet::new();
    for id in graph.top_level_ids() {
        write_plan_node(graph, id, 0, &mut visited, &mut out);
    }
    out
}

fn write_plan_node(
    graph: &TaskGraph,
    id: TaskId,
    depth: usize,
    visited: &mut HashSet<TaskId>,
    out: &mut String,
) {
    let indent = "  ".repeat(depth);
    let Some(node) = graph.get(id) else {
        let _ = writeln!(out, "{}- <missing task {}>", indent, id);
        return;
    };
    if !visited.insert(id) {
        let _ = writeln!(out, "{}- {} (cycle)", indent, node.name);
        return;
    }

    let mut line = format!("{}- {}", indent, node.name);
    match node.kind {
        TaskKind::ToolCall => {
            let _ = write!(
                line,
                " [tool: {}({})]",
                node.tool_name.as_deref().unwrap_or("?"),
                format_params(node)
            );
        }
        TaskKind::Plan => line.push_str(" [replan]"),
        TaskKind::Task => {}
    }
    if node.verify_screen_change {
        line.push_str(" [verify screen]");
    }
    if !node.dependencies.is_empty() {
        let names: Vec<String> = node
            .dependencies
            .iter()
            .map(|dep| {
                graph
                    .get(*dep)
                    .map(|n| n.name.clone())
                    .unwrap_or_else(|| format!("<missing {}>", dep))
            })
            .collect();
        let _ = write!(line, " (depends on: {})", names.join(", "));
    }
    let _ = writeln!(out, "{}", line);

    for child in &node.subtasks {
        write_plan_node(graph, *child, depth + 1, visited, out);
    }
}

fn format_params(node: &TaskNode) -> String {
    node.params
        .iter()
        .map(|(key, value)| match value {
            Value::String(s) => format!("{}={:?}", key, s),
            other => format!("{}={}", key, other),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Render one status line per node in declaration order.
pub fn render_summary(graph: &TaskGraph) -> String {
    let mut out = String::new();
    for node in graph.nodes() {
        let reason = node.stderr.as_deref().map(str::trim).filter(|s| !s.is_empty());
        let line = match node.status {
            TaskStatus::Success => format!("✓ {} ({})", node.name, node.id),
            TaskStatus::Error => match reason {
                Some(reason) => format!("✗ {} ({}): {}", node.name, node.id, reason),
                None => format!("✗ {} ({})", node.name, node.id),
            },
            TaskStatus::Blocked => match reason {
                Some(reason) => format!("- {} ({}) blocked: {}", node.name, node.id, reason),
                None => format!("- {} ({}) blocked", node.name, node.id),
            },
            TaskStatus::Replan => format!("↻ {} ({}) needs replanning", node.name, node.id),
            TaskStatus::Running => format!("… {} ({}) running", node.name, node.id),
        };
        let _ = writeln!(out, "{}", line);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_render_plan_tree() {
        let graph = TaskGraph::new(vec![
            TaskNode::task(0, vec![1, 2]).with_name("Open browser").with_verification(),
            TaskNode::tool_call(1, "hotkey", json!({"keys": "ctrl+t"})).with_name("New tab"),
            TaskNode::plan(2).with_name("Decide").with_dependencies(vec![1]),
        ])
        .unwrap();

        let rendered = render_plan(&graph);
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines[0], "- Open browser [verify screen]");
        assert_eq!(lines[1], "  - New tab [tool: hotkey(keys=\"ctrl+t\")]");
        assert_eq!(lines[2], "  - Decide [replan] (depends on: New tab)");
    }

    #[test]
    fn test_render_summary_reasons() {
        let mut graph = TaskGraph::new(vec![
            TaskNode::tool_call(1, "add", json!({})),
            TaskNode::tool_call(2, "noop", json!({})),
        ])
        .unwrap();
        let first = graph.get_mut(TaskId(1)).unwrap();
        first.status = TaskStatus::Error;
        first.stderr = Some("boom\n".to_string());
        graph.get_mut(TaskId(2)).unwrap().stderr = Some("blocked by failure of task 1".to_string());

        let summary = render_summary(&graph);
        assert!(summary.contains("✗ Task 1 (1): boom"));
        assert!(summary.contains("- Task 2 (2) blocked: blocked by failure of task 1"));
    }
}
