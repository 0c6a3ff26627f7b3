//! Tool system for the executor.
//!
//! Tools are the side-effecting leaves of a plan: a `tool_call` node names a
//! tool and supplies its parameters, and the scheduler dispatches it through
//! the [`ToolRegistry`].
//!
//! ## Task context
//!
//! Most tools report only through their [`ToolOutput`]. The tools listed in
//! [`TASK_CONTEXT_TOOLS`] also receive a [`TaskSink`] that writes straight into
//! the owning node's `stdout`/`stderr`, because their natural output is long
//! or structured (shell output, window listings).

mod desktop;
mod terminal;

pub use desktop::{Click, FocusWindow, Hotkey, Launch, ListWindows, MoveMouse, TypeText, Wait};
pub(crate) use desktop::run_with_display;
pub use terminal::RunShellCommand;

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::llm::{FunctionDefinition, ToolDefinition};
use crate::task::TaskNode;

/// Tools that receive the owning node as extra context.
pub const TASK_CONTEXT_TOOLS: [&str; 2] = ["run_shell_command", "list_windows"];

/// Information about a tool for display purposes.
#[derive(Debug, Clone)]
pub struct ToolInfo {
    pub name: String,
    pub description: String,
}

/// Result of one tool call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolOutput {
    pub success: bool,
    pub stdout: Option<String>,
    pub stderr: Option<String>,
    pub exit_code: Option<i32>,
}

impl ToolOutput {
    /// A successful call with no output.
    pub fn ok() -> Self {
        Self {
            success: true,
            ..Default::default()
        }
    }

    /// A failed call with a reason.
    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            success: false,
            stderr: Some(reason.into()),
            ..Default::default()
        }
    }

    pub fn with_stdout(mut self, stdout: impl Into<String>) -> Self {
        self.stdout = Some(stdout.into());
        self
    }

    pub fn with_exit_code(mut self, exit_code: i32) -> Self {
        self.exit_code = Some(exit_code);
        self
    }
}

/// Write access to the owning node's output fields.
pub struct TaskSink<'a> {
    stdout: &'a mut Option<String>,
    stderr: &'a mut Option<String>,
}

impl<'a> TaskSink<'a> {
    pub fn new(stdout: &'a mut Option<String>, stderr: &'a mut Option<String>) -> Self {
        Self { stdout, stderr }
    }

    /// Append to the node's stdout.
    pub fn write_stdout(&mut self, text: &str) {
        append(self.stdout, text);
    }

    /// Append to the node's stderr.
    pub fn write_stderr(&mut self, text: &str) {
        append(self.stderr, text);
    }
}

fn append(slot: &mut Option<String>, text: &str) {
    if text.is_empty() {
        return;
    }
    match slot {
        Some(existing) => existing.push_str(text),
        None => *slot = Some(text.to_string()),
    }
}

/// Environment handed to every tool call.
pub struct ToolContext<'a> {
    /// Default directory for relative paths.
    pub working_dir: &'a Path,
    /// X display used by desktop tools.
    pub display: &'a str,
    /// Present only for [`TASK_CONTEXT_TOOLS`].
    pub sink: Option<TaskSink<'a>>,
}

/// Trait for implementing tools.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool.
    fn name(&self) -> &str;

    /// A description of what this tool does.
    fn description(&self) -> &str;

    /// JSON schema for the tool's parameters.
    fn parameters_schema(&self) -> Value;

    /// Perform the side effect.
    ///
    /// Returning `Err` is treated exactly like a failed [`ToolOutput`]: the
    /// error text lands in the node's stderr.
    async fn call(
        &self,
        params: &Map<String, Value>,
        ctx: ToolContext<'_>,
    ) -> anyhow::Result<ToolOutput>;
}

/// Errors surfaced by [`ToolRegistry::dispatch`].
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("{0}")]
    Failed(#[source] anyhow::Error),
}

/// Registry of available tools.
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    /// Create a new registry with the built-in desktop and shell tools.
    pub fn new() -> Self {
        let mut registry = Self::empty();

        registry.register(Arc::new(terminal::RunShellCommand));

        // Desktop (X11 via xdotool / wmctrl)
        registry.register(Arc::new(desktop::FocusWindow));
        registry.register(Arc::new(desktop::Launch));
        registry.register(Arc::new(desktop::Hotkey));
        registry.register(Arc::new(desktop::TypeText));
        registry.register(Arc::new(desktop::Click));
        registry.register(Arc::new(desktop::MoveMouse));
        registry.register(Arc::new(desktop::Wait));
        registry.register(Arc::new(desktop::ListWindows));

        tracing::debug!(tools = registry.tools.len(), "Tool registry ready");
        registry
    }

    /// Create an empty registry (no built-in tools).
    pub fn empty() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Add a tool, replacing any tool with the same name.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Check if a tool exists by name.
    pub fn has_tool(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// List all available tools, sorted by name.
    pub fn list_tools(&self) -> Vec<ToolInfo> {
        let mut tools: Vec<ToolInfo> = self
            .tools
            .values()
            .map(|t| ToolInfo {
                name: t.name().to_string(),
                description: t.description().to_string(),
            })
            .collect();
        tools.sort_by(|a, b| a.name.cmp(&b.name));
        tools
    }

    /// Get tool schemas in LLM-compatible format.
    pub fn tool_schemas(&self) -> Vec<ToolDefinition> {
        let mut schemas: Vec<ToolDefinition> = self
            .tools
            .values()
            .map(|t| ToolDefinition {
                tool_type: "function".to_string(),
                function: FunctionDefinition {
                    name: t.name().to_string(),
                    description: t.description().to_string(),
                    parameters: t.parameters_schema(),
                },
            })
            .collect();
        schemas.sort_by(|a, b| a.function.name.cmp(&b.function.name));
        schemas
    }

    /// Invoke the tool named by a `tool_call` node.
    ///
    /// Reserved task-context tools write into the node's stdout/stderr while
    /// they run; every other tool only returns a [`ToolOutput`].
    pub async fn dispatch(
        &self,
        node: &mut TaskNode,
        working_dir: &Path,
        display: &str,
    ) -> Result<ToolOutput, ToolError> {
        let TaskNode {
            tool_name,
            params,
            stdout,
            stderr,
            ..
        } = node;

        let name = tool_name.as_deref().unwrap_or_default();
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;

        let sink = if TASK_CONTEXT_TOOLS.iter().any(|reserved| *reserved == name) {
            Some(TaskSink::new(stdout, stderr))
        } else {
            None
        };
        let ctx = ToolContext {
            working_dir,
            display,
            sink,
        };

        tool.call(params, ctx).await.map_err(ToolError::Failed)
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Read a required string parameter.
pub(crate) fn require_str<'a>(params: &'a Map<String, Value>, key: &str) -> anyhow::Result<&'a str> {
    params
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| anyhow::anyhow!("Missing '{}' argument", key))
}

/// Read a required integer parameter.
pub(crate) fn require_i64(params: &Map<String, Value>, key: &str) -> anyhow::Result<i64> {
    params
        .get(key)
        .and_then(Value::as_i64)
        .ok_or_else(|| anyhow::anyhow!("Missing '{}' argument", key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    /// Echoes its `text` param into whichever channel it can reach.
    struct Echo(&'static str);

    #[async_trait]
    impl Tool for Echo {
        fn name(&self) -> &str {
            self.0
        }

        fn description(&self) -> &str {
            "echo"
        }

        fn parameters_schema(&self) -> Value {
            json!({"type": "object"})
        }

        async fn call(
            &self,
            params: &Map<String, Value>,
            mut ctx: ToolContext<'_>,
        ) -> anyhow::Result<ToolOutput> {
            let text = require_str(params, "text")?;
            match ctx.sink.as_mut() {
                Some(sink) => {
                    sink.write_stdout(text);
                    Ok(ToolOutput::ok())
                }
                None => Ok(ToolOutput::ok().with_stdout(text)),
            }
        }
    }

    fn registry() -> ToolRegistry {
        let mut registry = ToolRegistry::empty();
        registry.register(Arc::new(Echo("run_shell_command")));
        registry.register(Arc::new(Echo("echo")));
        registry
    }

    #[tokio::test]
    async fn test_reserved_tool_writes_into_node() {
        let mut node = TaskNode::tool_call(1, "run_shell_command", json!({"text": "hello"}));
        let output = registry()
            .dispatch(&mut node, Path::new("."), ":0")
            .await
            .unwrap();

        assert!(output.success);
        assert_eq!(output.stdout, None);
        assert_eq!(node.stdout.as_deref(), Some("hello"));
    }

    #[tokio::test]
    async fn test_plain_tool_reports_through_output() {
        let mut node = TaskNode::tool_call(1, "echo", json!({"text": "hello"}));
        let output = registry()
            .dispatch(&mut node, Path::new("."), ":0")
            .await
            .unwrap();

        assert_eq!(output.stdout.as_deref(), Some("hello"));
        assert!(node.stdout.is_none());
    }

    #[tokio::test]
    async fn test_unknown_tool_and_tool_error() {
        let mut node = TaskNode::tool_call(1, "missing", json!({}));
        let err = registry()
            .dispatch(&mut node, Path::new("."), ":0")
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::UnknownTool(ref name) if name == "missing"));

        let mut node = TaskNode::tool_call(2, "echo", json!({}));
        let err = registry()
            .dispatch(&mut node, Path::new("."), ":0")
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Missing 'text' argument");
    }

    #[test]
    fn test_default_registry_lists_reserved_tools() {
        let registry = ToolRegistry::new();
        for name in TASK_CONTEXT_TOOLS {
            assert!(registry.has_tool(name), "{} should be registered", name);
        }
        let names: Vec<String> = registry.list_tools().into_iter().map(|t| t.name).collect();
        let mut sorted = names.clone();
        sorted.sort();
        assert_eq!(names, sorted);
        assert_eq!(registry.tool_schemas().len(), names.len());
    }
}
