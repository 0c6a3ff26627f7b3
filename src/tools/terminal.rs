//! Shell command execution tool.
//!
//! `run_shell_command` is a task-context tool: its output is streamed into
//! the owning node's stdout/stderr instead of being summarized in the return
//! value. Commands run in the workspace unless `cwd` says otherwise.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tokio::process::Command;

use super::{require_str, Tool, ToolContext, ToolOutput};

const MAX_OUTPUT_BYTES: usize = 10_000;

/// Sanitize command output so it can be shown to a person or a model.
/// Removes binary garbage while preserving valid text.
pub(crate) fn sanitize_output(bytes: &[u8]) -> String {
    let non_printable_count = bytes
        .iter()
        .filter(|&&b| b < 0x20 && b != b'\n' && b != b'\r' && b != b'\t')
        .count();

    // More than 10% control bytes means binary
    if bytes.len() > 100 && non_printable_count > bytes.len() / 10 {
        return format!(
            "[Binary output - {} bytes, {}% non-printable]",
            bytes.len(),
            non_printable_count * 100 / bytes.len()
        );
    }

    let text: String = String::from_utf8_lossy(bytes)
        .chars()
        .filter(|&c| c == '\n' || c == '\r' || c == '\t' || (c >= ' ' && c != '\u{FFFD}'))
        .collect();

    truncate_on_char_boundary(text, MAX_OUTPUT_BYTES)
}

fn truncate_on_char_boundary(mut text: String, max: usize) -> String {
    if text.len() <= max {
        return text;
    }
    let mut cut = max;
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    text.truncate(cut);
    text.push_str("\n... [output truncated]");
    text
}

/// Command patterns that are refused outright.
const DANGEROUS_PATTERNS: &[(&str, &str)] = &[
    ("rm -rf /", "This would destroy the entire system"),
    ("rm -rf /*", "This would destroy the entire system"),
    ("rm -rf ~", "This would delete the home directory"),
    ("mkfs", "Formatting filesystems is blocked"),
    ("> /dev/", "Writing to device files is blocked"),
    ("dd if=/dev/", "Direct disk operations are blocked"),
    (":(){", "Fork bombs are blocked"),
    ("shutdown", "Powering off the machine is blocked"),
    ("reboot", "Rebooting the machine is blocked"),
    ("find / ", "Use a specific directory path instead of root"),
    ("grep -r /", "Use a specific directory path instead of root"),
];

/// Validate a command against dangerous patterns.
/// Returns Ok(()) if safe, Err with the reason if blocked.
pub(crate) fn validate_command(cmd: &str) -> Result<(), String> {
    let trimmed = cmd.trim();
    let prefixes = ["sudo ", "time ", "nice ", "nohup "];

    let mut candidates = vec![trimmed];
    for prefix in prefixes {
        if let Some(rest) = trimmed.strip_prefix(prefix) {
            candidates.push(rest.trim_start());
        }
    }

    for (pattern, reason) in DANGEROUS_PATTERNS {
        if candidates.iter().any(|c| c.starts_with(pattern)) {
            return Err(format!(
                "Blocked dangerous command pattern '{}'. {}",
                pattern, reason
            ));
        }
    }

    Ok(())
}

fn resolve_cwd(cwd: Option<&str>, working_dir: &Path) -> PathBuf {
    match cwd.map(Path::new) {
        Some(path) if path.is_absolute() => path.to_path_buf(),
        Some(path) => working_dir.join(path),
        None => working_dir.to_path_buf(),
    }
}

/// Run a shell command through `/bin/sh -c`.
pub struct RunShellCommand;

#[async_trait]
impl Tool for RunShellCommand {
    fn name(&self) -> &str {
        "run_shell_command"
    }

    fn description(&self) -> &str {
        "Execute a shell command and capture its output into the task. Runs in the workspace by default."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "The shell command to execute"
                },
                "cwd": {
                    "type": "string",
                    "description": "Optional working directory, relative to the workspace or absolute"
                },
                "timeout_secs": {
                    "type": "integer",
                    "description": "Timeout in seconds (default: 60)"
                }
            },
            "required": ["command"]
        })
    }

    async fn call(
        &self,
        params: &Map<String, Value>,
        mut ctx: ToolContext<'_>,
    ) -> anyhow::Result<ToolOutput> {
        let command = require_str(params, "command")?;

        if let Err(msg) = validate_command(command) {
            tracing::warn!(command = %command, "Blocked dangerous command");
            return Err(anyhow::anyhow!("{}", msg));
        }

        let cwd = resolve_cwd(params.get("cwd").and_then(Value::as_str), ctx.working_dir);
        let timeout_secs = params
            .get("timeout_secs")
            .and_then(Value::as_u64)
            .unwrap_or(60);

        tracing::info!(cwd = ?cwd, command = %command, "Executing shell command");

        let output = match tokio::time::timeout(
            std::time::Duration::from_secs(timeout_secs),
            Command::new("/bin/sh")
                .arg("-c")
                .arg(command)
                .current_dir(&cwd)
                .env("DISPLAY", ctx.display)
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .kill_on_drop(true)
                .output(),
        )
        .await
        {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(anyhow::anyhow!("Failed to execute command: {}", e));
            }
            Err(_) => {
                return Err(anyhow::anyhow!(
                    "Command timed out after {} seconds",
                    timeout_secs
                ));
            }
        };

        let stdout = sanitize_output(&output.stdout);
        let stderr = sanitize_output(&output.stderr);
        let exit_code = output.status.code().unwrap_or(-1);

        tracing::debug!(
            exit_code,
            stdout_len = stdout.len(),
            stderr_len = stderr.len(),
            "Shell command completed"
        );

        let mut result = if exit_code == 0 {
            ToolOutput::ok()
        } else {
            ToolOutput {
                success: false,
                ..Default::default()
            }
        }
        .with_exit_code(exit_code);

        match ctx.sink.as_mut() {
            Some(sink) => {
                sink.write_stdout(&stdout);
                sink.write_stderr(&stderr);
            }
            None => {
                result.stdout = Some(stdout).filter(|s| !s.is_empty());
                result.stderr = Some(stderr).filter(|s| !s.is_empty());
            }
        }

        if !result.success && result.stderr.is_none() {
            result.stderr = Some(format!("Command exited with code {}", exit_code));
        }

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::TaskNode;
    use crate::tools::TaskSink;

    #[test]
    fn test_validate_command() {
        assert!(validate_command("ls -la").is_ok());
        assert!(validate_command("rm -rf /").is_err());
        assert!(validate_command("sudo rm -rf /").is_err());
        assert!(validate_command("  nohup  dd if=/dev/zero of=x").is_err());
        assert!(validate_command("echo reboot").is_ok());
    }

    #[test]
    fn test_sanitize_output() {
        assert_eq!(sanitize_output(b"hello\x00 world\n"), "hello world\n");

        let binary = vec![0x01u8; 200];
        assert!(sanitize_output(&binary).starts_with("[Binary output"));

        let long = "é".repeat(MAX_OUTPUT_BYTES);
        let truncated = sanitize_output(long.as_bytes());
        assert!(truncated.ends_with("[output truncated]"));
    }

    #[test]
    fn test_resolve_cwd() {
        let workspace = Path::new("/work");
        assert_eq!(resolve_cwd(None, workspace), PathBuf::from("/work"));
        assert_eq!(resolve_cwd(Some("sub"), workspace), PathBuf::from("/work/sub"));
        assert_eq!(resolve_cwd(Some("/tmp"), workspace), PathBuf::from("/tmp"));
    }

    #[tokio::test]
    async fn test_command_output_goes_into_task() {
        let dir = tempfile::tempdir().unwrap();
        let mut node = TaskNode::tool_call(1, "run_shell_command", json!({}));
        let params = json!({"command": "echo out; echo err >&2; exit 3"});

        let output = RunShellCommand
            .call(
                params.as_object().unwrap(),
                ToolContext {
                    working_dir: dir.path(),
                    display: ":0",
                    sink: Some(TaskSink::new(&mut node.stdout, &mut node.stderr)),
                },
            )
            .await
            .unwrap();

        assert!(!output.success);
        assert_eq!(output.exit_code, Some(3));
        assert_eq!(node.stdout.as_deref(), Some("out\n"));
        assert_eq!(node.stderr.as_deref(), Some("err\n"));
    }

    #[tokio::test]
    async fn test_timed_out_command_is_killed() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("marker");
        let params = json!({
            "command": format!("sleep 2; touch {}", marker.display()),
            "timeout_secs": 1
        });

        let result = RunShellCommand
            .call(
                params.as_object().unwrap(),
                ToolContext {
                    working_dir: dir.path(),
                    display: ":0",
                    sink: None,
                },
            )
            .await;
        let err = result.unwrap_err();
        assert!(err.to_string().contains("timed out"));

        tokio::time::sleep(std::time::Duration::from_secs(3)).await;
        assert!(!marker.exists());
    }

    #[tokio::test]
    async fn test_blocked_command_is_an_error() {
        let params = json!({"command": "rm -rf /"});
        let result = RunShellCommand
            .call(
                params.as_object().unwrap(),
                ToolContext {
                    working_dir: Path::new("."),
                    display: ":0",
                    sink: None,
                },
            )
            .await;
        assert!(result.is_err());
    }
}
