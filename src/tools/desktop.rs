//! Desktop automation tools for controlling graphical applications.
//!
//! Keyboard and mouse go through `xdotool`, window management through
//! `wmctrl`. Every command runs against the display from the tool context.
//!
//! Requires: xdotool, wmctrl

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tokio::process::Command;

use super::{require_i64, require_str, Tool, ToolContext, ToolOutput};

/// Run a command with DISPLAY set, returning `(stdout, stderr, exit_code)`.
pub(crate) async fn run_with_display(
    display: &str,
    program: &str,
    args: &[&str],
    timeout_secs: u64,
) -> anyhow::Result<(String, String, i32)> {
    let output = match tokio::time::timeout(
        Duration::from_secs(timeout_secs),
        Command::new(program)
            .args(args)
            .env("DISPLAY", display)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output(),
    )
    .await
    {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => return Err(anyhow::anyhow!("Failed to execute {}: {}", program, e)),
        Err(_) => return Err(anyhow::anyhow!("Command {} timed out", program)),
    };

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let exit_code = output.status.code().unwrap_or(-1);

    Ok((stdout, stderr, exit_code))
}

/// Run an xdotool subcommand and turn a non-zero exit into an error.
async fn xdotool(display: &str, args: &[&str]) -> anyhow::Result<()> {
    let (_, stderr, exit_code) = run_with_display(display, "xdotool", args, 10).await?;
    if exit_code != 0 {
        return Err(anyhow::anyhow!(
            "xdotool {} failed: {}",
            args.first().copied().unwrap_or_default(),
            stderr.trim()
        ));
    }
    Ok(())
}

/// One line of `wmctrl -l`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct WindowEntry {
    pub id: String,
    pub title: String,
}

/// Parse `wmctrl -l` output: `<id> <desktop> <host> <title...>`.
pub(crate) fn parse_window_list(output: &str) -> Vec<WindowEntry> {
    output
        .lines()
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            let id = parts.next()?.to_string();
            let title = parts.skip(2).collect::<Vec<_>>().join(" ");
            Some(WindowEntry { id, title })
        })
        .collect()
}

/// Translate `ctrl+shift+t` style combos into xdotool key names.
pub(crate) fn to_xdotool_keys(keys: &str) -> String {
    keys.split('+')
        .map(|part| {
            let part = part.trim();
            match part.to_lowercase().as_str() {
                "ctrl" | "control" => "ctrl".to_string(),
                "alt" => "alt".to_string(),
                "shift" => "shift".to_string(),
                "cmd" | "win" | "super" | "meta" => "super".to_string(),
                "enter" | "return" => "Return".to_string(),
                "esc" | "escape" => "Escape".to_string(),
                "tab" => "Tab".to_string(),
                "space" => "space".to_string(),
                "backspace" => "BackSpace".to_string(),
                "delete" | "del" => "Delete".to_string(),
                "up" => "Up".to_string(),
                "down" => "Down".to_string(),
                "left" => "Left".to_string(),
                "right" => "Right".to_string(),
                "home" => "Home".to_string(),
                "end" => "End".to_string(),
                "pageup" => "Page_Up".to_string(),
                "pagedown" => "Page_Down".to_string(),
                lower if lower.len() == 1 => lower.to_string(),
                _ => part.to_string(),
            }
        })
        .collect::<Vec<_>>()
        .join("+")
}

/// Find a window by name and raise it.
pub struct FocusWindow;

#[async_trait]
impl Tool for FocusWindow {
    fn name(&self) -> &str {
        "focus_window"
    }

    fn description(&self) -> &str {
        "Find a running window whose title contains the given name, switch to its desktop, raise and focus it."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "name": {
                    "type": "string",
                    "description": "Case-insensitive part of the window title"
                }
            },
            "required": ["name"]
        })
    }

    async fn call(
        &self,
        params: &Map<String, Value>,
        ctx: ToolContext<'_>,
    ) -> anyhow::Result<ToolOutput> {
        let name = require_str(params, "name")?;
        let (stdout, stderr, exit_code) =
            run_with_display(ctx.display, "wmctrl", &["-l"], 10).await?;
        if exit_code != 0 {
            return Ok(ToolOutput::failed(format!("wmctrl -l failed: {}", stderr.trim())));
        }

        let needle = name.to_lowercase();
        let Some(window) = parse_window_list(&stdout)
            .into_iter()
            .find(|w| w.title.to_lowercase().contains(&needle))
        else {
            return Ok(ToolOutput::failed(format!("Window '{}' not found", name)));
        };

        tracing::info!(window = %window.id, title = %window.title, "Focusing window");
        let (_, stderr, exit_code) =
            run_with_display(ctx.display, "wmctrl", &["-i", "-a", &window.id], 10).await?;
        if exit_code != 0 {
            return Ok(ToolOutput::failed(format!("wmctrl -a failed: {}", stderr.trim())));
        }

        tokio::time::sleep(Duration::from_millis(500)).await;
        Ok(ToolOutput::ok().with_stdout(window.title))
    }
}

/// Launch an application without waiting for it to exit.
pub struct Launch;

#[async_trait]
impl Tool for Launch {
    fn name(&self) -> &str {
        "launch"
    }

    fn description(&self) -> &str {
        "Launch an application by path or command name, then give it time to start."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Executable path or name on PATH"
                },
                "args": {
                    "type": "array",
                    "items": {"type": "string"},
                    "description": "Optional command-line arguments"
                },
                "wait_ms": {
                    "type": "integer",
                    "description": "Startup wait in milliseconds (default: 2000)"
                }
            },
            "required": ["path"]
        })
    }

    async fn call(
        &self,
        params: &Map<String, Value>,
        ctx: ToolContext<'_>,
    ) -> anyhow::Result<ToolOutput> {
        let path = require_str(params, "path")?;
        let args: Vec<&str> = params
            .get("args")
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();
        let wait_ms = params.get("wait_ms").and_then(Value::as_u64).unwrap_or(2000);

        tracing::info!(path = %path, args = ?args, "Launching application");

        let child = Command::new(path)
            .args(&args)
            .current_dir(ctx.working_dir)
            .env("DISPLAY", ctx.display)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| anyhow::anyhow!("Failed to launch {}: {}", path, e))?;

        let pid = child.id().unwrap_or(0);
        tokio::time::sleep(Duration::from_millis(wait_ms)).await;

        Ok(ToolOutput::ok().with_stdout(format!("Launched {} (pid {})", path, pid)))
    }
}

/// Send a key combination.
pub struct Hotkey;

#[async_trait]
impl Tool for Hotkey {
    fn name(&self) -> &str {
        "hotkey"
    }

    fn description(&self) -> &str {
        "Send a keyboard shortcut such as 'ctrl+t', 'alt+tab' or 'enter'."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "keys": {
                    "type": "string",
                    "description": "Keys joined with '+', e.g. 'ctrl+shift+t'"
                }
            },
            "required": ["keys"]
        })
    }

    async fn call(
        &self,
        params: &Map<String, Value>,
        ctx: ToolContext<'_>,
    ) -> anyhow::Result<ToolOutput> {
        let keys = to_xdotool_keys(require_str(params, "keys")?);
        tracing::info!(keys = %keys, "Sending hotkey");

        xdotool(ctx.display, &["key", "--clearmodifiers", &keys]).await?;
        tokio::time::sleep(Duration::from_millis(100)).await;
        Ok(ToolOutput::ok())
    }
}

/// Type text into the focused window.
pub struct TypeText;

#[async_trait]
impl Tool for TypeText {
    fn name(&self) -> &str {
        "type_text"
    }

    fn description(&self) -> &str {
        "Type text into the currently focused window. Does nothing visible if no input has focus."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "text": {
                    "type": "string",
                    "description": "The text to type"
                },
                "delay_ms": {
                    "type": "integer",
                    "description": "Delay between keystrokes in milliseconds (default: 12)"
                }
            },
            "required": ["text"]
        })
    }

    async fn call(
        &self,
        params: &Map<String, Value>,
        ctx: ToolContext<'_>,
    ) -> anyhow::Result<ToolOutput> {
        let text = require_str(params, "text")?;
        let delay = params
            .get("delay_ms")
            .and_then(Value::as_u64)
            .unwrap_or(12)
            .to_string();

        tracing::info!(chars = text.chars().count(), "Typing text");
        xdotool(ctx.display, &["type", "--delay", &delay, "--", text]).await?;
        tokio::time::sleep(Duration::from_millis(100)).await;
        Ok(ToolOutput::ok())
    }
}

/// Click at a screen position.
pub struct Click;

#[async_trait]
impl Tool for Click {
    fn name(&self) -> &str {
        "click"
    }

    fn description(&self) -> &str {
        "Click at a screen position. Coordinates are pixels from the top-left corner."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "x": {"type": "integer", "description": "X coordinate in pixels"},
                "y": {"type": "integer", "description": "Y coordinate in pixels"},
                "button": {
                    "type": "string",
                    "enum": ["left", "middle", "right"],
                    "description": "Mouse button (default: 'left')"
                },
                "double": {
                    "type": "boolean",
                    "description": "Double-click (default: false)"
                }
            },
            "required": ["x", "y"]
        })
    }

    async fn call(
        &self,
        params: &Map<String, Value>,
        ctx: ToolContext<'_>,
    ) -> anyhow::Result<ToolOutput> {
        let x = require_i64(params, "x")?.to_string();
        let y = require_i64(params, "y")?.to_string();
        let button = match params.get("button").and_then(Value::as_str).unwrap_or("left") {
            "left" => "1",
            "middle" => "2",
            "right" => "3",
            other => return Err(anyhow::anyhow!("Invalid button: {}", other)),
        };
        let repeat = if params.get("double").and_then(Value::as_bool).unwrap_or(false) {
            "2"
        } else {
            "1"
        };

        tracing::info!(x = %x, y = %y, button, "Clicking");

        xdotool(ctx.display, &["mousemove", &x, &y]).await?;
        // Let the pointer settle before the button event
        tokio::time::sleep(Duration::from_millis(50)).await;
        xdotool(ctx.display, &["click", "--repeat", repeat, button]).await?;

        Ok(ToolOutput::ok())
    }
}

/// Move the pointer without clicking.
pub struct MoveMouse;

#[async_trait]
impl Tool for MoveMouse {
    fn name(&self) -> &str {
        "move_mouse"
    }

    fn description(&self) -> &str {
        "Move the mouse pointer to a screen position without clicking."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "x": {"type": "integer", "description": "X coordinate in pixels"},
                "y": {"type": "integer", "description": "Y coordinate in pixels"}
            },
            "required": ["x", "y"]
        })
    }

    async fn call(
        &self,
        params: &Map<String, Value>,
        ctx: ToolContext<'_>,
    ) -> anyhow::Result<ToolOutput> {
        let x = require_i64(params, "x")?.to_string();
        let y = require_i64(params, "y")?.to_string();
        xdotool(ctx.display, &["mousemove", &x, &y]).await?;
        Ok(ToolOutput::ok())
    }
}

/// Pause for a while, e.g. to let a page load.
pub struct Wait;

const MAX_WAIT_SECS: f64 = 60.0;

#[async_trait]
impl Tool for Wait {
    fn name(&self) -> &str {
        "wait"
    }

    fn description(&self) -> &str {
        "Wait for the given number of seconds (at most 60)."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "seconds": {"type": "number", "description": "Seconds to wait (default: 1)"}
            }
        })
    }

    async fn call(
        &self,
        params: &Map<String, Value>,
        _ctx: ToolContext<'_>,
    ) -> anyhow::Result<ToolOutput> {
        let seconds = params
            .get("seconds")
            .and_then(Value::as_f64)
            .unwrap_or(1.0)
            .clamp(0.0, MAX_WAIT_SECS);
        tokio::time::sleep(Duration::from_secs_f64(seconds)).await;
        Ok(ToolOutput::ok())
    }
}

/// List open windows into the task's stdout.
pub struct ListWindows;

#[async_trait]
impl Tool for ListWindows {
    fn name(&self) -> &str {
        "list_windows"
    }

    fn description(&self) -> &str {
        "List the titles of all open windows. The list is recorded in the task output."
    }

    fn parameters_schema(&self) -> Value {
        json!({"type": "object", "properties": {}})
    }

    async fn call(
        &self,
        _params: &Map<String, Value>,
        mut ctx: ToolContext<'_>,
    ) -> anyhow::Result<ToolOutput> {
        let (stdout, stderr, exit_code) =
            run_with_display(ctx.display, "wmctrl", &["-l"], 10).await?;
        if exit_code != 0 {
            return Ok(ToolOutput::failed(format!("wmctrl -l failed: {}", stderr.trim())));
        }

        let listing: String = parse_window_list(&stdout)
            .into_iter()
            .map(|w| format!("{}\n", w.title))
            .collect();

        match ctx.sink.as_mut() {
            Some(sink) => {
                sink.write_stdout(&listing);
                Ok(ToolOutput::ok())
            }
            None => Ok(ToolOutput::ok().with_stdout(listing)),
        }
    }
}
