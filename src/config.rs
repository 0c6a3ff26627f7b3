//! Configuration management for kyros.
//!
//! Configuration is read from environment variables:
//! - `OPENROUTER_API_KEY` - Required for the LLM planner and vision comparison.
//! - `KYROS_MODEL` - Optional. Planner model. Defaults to `anthropic/claude-sonnet-4.5`.
//! - `KYROS_VISION_MODEL` - Optional. Vision model. Defaults to `KYROS_MODEL`.
//! - `WORKSPACE_PATH` - Optional. Working directory for tools and screenshots. Defaults to current directory.
//! - `DISPLAY` - Optional. X display. Defaults to `:0`.
//! - `KYROS_MAX_ATTEMPTS` - Optional. Planning attempts per run. Defaults to `3`.
//! - `KYROS_STEP_DELAY_MS` - Optional. Pause after each successful task. Defaults to `500`.
//! - `KYROS_SETTLE_MS` - Optional. Wait before the second screenshot. Defaults to `2000`.
//! - `KYROS_SCREEN_COMPARATOR` - Optional. `digest` or `vision`. Defaults to `digest`.
//! - `KYROS_STRICT_GRAPH` - Optional. Reject plans with unknown task ids. Defaults to `false`.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::executor::SchedulerConfig;

const DEFAULT_MODEL: &str = "anthropic/claude-sonnet-4.5";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

/// How screenshots are compared during verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ComparatorKind {
    /// Byte digest; any pixel change counts
    #[default]
    Digest,
    /// Ask a vision model
    Vision,
}

impl FromStr for ComparatorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "digest" | "hash" => Ok(Self::Digest),
            "vision" | "llm" => Ok(Self::Vision),
            other => Err(format!("expected `digest` or `vision`, got `{}`", other)),
        }
    }
}

/// Runtime configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// OpenRouter API key
    pub api_key: Option<String>,

    /// Planner model identifier (OpenRouter format)
    pub model: String,

    /// Model used for screenshot comparison
    pub vision_model: String,

    /// Working directory for tools; screenshots go under `screenshots/`
    pub workspace: PathBuf,

    /// X display for desktop tools
    pub display: String,

    pub max_attempts: u32,

    pub step_delay: Duration,

    /// Wait between the action and the second screenshot
    pub settle: Duration,

    pub comparator: ComparatorKind,

    /// Reject graphs with dangling ids instead of skipping them
    pub strict_graph: bool,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` for unparseable numbers, booleans
    /// or comparator names.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let model = get("KYROS_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let vision_model = get("KYROS_VISION_MODEL").unwrap_or_else(|| model.clone());

        let workspace = get("WORKSPACE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

        let comparator = match get("KYROS_SCREEN_COMPARATOR") {
            Some(value) => value.parse().map_err(|e| {
                ConfigError::InvalidValue("KYROS_SCREEN_COMPARATOR".to_string(), e)
            })?,
            None => ComparatorKind::default(),
        };

        Ok(Self {
            api_key: get("OPENROUTER_API_KEY"),
            model,
            vision_model,
            workspace,
            display: get("DISPLAY").unwrap_or_else(|| ":0".to_string()),
            max_attempts: parse_or(&get, "KYROS_MAX_ATTEMPTS", 3)?,
            step_delay: Duration::from_millis(parse_or(&get, "KYROS_STEP_DELAY_MS", 500)?),
            settle: Duration::from_millis(parse_or(&get, "KYROS_SETTLE_MS", 2000)?),
            comparator,
            strict_graph: parse_bool(&get, "KYROS_STRICT_GRAPH")?,
        })
    }

    /// The API key, for commands that talk to OpenRouter.
    pub fn require_api_key(&self) -> Result<&str, ConfigError> {
        self.api_key
            .as_deref()
            .ok_or_else(|| ConfigError::MissingEnvVar("OPENROUTER_API_KEY".to_string()))
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            step_delay: self.step_delay,
            working_dir: self.workspace.clone(),
            display: self.display.clone(),
            strict_graph: self.strict_graph,
        }
    }
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|e: T::Err| ConfigError::InvalidValue(key.to_string(), e.to_string())),
        None => Ok(default),
    }
}

fn parse_bool<G>(get: &G, key: &str) -> Result<bool, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    match get(key).map(|v| v.trim().to_lowercase()).as_deref() {
        None | Some("0") | Some("false") | Some("no") | Some("off") => Ok(false),
        Some("1") | Some("true") | Some("yes") | Some("on") => Ok(true),
        Some(other) => Err(ConfigError::InvalidValue(
            key.to_string(),
            format!("expected a boolean, got `{}`", other),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config(&[]).unwrap();
        assert!(config.api_key.is_none());
        assert_eq!(config.model, DEFAULT_MODEL);
        assert_eq!(config.vision_model, DEFAULT_MODEL);
        assert_eq!(config.display, ":0");
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.step_delay, Duration::from_millis(500));
        assert_eq!(config.settle, Duration::from_secs(2));
        assert_eq!(config.comparator, ComparatorKind::Digest);
        assert!(!config.strict_graph);
        assert!(matches!(
            config.require_api_key(),
            Err(ConfigError::MissingEnvVar(_))
        ));
    }

    #[test]
    fn test_overrides() {
        let config = config(&[
            ("OPENROUTER_API_KEY", "sk-test"),
            ("KYROS_MODEL", "openai/gpt-4o"),
            ("WORKSPACE_PATH", "/tmp/kyros"),
            ("DISPLAY", ":1"),
            ("KYROS_MAX_ATTEMPTS", "5"),
            ("KYROS_STEP_DELAY_MS", "0"),
            ("KYROS_SCREEN_COMPARATOR", "Vision"),
            ("KYROS_STRICT_GRAPH", "yes"),
        ])
        .unwrap();
        assert_eq!(config.require_api_key().unwrap(), "sk-test");
        assert_eq!(config.vision_model, "openai/gpt-4o");
        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.comparator, ComparatorKind::Vision);

        let scheduler = config.scheduler_config();
        assert_eq!(scheduler.working_dir, PathBuf::from("/tmp/kyros"));
        assert_eq!(scheduler.display, ":1");
        assert!(scheduler.step_delay.is_zero());
        assert!(scheduler.strict_graph);
    }

    #[test]
    fn test_invalid_values() {
        let err = config(&[("KYROS_MAX_ATTEMPTS", "many")]).unwrap_err();
        assert!(err.to_string().starts_with("Invalid value for KYROS_MAX_ATTEMPTS"));
        assert!(config(&[("KYROS_STRICT_GRAPH", "maybe")]).is_err());
        assert!(config(&[("KYROS_SCREEN_COMPARATOR", "pixels")]).is_err());
    }
}
