//! Hand-written fakes shared by the unit tests.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::executor::{Scheduler, SchedulerConfig};
use crate::llm::{ChatMessage, ChatOptions, ChatResponse, LlmClient};
use crate::planner::{History, Planner};
use crate::task::TaskGraph;
use crate::tools::{Tool, ToolContext, ToolOutput, ToolRegistry};
use crate::verify::{ChangeOracle, Observation, VerifyError};

/// Ordered log of tool names invoked.
#[derive(Debug, Clone, Default)]
pub(crate) struct CallLog(Arc<Mutex<Vec<String>>>);

impl CallLog {
    pub fn calls(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    fn push(&self, name: &str) {
        self.0.lock().unwrap().push(name.to_string());
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) enum Behavior {
    /// Succeeds; reports `a + b` on stdout when both are given
    Succeed,
    /// Returns a failed output with stderr "boom"
    Fail,
    /// Returns `Err("exploded")`
    Raise,
}

pub(crate) struct FakeTool {
    name: String,
    behavior: Behavior,
    log: CallLog,
}

#[async_trait]
impl Tool for FakeTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "fake"
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({"type": "object"})
    }

    async fn call(
        &self,
        params: &Map<String, Value>,
        _ctx: ToolContext<'_>,
    ) -> anyhow::Result<ToolOutput> {
        self.log.push(&self.name);
        match self.behavior {
            Behavior::Succeed => {
                let sum = params
                    .get("a")
                    .and_then(Value::as_i64)
                    .zip(params.get("b").and_then(Value::as_i64))
                    .map(|(a, b)| a + b);
                Ok(match sum {
                    Some(sum) => ToolOutput::ok().with_stdout(sum.to_string()),
                    None => ToolOutput::ok(),
                })
            }
            Behavior::Fail => Ok(ToolOutput::failed("boom")),
            Behavior::Raise => Err(anyhow::anyhow!("exploded")),
        }
    }
}

pub(crate) fn fake_registry(log: &CallLog, tools: &[(&str, Behavior)]) -> ToolRegistry {
    let mut registry = ToolRegistry::empty();
    for (name, behavior) in tools {
        registry.register(Arc::new(FakeTool {
            name: name.to_string(),
            behavior: *behavior,
            log: log.clone(),
        }));
    }
    registry
}

/// Scheduler over fake tools with no delays.
pub(crate) fn fake_scheduler(
    log: &CallLog,
    tools: &[(&str, Behavior)],
    oracle: StaticOracle,
) -> Scheduler {
    Scheduler::new(
        Arc::new(fake_registry(log, tools)),
        Arc::new(oracle),
        SchedulerConfig {
            step_delay: Duration::ZERO,
            working_dir: PathBuf::from("."),
            display: ":0".to_string(),
            strict_graph: false,
        },
    )
}

/// Oracle with a fixed verdict.
pub(crate) struct StaticOracle {
    changed: bool,
    broken: bool,
    labels: Mutex<Vec<String>>,
}

impl StaticOracle {
    fn with(changed: bool, broken: bool) -> Self {
        Self {
            changed,
            broken,
            labels: Mutex::new(Vec::new()),
        }
    }

    pub fn changed() -> Self {
        Self::with(true, false)
    }

    pub fn unchanged() -> Self {
        Self::with(false, false)
    }

    /// Every capture fails.
    pub fn broken() -> Self {
        Self::with(true, true)
    }

    pub fn labels(&self) -> Vec<String> {
        self.labels.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChangeOracle for StaticOracle {
    async fn observe(&self, label: &str) -> Result<Observation, VerifyError> {
        self.labels.lock().unwrap().push(label.to_string());
        if self.broken {
            return Err(VerifyError::Capture("no display".to_string()));
        }
        Ok(Observation {
            label: label.to_string(),
            path: None,
            bytes: label.as_bytes().to_vec(),
        })
    }

    async fn compare(&self, _before: &Observation, _after: &Observation) -> Result<bool, VerifyError> {
        Ok(self.changed)
    }

    fn settle_duration(&self) -> Duration {
        Duration::ZERO
    }
}

/// LLM that answers from a script and records every request.
pub(crate) struct ScriptedLlm {
    replies: Mutex<VecDeque<String>>,
    requests: Mutex<Vec<Vec<ChatMessage>>>,
}

impl ScriptedLlm {
    pub fn new(replies: Vec<&str>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().map(String::from).collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<Vec<ChatMessage>> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn chat_completion(
        &self,
        model: &str,
        messages: &[ChatMessage],
        _options: ChatOptions,
    ) -> anyhow::Result<ChatResponse> {
        self.requests.lock().unwrap().push(messages.to_vec());
        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| anyhow::anyhow!("script exhausted"))?;
        Ok(ChatResponse {
            content: Some(reply),
            finish_reason: Some("stop".to_string()),
            usage: None,
            model: Some(model.to_string()),
        })
    }
}

/// Planner that replays a fixed list of plans and records its inputs.
pub(crate) struct ScriptedPlanner {
    plans: Mutex<VecDeque<Option<Value>>>,
    inputs: Mutex<Vec<String>>,
    history_lens: Mutex<Vec<usize>>,
}

impl ScriptedPlanner {
    /// `None` entries make `generate` return no plan for that attempt.
    pub fn new(plans: Vec<Option<Value>>) -> Self {
        Self {
            plans: Mutex::new(plans.into()),
            inputs: Mutex::new(Vec::new()),
            history_lens: Mutex::new(Vec::new()),
        }
    }

    pub fn inputs(&self) -> Vec<String> {
        self.inputs.lock().unwrap().clone()
    }

    pub fn history_lens(&self) -> Vec<usize> {
        self.history_lens.lock().unwrap().clone()
    }
}

#[async_trait]
impl Planner for ScriptedPlanner {
    async fn generate(&self, input: &str, history: &History) -> anyhow::Result<Option<TaskGraph>> {
        self.inputs.lock().unwrap().push(input.to_string());
        self.history_lens.lock().unwrap().push(history.len());
        let next = self.plans.lock().unwrap().pop_front().flatten();
        match next {
            Some(document) => Ok(Some(TaskGraph::from_value(document)?)),
            None => Ok(None),
        }
    }
}
