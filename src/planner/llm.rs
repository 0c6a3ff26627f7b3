//! Planner backed by a chat model.

use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use regex::Regex;

use super::{History, Planner};
use crate::llm::{ChatMessage, ChatOptions, LlmClient, Role, ToolDefinition};
use crate::task::TaskGraph;

const PLANNER_PROMPT: &str = r#"You control a Linux desktop by writing plans. A plan is a JSON object {"tasks": [...]} where every task has:
- "id": a unique integer
- "name": a short description
- "type": "task" (a group of subtasks), "tool_call" (one tool invocation) or "plan" (a marker meaning "stop here and plan the rest")
- "subtasks": ids of child tasks, only for "task"
- "dependencies": ids of tasks that must succeed before this one starts
- "verify_screen_change": true when the task must visibly change the screen to count as done
- "tool_name" and "params": only for "tool_call"

Tasks that are not the subtask of another task are the top level of the plan.
When a decision depends on something you can only learn by running earlier steps (a window list, command output), put a "plan" task after those steps. You will be called again with the results and should plan the remaining work.

Reply with the JSON plan only."#;

pub struct LlmPlanner {
    llm: Arc<dyn LlmClient>,
    model: String,
    tools: Vec<ToolDefinition>,
}

impl LlmPlanner {
    pub fn new(llm: Arc<dyn LlmClient>, model: impl Into<String>, tools: Vec<ToolDefinition>) -> Self {
        Self {
            llm,
            model: model.into(),
            tools,
        }
    }

    fn system_prompt(&self) -> String {
        let mut prompt = String::from(PLANNER_PROMPT);
        prompt.push_str("\n\nAvailable tools:\n");
        for tool in &self.tools {
            prompt.push_str(&format!(
                "- {}: {} Parameters: {}\n",
                tool.function.name, tool.function.description, tool.function.parameters
            ));
        }
        prompt
    }

    /// Conversation for one planning call: earlier attempts replayed as
    /// request, plan, result; then the input itself.
    pub(crate) fn build_messages(&self, input: &str, history: &History) -> Vec<ChatMessage> {
        let mut messages = vec![ChatMessage::new(Role::System, self.system_prompt())];
        for entry in history.entries() {
            messages.push(ChatMessage::new(Role::User, entry.input.clone()));
            messages.push(ChatMessage::new(Role::Assistant, entry.plan.to_string()));
            messages.push(ChatMessage::new(
                Role::User,
                format!("Result: {}\n{}", entry.result, entry.summary),
            ));
        }
        messages.push(ChatMessage::new(Role::User, input));
        messages
    }
}

fn fenced_block() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)```(?:json)?\s*(.*?)```").expect("valid regex"))
}

/// Pull the JSON document out of a model reply.
///
/// Prefers a fenced code block, then the outermost `{...}` or `[...]` span.
pub fn extract_json(reply: &str) -> &str {
    if let Some(body) = fenced_block().captures(reply).and_then(|c| c.get(1)) {
        return body.as_str().trim();
    }
    let start = reply.find(['{', '[']);
    let end = reply.rfind(['}', ']']);
    match (start, end) {
        (Some(start), Some(end)) if end > start => &reply[start..=end],
        _ => reply.trim(),
    }
}

#[async_trait]
impl Planner for LlmPlanner {
    async fn generate(&self, input: &str, history: &History) -> anyhow::Result<Option<TaskGraph>> {
        let messages = self.build_messages(input, history);
        let options = ChatOptions {
            temperature: Some(0.2),
            max_tokens: Some(4096),
        };

        let response = self
            .llm
            .chat_completion(&self.model, &messages, options)
            .await?;
        let reply = response.content.unwrap_or_default();
        if reply.trim().is_empty() {
            tracing::warn!("Planner returned an empty reply");
            return Ok(None);
        }

        let graph = TaskGraph::from_json(extract_json(&reply))?;
        if graph.is_empty() {
            return Ok(None);
        }
        tracing::debug!(tasks = graph.len(), "Parsed plan");
        Ok(Some(graph))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::AttemptResult;
    use crate::task::{TaskId, TaskStatus};
    use crate::testing::ScriptedLlm;
    use crate::tools::ToolRegistry;

    const PLAN: &str = r#"{"tasks": [{"id": 1, "name": "List", "type": "tool_call", "tool_name": "list_windows"}, {"id": 2, "name": "Decide", "type": "plan", "dependencies": [1]}]}"#;

    #[test]
    fn test_extract_json() {
        assert_eq!(extract_json("```json\n{\"tasks\": []}\n```"), "{\"tasks\": []}");
        assert_eq!(extract_json("Here you go: {\"tasks\": []} done"), "{\"tasks\": []}");
        assert_eq!(extract_json("[1, 2]"), "[1, 2]");
        assert_eq!(extract_json("  nothing  "), "nothing");
    }

    #[test]
    fn test_system_prompt_lists_tools() {
        let llm = Arc::new(ScriptedLlm::new(vec![]));
        let planner = LlmPlanner::new(llm, "m", ToolRegistry::new().tool_schemas());
        let prompt = planner.system_prompt();
        assert!(prompt.contains("- run_shell_command:"));
        assert!(prompt.contains("- list_windows:"));
    }

    #[tokio::test]
    async fn test_generate_parses_fenced_plan() {
        let reply = format!("Plan:\n```json\n{PLAN}\n```");
        let llm = Arc::new(ScriptedLlm::new(vec![reply.as_str()]));
        let planner = LlmPlanner::new(llm.clone(), "m", vec![]);

        let graph = planner
            .generate("open a terminal", &History::new())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(graph.len(), 2);
        assert_eq!(graph.get(TaskId(2)).unwrap().dependencies, vec![TaskId(1)]);

        let requests = llm.requests();
        assert_eq!(requests[0].len(), 2);
        assert_eq!(requests[0][1].text_content(), Some("open a terminal"));
    }

    #[tokio::test]
    async fn test_history_is_replayed_before_input() {
        let llm = Arc::new(ScriptedLlm::new(vec![r#"{"tasks": []}"#]));
        let planner = LlmPlanner::new(llm.clone(), "m", vec![]);

        let mut graph = TaskGraph::from_json(PLAN).unwrap();
        graph.get_mut(TaskId(1)).unwrap().status = TaskStatus::Success;
        graph.get_mut(TaskId(2)).unwrap().status = TaskStatus::Replan;
        let mut history = History::new();
        history.record("open a terminal", &graph, AttemptResult::ReplanRequested);

        let result = planner.generate("open a terminal", &history).await.unwrap();
        assert!(result.is_none());

        let requests = llm.requests();
        let messages = &requests[0];
        assert_eq!(messages.len(), 5);
        assert_eq!(messages[2].role, Role::Assistant);
        assert!(messages[3]
            .text_content()
            .unwrap()
            .starts_with("Result: needs replanning"));
        assert_eq!(messages[4].text_content(), Some("open a terminal"));
    }

    #[tokio::test]
    async fn test_unparseable_reply_is_an_error() {
        let llm = Arc::new(ScriptedLlm::new(vec!["I would rather not"]));
        let planner = LlmPlanner::new(llm, "m", vec![]);
        assert!(planner.generate("x", &History::new()).await.is_err());
    }
}
