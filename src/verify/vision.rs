//! Model-driven screen comparison.
//!
//! Sends both captures to a vision model and asks whether the screen changed
//! in a way a person would notice. Tolerates noise like clocks and cursors
//! that [`super::DigestComparator`] counts as change.

use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine;

use super::{Observation, ScreenComparator, VerifyError};
use crate::llm::{ChatMessage, ChatOptions, ContentPart, LlmClient, Role};

const COMPARE_PROMPT: &str = "You are given two screenshots of the same desktop. \
The first was taken before an action, the second after it. \
Ignore trivial differences such as a blinking cursor or a clock. \
Did the screen change in a meaningful way? \
Answer on the first line with exactly `CHANGED: YES` or `CHANGED: NO`, then give a one-sentence reason.";

pub struct VisionComparator {
    llm: Arc<dyn LlmClient>,
    model: String,
}

impl VisionComparator {
    pub fn new(llm: Arc<dyn LlmClient>, model: impl Into<String>) -> Self {
        Self {
            llm,
            model: model.into(),
        }
    }
}

fn data_url(bytes: &[u8]) -> String {
    format!(
        "data:image/png;base64,{}",
        base64::engine::general_purpose::STANDARD.encode(bytes)
    )
}

/// Read the `CHANGED: YES|NO` answer anywhere in the reply.
pub(crate) fn parse_change_answer(reply: &str) -> Option<bool> {
    reply.lines().find_map(|line| {
        let upper = line.trim().trim_matches('`').to_uppercase();
        let answer = upper.strip_prefix("CHANGED:")?.trim().to_string();
        if answer.starts_with("YES") {
            Some(true)
        } else if answer.starts_with("NO") {
            Some(false)
        } else {
            None
        }
    })
}

#[async_trait]
impl ScreenComparator for VisionComparator {
    async fn differs(&self, before: &Observation, after: &Observation) -> Result<bool, VerifyError> {
        let message = ChatMessage::with_parts(
            Role::User,
            vec![
                ContentPart::text(COMPARE_PROMPT),
                ContentPart::image_url(data_url(&before.bytes)),
                ContentPart::image_url(data_url(&after.bytes)),
            ],
        );
        let options = ChatOptions {
            temperature: Some(0.0),
            max_tokens: Some(200),
        };

        let response = self
            .llm
            .chat_completion(&self.model, &[message], options)
            .await
            .map_err(|e| VerifyError::Compare(e.to_string()))?;
        let reply = response.content.unwrap_or_default();

        tracing::debug!(reply = %reply, "Vision comparison reply");
        parse_change_answer(&reply)
            .ok_or_else(|| VerifyError::Compare(format!("unexpected reply: {}", reply.trim())))
    }
}
