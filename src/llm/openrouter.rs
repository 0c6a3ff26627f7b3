//! OpenRouter API client with automatic retry for transient errors.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::error::{classify_http_status, LlmError, LlmErrorKind, RetryConfig};
use super::{ChatMessage, ChatOptions, ChatResponse, LlmClient, TokenUsage};

const OPENROUTER_API_URL: &str = "https://openrouter.ai/api/v1/chat/completions";

/// OpenRouter API client.
pub struct OpenRouterClient {
    client: Client,
    api_key: String,
    retry_config: RetryConfig,
}

impl OpenRouterClient {
    pub fn new(api_key: String) -> Self {
        Self::with_retry_config(api_key, RetryConfig::default())
    }

    pub fn with_retry_config(api_key: String, retry_config: RetryConfig) -> Self {
        Self {
            client: Client::new(),
            api_key,
            retry_config,
        }
    }

    /// Parse a numeric Retry-After header if present.
    fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
        headers
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.trim().parse::<u64>().ok())
            .map(Duration::from_secs)
    }

    fn create_error(status: reqwest::StatusCode, body: &str, retry_after: Option<Duration>) -> LlmError {
        let status_code = status.as_u16();
        match classify_http_status(status_code) {
            LlmErrorKind::RateLimited => LlmError::rate_limited(body.to_string(), retry_after),
            LlmErrorKind::ClientError => LlmError::client_error(status_code, body.to_string()),
            _ => LlmError::server_error(status_code, body.to_string()),
        }
    }

    /// Execute a single request without retry.
    async fn execute_request(&self, request: &OpenRouterRequest) -> Result<ChatResponse, LlmError> {
        let response = self
            .client
            .post(OPENROUTER_API_URL)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("X-Title", "kyros")
            .json(request)
            .send()
            .await
            .map_err(|e| {
                let what = if e.is_timeout() {
                    "Request timeout"
                } else if e.is_connect() {
                    "Connection failed"
                } else {
                    "Request failed"
                };
                LlmError::network_error(format!("{}: {}", what, e))
            })?;

        let status = response.status();
        let retry_after = Self::parse_retry_after(response.headers());
        let body = response.text().await.unwrap_or_default();

        if !status.is_success() {
            return Err(Self::create_error(status, &body, retry_after));
        }

        parse_response(&body, &request.model)
    }

    /// Execute a request, retrying transient errors with backoff.
    async fn execute_with_retry(&self, request: &OpenRouterRequest) -> anyhow::Result<ChatResponse> {
        let start = Instant::now();
        let mut attempt = 0;

        loop {
            let error = match self.execute_request(request).await {
                Ok(response) => {
                    if attempt > 0 {
                        tracing::info!(
                            retries = attempt,
                            elapsed = ?start.elapsed(),
                            "LLM request succeeded after retries"
                        );
                    }
                    return Ok(response);
                }
                Err(error) => error,
            };

            if !self.retry_config.should_retry(&error) || attempt >= self.retry_config.max_retries {
                tracing::error!(retries = attempt, "LLM request failed: {}", error);
                return Err(error.into());
            }

            let remaining = self
                .retry_config
                .max_retry_duration
                .saturating_sub(start.elapsed());
            let delay = error.suggested_delay(attempt).min(remaining);
            if delay.is_zero() {
                tracing::warn!("No retry time remaining: {}", error);
                return Err(error.into());
            }

            tracing::warn!(
                attempt = attempt + 1,
                delay = ?delay,
                kind = %error.kind,
                "LLM request failed, retrying: {}",
                error.message
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}

fn parse_response(body: &str, requested_model: &str) -> Result<ChatResponse, LlmError> {
    let parsed: OpenRouterResponse = serde_json::from_str(body)
        .map_err(|e| LlmError::parse_error(format!("Failed to parse response: {}, body: {}", e, body)))?;

    let choice = parsed
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| LlmError::parse_error("No choices in response".to_string()))?;

    Ok(ChatResponse {
        content: choice.message.content,
        finish_reason: choice.finish_reason,
        usage: parsed
            .usage
            .map(|u| TokenUsage::new(u.prompt_tokens, u.completion_tokens)),
        model: parsed.model.or_else(|| Some(requested_model.to_string())),
    })
}

#[async_trait]
impl LlmClient for OpenRouterClient {
    async fn chat_completion(
        &self,
        model: &str,
        messages: &[ChatMessage],
        options: ChatOptions,
    ) -> anyhow::Result<ChatResponse> {
        let request = OpenRouterRequest {
            model: model.to_string(),
            messages: messages.to_vec(),
            temperature: options.temperature,
            max_tokens: options.max_tokens,
        };

        tracing::debug!(model = %model, messages = messages.len(), "Sending request to OpenRouter");
        self.execute_with_retry(&request).await
    }
}

#[derive(Debug, Serialize)]
struct OpenRouterRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct OpenRouterResponse {
    choices: Vec<OpenRouterChoice>,
    #[serde(default)]
    usage: Option<OpenRouterUsage>,
    #[serde(default)]
    model: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenRouterChoice {
    message: OpenRouterMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenRouterMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenRouterUsage {
    prompt_tokens: u64,
    completion_tokens: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_response() {
        let body = r#"{
            "choices": [{"message": {"role": "assistant", "content": "CHANGED: YES"}, "finish_reason": "stop"}],
            "usage": {"prompt_tokens": 10, "completion_tokens": 3, "total_tokens": 13}
        }"#;
        let response = parse_response(body, "some/model").unwrap();
        assert_eq!(response.content.as_deref(), Some("CHANGED: YES"));
        assert_eq!(response.model.as_deref(), Some("some/model"));
        assert_eq!(response.usage.unwrap().total_tokens, 13);
    }

    #[test]
    fn test_parse_response_without_choices() {
        let err = parse_response(r#"{"choices": []}"#, "m").unwrap_err();
        assert_eq!(err.kind, LlmErrorKind::ParseError);
    }

    #[test]
    fn test_status_maps_to_error_kind() {
        let err = OpenRouterClient::create_error(reqwest::StatusCode::TOO_MANY_REQUESTS, "slow", None);
        assert!(err.is_transient());
        let err = OpenRouterClient::create_error(reqwest::StatusCode::UNAUTHORIZED, "key", None);
        assert_eq!(err.kind, LlmErrorKind::ClientError);
    }
}
