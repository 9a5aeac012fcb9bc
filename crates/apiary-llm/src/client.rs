// SPDX-FileCopyrightText: 2026 Apiary Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP client for the OpenAI-compatible completion upstream.
//!
//! One upstream attempt per improve call: HTTP error statuses are
//! reported straight back so the circuit breaker sees every failure.
//! Only connection-level transport errors are retried, bounded by
//! `LLM_MAX_RETRIES`.

use std::time::Duration;

use apiary_config::model::LlmConfig;
use apiary_core::ApiaryError;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::presets::Preset;

/// What one upstream call can fail with. The distinction matters to
/// the breaker: timeouts and 5xx count as failures, 4xx does not.
#[derive(Debug)]
pub enum LlmCallError {
    Timeout,
    Transport(String),
    Status(u16, String),
}

impl LlmCallError {
    /// Whether the breaker should count this as a failure.
    pub fn is_breaker_failure(&self) -> bool {
        match self {
            LlmCallError::Timeout | LlmCallError::Transport(_) => true,
            LlmCallError::Status(code, _) => *code >= 500,
        }
    }

    pub fn error_type(&self) -> &'static str {
        match self {
            LlmCallError::Timeout => "timeout",
            LlmCallError::Transport(_) => "transport",
            LlmCallError::Status(code, _) if *code >= 500 => "upstream_5xx",
            LlmCallError::Status(_, _) => "upstream_4xx",
        }
    }
}

/// A successful completion with its token accounting.
#[derive(Debug, Clone)]
pub struct Completion {
    pub content: String,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f64,
    max_tokens: u32,
    top_p: f64,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Usage,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: String,
}

#[derive(Default, Deserialize)]
struct Usage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
    #[serde(default)]
    total_tokens: u64,
}

/// Client for `POST {base}/v1/chat/completions`.
#[derive(Debug, Clone)]
pub struct ImproveClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
    max_retries: u32,
}

impl ImproveClient {
    pub fn new(config: &LlmConfig) -> Result<Self, ApiaryError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ApiaryError::Config(format!("llm client build: {e}")))?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            max_retries: config.max_retries,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Ask the upstream to improve `text` in the given style.
    pub async fn improve(&self, text: &str, preset: Preset) -> Result<Completion, LlmCallError> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: preset.system_prompt(),
                },
                ChatMessage {
                    role: "user",
                    content: text,
                },
            ],
            temperature: 0.2,
            max_tokens: preset.max_tokens(),
            top_p: 0.9,
        };
        let url = format!("{}/v1/chat/completions", self.base_url);

        let mut attempt = 0;
        let response = loop {
            match self.client.post(&url).json(&request).send().await {
                Ok(response) => break response,
                Err(e) if e.is_timeout() => return Err(LlmCallError::Timeout),
                Err(e) if e.is_connect() && attempt < self.max_retries => {
                    attempt += 1;
                    warn!(attempt, error = %e, "llm connect failed, retrying");
                    tokio::time::sleep(Duration::from_millis(200)).await;
                }
                Err(e) => return Err(LlmCallError::Transport(e.to_string())),
            }
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmCallError::Status(status.as_u16(), body));
        }

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| LlmCallError::Transport(format!("bad response body: {e}")))?;
        let content = body
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| LlmCallError::Transport("response has no choices".into()))?;

        debug!(total_tokens = body.usage.total_tokens, "llm completion received");
        Ok(Completion {
            content,
            prompt_tokens: body.usage.prompt_tokens,
            completion_tokens: body.usage.completion_tokens,
            total_tokens: body.usage.total_tokens,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(base_url: &str) -> LlmConfig {
        LlmConfig {
            enabled: true,
            base_url: base_url.to_string(),
            model: "test-model".to_string(),
            timeout_secs: 5,
            max_retries: 0,
            ..LlmConfig::default()
        }
    }

    #[tokio::test]
    async fn improve_sends_preset_prompt_and_parses_usage() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(body_partial_json(json!({"model": "test-model", "max_tokens": 100})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"role": "assistant", "content": "Короче!"}}],
                "usage": {"prompt_tokens": 12, "completion_tokens": 3, "total_tokens": 15}
            })))
            .mount(&server)
            .await;

        let client = ImproveClient::new(&test_config(&server.uri())).unwrap();
        let completion = client.improve("Привет", Preset::Short).await.unwrap();
        assert_eq!(completion.content, "Короче!");
        assert_eq!(completion.total_tokens, 15);
    }

    #[tokio::test]
    async fn server_errors_surface_as_breaker_failures() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let client = ImproveClient::new(&test_config(&server.uri())).unwrap();
        let err = client.improve("x", Preset::Neutral).await.unwrap_err();
        assert!(err.is_breaker_failure());
        assert_eq!(err.error_type(), "upstream_5xx");
    }

    #[tokio::test]
    async fn client_errors_do_not_count_against_the_breaker() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(400))
            .mount(&server)
            .await;

        let client = ImproveClient::new(&test_config(&server.uri())).unwrap();
        let err = client.improve("x", Preset::Neutral).await.unwrap_err();
        assert!(!err.is_breaker_failure());
        assert_eq!(err.error_type(), "upstream_4xx");
    }
}
