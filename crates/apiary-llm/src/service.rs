// SPDX-FileCopyrightText: 2026 Apiary Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The improvement pipeline: rate limit, budget, cache, breaker, call.
//!
//! [`LlmService::improve`] never fails the caller. Every refusal and
//! error path hands the unchanged text back together with the refusal
//! code so the action executor can log the right event.

use std::time::Instant;

use apiary_config::model::LlmConfig;
use apiary_core::ApiaryError;
use apiary_prometheus::recording;
use apiary_storage::models::{iso_after_secs, BotRow};
use apiary_storage::queries::llm_cache;
use apiary_storage::Database;
use tracing::debug;

use crate::breaker::CircuitBreaker;
use crate::budget::BudgetTracker;
use crate::client::{ImproveClient, LlmCallError};
use crate::presets::Preset;
use crate::ratelimit::RateLimiter;

/// Outcome of one improvement attempt.
#[derive(Debug, Clone)]
pub struct ImproveResult {
    /// Improved text, or the input unchanged on any refusal.
    pub text: String,
    pub cached: bool,
    /// Tokens consumed by this call (0 on cache hits and refusals).
    pub total_tokens: i64,
    /// Refusal code when the text went out unimproved.
    pub refused: Option<&'static str>,
}

impl ImproveResult {
    fn passthrough(text: &str, code: &'static str) -> Self {
        Self {
            text: text.to_string(),
            cached: false,
            total_tokens: 0,
            refused: Some(code),
        }
    }
}

/// The LLM improvement subsystem, owned by the runtime.
pub struct LlmService {
    config: LlmConfig,
    client: ImproveClient,
    breaker: CircuitBreaker,
    ratelimit: RateLimiter,
    budget: BudgetTracker,
    db: Database,
}

impl LlmService {
    pub fn new(config: LlmConfig, db: Database) -> Result<Self, ApiaryError> {
        let client = ImproveClient::new(&config)?;
        Ok(Self {
            ratelimit: RateLimiter::new(config.rate_limit_per_min),
            budget: BudgetTracker::new(db.clone()),
            breaker: CircuitBreaker::default(),
            client,
            config,
            db,
        })
    }

    /// Whether improvement is switched on process-wide.
    pub fn enabled(&self) -> bool {
        self.config.enabled
    }

    /// Breaker access for health reporting and tests.
    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// Improve `text` for this bot and user, degrading to the
    /// unchanged text on any refusal.
    pub async fn improve(&self, bot: &BotRow, user_id: i64, text: &str) -> ImproveResult {
        if !self.config.enabled || !bot.llm_enabled {
            return ImproveResult::passthrough(text, "disabled");
        }
        let bot_id = bot.id;
        let preset = Preset::parse(&bot.llm_preset);

        if let Err(e) = self.ratelimit.check(bot_id, user_id) {
            recording::record_llm_request("improve", "rejected");
            return ImproveResult::passthrough(text, e.code());
        }
        if let Err(e) = self.budget.check(bot_id, bot.daily_budget_limit).await {
            recording::record_llm_request("improve", "rejected");
            return ImproveResult::passthrough(text, e.code());
        }

        let cache_key = cache_key(text, self.client.model(), preset);
        if let Ok(Some(hit)) = llm_cache::get(&self.db, cache_key.clone()).await {
            debug!(bot_id = %bot_id, "llm cache hit");
            recording::record_llm_cache_hit(self.client.model());
            recording::record_llm_latency("improve", true, 0.0);
            return ImproveResult {
                text: hit.content,
                cached: true,
                total_tokens: 0,
                refused: None,
            };
        }

        if let Err(e) = self.breaker.try_acquire(bot_id) {
            return ImproveResult::passthrough(text, e.code());
        }

        let started = Instant::now();
        match self.client.improve(text, preset).await {
            Ok(completion) => {
                let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
                self.breaker.record_success(bot_id);
                recording::record_llm_request("improve", "success");
                recording::record_llm_latency("improve", false, elapsed_ms);
                recording::record_llm_tokens(
                    self.client.model(),
                    "prompt",
                    completion.prompt_tokens,
                );
                recording::record_llm_tokens(
                    self.client.model(),
                    "completion",
                    completion.completion_tokens,
                );
                self.budget
                    .consume(bot_id, completion.total_tokens as i64)
                    .await;
                let expires = iso_after_secs(self.config.cache_ttl_secs as i64);
                let _ = llm_cache::put(
                    &self.db,
                    cache_key,
                    completion.content.clone(),
                    completion.total_tokens as i64,
                    expires,
                )
                .await;
                ImproveResult {
                    text: completion.content,
                    cached: false,
                    total_tokens: completion.total_tokens as i64,
                    refused: None,
                }
            }
            Err(error) => {
                recording::record_llm_request("improve", "failure");
                recording::record_llm_error(self.client.model(), error.error_type());
                if matches!(error, LlmCallError::Timeout) {
                    recording::record_llm_timeout(bot_id);
                }
                if error.is_breaker_failure() {
                    self.breaker.record_failure(bot_id);
                }
                let code = match error {
                    LlmCallError::Timeout => "timeout",
                    _ => "llm_error",
                };
                ImproveResult::passthrough(text, code)
            }
        }
    }
}

fn cache_key(prompt: &str, model: &str, preset: Preset) -> String {
    let mut hash = 0xcbf2_9ce4_8422_2325u64;
    for byte in prompt
        .bytes()
        .chain([0u8])
        .chain(model.bytes())
        .chain([0u8])
        .chain(preset.as_str().bytes())
    {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    format!("llm:{hash:016x}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn service_config(base_url: &str) -> LlmConfig {
        LlmConfig {
            enabled: true,
            base_url: base_url.to_string(),
            model: "test-model".to_string(),
            timeout_secs: 5,
            max_retries: 0,
            ..LlmConfig::default()
        }
    }

    fn llm_bot() -> BotRow {
        BotRow {
            llm_enabled: true,
            ..BotRow::new("b", "t")
        }
    }

    fn completion_body(text: &str) -> serde_json::Value {
        json!({
            "choices": [{"message": {"role": "assistant", "content": text}}],
            "usage": {"prompt_tokens": 5, "completion_tokens": 5, "total_tokens": 10}
        })
    }

    async fn service(server: &MockServer) -> LlmService {
        let db = Database::open_in_memory().await.unwrap();
        LlmService::new(service_config(&server.uri()), db).unwrap()
    }

    #[tokio::test]
    async fn improve_returns_upstream_text_and_caches_it() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion_body("Лучше!")))
            .expect(1) // second call must come from the cache
            .mount(&server)
            .await;

        let svc = service(&server).await;
        let bot = llm_bot();

        let first = svc.improve(&bot, 1, "привет").await;
        assert_eq!(first.text, "Лучше!");
        assert!(!first.cached);
        assert_eq!(first.total_tokens, 10);

        let second = svc.improve(&bot, 1, "привет").await;
        assert_eq!(second.text, "Лучше!");
        assert!(second.cached);
    }

    #[tokio::test]
    async fn disabled_bot_passes_text_through() {
        let server = MockServer::start().await;
        let svc = service(&server).await;
        let mut bot = llm_bot();
        bot.llm_enabled = false;
        let result = svc.improve(&bot, 1, "как есть").await;
        assert_eq!(result.text, "как есть");
        assert_eq!(result.refused, Some("disabled"));
    }

    #[tokio::test]
    async fn five_upstream_errors_trip_the_breaker_and_text_degrades() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let svc = service(&server).await;
        let bot = llm_bot();
        for i in 0..5 {
            // Distinct prompts keep the cache out of the way.
            let result = svc.improve(&bot, 1, &format!("текст {i}")).await;
            assert_eq!(result.refused, Some("llm_error"));
            assert_eq!(result.text, format!("текст {i}"));
        }
        let sixth = svc.improve(&bot, 1, "текст 6").await;
        assert_eq!(sixth.refused, Some("circuit_breaker_open"));
        assert_eq!(sixth.text, "текст 6");
    }

    #[tokio::test]
    async fn rate_limit_rejects_the_eleventh_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion_body("ok")))
            .mount(&server)
            .await;

        let svc = service(&server).await;
        let bot = llm_bot();
        for i in 0..10 {
            let result = svc.improve(&bot, 7, &format!("uniq {i}")).await;
            assert!(result.refused.is_none(), "request {i} refused");
        }
        let eleventh = svc.improve(&bot, 7, "uniq 11").await;
        assert_eq!(eleventh.refused, Some("rate_limit_exceeded"));
    }

    #[tokio::test]
    async fn exhausted_budget_rejects_without_calling_upstream() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion_body("ok")))
            .expect(1)
            .mount(&server)
            .await;

        let svc = service(&server).await;
        let mut bot = llm_bot();
        bot.daily_budget_limit = 10; // one 10-token call spends it all

        let first = svc.improve(&bot, 1, "раз").await;
        assert!(first.refused.is_none());
        let second = svc.improve(&bot, 1, "два").await;
        assert_eq!(second.refused, Some("budget_exhausted"));
        assert_eq!(second.text, "два");
    }
}
