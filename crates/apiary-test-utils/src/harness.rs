// SPDX-FileCopyrightText: 2026 Apiary Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The end-to-end test harness.

use std::sync::Arc;
use std::time::Duration;

use apiary_broadcast::BroadcastEngine;
use apiary_config::model::LlmConfig;
use apiary_core::{ApiaryError, InboundUpdate, Reply};
use apiary_engine::Engine;
use apiary_llm::LlmService;
use apiary_storage::models::BotRow;
use apiary_storage::queries::{bots, events, specs};
use apiary_storage::{Database, EventRow};
use serde_json::Value;
use wiremock::MockServer;

use crate::mock_delivery::MockDeliverer;

/// Builder for a complete runtime around an in-memory database.
pub struct TestHarnessBuilder {
    spec_json: Value,
    llm_enabled: bool,
    llm_preset: String,
    daily_budget_limit: i64,
}

impl TestHarnessBuilder {
    fn new(spec_json: Value) -> Self {
        Self {
            spec_json,
            llm_enabled: false,
            llm_preset: "neutral".to_string(),
            daily_budget_limit: 0,
        }
    }

    /// Enable LLM improvement; the harness starts a mock upstream and
    /// exposes it for the test to mount responses on.
    pub fn with_llm(mut self) -> Self {
        self.llm_enabled = true;
        self
    }

    pub fn with_preset(mut self, preset: &str) -> Self {
        self.llm_preset = preset.to_string();
        self
    }

    pub fn with_daily_budget(mut self, tokens: i64) -> Self {
        self.daily_budget_limit = tokens;
        self
    }

    pub async fn build(self) -> Result<TestHarness, ApiaryError> {
        let db = Database::open_in_memory().await?;

        let mut bot = BotRow::new("test-bot", "0000:TESTTOKEN");
        bot.llm_enabled = self.llm_enabled;
        bot.llm_preset = self.llm_preset;
        bot.daily_budget_limit = self.daily_budget_limit;
        bots::create_bot(&db, &bot).await?;
        specs::publish_spec(&db, bot.id, self.spec_json.to_string()).await?;

        let (llm_server, llm_config) = if self.llm_enabled {
            let server = MockServer::start().await;
            let config = LlmConfig {
                enabled: true,
                base_url: server.uri(),
                model: "test-model".to_string(),
                timeout_secs: 5,
                max_retries: 0,
                ..LlmConfig::default()
            };
            (Some(server), config)
        } else {
            (None, LlmConfig::default())
        };

        let llm = Arc::new(LlmService::new(llm_config, db.clone())?);
        let engine = Arc::new(Engine::new(
            db.clone(),
            llm,
            true,
            Duration::from_secs(30),
        ));
        let deliverer = Arc::new(MockDeliverer::new());
        let broadcasts = Arc::new(BroadcastEngine::new(db.clone(), deliverer.clone(), true));

        Ok(TestHarness {
            db,
            engine,
            bot,
            deliverer,
            broadcasts,
            llm_server,
        })
    }
}

/// A complete assembled runtime for one test.
pub struct TestHarness {
    pub db: Database,
    pub engine: Arc<Engine>,
    pub bot: BotRow,
    pub deliverer: Arc<MockDeliverer>,
    pub broadcasts: Arc<BroadcastEngine>,
    /// Mock LLM upstream; present when built `with_llm()`.
    pub llm_server: Option<MockServer>,
}

impl TestHarness {
    /// Start building a harness around a spec document.
    pub fn builder(spec_json: Value) -> TestHarnessBuilder {
        TestHarnessBuilder::new(spec_json)
    }

    /// Drive one text update through the full pipeline.
    pub async fn send_text(
        &self,
        user_id: i64,
        text: &str,
    ) -> Result<Option<Reply>, ApiaryError> {
        self.engine
            .handle_update(InboundUpdate::text(self.bot.id, user_id, text))
            .await
    }

    /// Drive one callback update through the full pipeline.
    pub async fn send_callback(
        &self,
        user_id: i64,
        data: &str,
    ) -> Result<Option<Reply>, ApiaryError> {
        self.engine
            .handle_update(InboundUpdate::callback(self.bot.id, user_id, data))
            .await
    }

    /// Recent events of one kind for the harness bot, newest first.
    pub async fn events_of_kind(&self, kind: &str) -> Result<Vec<EventRow>, ApiaryError> {
        let all = events::events_for_bot(&self.db, self.bot.id, 500).await?;
        Ok(all.into_iter().filter(|e| e.kind == kind).collect())
    }
}
