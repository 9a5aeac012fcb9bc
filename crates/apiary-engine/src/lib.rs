// SPDX-FileCopyrightText: 2026 Apiary Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The DSL interpreter.
//!
//! [`Engine::handle_update`] is the single entry point for inbound
//! updates. It routes with a fixed precedence (active wizard, widget
//! callback, menu flow, wizard flow, intent, silence) and runs the
//! matched handler's actions in order. Every step emits one event
//! correlated by the update's trace id.
//!
//! The engine owns the process-local singletons (spec cache, i18n key
//! cache) and borrows the shared subsystems (database, LLM service).

pub mod actions;
pub mod events;
pub mod i18n;
pub mod router;
pub mod spec_cache;
pub mod widget;
pub mod wizard;

use std::sync::Arc;
use std::time::{Duration, Instant};

use apiary_core::{ApiaryError, InboundUpdate, Reply, TraceId};
use apiary_llm::LlmService;
use apiary_prometheus::recording;
use apiary_storage::Database;
use tracing::{error, warn};

use crate::events::EventSink;
use crate::i18n::I18nResolver;
use crate::spec_cache::SpecCache;

/// Reply text for failures the user should never see details of.
pub(crate) const GENERIC_ERROR_REPLY: &str = "Произошла ошибка. Попробуйте позже.";

/// Wizard step input is truncated to this length before matching.
pub(crate) const MAX_INPUT_LEN: usize = 1024;

/// The interpreter and its process-local state.
pub struct Engine {
    pub(crate) db: Database,
    pub(crate) specs: SpecCache,
    pub(crate) llm: Arc<LlmService>,
    pub(crate) i18n: I18nResolver,
    pub(crate) sink: EventSink,
    handler_deadline: Duration,
}

impl Engine {
    pub fn new(
        db: Database,
        llm: Arc<LlmService>,
        mask_events: bool,
        handler_deadline: Duration,
    ) -> Self {
        Self {
            specs: SpecCache::new(db.clone()),
            i18n: I18nResolver::new(db.clone()),
            sink: EventSink::new(db.clone(), mask_events),
            db,
            llm,
            handler_deadline,
        }
    }

    /// The spec cache, for reload and validation endpoints.
    pub fn spec_cache(&self) -> &SpecCache {
        &self.specs
    }

    /// The LLM service, for health reporting.
    pub fn llm(&self) -> &LlmService {
        &self.llm
    }

    /// The event sink, for collaborators that log outside a handler.
    pub fn sink(&self) -> &EventSink {
        &self.sink
    }

    /// Drop every cached view of a bot: compiled spec and i18n keys.
    /// Called on spec publish, explicit reload, and data purge.
    pub fn invalidate_bot_caches(&self, bot_id: apiary_core::BotId) {
        self.specs.invalidate(bot_id);
        self.i18n.invalidate(bot_id);
    }

    /// Handle one inbound update to completion.
    ///
    /// Returns the reply to send, or `None` for silence. Availability
    /// errors propagate so the HTTP layer can answer 503; everything
    /// else is internalised into events and a generic failure reply.
    pub async fn handle_update(
        &self,
        update: InboundUpdate,
    ) -> Result<Option<Reply>, ApiaryError> {
        let trace = TraceId::new();
        let started = Instant::now();
        let bot_id = update.bot_id;
        let user_id = update.user_id;

        recording::record_update(bot_id);

        let routed = tokio::time::timeout(self.handler_deadline, self.route(&update, &trace))
            .await
            .unwrap_or(Err(ApiaryError::Timeout));

        recording::record_handle_latency(started.elapsed().as_secs_f64() * 1000.0);

        match routed {
            Ok(reply) => Ok(reply),
            Err(e @ ApiaryError::DbUnavailable(_)) => {
                recording::record_error(bot_id, "db", e.code());
                self.sink
                    .error(bot_id, Some(user_id), "db", e.code(), &e.to_string(), &trace)
                    .await;
                Err(e)
            }
            // An unknown bot is the caller's mistake, not the user's.
            Err(e @ ApiaryError::NotFound(_)) => Err(e),
            Err(ApiaryError::Timeout) => {
                warn!(bot_id = %bot_id, "handler deadline exceeded");
                recording::record_error(bot_id, "engine", "timeout");
                self.sink
                    .error(bot_id, Some(user_id), "engine", "timeout", "deadline exceeded", &trace)
                    .await;
                Ok(Some(Reply::text(GENERIC_ERROR_REPLY)))
            }
            Err(e) => {
                error!(bot_id = %bot_id, error = %e, "update handling failed");
                recording::record_error(bot_id, "engine", e.code());
                self.sink
                    .error(bot_id, Some(user_id), "engine", e.code(), &e.to_string(), &trace)
                    .await;
                Ok(Some(Reply::text(GENERIC_ERROR_REPLY)))
            }
        }
    }
}
