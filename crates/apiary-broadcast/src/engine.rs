// SPDX-FileCopyrightText: 2026 Apiary Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Broadcast campaign creation and execution.
//!
//! Execution walks the audience in stable `user_id` order in chunks,
//! renders the message per recipient (locale preferences honoured),
//! shapes sends through the throttle, and records one delivery event
//! per recipient. Transient failures retry with 1 s / 4 s / 16 s
//! backoff; a user-blocked-bot report is terminal.

use std::sync::Arc;

use apiary_core::{ApiaryError, BotId, Deliverer, DeliveryOutcome, Reply, TraceId};
use apiary_dsl::template;
use apiary_engine::events::EventSink;
use apiary_engine::i18n::I18nResolver;
use apiary_prometheus::recording;
use apiary_storage::models::{now_iso, Audience, BroadcastRow};
use apiary_storage::queries::{broadcasts, users};
use apiary_storage::Database;
use serde_json::{json, Map, Value};
use tokio::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

/// Audience chunk size.
const CHUNK_SIZE: i64 = 1000;
/// Backoff schedule for transient delivery failures.
const RETRY_BACKOFF_SECS: &[u64] = &[1, 4, 16];
/// Campaigns refuse audiences beyond this size.
const MAX_AUDIENCE: i64 = 100_000;
/// Throttle bounds.
const MIN_PER_SEC: u32 = 1;
const MAX_PER_SEC: u32 = 100;

/// Creates and executes broadcast campaigns.
pub struct BroadcastEngine {
    db: Database,
    deliverer: Arc<dyn Deliverer>,
    i18n: I18nResolver,
    sink: EventSink,
}

impl BroadcastEngine {
    pub fn new(db: Database, deliverer: Arc<dyn Deliverer>, mask_events: bool) -> Self {
        Self {
            i18n: I18nResolver::new(db.clone()),
            sink: EventSink::new(db.clone(), mask_events),
            db,
            deliverer,
        }
    }

    /// Create a campaign in `pending` state; the worker picks it up.
    pub async fn create(
        &self,
        bot_id: BotId,
        audience: &str,
        message: String,
        per_sec: u32,
    ) -> Result<BroadcastRow, ApiaryError> {
        let selector = Audience::parse(audience)
            .ok_or_else(|| ApiaryError::SpecInvalid(format!("invalid audience: {audience}")))?;
        let per_sec = per_sec.clamp(MIN_PER_SEC, MAX_PER_SEC);

        let total_users = users::count_audience(&self.db, bot_id, &selector).await?;
        if total_users > MAX_AUDIENCE {
            return Err(ApiaryError::SpecInvalid(format!(
                "audience size {total_users} exceeds maximum {MAX_AUDIENCE}"
            )));
        }

        let row = BroadcastRow {
            id: Uuid::new_v4().to_string(),
            bot_id,
            audience: selector.as_str(),
            message,
            throttle_per_sec: per_sec,
            status: "pending".to_string(),
            total_users,
            sent_count: 0,
            failed_count: 0,
            blocked_count: 0,
            created_at: now_iso(),
            started_at: None,
            completed_at: None,
        };
        broadcasts::insert_broadcast(&self.db, &row).await?;
        info!(
            broadcast_id = %row.id,
            bot_id = %bot_id,
            audience,
            total_users,
            "broadcast created"
        );
        Ok(row)
    }

    /// Campaign status and live counters.
    pub async fn status(&self, id: &str) -> Result<Option<BroadcastRow>, ApiaryError> {
        broadcasts::get_broadcast(&self.db, id.to_string()).await
    }

    /// Execute (or resume) one claimed campaign to a terminal status.
    pub async fn run(&self, broadcast: BroadcastRow) -> Result<(), ApiaryError> {
        let bot_id = broadcast.bot_id;
        let trace = TraceId::new();
        let Some(selector) = Audience::parse(&broadcast.audience) else {
            broadcasts::finish_broadcast(&self.db, broadcast.id.clone(), "failed", 0, 0, 0).await?;
            return Err(ApiaryError::Internal(format!(
                "broadcast {} has unparseable audience",
                broadcast.id
            )));
        };

        // Resume-aware: recipients with a recorded event are excluded
        // by the chunk query, and existing counts carry forward.
        let (mut sent, mut failed, mut blocked) =
            broadcasts::delivery_counts(&self.db, broadcast.id.clone()).await?;
        self.sink
            .emit(
                bot_id,
                None,
                "broadcast_start",
                json!({
                    "broadcast_id": broadcast.id,
                    "audience": broadcast.audience,
                    "total_users": broadcast.total_users,
                    "resumed_from": sent + failed + blocked,
                }),
                &trace,
            )
            .await;

        let mut throttle = crate::throttle::Throttle::new(broadcast.throttle_per_sec);
        let mut after_user = 0i64;
        loop {
            let chunk = users::audience_chunk(
                &self.db,
                bot_id,
                &selector,
                after_user,
                Some(broadcast.id.clone()),
                CHUNK_SIZE,
            )
            .await?;
            if chunk.is_empty() {
                break;
            }

            for user_id in chunk {
                after_user = user_id;
                let text = self.render_for(bot_id, user_id, &broadcast.message).await;
                throttle.acquire().await;

                match self.deliver_with_retry(bot_id, user_id, &text).await {
                    DeliveryOutcome::Sent => {
                        sent += 1;
                        recording::record_broadcast_sent(bot_id);
                        broadcasts::record_delivery(
                            &self.db,
                            broadcast.id.clone(),
                            user_id,
                            "sent",
                            None,
                        )
                        .await?;
                    }
                    DeliveryOutcome::Blocked => {
                        blocked += 1;
                        recording::record_broadcast_failed(bot_id);
                        broadcasts::record_delivery(
                            &self.db,
                            broadcast.id.clone(),
                            user_id,
                            "blocked",
                            Some("user_blocked_bot".to_string()),
                        )
                        .await?;
                        users::deactivate_user(&self.db, bot_id, user_id).await?;
                    }
                    DeliveryOutcome::Transient(error) => {
                        failed += 1;
                        recording::record_broadcast_failed(bot_id);
                        warn!(
                            broadcast_id = %broadcast.id,
                            user_id,
                            error = %error,
                            "broadcast delivery failed after retries"
                        );
                        broadcasts::record_delivery(
                            &self.db,
                            broadcast.id.clone(),
                            user_id,
                            "failed",
                            Some(error),
                        )
                        .await?;
                    }
                }

                if (sent + failed + blocked) % 100 == 0 {
                    broadcasts::update_counters(
                        &self.db,
                        broadcast.id.clone(),
                        sent,
                        failed,
                        blocked,
                    )
                    .await?;
                }
            }
        }

        broadcasts::finish_broadcast(
            &self.db,
            broadcast.id.clone(),
            "completed",
            sent,
            failed,
            blocked,
        )
        .await?;
        self.sink
            .emit(
                bot_id,
                None,
                "broadcast_completed",
                json!({
                    "broadcast_id": broadcast.id,
                    "sent": sent,
                    "failed": failed,
                    "blocked": blocked,
                }),
                &trace,
            )
            .await;
        info!(
            broadcast_id = %broadcast.id,
            bot_id = %bot_id,
            sent,
            failed,
            blocked,
            "broadcast completed"
        );
        Ok(())
    }

    /// Render the campaign message for one recipient: i18n markers
    /// against the user's locale, then scalar substitution.
    async fn render_for(&self, bot_id: BotId, user_id: i64, message: &str) -> String {
        let locale = self.i18n.locale_for(bot_id, user_id, None, "").await;
        let resolved = self.i18n.resolve(bot_id, &locale, message).await;
        let mut scope = Map::new();
        scope.insert("user_id".to_string(), Value::from(user_id));
        template::render_scalars_only(&resolved, &scope)
    }

    async fn deliver_with_retry(
        &self,
        bot_id: BotId,
        user_id: i64,
        text: &str,
    ) -> DeliveryOutcome {
        let reply = Reply::text(text);
        let mut last_error = String::new();
        for attempt in 0..=RETRY_BACKOFF_SECS.len() {
            if attempt > 0 {
                tokio::time::sleep(Duration::from_secs(RETRY_BACKOFF_SECS[attempt - 1])).await;
            }
            match self.deliverer.deliver(bot_id, user_id, &reply).await {
                DeliveryOutcome::Transient(error) => last_error = error,
                terminal => return terminal,
            }
        }
        DeliveryOutcome::Transient(last_error)
    }
}
