// SPDX-FileCopyrightText: 2026 Apiary Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Broadcast engine behavior: throttle pacing, retry ladder, blocked
//! handling, resumption, and counter invariants.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use apiary_broadcast::BroadcastEngine;
use apiary_core::{BotId, Deliverer, DeliveryOutcome, Reply};
use apiary_storage::queries::{broadcasts, users};
use apiary_storage::Database;
use async_trait::async_trait;
use tokio::time::{Duration, Instant};

/// Deliverer with scripted outcomes per user; everything else sends.
#[derive(Default)]
struct ScriptedDeliverer {
    scripted: HashMap<i64, Vec<DeliveryOutcome>>,
    attempts: Mutex<HashMap<i64, usize>>,
    delivered: AtomicUsize,
}

impl ScriptedDeliverer {
    fn with_script(user_id: i64, outcomes: Vec<DeliveryOutcome>) -> Self {
        let mut scripted = HashMap::new();
        scripted.insert(user_id, outcomes);
        Self {
            scripted,
            ..Self::default()
        }
    }

    fn attempts_for(&self, user_id: i64) -> usize {
        *self.attempts.lock().unwrap().get(&user_id).unwrap_or(&0)
    }
}

#[async_trait]
impl Deliverer for ScriptedDeliverer {
    async fn deliver(&self, _bot_id: BotId, chat_id: i64, _reply: &Reply) -> DeliveryOutcome {
        let attempt = {
            let mut attempts = self.attempts.lock().unwrap();
            let slot = attempts.entry(chat_id).or_insert(0);
            *slot += 1;
            *slot - 1
        };
        let outcome = self
            .scripted
            .get(&chat_id)
            .and_then(|outcomes| outcomes.get(attempt).cloned())
            .unwrap_or(DeliveryOutcome::Sent);
        if outcome == DeliveryOutcome::Sent {
            self.delivered.fetch_add(1, Ordering::SeqCst);
        }
        outcome
    }
}

async fn setup(user_count: i64) -> (Database, BotId) {
    let db = Database::open_in_memory().await.unwrap();
    let bot = BotId::new();
    for user in 1..=user_count {
        users::touch_user(&db, bot, user).await.unwrap();
    }
    (db, bot)
}

#[tokio::test(start_paused = true)]
async fn hundred_users_at_ten_per_sec_complete_with_full_counters() {
    let (db, bot) = setup(100).await;
    let deliverer = Arc::new(ScriptedDeliverer::default());
    let engine = BroadcastEngine::new(db.clone(), deliverer.clone(), true);

    let row = engine.create(bot, "all", "Привет, {{user_id}}!".into(), 10).await.unwrap();
    assert_eq!(row.total_users, 100);

    let claimed = broadcasts::claim_next_pending(&db).await.unwrap().unwrap();
    let started = Instant::now();
    engine.run(claimed).await.unwrap();
    // 100 recipients at 10/sec span at least 9 throttle windows.
    assert!(started.elapsed() >= Duration::from_secs(9));

    let finished = engine.status(&row.id).await.unwrap().unwrap();
    assert_eq!(finished.status, "completed");
    assert_eq!(finished.sent_count, 100);
    assert_eq!(finished.sent_count + finished.failed_count + finished.blocked_count, 100);
    assert_eq!(
        broadcasts::events_for_broadcast(&db, row.id.clone()).await.unwrap().len(),
        100
    );
}

#[tokio::test(start_paused = true)]
async fn transient_failures_retry_up_to_four_attempts_then_record_failed() {
    let (db, bot) = setup(1).await;
    let deliverer = Arc::new(ScriptedDeliverer::with_script(
        1,
        vec![
            DeliveryOutcome::Transient("timeout".into());
            4 // initial attempt + 3 retries, all failing
        ],
    ));
    let engine = BroadcastEngine::new(db.clone(), deliverer.clone(), true);
    let row = engine.create(bot, "all", "hi".into(), 10).await.unwrap();
    let claimed = broadcasts::claim_next_pending(&db).await.unwrap().unwrap();
    engine.run(claimed).await.unwrap();

    assert_eq!(deliverer.attempts_for(1), 4);
    let events = broadcasts::events_for_broadcast(&db, row.id.clone()).await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].status, "failed");
    assert_eq!(events[0].error_code.as_deref(), Some("timeout"));
}

#[tokio::test(start_paused = true)]
async fn a_retry_can_recover_a_transient_failure() {
    let (db, bot) = setup(1).await;
    let deliverer = Arc::new(ScriptedDeliverer::with_script(
        1,
        vec![DeliveryOutcome::Transient("flaky".into()), DeliveryOutcome::Sent],
    ));
    let engine = BroadcastEngine::new(db.clone(), deliverer.clone(), true);
    let row = engine.create(bot, "all", "hi".into(), 10).await.unwrap();
    let claimed = broadcasts::claim_next_pending(&db).await.unwrap().unwrap();
    engine.run(claimed).await.unwrap();

    assert_eq!(deliverer.attempts_for(1), 2);
    let finished = engine.status(&row.id).await.unwrap().unwrap();
    assert_eq!(finished.sent_count, 1);
    assert_eq!(finished.failed_count, 0);
}

#[tokio::test(start_paused = true)]
async fn blocked_users_are_terminal_and_deactivated() {
    let (db, bot) = setup(2).await;
    let deliverer = Arc::new(ScriptedDeliverer::with_script(1, vec![DeliveryOutcome::Blocked]));
    let engine = BroadcastEngine::new(db.clone(), deliverer.clone(), true);
    let row = engine.create(bot, "all", "hi".into(), 10).await.unwrap();
    let claimed = broadcasts::claim_next_pending(&db).await.unwrap().unwrap();
    engine.run(claimed).await.unwrap();

    // No retry for blocked.
    assert_eq!(deliverer.attempts_for(1), 1);
    let finished = engine.status(&row.id).await.unwrap().unwrap();
    assert_eq!(finished.blocked_count, 1);
    assert_eq!(finished.sent_count, 1);
    // The blocked user leaves future audiences.
    let remaining = users::audience_chunk(
        &db,
        bot,
        &apiary_storage::models::Audience::All,
        0,
        None,
        100,
    )
    .await
    .unwrap();
    assert_eq!(remaining, vec![2]);
}

#[tokio::test(start_paused = true)]
async fn interrupted_broadcast_resumes_without_double_delivery() {
    let (db, bot) = setup(10).await;
    let deliverer = Arc::new(ScriptedDeliverer::default());
    let engine = BroadcastEngine::new(db.clone(), deliverer.clone(), true);
    let row = engine.create(bot, "all", "hi".into(), 100).await.unwrap();
    let claimed = broadcasts::claim_next_pending(&db).await.unwrap().unwrap();

    // Simulate a crash after four recipients were recorded.
    for user in 1..=4 {
        broadcasts::record_delivery(&db, row.id.clone(), user, "sent", None)
            .await
            .unwrap();
    }

    engine.run(claimed).await.unwrap();

    let finished = engine.status(&row.id).await.unwrap().unwrap();
    assert_eq!(finished.status, "completed");
    assert_eq!(finished.sent_count, 10);
    // Only the six unrecorded users saw a delivery attempt.
    assert_eq!(deliverer.delivered.load(Ordering::SeqCst), 6);
    for user in 1..=4 {
        assert_eq!(deliverer.attempts_for(user), 0);
    }
}
