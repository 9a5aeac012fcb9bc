// SPDX-FileCopyrightText: 2026 Apiary Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests for the storage layer: wizard state CAS, TTL
//! expiry, audience selection, and tenant purge.

use apiary_core::{BotId, EventRecord, TraceId};
use apiary_storage::models::{Audience, BotRow, WizardStateRow, WIZARD_STATE_FORMAT};
use apiary_storage::models::{iso_after_secs, now_iso};
use apiary_storage::queries::{bots, broadcasts, events, i18n, state, users};
use apiary_storage::Database;

fn fresh_state(bot_id: BotId, user_id: i64, step: i64) -> WizardStateRow {
    WizardStateRow {
        bot_id,
        user_id,
        format: WIZARD_STATE_FORMAT.to_string(),
        flow_cmd: "/book".to_string(),
        step,
        vars: "{}".to_string(),
        started_at: now_iso(),
        expires_at: iso_after_secs(3600),
    }
}

#[tokio::test]
async fn wizard_state_advance_is_compare_and_set() {
    let db = Database::open_in_memory().await.unwrap();
    let bot = BotId::new();
    state::start(&db, fresh_state(bot, 1, 0)).await.unwrap();

    // First advance from step 0 wins.
    let won = state::advance(&db, bot, 1, 0, 1, r#"{"service":"spa"}"#.into(), iso_after_secs(3600))
        .await
        .unwrap();
    assert!(won);

    // A racer still expecting step 0 loses and changes nothing.
    let lost = state::advance(&db, bot, 1, 0, 1, r#"{"service":"x"}"#.into(), iso_after_secs(3600))
        .await
        .unwrap();
    assert!(!lost);

    let current = state::load(&db, bot, 1).await.unwrap().unwrap();
    assert_eq!(current.step, 1);
    assert_eq!(current.vars, r#"{"service":"spa"}"#);
}

#[tokio::test]
async fn expired_wizard_state_reads_as_absent() {
    let db = Database::open_in_memory().await.unwrap();
    let bot = BotId::new();
    let mut expired = fresh_state(bot, 2, 1);
    expired.expires_at = iso_after_secs(-10);
    state::start(&db, expired).await.unwrap();

    assert!(state::load(&db, bot, 2).await.unwrap().is_none());
    // The lapsed row was dropped, not just hidden.
    assert!(state::load(&db, bot, 2).await.unwrap().is_none());
}

#[tokio::test]
async fn wizard_state_is_tenant_scoped() {
    let db = Database::open_in_memory().await.unwrap();
    let (bot_a, bot_b) = (BotId::new(), BotId::new());
    state::start(&db, fresh_state(bot_a, 1, 3)).await.unwrap();

    assert!(state::load(&db, bot_b, 1).await.unwrap().is_none());
    state::delete(&db, bot_b, 1).await.unwrap();
    assert_eq!(state::load(&db, bot_a, 1).await.unwrap().unwrap().step, 3);
}

#[tokio::test]
async fn audience_chunks_are_ordered_and_resumable() {
    let db = Database::open_in_memory().await.unwrap();
    let bot = BotId::new();
    for user in [5, 1, 9, 3] {
        users::touch_user(&db, bot, user).await.unwrap();
    }
    users::deactivate_user(&db, bot, 9).await.unwrap();

    let chunk = users::audience_chunk(&db, bot, &Audience::All, 0, None, 1000)
        .await
        .unwrap();
    assert_eq!(chunk, vec![1, 3, 5]);

    // A recorded delivery removes the user from the next chunk.
    broadcasts::record_delivery(&db, "bc-1".into(), 3, "sent", None)
        .await
        .unwrap();
    let resumed = users::audience_chunk(&db, bot, &Audience::All, 0, Some("bc-1".into()), 1000)
        .await
        .unwrap();
    assert_eq!(resumed, vec![1, 5]);
}

#[tokio::test]
async fn segment_audience_matches_json_tags() {
    let db = Database::open_in_memory().await.unwrap();
    let bot = BotId::new();
    users::touch_user(&db, bot, 1).await.unwrap();
    users::touch_user(&db, bot, 2).await.unwrap();
    users::set_segment_tags(&db, bot, 2, &["vip".to_string(), "beta".to_string()])
        .await
        .unwrap();

    let vip = users::audience_chunk(&db, bot, &Audience::Segment("vip".into()), 0, None, 1000)
        .await
        .unwrap();
    assert_eq!(vip, vec![2]);
    assert_eq!(
        users::count_audience(&db, bot, &Audience::Segment("vip".into()))
            .await
            .unwrap(),
        1
    );
}

#[tokio::test]
async fn locale_preferences_are_scoped_per_user_and_chat() {
    let db = Database::open_in_memory().await.unwrap();
    let bot = BotId::new();
    i18n::set_locale(&db, bot, Some(1), None, "en".into()).await.unwrap();
    i18n::set_locale(&db, bot, None, Some(77), "ru".into()).await.unwrap();
    // Upsert replaces in place.
    i18n::set_locale(&db, bot, Some(1), None, "ru".into()).await.unwrap();

    assert_eq!(i18n::user_locale(&db, bot, 1).await.unwrap().as_deref(), Some("ru"));
    assert_eq!(i18n::chat_locale(&db, bot, 77).await.unwrap().as_deref(), Some("ru"));
    assert!(i18n::user_locale(&db, bot, 2).await.unwrap().is_none());
}

#[tokio::test]
async fn purge_erases_tenant_data_but_not_the_neighbour() {
    let db = Database::open_in_memory().await.unwrap();
    let (bot_a, bot_b) = (BotId::new(), BotId::new());
    for bot in [bot_a, bot_b] {
        bots::create_bot(&db, &BotRow { id: bot, ..BotRow::new("b", "t") })
            .await
            .unwrap();
        users::touch_user(&db, bot, 1).await.unwrap();
        events::append_event(
            &db,
            EventRecord::new(bot, Some(1), "update", serde_json::json!({}), &TraceId::new()),
            true,
        )
        .await;
    }

    bots::purge_bot_data(&db, bot_a).await.unwrap();

    assert!(events::events_for_bot(&db, bot_a, 10).await.unwrap().is_empty());
    assert_eq!(events::events_for_bot(&db, bot_b, 10).await.unwrap().len(), 1);
    assert!(users::audience_chunk(&db, bot_a, &Audience::All, 0, None, 10)
        .await
        .unwrap()
        .is_empty());
    // The bot record itself survives a data purge.
    assert!(bots::get_bot(&db, bot_a).await.unwrap().is_some());
}
