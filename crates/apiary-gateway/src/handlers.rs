// SPDX-FileCopyrightText: 2026 Apiary Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP request handlers.
//!
//! Webhook ingest always answers 200; delivery errors are the
//! runtime's problem, not Telegram's. The management API answers with
//! the shared error envelope.

use std::time::Instant;

use apiary_core::{ApiaryError, BotId, InboundUpdate, TraceId};
use apiary_engine::spec_cache::validate_spec_json;
use apiary_prometheus::recording;
use apiary_storage::models::{BotPatch, BotRow};
use apiary_storage::queries::{bots, i18n, specs};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::envelope::ErrorEnvelope;
use crate::server::AppState;
use crate::update::TgUpdate;

type ApiResult = Result<Response, ErrorEnvelope>;

fn parse_bot_id(raw: &str, trace: &TraceId) -> Result<BotId, ErrorEnvelope> {
    BotId::parse(raw).ok_or_else(|| {
        ErrorEnvelope::new(
            ApiaryError::NotFound(format!("bot {raw}")),
            trace.clone(),
        )
    })
}

// --- Health ---

pub async fn get_health() -> Json<Value> {
    Json(json!({"ok": true}))
}

pub async fn get_health_db(State(state): State<AppState>) -> Response {
    match state.db.ping().await {
        Ok(()) => (StatusCode::OK, Json(json!({"db_ok": true}))).into_response(),
        Err(_) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({"db_ok": false})),
        )
            .into_response(),
    }
}

/// Alias kept for the documented surface; it probes the same single
/// database as `/health/db`.
pub async fn get_health_pg(State(state): State<AppState>) -> Response {
    match state.db.ping().await {
        Ok(()) => (StatusCode::OK, Json(json!({"pg_ok": true}))).into_response(),
        Err(_) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({"pg_ok": false})),
        )
            .into_response(),
    }
}

pub async fn get_health_llm(State(state): State<AppState>) -> Response {
    let Some(url) = &state.llm_probe_url else {
        // LLM improvement is off; nothing to be unhealthy.
        return (StatusCode::OK, Json(json!({"llm_ok": true, "enabled": false})))
            .into_response();
    };
    let probe = reqwest::Client::new()
        .get(url)
        .timeout(std::time::Duration::from_secs(2))
        .send()
        .await;
    match probe {
        // Any HTTP answer means the upstream is reachable.
        Ok(_) => (StatusCode::OK, Json(json!({"llm_ok": true}))).into_response(),
        Err(_) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({"llm_ok": false})),
        )
            .into_response(),
    }
}

pub async fn get_metrics(State(state): State<AppState>) -> Response {
    match &state.prometheus {
        Some(prometheus) => prometheus.render().into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

// --- Webhook ingest ---

/// `POST /tg/{bot_id}`: always 200; errors are internalised.
pub async fn post_webhook(
    State(state): State<AppState>,
    Path(bot_id): Path<String>,
    body: String,
) -> Json<Value> {
    let started = Instant::now();
    let Some(bot_id) = BotId::parse(&bot_id) else {
        warn!(bot_id, "webhook for unparseable bot id");
        return Json(json!({"ok": true}));
    };
    let inbound = serde_json::from_str::<TgUpdate>(&body)
        .ok()
        .and_then(|update| update.into_inbound(bot_id));
    let Some(inbound) = inbound else {
        debug!(bot_id = %bot_id, "webhook update carries nothing to handle");
        return Json(json!({"ok": true}));
    };

    // Handle and deliver off the request path; Telegram only needs
    // the 200.
    let engine = state.engine.clone();
    let deliverer = state.deliverer.clone();
    tokio::spawn(async move {
        let chat_id = inbound.chat_id.unwrap_or(inbound.user_id);
        match engine.handle_update(inbound).await {
            Ok(Some(reply)) => {
                deliverer.deliver(bot_id, chat_id, &reply).await;
            }
            Ok(None) => {}
            Err(e) => warn!(bot_id = %bot_id, error = %e, "webhook handling failed"),
        }
    });

    recording::record_webhook_latency(started.elapsed().as_secs_f64() * 1000.0);
    Json(json!({"ok": true}))
}

// --- Preview ---

#[derive(Debug, Deserialize)]
pub struct PreviewRequest {
    pub bot_id: String,
    pub text: String,
    #[serde(default)]
    pub user_id: Option<i64>,
}

/// `POST /preview/send`: synchronous single-update tester.
pub async fn post_preview(
    State(state): State<AppState>,
    Json(body): Json<PreviewRequest>,
) -> ApiResult {
    let trace = TraceId::new();
    let bot_id = parse_bot_id(&body.bot_id, &trace)?;
    let user_id = body.user_id.unwrap_or(0);

    let update = InboundUpdate::text(bot_id, user_id, body.text);
    let reply = state
        .engine
        .handle_update(update)
        .await
        .map_err(|e| ErrorEnvelope::new(e, trace.clone()))?;

    let body = match reply {
        Some(reply) => {
            let mut out = json!({"bot_reply": reply.text});
            if let Some(keyboard) = reply.keyboard {
                out["keyboard"] = serde_json::to_value(&keyboard.rows).unwrap_or(Value::Null);
            }
            out
        }
        None => json!({"bot_reply": Value::Null}),
    };
    Ok(Json(body).into_response())
}

// --- Bot CRUD ---

#[derive(Debug, Deserialize)]
pub struct CreateBotRequest {
    pub name: String,
    pub token: String,
    #[serde(default)]
    pub llm_enabled: Option<bool>,
    #[serde(default)]
    pub llm_preset: Option<String>,
    #[serde(default)]
    pub daily_budget_limit: Option<i64>,
}

pub async fn post_bot(
    State(state): State<AppState>,
    Json(body): Json<CreateBotRequest>,
) -> ApiResult {
    let trace = TraceId::new();
    let mut bot = BotRow::new(body.name, body.token);
    if let Some(llm_enabled) = body.llm_enabled {
        bot.llm_enabled = llm_enabled;
    }
    if let Some(llm_preset) = body.llm_preset {
        bot.llm_preset = llm_preset;
    }
    if let Some(limit) = body.daily_budget_limit {
        bot.daily_budget_limit = limit;
    }
    bots::create_bot(&state.db, &bot)
        .await
        .map_err(|e| ErrorEnvelope::new(e, trace))?;
    Ok((StatusCode::CREATED, Json(bot)).into_response())
}

pub async fn get_bots(State(state): State<AppState>) -> ApiResult {
    let trace = TraceId::new();
    let bots = bots::list_bots(&state.db)
        .await
        .map_err(|e| ErrorEnvelope::new(e, trace))?;
    Ok(Json(bots).into_response())
}

pub async fn get_bot(State(state): State<AppState>, Path(bot_id): Path<String>) -> ApiResult {
    let trace = TraceId::new();
    let bot_id = parse_bot_id(&bot_id, &trace)?;
    let bot = bots::get_bot(&state.db, bot_id)
        .await
        .map_err(|e| ErrorEnvelope::new(e, trace.clone()))?
        .ok_or_else(|| {
            ErrorEnvelope::new(ApiaryError::NotFound(format!("bot {bot_id}")), trace)
        })?;
    Ok(Json(bot).into_response())
}

pub async fn put_bot(
    State(state): State<AppState>,
    Path(bot_id): Path<String>,
    Json(patch): Json<BotPatch>,
) -> ApiResult {
    let trace = TraceId::new();
    let bot_id = parse_bot_id(&bot_id, &trace)?;
    let updated = bots::update_bot(&state.db, bot_id, patch)
        .await
        .map_err(|e| ErrorEnvelope::new(e, trace.clone()))?
        .ok_or_else(|| {
            ErrorEnvelope::new(ApiaryError::NotFound(format!("bot {bot_id}")), trace)
        })?;
    Ok(Json(updated).into_response())
}

pub async fn delete_bot(State(state): State<AppState>, Path(bot_id): Path<String>) -> ApiResult {
    let trace = TraceId::new();
    let bot_id = parse_bot_id(&bot_id, &trace)?;
    let removed = bots::delete_bot(&state.db, bot_id)
        .await
        .map_err(|e| ErrorEnvelope::new(e, trace.clone()))?;
    if !removed {
        return Err(ErrorEnvelope::new(
            ApiaryError::NotFound(format!("bot {bot_id}")),
            trace,
        ));
    }
    state.engine.invalidate_bot_caches(bot_id);
    Ok(Json(json!({"deleted": true})).into_response())
}

// --- Spec lifecycle ---

pub async fn get_spec(State(state): State<AppState>, Path(bot_id): Path<String>) -> ApiResult {
    let trace = TraceId::new();
    let bot_id = parse_bot_id(&bot_id, &trace)?;
    let spec = specs::latest_spec(&state.db, bot_id)
        .await
        .map_err(|e| ErrorEnvelope::new(e, trace.clone()))?
        .ok_or_else(|| {
            ErrorEnvelope::new(ApiaryError::NotFound(format!("spec for bot {bot_id}")), trace)
        })?;
    let spec_json: Value = serde_json::from_str(&spec.spec_json).unwrap_or(Value::Null);
    Ok(Json(json!({
        "bot_id": bot_id.to_string(),
        "version": spec.version,
        "published_at": spec.published_at,
        "spec_json": spec_json,
    }))
    .into_response())
}

/// `PUT /bots/{id}/spec`: validate, publish a new version, reload.
pub async fn put_spec(
    State(state): State<AppState>,
    Path(bot_id): Path<String>,
    Json(spec_json): Json<Value>,
) -> ApiResult {
    let trace = TraceId::new();
    let bot_id = parse_bot_id(&bot_id, &trace)?;
    bots::get_bot(&state.db, bot_id)
        .await
        .map_err(|e| ErrorEnvelope::new(e, trace.clone()))?
        .ok_or_else(|| {
            ErrorEnvelope::new(ApiaryError::NotFound(format!("bot {bot_id}")), trace.clone())
        })?;

    let raw = spec_json.to_string();
    validate_spec_json(&raw).map_err(|e| ErrorEnvelope::new(e, trace.clone()))?;
    let version = specs::publish_spec(&state.db, bot_id, raw)
        .await
        .map_err(|e| ErrorEnvelope::new(e, trace.clone()))?;
    state.engine.invalidate_bot_caches(bot_id);
    state
        .engine
        .spec_cache()
        .reload(bot_id)
        .await
        .map_err(|e| ErrorEnvelope::new(e, trace))?;
    Ok(Json(json!({"bot_id": bot_id.to_string(), "version": version})).into_response())
}

pub async fn post_reload(State(state): State<AppState>, Path(bot_id): Path<String>) -> ApiResult {
    let trace = TraceId::new();
    let bot_id = parse_bot_id(&bot_id, &trace)?;
    state.engine.invalidate_bot_caches(bot_id);
    let compiled = state
        .engine
        .spec_cache()
        .reload(bot_id)
        .await
        .map_err(|e| ErrorEnvelope::new(e, trace))?;
    Ok(Json(json!({
        "bot_id": bot_id.to_string(),
        "cache_invalidated": true,
        "spec_version": compiled.version,
    }))
    .into_response())
}

pub async fn post_validate(
    Path(_bot_id): Path<String>,
    Json(spec_json): Json<Value>,
) -> Json<Value> {
    match validate_spec_json(&spec_json.to_string()) {
        Ok(compiled) => Json(json!({
            "valid": true,
            "intents": compiled.intents.len(),
            "menus": compiled.menus.len(),
            "wizards": compiled.wizards.len(),
        })),
        Err(e) => Json(json!({"valid": false, "error": e.to_string()})),
    }
}

/// `DELETE /bots/{id}/data`: explicit tenant data purge.
pub async fn delete_bot_data(
    State(state): State<AppState>,
    Path(bot_id): Path<String>,
) -> ApiResult {
    let trace = TraceId::new();
    let bot_id = parse_bot_id(&bot_id, &trace)?;
    bots::purge_bot_data(&state.db, bot_id)
        .await
        .map_err(|e| ErrorEnvelope::new(e, trace))?;
    state.engine.invalidate_bot_caches(bot_id);
    Ok(Json(json!({"purged": true})).into_response())
}

// --- Broadcasts ---

#[derive(Debug, Deserialize)]
pub struct CreateBroadcastRequest {
    pub audience: String,
    pub message: String,
    #[serde(default)]
    pub throttle: Option<ThrottleSpec>,
}

#[derive(Debug, Deserialize)]
pub struct ThrottleSpec {
    pub per_sec: u32,
}

pub async fn post_broadcast(
    State(state): State<AppState>,
    Path(bot_id): Path<String>,
    Json(body): Json<CreateBroadcastRequest>,
) -> ApiResult {
    let trace = TraceId::new();
    let bot_id = parse_bot_id(&bot_id, &trace)?;
    let per_sec = body.throttle.map(|t| t.per_sec).unwrap_or(30);
    let row = state
        .broadcasts
        .create(bot_id, &body.audience, body.message, per_sec)
        .await
        .map_err(|e| ErrorEnvelope::new(e, trace))?;
    Ok((StatusCode::CREATED, Json(row)).into_response())
}

pub async fn get_broadcast(
    State(state): State<AppState>,
    Path(broadcast_id): Path<String>,
) -> ApiResult {
    let trace = TraceId::new();
    let row = state
        .broadcasts
        .status(&broadcast_id)
        .await
        .map_err(|e| ErrorEnvelope::new(e, trace.clone()))?
        .ok_or_else(|| {
            ErrorEnvelope::new(
                ApiaryError::NotFound(format!("broadcast {broadcast_id}")),
                trace,
            )
        })?;
    Ok(Json(row).into_response())
}

// --- i18n keys ---

#[derive(Debug, Deserialize)]
pub struct PutI18nRequest {
    pub keys: std::collections::HashMap<String, String>,
}

pub async fn put_i18n_keys(
    State(state): State<AppState>,
    Path((bot_id, locale)): Path<(String, String)>,
    Json(body): Json<PutI18nRequest>,
) -> ApiResult {
    let trace = TraceId::new();
    let bot_id = parse_bot_id(&bot_id, &trace)?;
    let count = body.keys.len();
    i18n::upsert_keys(
        &state.db,
        bot_id,
        locale.clone(),
        body.keys.into_iter().collect(),
    )
    .await
    .map_err(|e| ErrorEnvelope::new(e, trace))?;
    state.engine.invalidate_bot_caches(bot_id);
    Ok(Json(json!({"locale": locale, "keys": count})).into_response())
}

