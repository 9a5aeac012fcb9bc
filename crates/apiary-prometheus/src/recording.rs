// SPDX-FileCopyrightText: 2026 Apiary Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Metric registration and recording helpers.
//!
//! One helper per stable metric name. Label sets are part of the
//! external contract and never change shape at a call site.

use apiary_core::BotId;
use metrics::{describe_counter, describe_histogram};

/// Register all metric descriptions. Called once after the recorder is
/// installed.
pub fn register_metrics() {
    describe_counter!("bot_updates_total", "Inbound updates per bot");
    describe_counter!("bot_errors_total", "Errors per bot, component, and code");
    describe_histogram!("dsl_handle_latency_ms", "Update handling latency in ms");
    describe_histogram!("webhook_latency_ms", "Webhook request latency in ms");
    describe_counter!("bot_sql_query_total", "sql_query actions per bot");
    describe_counter!("bot_sql_exec_total", "sql_exec actions per bot");
    describe_histogram!("dsl_action_latency_ms", "Action latency in ms per kind");
    describe_counter!("llm_requests_total", "LLM requests by type and status");
    describe_histogram!("llm_latency_ms", "LLM latency in ms by type and cache state");
    describe_counter!("llm_tokens_total", "LLM tokens by model and type");
    describe_counter!("llm_cache_hits_total", "LLM prompt cache hits per model");
    describe_counter!("llm_errors_total", "LLM errors by model and error type");
    describe_counter!("llm_timeout_total", "LLM timeouts per bot");
    describe_counter!(
        "circuit_breaker_state_changes_total",
        "Breaker transitions per bot and target state"
    );
    describe_counter!(
        "llm_circuit_breaker_rejections_total",
        "Requests rejected by an open breaker per bot"
    );
    describe_counter!("widget_calendar_renders_total", "Calendar renders per bot");
    describe_counter!("widget_calendar_picks_total", "Calendar picks per bot and mode");
    describe_counter!("broadcast_sent_total", "Broadcast deliveries per bot");
    describe_counter!("broadcast_failed_total", "Broadcast failures per bot");
}

pub fn record_update(bot_id: BotId) {
    metrics::counter!("bot_updates_total", "bot_id" => bot_id.to_string()).increment(1);
}

pub fn record_error(bot_id: BotId, component: &'static str, code: &'static str) {
    metrics::counter!(
        "bot_errors_total",
        "bot_id" => bot_id.to_string(),
        "where" => component,
        "code" => code
    )
    .increment(1);
}

pub fn record_handle_latency(ms: f64) {
    metrics::histogram!("dsl_handle_latency_ms").record(ms);
}

pub fn record_webhook_latency(ms: f64) {
    metrics::histogram!("webhook_latency_ms").record(ms);
}

pub fn record_sql_query(bot_id: BotId) {
    metrics::counter!("bot_sql_query_total", "bot_id" => bot_id.to_string()).increment(1);
}

pub fn record_sql_exec(bot_id: BotId) {
    metrics::counter!("bot_sql_exec_total", "bot_id" => bot_id.to_string()).increment(1);
}

pub fn record_action_latency(action: &'static str, ms: f64) {
    metrics::histogram!("dsl_action_latency_ms", "action" => action).record(ms);
}

pub fn record_llm_request(kind: &'static str, status: &'static str) {
    metrics::counter!("llm_requests_total", "type" => kind, "status" => status).increment(1);
}

pub fn record_llm_latency(kind: &'static str, cached: bool, ms: f64) {
    metrics::histogram!(
        "llm_latency_ms",
        "type" => kind,
        "cached" => if cached { "true" } else { "false" }
    )
    .record(ms);
}

pub fn record_llm_tokens(model: &str, kind: &'static str, tokens: u64) {
    metrics::counter!(
        "llm_tokens_total",
        "model" => model.to_string(),
        "type" => kind
    )
    .increment(tokens);
}

pub fn record_llm_cache_hit(model: &str) {
    metrics::counter!("llm_cache_hits_total", "model" => model.to_string()).increment(1);
}

pub fn record_llm_error(model: &str, error_type: &'static str) {
    metrics::counter!(
        "llm_errors_total",
        "model" => model.to_string(),
        "error_type" => error_type
    )
    .increment(1);
}

pub fn record_llm_timeout(bot_id: BotId) {
    metrics::counter!("llm_timeout_total", "bot_id" => bot_id.to_string()).increment(1);
}

pub fn record_breaker_transition(bot_id: BotId, to: &'static str) {
    metrics::counter!(
        "circuit_breaker_state_changes_total",
        "bot_id" => bot_id.to_string(),
        "to" => to
    )
    .increment(1);
}

pub fn record_breaker_rejection(bot_id: BotId) {
    metrics::counter!(
        "llm_circuit_breaker_rejections_total",
        "bot_id" => bot_id.to_string()
    )
    .increment(1);
}

pub fn record_calendar_render(bot_id: BotId) {
    metrics::counter!("widget_calendar_renders_total", "bot_id" => bot_id.to_string())
        .increment(1);
}

pub fn record_calendar_pick(bot_id: BotId, mode: &'static str) {
    metrics::counter!(
        "widget_calendar_picks_total",
        "bot_id" => bot_id.to_string(),
        "mode" => mode
    )
    .increment(1);
}

pub fn record_broadcast_sent(bot_id: BotId) {
    metrics::counter!("broadcast_sent_total", "bot_id" => bot_id.to_string()).increment(1);
}

pub fn record_broadcast_failed(bot_id: BotId) {
    metrics::counter!("broadcast_failed_total", "bot_id" => bot_id.to_string()).increment(1);
}
