// SPDX-FileCopyrightText: 2026 Apiary Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs.
//!
//! All sections are optional and default to values that run the
//! process against a local SQLite file with LLM improvement disabled.

use serde::{Deserialize, Serialize};

/// Top-level runtime configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ApiaryConfig {
    /// Process-wide settings.
    #[serde(default)]
    pub runtime: RuntimeConfig,

    /// Database settings.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// LLM improvement settings.
    #[serde(default)]
    pub llm: LlmConfig,

    /// Event log settings.
    #[serde(default)]
    pub events: EventsConfig,

    /// Metrics exposition settings.
    #[serde(default)]
    pub metrics: MetricsConfig,

    /// HTTP gateway settings.
    #[serde(default)]
    pub gateway: GatewayConfig,
}

/// Process-wide settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RuntimeConfig {
    /// Logging filter (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Deadline for handling one inbound update, in seconds.
    #[serde(default = "default_handler_deadline_secs")]
    pub handler_deadline_secs: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            handler_deadline_secs: default_handler_deadline_secs(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_handler_deadline_secs() -> u64 {
    30
}

/// Database settings. The URL is a filesystem path for SQLite.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DatabaseConfig {
    /// Database location (`DATABASE_URL`).
    #[serde(default = "default_database_url")]
    pub url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
        }
    }
}

fn default_database_url() -> String {
    "apiary.db".to_string()
}

/// LLM improvement settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LlmConfig {
    /// Master switch (`LLM_ENABLED`). A bot's own `llm_enabled` flag is
    /// only honoured when this is true.
    #[serde(default)]
    pub enabled: bool,

    /// Base URL of the OpenAI-compatible upstream (`LLM_BASE_URL`).
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,

    /// Model identifier (`LLM_MODEL`).
    #[serde(default = "default_llm_model")]
    pub model: String,

    /// Per-request timeout in seconds (`LLM_TIMEOUT`).
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,

    /// Transient-error retries per request (`LLM_MAX_RETRIES`).
    #[serde(default = "default_llm_max_retries")]
    pub max_retries: u32,

    /// Per-(bot, user) requests per minute (`LLM_RATE_LIMIT`).
    #[serde(default = "default_llm_rate_limit")]
    pub rate_limit_per_min: u32,

    /// Prompt cache TTL in seconds (`LLM_CACHE_TTL`).
    #[serde(default = "default_llm_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: default_llm_base_url(),
            model: default_llm_model(),
            timeout_secs: default_llm_timeout_secs(),
            max_retries: default_llm_max_retries(),
            rate_limit_per_min: default_llm_rate_limit(),
            cache_ttl_secs: default_llm_cache_ttl_secs(),
        }
    }
}

fn default_llm_base_url() -> String {
    "http://llm:11434".to_string()
}

fn default_llm_model() -> String {
    "microsoft/Phi-3-mini-4k-instruct".to_string()
}

fn default_llm_timeout_secs() -> u64 {
    30
}

fn default_llm_max_retries() -> u32 {
    3
}

fn default_llm_rate_limit() -> u32 {
    10
}

fn default_llm_cache_ttl_secs() -> u64 {
    900
}

/// Event log settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct EventsConfig {
    /// Days to keep `bot_events` rows (`EVENTS_DB_RETENTION_DAYS`).
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,

    /// Replace sensitive values with `***masked***` before events are
    /// written (`MASK_SENSITIVE_DATA`).
    #[serde(default = "default_mask_sensitive_data")]
    pub mask_sensitive_data: bool,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            retention_days: default_retention_days(),
            mask_sensitive_data: default_mask_sensitive_data(),
        }
    }
}

fn default_retention_days() -> u32 {
    30
}

fn default_mask_sensitive_data() -> bool {
    true
}

/// Metrics exposition settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct MetricsConfig {
    /// Serve `GET /metrics` (`METRICS_ENABLED`).
    #[serde(default = "default_metrics_enabled")]
    pub enabled: bool,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_metrics_enabled(),
        }
    }
}

fn default_metrics_enabled() -> bool {
    true
}

/// HTTP gateway settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    /// Host address to bind.
    #[serde(default = "default_gateway_host")]
    pub host: String,

    /// Port to bind.
    #[serde(default = "default_gateway_port")]
    pub port: u16,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_gateway_host(),
            port: default_gateway_port(),
        }
    }
}

fn default_gateway_host() -> String {
    "0.0.0.0".to_string()
}

fn default_gateway_port() -> u16 {
    8080
}
