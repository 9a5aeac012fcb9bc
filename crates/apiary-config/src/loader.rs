// SPDX-FileCopyrightText: 2026 Apiary Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered merging.
//!
//! The environment layer uses the documented raw variable names
//! (`DATABASE_URL`, `LLM_BASE_URL`, ...) rather than a single prefix,
//! so each name is mapped explicitly onto its dotted config key.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};

use crate::model::ApiaryConfig;

/// Load configuration from `apiary.toml` and the environment.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `./apiary.toml`
/// 3. Documented environment variables
pub fn load_config() -> Result<ApiaryConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(ApiaryConfig::default()))
        .merge(Toml::file("apiary.toml"))
        .merge(env_provider())
        .extract()
}

/// Load configuration from an inline TOML string with defaults applied.
///
/// Used in tests and for explicit config injection.
pub fn load_config_from_str(toml_content: &str) -> Result<ApiaryConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(ApiaryConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// The documented environment variables and their dotted config keys.
///
/// Names are matched exactly; an unrelated variable never leaks into
/// the config, so `Env::raw()` is filtered through this table.
const ENV_KEYS: &[(&str, &str)] = &[
    ("database_url", "database.url"),
    ("llm_enabled", "llm.enabled"),
    ("llm_base_url", "llm.base_url"),
    ("llm_model", "llm.model"),
    ("llm_timeout", "llm.timeout_secs"),
    ("llm_max_retries", "llm.max_retries"),
    ("llm_rate_limit", "llm.rate_limit_per_min"),
    ("llm_cache_ttl", "llm.cache_ttl_secs"),
    ("log_level", "runtime.log_level"),
    ("events_db_retention_days", "events.retention_days"),
    ("metrics_enabled", "metrics.enabled"),
    ("mask_sensitive_data", "events.mask_sensitive_data"),
];

fn env_provider() -> Env {
    let names: Vec<&str> = ENV_KEYS.iter().map(|(name, _)| *name).collect();
    Env::raw().only(&names).map(|key| {
        let key_str = key.as_str().to_ascii_lowercase();
        ENV_KEYS
            .iter()
            .find(|(name, _)| *name == key_str)
            .map(|(_, dotted)| (*dotted).into())
            .unwrap_or_else(|| key_str.into())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_without_any_source() {
        let cfg = load_config_from_str("").unwrap();
        assert_eq!(cfg.database.url, "apiary.db");
        assert!(!cfg.llm.enabled);
        assert_eq!(cfg.llm.rate_limit_per_min, 10);
        assert_eq!(cfg.events.retention_days, 30);
        assert!(cfg.events.mask_sensitive_data);
    }

    #[test]
    fn toml_overrides_defaults() {
        let cfg = load_config_from_str(
            r#"
            [database]
            url = "/var/lib/apiary/bots.db"

            [llm]
            enabled = true
            timeout_secs = 10
            "#,
        )
        .unwrap();
        assert_eq!(cfg.database.url, "/var/lib/apiary/bots.db");
        assert!(cfg.llm.enabled);
        assert_eq!(cfg.llm.timeout_secs, 10);
        // Untouched sections keep their defaults.
        assert_eq!(cfg.gateway.port, 8080);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = load_config_from_str("[database]\nurll = \"x\"\n");
        assert!(err.is_err());
    }
}
