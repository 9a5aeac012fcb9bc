// SPDX-FileCopyrightText: 2026 Apiary Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! i18n marker resolution.
//!
//! A translatable string starts with `t:<key>`, optionally followed by
//! `{k1=v1, k2=v2}` placeholder arguments. Locale resolution order:
//! per-user preference, per-chat preference, bot default, `ru`. A key
//! missing in both the resolved and the default locale returns the
//! literal marker so missing translations are visible in output.
//!
//! Key maps are cached per (bot, locale) with a short TTL and dropped
//! on spec reload.

use std::collections::HashMap;

use apiary_core::BotId;
use apiary_storage::queries::i18n as i18n_queries;
use apiary_storage::Database;
use dashmap::DashMap;
use serde_json::{Map, Value};
use tokio::time::{Duration, Instant};
use tracing::warn;

/// Locale of last resort.
pub const FALLBACK_LOCALE: &str = "ru";

const KEY_CACHE_TTL: Duration = Duration::from_secs(300);

struct CachedKeys {
    keys: HashMap<String, String>,
    fetched_at: Instant,
}

/// Resolver with a per-(bot, locale) key cache.
pub struct I18nResolver {
    db: Database,
    cache: DashMap<(BotId, String), CachedKeys>,
}

impl I18nResolver {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            cache: DashMap::new(),
        }
    }

    /// Resolve the effective locale for a (user, chat) pair.
    pub async fn locale_for(
        &self,
        bot_id: BotId,
        user_id: i64,
        chat_id: Option<i64>,
        bot_default: &str,
    ) -> String {
        match i18n_queries::user_locale(&self.db, bot_id, user_id).await {
            Ok(Some(locale)) => return locale,
            Ok(None) => {}
            Err(e) => warn!(bot_id = %bot_id, error = %e, "user locale lookup failed"),
        }
        if let Some(chat_id) = chat_id {
            match i18n_queries::chat_locale(&self.db, bot_id, chat_id).await {
                Ok(Some(locale)) => return locale,
                Ok(None) => {}
                Err(e) => warn!(bot_id = %bot_id, error = %e, "chat locale lookup failed"),
            }
        }
        if !bot_default.is_empty() {
            return bot_default.to_string();
        }
        FALLBACK_LOCALE.to_string()
    }

    /// Resolve `text` if it is a `t:` marker; plain text passes
    /// through unchanged.
    pub async fn resolve(&self, bot_id: BotId, locale: &str, text: &str) -> String {
        let Some(marker) = parse_marker(text) else {
            return text.to_string();
        };

        let value = match self.lookup(bot_id, locale, &marker.key).await {
            Some(value) => value,
            None if locale != FALLBACK_LOCALE => {
                match self.lookup(bot_id, FALLBACK_LOCALE, &marker.key).await {
                    Some(value) => value,
                    None => {
                        warn!(bot_id = %bot_id, locale, key = %marker.key, "i18n key miss");
                        return text.to_string();
                    }
                }
            }
            None => {
                warn!(bot_id = %bot_id, locale, key = %marker.key, "i18n key miss");
                return text.to_string();
            }
        };

        let args: Map<String, Value> = marker
            .args
            .into_iter()
            .map(|(k, v)| (k, Value::String(v)))
            .collect();
        apiary_dsl::template::render_scalars_only(&value, &args)
    }

    /// Drop cached key maps for a bot (spec reload, key upsert).
    pub fn invalidate(&self, bot_id: BotId) {
        self.cache.retain(|(bot, _), _| *bot != bot_id);
    }

    async fn lookup(&self, bot_id: BotId, locale: &str, key: &str) -> Option<String> {
        let cache_key = (bot_id, locale.to_string());
        if let Some(cached) = self.cache.get(&cache_key) {
            if cached.fetched_at.elapsed() < KEY_CACHE_TTL {
                return cached.keys.get(key).cloned();
            }
        }
        match i18n_queries::keys_for(&self.db, bot_id, locale.to_string()).await {
            Ok(keys) => {
                let value = keys.get(key).cloned();
                self.cache.insert(
                    cache_key,
                    CachedKeys {
                        keys,
                        fetched_at: Instant::now(),
                    },
                );
                value
            }
            Err(e) => {
                warn!(bot_id = %bot_id, locale, error = %e, "i18n keys load failed");
                None
            }
        }
    }
}

struct Marker {
    key: String,
    args: Vec<(String, String)>,
}

/// Parse `t:<key>` / `t:<key> {a=x, b=y}`.
fn parse_marker(text: &str) -> Option<Marker> {
    let rest = text.strip_prefix("t:")?;
    let rest = rest.trim();
    if rest.is_empty() {
        return None;
    }
    let (key, tail) = match rest.find(['{', ' ']) {
        Some(pos) => (&rest[..pos], rest[pos..].trim_start()),
        None => (rest, ""),
    };
    let mut args = Vec::new();
    if let Some(body) = tail.strip_prefix('{').and_then(|t| t.strip_suffix('}')) {
        for pair in body.split(',') {
            let mut parts = pair.splitn(2, '=');
            let name = parts.next()?.trim();
            let value = parts.next()?.trim();
            if name.is_empty() {
                return None;
            }
            args.push((name.to_string(), value.to_string()));
        }
    }
    Some(Marker {
        key: key.to_string(),
        args,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn marker_parses_key_and_args() {
        let marker = parse_marker("t:greeting {name=Ira, day=Monday}").unwrap();
        assert_eq!(marker.key, "greeting");
        assert_eq!(
            marker.args,
            vec![
                ("name".to_string(), "Ira".to_string()),
                ("day".to_string(), "Monday".to_string())
            ]
        );
    }

    #[test]
    fn marker_without_args_parses_bare_key() {
        let marker = parse_marker("t:menu.title").unwrap();
        assert_eq!(marker.key, "menu.title");
        assert!(marker.args.is_empty());
    }

    #[test]
    fn plain_text_is_not_a_marker() {
        assert!(parse_marker("hello").is_none());
        assert!(parse_marker("t:").is_none());
    }
}
