// SPDX-FileCopyrightText: 2026 Apiary Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain model types for storage rows.
//!
//! Timestamps are RFC 3339 UTC strings with a fixed format so string
//! comparison orders them correctly (TTL expiry and retention rely on
//! this).

use apiary_core::BotId;
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Current UTC timestamp in the canonical storage format.
pub fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// UTC timestamp `secs` seconds from now, canonical format.
pub fn iso_after_secs(secs: i64) -> String {
    (Utc::now() + chrono::Duration::seconds(secs)).to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// A hosted bot (tenant).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotRow {
    pub id: BotId,
    pub name: String,
    /// Webhook credential. Masked in events, never returned by list
    /// endpoints verbatim.
    pub token: String,
    /// `active` or `disabled`.
    pub status: String,
    pub llm_enabled: bool,
    /// `short`, `neutral`, or `detailed`.
    pub llm_preset: String,
    /// Daily LLM token budget; 0 means unlimited.
    pub daily_budget_limit: i64,
    pub created_at: String,
    pub updated_at: String,
}

impl BotRow {
    pub fn new(name: impl Into<String>, token: impl Into<String>) -> Self {
        let now = now_iso();
        Self {
            id: BotId::new(),
            name: name.into(),
            token: token.into(),
            status: "active".to_string(),
            llm_enabled: false,
            llm_preset: "neutral".to_string(),
            daily_budget_limit: 0,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == "active"
    }
}

/// Partial update for a bot record; `None` fields are left unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BotPatch {
    pub name: Option<String>,
    pub token: Option<String>,
    pub status: Option<String>,
    pub llm_enabled: Option<bool>,
    pub llm_preset: Option<String>,
    pub daily_budget_limit: Option<i64>,
}

/// One published spec version.
#[derive(Debug, Clone)]
pub struct SpecRow {
    pub bot_id: BotId,
    pub version: i64,
    pub spec_json: String,
    pub published_at: String,
}

/// One append-only event row, as read back from the log.
#[derive(Debug, Clone, Serialize)]
pub struct EventRow {
    pub id: i64,
    pub bot_id: BotId,
    pub user_id: Option<i64>,
    pub ts: String,
    pub kind: String,
    pub data: serde_json::Value,
}

/// Per-(bot, user) wizard state record.
#[derive(Debug, Clone)]
pub struct WizardStateRow {
    pub bot_id: BotId,
    pub user_id: i64,
    /// Format tag; only `wizard.v1` is understood. Anything else is
    /// treated as corrupt and discarded.
    pub format: String,
    /// Entry command of the owning wizard flow.
    pub flow_cmd: String,
    pub step: i64,
    /// JSON object of collected variables.
    pub vars: String,
    pub started_at: String,
    pub expires_at: String,
}

/// Known wizard state format tag.
pub const WIZARD_STATE_FORMAT: &str = "wizard.v1";

/// A known end user of a bot.
#[derive(Debug, Clone, Serialize)]
pub struct BotUserRow {
    pub bot_id: BotId,
    pub user_id: i64,
    pub last_active: String,
    /// JSON array of segment tags.
    pub segment_tags: String,
    pub is_active: bool,
}

/// Broadcast audience selector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Audience {
    All,
    Active7d,
    Segment(String),
}

impl Audience {
    /// Parse `all`, `active_7d`, or `segment:<tag>`.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "all" => Some(Audience::All),
            "active_7d" => Some(Audience::Active7d),
            other => {
                let tag = other.strip_prefix("segment:")?;
                let valid = !tag.is_empty()
                    && tag.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_');
                valid.then(|| Audience::Segment(tag.to_string()))
            }
        }
    }

    pub fn as_str(&self) -> String {
        match self {
            Audience::All => "all".to_string(),
            Audience::Active7d => "active_7d".to_string(),
            Audience::Segment(tag) => format!("segment:{tag}"),
        }
    }
}

/// A broadcast campaign with live counters.
#[derive(Debug, Clone, Serialize)]
pub struct BroadcastRow {
    pub id: String,
    pub bot_id: BotId,
    pub audience: String,
    pub message: String,
    pub throttle_per_sec: u32,
    /// `pending`, `running`, `completed`, or `failed`.
    pub status: String,
    pub total_users: i64,
    pub sent_count: i64,
    pub failed_count: i64,
    pub blocked_count: i64,
    pub created_at: String,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
}

/// One per-recipient delivery record.
#[derive(Debug, Clone, Serialize)]
pub struct BroadcastEventRow {
    pub broadcast_id: String,
    pub user_id: i64,
    /// `sent`, `failed`, or `blocked`.
    pub status: String,
    pub error_code: Option<String>,
    pub sent_at: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn audience_parses_the_three_selectors() {
        assert_eq!(Audience::parse("all"), Some(Audience::All));
        assert_eq!(Audience::parse("active_7d"), Some(Audience::Active7d));
        assert_eq!(
            Audience::parse("segment:vip_2024"),
            Some(Audience::Segment("vip_2024".to_string()))
        );
        assert_eq!(Audience::parse("segment:"), None);
        assert_eq!(Audience::parse("segment:no spaces"), None);
        assert_eq!(Audience::parse("everyone"), None);
    }

    #[test]
    fn iso_timestamps_order_lexicographically() {
        let earlier = now_iso();
        let later = iso_after_secs(60);
        assert!(earlier < later);
    }
}
