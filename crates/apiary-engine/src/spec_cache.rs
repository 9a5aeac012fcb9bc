// SPDX-FileCopyrightText: 2026 Apiary Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Compiled spec cache with explicit reload.
//!
//! One `Arc<CompiledSpec>` per bot, swapped atomically on reload.
//! Handlers clone the Arc they route against, so an in-flight update
//! finishes on the spec it started with while the next update sees the
//! new version. No intrinsic TTL: invalidation is always explicit.

use std::sync::Arc;

use apiary_core::{ApiaryError, BotId};
use apiary_dsl::{compile, BotSpec, CompiledSpec};
use apiary_storage::queries::specs;
use apiary_storage::Database;
use dashmap::DashMap;
use tracing::info;

/// Per-bot cache of compiled specs.
pub struct SpecCache {
    db: Database,
    map: DashMap<BotId, Arc<CompiledSpec>>,
}

impl SpecCache {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            map: DashMap::new(),
        }
    }

    /// The compiled spec for a bot; compiles synchronously on a miss.
    pub async fn get(&self, bot_id: BotId) -> Result<Arc<CompiledSpec>, ApiaryError> {
        if let Some(cached) = self.map.get(&bot_id) {
            return Ok(cached.clone());
        }
        self.reload(bot_id).await
    }

    /// Recompile from the highest published version and swap the
    /// reference. Idempotent for an unchanged version.
    pub async fn reload(&self, bot_id: BotId) -> Result<Arc<CompiledSpec>, ApiaryError> {
        let row = specs::latest_spec(&self.db, bot_id)
            .await?
            .ok_or_else(|| ApiaryError::NotFound(format!("no published spec for bot {bot_id}")))?;
        let raw: BotSpec = serde_json::from_str(&row.spec_json)
            .map_err(|e| ApiaryError::SpecInvalid(format!("spec_json: {e}")))?;
        let compiled = Arc::new(compile(&raw, row.version)?);
        self.map.insert(bot_id, compiled.clone());
        info!(bot_id = %bot_id, version = row.version, "spec compiled");
        Ok(compiled)
    }

    /// Drop the cached entry; the next update recompiles.
    pub fn invalidate(&self, bot_id: BotId) {
        self.map.remove(&bot_id);
    }
}

/// Compile a candidate spec without installing it anywhere. Backs the
/// validation endpoint.
pub fn validate_spec_json(spec_json: &str) -> Result<CompiledSpec, ApiaryError> {
    let raw: BotSpec = serde_json::from_str(spec_json)
        .map_err(|e| ApiaryError::SpecInvalid(format!("spec_json: {e}")))?;
    compile(&raw, 0)
}
