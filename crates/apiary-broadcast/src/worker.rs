// SPDX-FileCopyrightText: 2026 Apiary Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The background worker: claims pending campaigns, resumes stranded
//! ones at startup, and runs the periodic retention sweep.

use std::sync::Arc;

use apiary_storage::queries::{broadcasts, events, llm_cache};
use apiary_storage::Database;
use tokio::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::engine::BroadcastEngine;

/// Interval between queue polls when idle.
const POLL_INTERVAL: Duration = Duration::from_secs(1);
/// Interval between retention sweeps.
const SWEEP_INTERVAL: Duration = Duration::from_secs(3600);

/// Long-running broadcast queue consumer.
pub struct BroadcastWorker {
    db: Database,
    engine: Arc<BroadcastEngine>,
    retention_days: u32,
}

impl BroadcastWorker {
    pub fn new(db: Database, engine: Arc<BroadcastEngine>, retention_days: u32) -> Self {
        Self {
            db,
            engine,
            retention_days,
        }
    }

    /// Run until the token cancels. Resumes `running` campaigns left
    /// over from a previous process first.
    pub async fn run(self, cancel: CancellationToken) {
        info!("broadcast worker starting");

        match broadcasts::list_running(&self.db).await {
            Ok(stranded) => {
                for row in stranded {
                    info!(broadcast_id = %row.id, "resuming interrupted broadcast");
                    if let Err(e) = self.engine.run(row).await {
                        error!(error = %e, "broadcast resume failed");
                    }
                }
            }
            Err(e) => error!(error = %e, "could not list stranded broadcasts"),
        }

        let mut last_sweep = Instant::now();
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(POLL_INTERVAL) => {}
            }

            loop {
                match broadcasts::claim_next_pending(&self.db).await {
                    Ok(Some(row)) => {
                        if let Err(e) = self.engine.run(row).await {
                            error!(error = %e, "broadcast execution failed");
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        error!(error = %e, "broadcast claim failed");
                        break;
                    }
                }
                if cancel.is_cancelled() {
                    return;
                }
            }

            if last_sweep.elapsed() >= SWEEP_INTERVAL {
                last_sweep = Instant::now();
                self.sweep().await;
            }
        }

        info!("broadcast worker stopped");
    }

    async fn sweep(&self) {
        match events::purge_older_than(&self.db, self.retention_days).await {
            Ok(removed) if removed > 0 => {
                info!(removed, retention_days = self.retention_days, "event retention sweep")
            }
            Ok(_) => {}
            Err(e) => error!(error = %e, "event retention sweep failed"),
        }
        if let Err(e) = llm_cache::purge_expired(&self.db).await {
            error!(error = %e, "llm cache sweep failed");
        }
    }
}
