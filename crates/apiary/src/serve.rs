// SPDX-FileCopyrightText: 2026 Apiary Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Runtime assembly and graceful shutdown.
//!
//! The runtime struct of record is the gateway's `AppState`: every
//! process-wide singleton (engine with its spec cache and breakers,
//! broadcast engine, metrics recorder) is built here once and passed
//! by reference. No globals.

use std::sync::Arc;
use std::time::Duration;

use apiary_broadcast::{BroadcastEngine, BroadcastWorker};
use apiary_config::ApiaryConfig;
use apiary_core::{ApiaryError, Deliverer};
use apiary_engine::Engine;
use apiary_gateway::AppState;
use apiary_llm::LlmService;
use apiary_prometheus::PrometheusAdapter;
use apiary_storage::Database;
use apiary_telegram::TelegramSender;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Install handlers for SIGTERM and SIGINT; the returned token fires
/// when either arrives.
fn install_signal_handler() -> CancellationToken {
    let token = CancellationToken::new();
    let token_clone = token.clone();

    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            let mut sigterm = match signal(SignalKind::terminate()) {
                Ok(sigterm) => sigterm,
                Err(e) => {
                    tracing::error!(error = %e, "SIGTERM handler install failed");
                    let _ = ctrl_c.await;
                    token_clone.cancel();
                    return;
                }
            };
            tokio::select! {
                _ = ctrl_c => info!("received SIGINT, shutting down"),
                _ = sigterm.recv() => info!("received SIGTERM, shutting down"),
            }
        }

        #[cfg(not(unix))]
        {
            let _ = ctrl_c.await;
            info!("received Ctrl+C, shutting down");
        }

        token_clone.cancel();
    });

    token
}

struct Runtime {
    db: Database,
    engine: Arc<Engine>,
    broadcasts: Arc<BroadcastEngine>,
    deliverer: Arc<dyn Deliverer>,
    config: ApiaryConfig,
}

async fn build_runtime(config: ApiaryConfig) -> Result<Runtime, ApiaryError> {
    let db = Database::open(&config.database.url).await?;
    let llm = Arc::new(LlmService::new(config.llm.clone(), db.clone())?);
    let engine = Arc::new(Engine::new(
        db.clone(),
        llm,
        config.events.mask_sensitive_data,
        Duration::from_secs(config.runtime.handler_deadline_secs),
    ));
    let deliverer: Arc<dyn Deliverer> = Arc::new(TelegramSender::new(db.clone()));
    let broadcasts = Arc::new(BroadcastEngine::new(
        db.clone(),
        deliverer.clone(),
        config.events.mask_sensitive_data,
    ));
    Ok(Runtime {
        db,
        engine,
        broadcasts,
        deliverer,
        config,
    })
}

/// `apiary serve`: gateway plus in-process broadcast worker.
pub async fn run_serve(config: ApiaryConfig) -> Result<(), ApiaryError> {
    let runtime = build_runtime(config).await?;
    let cancel = install_signal_handler();

    let prometheus = if runtime.config.metrics.enabled {
        Some(Arc::new(PrometheusAdapter::new()?))
    } else {
        None
    };

    let worker = BroadcastWorker::new(
        runtime.db.clone(),
        runtime.broadcasts.clone(),
        runtime.config.events.retention_days,
    );
    let worker_handle = tokio::spawn(worker.run(cancel.clone()));

    let state = AppState {
        engine: runtime.engine.clone(),
        db: runtime.db.clone(),
        broadcasts: runtime.broadcasts.clone(),
        deliverer: runtime.deliverer.clone(),
        prometheus,
        llm_probe_url: runtime
            .config
            .llm
            .enabled
            .then(|| runtime.config.llm.base_url.clone()),
    };

    apiary_gateway::serve(
        &runtime.config.gateway.host,
        runtime.config.gateway.port,
        state,
        cancel.clone(),
    )
    .await?;

    cancel.cancel();
    let _ = worker_handle.await;
    runtime.db.close().await?;
    debug!("runtime shut down cleanly");
    Ok(())
}

/// `apiary worker`: standalone broadcast worker process.
pub async fn run_worker(config: ApiaryConfig) -> Result<(), ApiaryError> {
    let runtime = build_runtime(config).await?;
    let cancel = install_signal_handler();

    BroadcastWorker::new(
        runtime.db.clone(),
        runtime.broadcasts.clone(),
        runtime.config.events.retention_days,
    )
    .run(cancel)
    .await;

    runtime.db.close().await?;
    Ok(())
}
