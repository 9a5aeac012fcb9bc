// SPDX-FileCopyrightText: 2026 Apiary Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Gateway HTTP server: routes, shared state, graceful shutdown.

use std::sync::Arc;

use apiary_broadcast::BroadcastEngine;
use apiary_core::{ApiaryError, Deliverer};
use apiary_engine::Engine;
use apiary_prometheus::PrometheusAdapter;
use apiary_storage::Database;
use axum::routing::{delete, get, post, put};
use axum::Router;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::handlers;

/// Shared state for axum request handlers.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
    pub db: Database,
    pub broadcasts: Arc<BroadcastEngine>,
    pub deliverer: Arc<dyn Deliverer>,
    pub prometheus: Option<Arc<PrometheusAdapter>>,
    /// Probe target for `GET /health/llm`; `None` when LLM is off.
    pub llm_probe_url: Option<String>,
}

/// Build the gateway router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::get_health))
        .route("/health/db", get(handlers::get_health_db))
        .route("/health/pg", get(handlers::get_health_pg))
        .route("/health/llm", get(handlers::get_health_llm))
        .route("/metrics", get(handlers::get_metrics))
        .route("/tg/:bot_id", post(handlers::post_webhook))
        .route("/preview/send", post(handlers::post_preview))
        .route("/bots", post(handlers::post_bot).get(handlers::get_bots))
        .route(
            "/bots/:bot_id",
            get(handlers::get_bot)
                .put(handlers::put_bot)
                .delete(handlers::delete_bot),
        )
        .route(
            "/bots/:bot_id/spec",
            get(handlers::get_spec).put(handlers::put_spec),
        )
        .route("/bots/:bot_id/reload", post(handlers::post_reload))
        .route("/bots/:bot_id/validate", post(handlers::post_validate))
        .route("/bots/:bot_id/data", delete(handlers::delete_bot_data))
        .route("/bots/:bot_id/broadcasts", post(handlers::post_broadcast))
        .route("/broadcasts/:broadcast_id", get(handlers::get_broadcast))
        .route("/bots/:bot_id/i18n/:locale", put(handlers::put_i18n_keys))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Bind and serve until the cancellation token fires.
pub async fn serve(
    host: &str,
    port: u16,
    state: AppState,
    cancel: CancellationToken,
) -> Result<(), ApiaryError> {
    let app = router(state);
    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| ApiaryError::Config(format!("bind {addr}: {e}")))?;
    info!(addr, "gateway listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
        .map_err(|e| ApiaryError::Internal(format!("gateway: {e}")))
}
