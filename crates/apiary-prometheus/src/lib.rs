// SPDX-FileCopyrightText: 2026 Apiary Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Prometheus metrics for the Apiary runtime.
//!
//! Uses the metrics-rs facade with the Prometheus exporter. The
//! recorder is installed once per process; the handle renders the text
//! exposition format for the gateway's `/metrics` endpoint. When no
//! recorder is installed (library use, most tests) the recording
//! helpers are no-ops, so every crate can call them unconditionally.

pub mod recording;

use apiary_core::ApiaryError;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Prometheus metrics adapter.
pub struct PrometheusAdapter {
    handle: PrometheusHandle,
}

impl PrometheusAdapter {
    /// Install the Prometheus recorder globally. Only one recorder can
    /// exist per process; a second install returns an error.
    pub fn new() -> Result<Self, ApiaryError> {
        let handle = PrometheusBuilder::new().install_recorder().map_err(|e| {
            ApiaryError::Internal(format!("failed to install Prometheus recorder: {e}"))
        })?;

        recording::register_metrics();
        tracing::info!("prometheus metrics recorder installed");

        Ok(Self { handle })
    }

    /// Render all collected metrics in Prometheus text format.
    pub fn render(&self) -> String {
        self.handle.render()
    }
}
