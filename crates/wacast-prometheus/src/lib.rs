// SPDX-FileCopyrightText: 2026 Wacast Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Prometheus metrics adapter for the Wacast dispatch engine.
//!
//! Uses the metrics-rs facade with the Prometheus exporter.
//! Metrics are rendered as Prometheus text format via the `render()` method,
//! which is exposed through the gateway's /metrics endpoint.

pub mod recording;

use async_trait::async_trait;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use wacast_core::traits::adapter::PluginAdapter;
use wacast_core::types::{AdapterType, DispatchEvent, HealthStatus};
use wacast_core::{EventSink, WacastError};

/// Prometheus metrics adapter.
///
/// Installs the Prometheus recorder and exposes a handle for rendering
/// metrics in Prometheus text format.
pub struct PrometheusAdapter {
    handle: PrometheusHandle,
}

impl PrometheusAdapter {
    /// Create a new PrometheusAdapter.
    ///
    /// Installs the Prometheus recorder globally. Only one recorder can be
    /// installed per process. Returns an error if a recorder is already installed.
    pub fn new() -> Result<Self, WacastError> {
        let handle = PrometheusBuilder::new().install_recorder().map_err(|e| {
            WacastError::Internal(format!("failed to install Prometheus recorder: {e}"))
        })?;

        recording::register_metrics();

        tracing::info!("prometheus metrics recorder installed");

        Ok(Self { handle })
    }

    /// Get a reference to the Prometheus handle for rendering.
    pub fn handle(&self) -> &PrometheusHandle {
        &self.handle
    }

    /// Render all collected metrics in Prometheus text format.
    pub fn render(&self) -> String {
        self.handle.render()
    }
}

#[async_trait]
impl PluginAdapter for PrometheusAdapter {
    fn name(&self) -> &str {
        "prometheus"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Observability
    }

    async fn health_check(&self) -> Result<HealthStatus, WacastError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), WacastError> {
        Ok(())
    }
}

/// Event sink that turns dispatch events into metrics.
#[derive(Debug, Clone, Copy, Default)]
pub struct PrometheusSink;

impl PrometheusSink {
    /// Record one event against the current recorder.
    pub fn observe(&self, event: &DispatchEvent) {
        match event {
            DispatchEvent::RecipientSent { latency_secs, .. } => {
                recording::record_sent(*latency_secs)
            }
            DispatchEvent::RecipientFailed { category, .. } => {
                recording::record_failed(&category.to_string())
            }
            DispatchEvent::RecipientSkipped { code, .. } => {
                recording::record_skipped(&code.to_string())
            }
            DispatchEvent::RateChanged {
                sender_id,
                next,
                reason,
                ..
            } => recording::set_target_rate(sender_id, *next, &reason.to_string()),
            DispatchEvent::BatchCompleted { .. } => recording::record_batch(),
            DispatchEvent::CampaignFinished { status, .. } => {
                recording::record_campaign_finished(&status.to_string())
            }
            DispatchEvent::StatusApplied {
                status, outcome, ..
            } => recording::record_status_event(&status.to_string(), &outcome.to_string()),
            DispatchEvent::PhoneSuppressed { source, .. } => {
                recording::record_suppression(&source.to_string())
            }
            DispatchEvent::CriticalAlert { .. } => recording::record_critical_alert(),
        }
    }
}

#[async_trait]
impl EventSink for PrometheusSink {
    async fn record(&self, event: &DispatchEvent) -> Result<(), WacastError> {
        self.observe(event);
        Ok(())
    }
}
