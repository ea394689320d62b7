// SPDX-FileCopyrightText: 2026 Wacast Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Wiring of storage, sender and engine components from configuration.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::info;

use wacast_config::WacastConfig;
use wacast_core::{
    AdapterType, AlertSink, EventSinks, HealthStatus, MessageSender, PluginAdapter, SendOutcome,
    StorageAdapter, TemplateMessage, WacastError,
};
use wacast_dispatch::{
    DispatchDeps, DispatchOrchestrator, DispatchRunner, DispatchSettings, RateController,
};
use wacast_status::{StatusReconciler, WebhookIngestor};
use wacast_storage::SqliteStorage;
use wacast_suppression::{AutoSuppressionEngine, SuppressionRegistry};
use wacast_whatsapp::CloudApiClient;

/// Every long-lived component of a running engine.
pub struct Engine {
    pub storage: Arc<SqliteStorage>,
    pub registry: Arc<SuppressionRegistry>,
    pub rate: Arc<RateController>,
    pub orchestrator: Arc<DispatchOrchestrator>,
    pub runner: Arc<DispatchRunner>,
    pub ingestor: Arc<WebhookIngestor>,
}

impl Engine {
    /// Open storage (running migrations) and wire the engine around `sender`.
    ///
    /// `sinks` receives the alert sink in addition to whatever the caller
    /// registered.
    pub async fn build(
        config: &WacastConfig,
        sender: Arc<dyn MessageSender>,
        sinks: EventSinks,
    ) -> Result<Self, WacastError> {
        let storage = Arc::new(SqliteStorage::new(config.storage.clone()));
        storage.initialize().await?;
        info!(path = %config.storage.database_path, "storage ready");

        let sinks = sinks.with(Arc::new(AlertSink::new(storage.clone())));
        let registry = Arc::new(SuppressionRegistry::new(storage.clone(), sinks.clone()));
        let auto_suppression = Arc::new(AutoSuppressionEngine::new(
            config.suppression.clone(),
            storage.clone(),
            registry.clone(),
        ));
        let rate = Arc::new(RateController::new(
            config.throttle.clone(),
            storage.clone(),
            sinks.clone(),
        ));

        let deps = DispatchDeps {
            campaigns: storage.clone(),
            claims: storage.clone(),
            queue: storage.clone(),
            sender,
            rate: rate.clone(),
            registry: registry.clone(),
            auto_suppression: auto_suppression.clone(),
            sinks: sinks.clone(),
        };
        let orchestrator = Arc::new(DispatchOrchestrator::new(
            deps,
            DispatchSettings::from_config(config),
        ));
        let runner = Arc::new(DispatchRunner::new(
            orchestrator.clone(),
            storage.clone(),
            Duration::from_millis(config.dispatch.poll_interval_ms),
        ));

        let reconciler = Arc::new(StatusReconciler::new(
            storage.clone(),
            registry.clone(),
            auto_suppression,
            sinks,
        ));
        let ingestor = Arc::new(WebhookIngestor::new(
            storage.clone(),
            reconciler,
            registry.clone(),
            config.whatsapp.app_secret.clone(),
            &config.webhook,
        ));

        Ok(Self {
            storage,
            registry,
            rate,
            orchestrator,
            runner,
            ingestor,
        })
    }
}

/// The Cloud API client, or a sender that refuses every send when no
/// access token is configured. Offline commands only enqueue work.
pub fn sender_for(config: &WacastConfig) -> Arc<dyn MessageSender> {
    match CloudApiClient::new(&config.whatsapp) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            info!(reason = %e, "vendor sender unavailable; sends are disabled");
            Arc::new(DisabledSender)
        }
    }
}

/// Sender used when the vendor is not configured.
struct DisabledSender;

#[async_trait]
impl PluginAdapter for DisabledSender {
    fn name(&self) -> &str {
        "disabled"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Sender
    }

    async fn health_check(&self) -> Result<HealthStatus, WacastError> {
        Ok(HealthStatus::Unhealthy(
            "whatsapp.access_token is not set".to_string(),
        ))
    }

    async fn shutdown(&self) -> Result<(), WacastError> {
        Ok(())
    }
}

#[async_trait]
impl MessageSender for DisabledSender {
    async fn send_template(
        &self,
        _sender_id: &str,
        _message: &TemplateMessage,
    ) -> Result<SendOutcome, WacastError> {
        Err(WacastError::Config(
            "whatsapp.access_token is not set".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn engine_builds_over_a_fresh_database() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = WacastConfig::default();
        config.storage.database_path = dir.path().join("wacast.db").to_string_lossy().to_string();

        let sender = sender_for(&config);
        assert_eq!(sender.name(), "disabled");

        let engine = Engine::build(&config, sender, EventSinks::new())
            .await
            .unwrap();
        assert_eq!(engine.runner.drain().await.unwrap(), 0);
    }
}
