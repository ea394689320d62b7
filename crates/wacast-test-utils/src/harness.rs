// SPDX-FileCopyrightText: 2026 Wacast Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness for end-to-end integration testing.
//!
//! `TestHarness` assembles the complete dispatch and reconciliation stack
//! over a temp SQLite database and a [`MockSender`]. Jobs are executed
//! explicitly through [`TestHarness::drain`], so tests stay deterministic.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tempfile::TempDir;

use wacast_config::WacastConfig;
use wacast_config::model::StorageConfig;
use wacast_core::{
    AlertSink, Campaign, CampaignRecipient, CampaignStats, CampaignStore, ComponentKind,
    EventSink, EventSinks, MessageTemplate, RecipientInput, RecipientStatus, StorageAdapter,
    TemplateComponent, TemplateVariables, WacastError,
};
use wacast_dispatch::{
    DispatchAccepted, DispatchDeps, DispatchOrchestrator, DispatchRequest, DispatchRunner,
    DispatchSettings, RateController,
};
use wacast_status::{IngestSummary, StatusReconciler, WebhookIngestor};
use wacast_storage::SqliteStorage;
use wacast_suppression::{AutoSuppressionEngine, SuppressionRegistry};

use crate::mock_sender::MockSender;

/// Sender identity every harness campaign dispatches from.
pub const TEST_SENDER: &str = "pn-test";
/// Template seeded into every harness database.
pub const TEST_TEMPLATE: &str = "promo";

/// Builder for creating test environments with configurable options.
pub struct TestHarnessBuilder {
    config: WacastConfig,
    sender: Option<MockSender>,
    sinks: EventSinks,
    campaigns: Vec<String>,
}

impl TestHarnessBuilder {
    fn new() -> Self {
        let mut config = WacastConfig::default();
        config.whatsapp.phone_number_id = Some(TEST_SENDER.to_string());
        config.throttle.start_rate = 1000.0;
        config.throttle.max_rate = 2000.0;
        config.throttle.increase_step = 100.0;
        config.throttle.min_increase_gap_secs = 0;
        config.dispatch.send_timeout_secs = 5;
        config.dispatch.poll_interval_ms = 10;
        Self {
            config,
            sender: None,
            sinks: EventSinks::new(),
            campaigns: Vec::new(),
        }
    }

    /// Use a scripted sender instead of one that accepts everything.
    pub fn with_sender(mut self, sender: MockSender) -> Self {
        self.sender = Some(sender);
        self
    }

    /// Register an extra event sink (for capturing emitted events).
    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sinks = self.sinks.with(sink);
        self
    }

    /// Adjust the configuration before the stack is wired.
    pub fn with_config(mut self, adjust: impl FnOnce(&mut WacastConfig)) -> Self {
        adjust(&mut self.config);
        self
    }

    /// Dispatch batch size.
    pub fn with_batch_size(self, batch_size: usize) -> Self {
        self.with_config(|c| c.dispatch.batch_size = batch_size)
    }

    /// Seed a draft campaign with this id.
    pub fn with_campaign(mut self, id: &str) -> Self {
        self.campaigns.push(id.to_string());
        self
    }

    /// Build the test harness, creating all required subsystems.
    pub async fn build(self) -> Result<TestHarness, WacastError> {
        let temp_dir = tempfile::TempDir::new().map_err(|e| WacastError::Storage {
            source: Box::new(e),
        })?;
        let db_path = temp_dir.path().join("wacast-test.db");
        let mut config = self.config;
        config.storage = StorageConfig {
            database_path: db_path.to_string_lossy().to_string(),
            wal_mode: true,
        };

        let storage = Arc::new(SqliteStorage::new(config.storage.clone()));
        storage.initialize().await?;
        storage.upsert_template(&TestHarness::template()).await?;
        for id in &self.campaigns {
            storage.create_campaign(&Campaign::draft(id, id)).await?;
        }

        let sender = Arc::new(self.sender.unwrap_or_default());
        let sinks = self
            .sinks
            .with(Arc::new(AlertSink::new(storage.clone())));
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
            sender: sender.clone(),
            rate: rate.clone(),
            registry: registry.clone(),
            auto_suppression: auto_suppression.clone(),
            sinks: sinks.clone(),
        };
        let orchestrator = Arc::new(DispatchOrchestrator::new(
            deps,
            DispatchSettings::from_config(&config),
        ));
        let runner = DispatchRunner::new(
            orchestrator.clone(),
            storage.clone(),
            Duration::from_millis(config.dispatch.poll_interval_ms),
        );

        let reconciler = Arc::new(StatusReconciler::new(
            storage.clone(),
            registry.clone(),
            auto_suppression.clone(),
            sinks.clone(),
        ));
        let ingestor = Arc::new(WebhookIngestor::new(
            storage.clone(),
            reconciler.clone(),
            registry.clone(),
            config.whatsapp.app_secret.clone(),
            &config.webhook,
        ));

        Ok(TestHarness {
            config,
            storage,
            sender,
            sinks,
            registry,
            auto_suppression,
            rate,
            orchestrator,
            runner: Arc::new(runner),
            reconciler,
            ingestor,
            _temp_dir: temp_dir,
        })
    }
}

/// A complete dispatch engine for integration tests.
///
/// The temp directory is deleted when the harness is dropped.
pub struct TestHarness {
    pub config: WacastConfig,
    pub storage: Arc<SqliteStorage>,
    pub sender: Arc<MockSender>,
    pub sinks: EventSinks,
    pub registry: Arc<SuppressionRegistry>,
    pub auto_suppression: Arc<AutoSuppressionEngine>,
    pub rate: Arc<RateController>,
    pub orchestrator: Arc<DispatchOrchestrator>,
    pub runner: Arc<DispatchRunner>,
    pub reconciler: Arc<StatusReconciler>,
    pub ingestor: Arc<WebhookIngestor>,
    _temp_dir: TempDir,
}

impl TestHarness {
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }

    /// `Oi {{1}}, seu cupom é {{2}}`, filled from the recipient's name and
    /// `coupon` custom field by [`TestHarness::variables`].
    pub fn template() -> MessageTemplate {
        MessageTemplate {
            name: TEST_TEMPLATE.to_string(),
            language: "pt_BR".to_string(),
            components: vec![TemplateComponent {
                kind: ComponentKind::Body,
                text: Some("Oi {{1}}, seu cupom é {{2}}".to_string()),
                index: None,
                sub_type: None,
            }],
        }
    }

    pub fn variables() -> TemplateVariables {
        TemplateVariables {
            body: vec!["{{name}}".to_string(), "{{custom.coupon}}".to_string()],
            ..TemplateVariables::default()
        }
    }

    /// A sendable recipient; `i` picks a distinct phone.
    pub fn recipient(i: usize) -> RecipientInput {
        RecipientInput {
            contact_id: Some(format!("contact-{i}")),
            phone: format!("+55 11 9{i:08}"),
            name: Some(format!("Cliente {i}")),
            email: None,
            custom_fields: BTreeMap::from([("coupon".to_string(), format!("CUPOM{i}"))]),
            opted_out: false,
        }
    }

    /// `n` sendable recipients numbered from 1.
    pub fn recipients(n: usize) -> Vec<RecipientInput> {
        (1..=n).map(Self::recipient).collect()
    }

    /// Normalized phone of [`TestHarness::recipient`]`(i)`.
    pub fn phone(i: usize) -> String {
        format!("55119{i:08}")
    }

    /// Start a dispatch of the seeded template.
    pub async fn dispatch(
        &self,
        campaign_id: &str,
        recipients: Option<Vec<RecipientInput>>,
    ) -> Result<DispatchAccepted, WacastError> {
        self.orchestrator
            .start(DispatchRequest {
                campaign_id: campaign_id.to_string(),
                template_name: TEST_TEMPLATE.to_string(),
                recipients,
                template_variables: Some(Self::variables()),
                sender_id: None,
            })
            .await
    }

    /// Run queued batch jobs until the queue is empty.
    pub async fn drain(&self) -> Result<usize, WacastError> {
        self.runner.drain().await
    }

    pub async fn campaign(&self, id: &str) -> Result<Campaign, WacastError> {
        self.orchestrator.get_campaign(id).await
    }

    pub async fn stats(&self, id: &str) -> Result<CampaignStats, WacastError> {
        self.orchestrator.stats(id).await
    }

    pub async fn recipients_in(
        &self,
        campaign_id: &str,
        status: Option<RecipientStatus>,
    ) -> Result<Vec<CampaignRecipient>, WacastError> {
        self.storage.list_recipients(campaign_id, status).await
    }

    /// Feed one status callback through the webhook ingestor.
    pub async fn deliver_status(
        &self,
        message_id: &str,
        status: &str,
        error_code: Option<i64>,
    ) -> Result<IngestSummary, WacastError> {
        let body = status_payload(message_id, status, "5511900000000", 1_700_000_000, error_code);
        self.ingestor.ingest(&body, None).await
    }
}

/// A webhook body carrying one status notification.
pub fn status_payload(
    message_id: &str,
    status: &str,
    recipient_id: &str,
    timestamp: i64,
    error_code: Option<i64>,
) -> Vec<u8> {
    let mut notification = json!({
        "id": message_id,
        "status": status,
        "timestamp": timestamp.to_string(),
        "recipient_id": recipient_id,
    });
    if let Some(code) = error_code {
        notification["errors"] = json!([{ "code": code, "title": format!("error {code}") }]);
    }
    webhook_body(vec![notification], vec![])
}

/// A webhook body carrying one inbound text message.
pub fn inbound_text_payload(from: &str, text: &str) -> Vec<u8> {
    let message = json!({
        "from": from,
        "id": format!("wamid.in.{from}"),
        "timestamp": "1700000000",
        "type": "text",
        "text": { "body": text },
    });
    webhook_body(vec![], vec![message])
}

fn webhook_body(statuses: Vec<serde_json::Value>, messages: Vec<serde_json::Value>) -> Vec<u8> {
    json!({
        "object": "whatsapp_business_account",
        "entry": [{
            "id": "waba-1",
            "changes": [{
                "field": "messages",
                "value": { "statuses": statuses, "messages": messages },
            }],
        }],
    })
    .to_string()
    .into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use wacast_core::CampaignStatus;

    #[tokio::test]
    async fn harness_sends_a_small_campaign() {
        let harness = TestHarness::builder()
            .with_campaign("c1")
            .with_batch_size(2)
            .build()
            .await
            .unwrap();

        let accepted = harness
            .dispatch("c1", Some(TestHarness::recipients(3)))
            .await
            .unwrap();
        assert_eq!(accepted.batches, 2);
        assert_eq!(harness.drain().await.unwrap(), 2);

        let campaign = harness.campaign("c1").await.unwrap();
        assert_eq!(campaign.status, CampaignStatus::Completed);
        assert_eq!(campaign.sent, 3);
        assert_eq!(harness.sender.calls(), 3);
        assert!(harness.sender.sent_to().contains(&TestHarness::phone(2)));
        assert_eq!(
            harness.sender.sent()[0].components[0].parameters,
            vec!["Cliente 1", "CUPOM1"]
        );
    }

    #[test]
    fn status_payload_carries_errors() {
        let body = status_payload("wamid.1", "failed", "5511900000000", 1, Some(131_026));
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        let status = &value["entry"][0]["changes"][0]["value"]["statuses"][0];
        assert_eq!(status["errors"][0]["code"], 131_026);
    }
}
