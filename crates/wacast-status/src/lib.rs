// SPDX-FileCopyrightText: 2026 Wacast Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Delivery status ingestion for the Wacast dispatch engine.
//!
//! [`WebhookIngestor`] authenticates and persists every status callback
//! before anything else happens to it; [`StatusReconciler`] then applies it
//! to the matching recipient.

pub mod ingestor;
pub mod reconciler;

pub use ingestor::{IngestSummary, ReconcileSummary, WebhookIngestor};
pub use reconciler::{StatusReconciler, StatusReport};

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use tempfile::TempDir;
    use wacast_config::model::{StorageConfig, SuppressionConfig};
    use wacast_core::{
        Campaign, CampaignRecipient, CampaignStatus, CampaignStore, ClaimStore, EventSinks,
        RecipientInput, RunSpec, StorageAdapter,
    };
    use wacast_storage::SqliteStorage;
    use wacast_suppression::{AutoSuppressionEngine, SuppressionRegistry};

    use crate::StatusReconciler;

    pub async fn storage() -> (Arc<SqliteStorage>, TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("status.db");
        let storage = SqliteStorage::new(StorageConfig {
            database_path: path.to_str().unwrap().to_string(),
            wal_mode: true,
        });
        storage.initialize().await.unwrap();
        (Arc::new(storage), dir)
    }

    pub fn reconciler(store: &Arc<SqliteStorage>, sinks: EventSinks) -> Arc<StatusReconciler> {
        let registry = Arc::new(SuppressionRegistry::new(store.clone(), sinks.clone()));
        let auto = Arc::new(AutoSuppressionEngine::new(
            SuppressionConfig {
                threshold: 1,
                ..SuppressionConfig::default()
            },
            store.clone(),
            registry.clone(),
        ));
        Arc::new(StatusReconciler::new(store.clone(), registry, auto, sinks))
    }

    /// A sending campaign with one recipient sent as `message_id`.
    pub async fn sent_recipient(store: &Arc<SqliteStorage>, phone: &str, message_id: &str) {
        if store.get_campaign("c1").await.unwrap().is_none() {
            store
                .create_campaign(&Campaign::draft("c1", "Spring"))
                .await
                .unwrap();
            store
                .begin_run("c1", &[CampaignStatus::Draft], &RunSpec::default())
                .await
                .unwrap();
        }
        let id = format!("c1:{phone}");
        let row = CampaignRecipient::pending(
            id.clone(),
            "c1",
            format!("trace-{phone}"),
            RecipientInput {
                contact_id: Some(format!("contact-{phone}")),
                phone: phone.to_string(),
                ..RecipientInput::default()
            },
        );
        store.insert_recipients("c1", &[row]).await.unwrap();
        let token = store.claim("c1", &id).await.unwrap().unwrap();
        assert!(store.mark_sent(&token, message_id).await.unwrap());
    }
}
