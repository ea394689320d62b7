// SPDX-FileCopyrightText: 2026 Wacast Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite implementation of the storage traits.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::OnceCell;
use tracing::debug;

use wacast_config::model::StorageConfig;
use wacast_core::{
    AdapterType, AlertStore, Campaign, CampaignRecipient, CampaignStats, CampaignStatus,
    CampaignStore, ClaimStore, ClaimToken, DeliveryStatus, EventState, FailureDetail,
    HealthStatus, JobQueue, MessageTemplate, NewAlert, NewStatusEvent, OperatorAlert,
    PluginAdapter, QueueEntry, ReceiptChange, ReceiptStore, RecipientStatus, RecordOutcome,
    RunSpec, SkipDetail, StatusEvent, StatusEventStore, StorageAdapter, SuppressionEntry,
    SuppressionSource, SuppressionStore, ThrottleState, ThrottleStore, WacastError,
};

use crate::database::{Database, map_tr_err};
use crate::queries;

/// Default queue lock, long enough for one batch at the minimum rate.
const DEFAULT_JOB_LOCK_SECS: u64 = 300;

/// SQLite-backed storage adapter.
///
/// Wraps a [`Database`] handle and delegates all query operations to the
/// typed query modules. The database is lazily initialized on the first
/// call to [`StorageAdapter::initialize`].
pub struct SqliteStorage {
    config: StorageConfig,
    db: OnceCell<Database>,
    job_lock_secs: u64,
}

impl SqliteStorage {
    /// Create a new SqliteStorage with the given configuration.
    ///
    /// The database connection is not opened until [`initialize`] is called.
    ///
    /// [`initialize`]: StorageAdapter::initialize
    pub fn new(config: StorageConfig) -> Self {
        Self {
            config,
            db: OnceCell::new(),
            job_lock_secs: DEFAULT_JOB_LOCK_SECS,
        }
    }

    /// How long a dequeued job stays locked before it may be requeued.
    pub fn with_job_lock_secs(mut self, secs: u64) -> Self {
        self.job_lock_secs = secs;
        self
    }

    /// Returns a reference to the underlying Database, or an error if not initialized.
    pub fn db(&self) -> Result<&Database, WacastError> {
        self.db.get().ok_or_else(|| WacastError::Storage {
            source: "storage not initialized -- call initialize() first".into(),
        })
    }

    async fn checkpoint(&self) -> Result<(), WacastError> {
        if let Some(db) = self.db.get() {
            db.connection()
                .call(|conn| -> Result<(), rusqlite::Error> {
                    conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
                    Ok(())
                })
                .await
                .map_err(map_tr_err)?;
            debug!("WAL checkpoint complete");
        }
        Ok(())
    }
}

#[async_trait]
impl PluginAdapter for SqliteStorage {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Storage
    }

    async fn health_check(&self) -> Result<HealthStatus, WacastError> {
        let db = self.db()?;
        db.connection()
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("SELECT 1;")?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)?;
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), WacastError> {
        self.checkpoint().await
    }
}

#[async_trait]
impl StorageAdapter for SqliteStorage {
    async fn initialize(&self) -> Result<(), WacastError> {
        let db = Database::open_with(&self.config.database_path, self.config.wal_mode).await?;
        self.db.set(db).map_err(|_| WacastError::Storage {
            source: "storage already initialized".into(),
        })?;
        debug!(path = %self.config.database_path, "SQLite storage initialized");
        Ok(())
    }

    async fn close(&self) -> Result<(), WacastError> {
        self.db()?;
        self.checkpoint().await
    }
}

#[async_trait]
impl ClaimStore for SqliteStorage {
    async fn claim(
        &self,
        campaign_id: &str,
        recipient_id: &str,
    ) -> Result<Option<ClaimToken>, WacastError> {
        queries::recipients::claim(self.db()?, campaign_id, recipient_id).await
    }

    async fn release_claim(&self, token: &ClaimToken) -> Result<bool, WacastError> {
        queries::recipients::release_claim(self.db()?, token).await
    }

    async fn mark_sent(&self, token: &ClaimToken, message_id: &str) -> Result<bool, WacastError> {
        queries::recipients::mark_sent(self.db()?, token, message_id).await
    }

    async fn mark_failed(
        &self,
        campaign_id: &str,
        recipient_id: &str,
        failure: &FailureDetail,
    ) -> Result<bool, WacastError> {
        queries::recipients::mark_failed(self.db()?, campaign_id, recipient_id, failure).await
    }

    async fn mark_skipped(
        &self,
        campaign_id: &str,
        recipient_id: &str,
        skip: &SkipDetail,
    ) -> Result<bool, WacastError> {
        queries::recipients::mark_skipped(self.db()?, campaign_id, recipient_id, skip).await
    }
}

#[async_trait]
impl CampaignStore for SqliteStorage {
    async fn create_campaign(&self, campaign: &Campaign) -> Result<(), WacastError> {
        queries::campaigns::create_campaign(self.db()?, campaign).await
    }

    async fn get_campaign(&self, id: &str) -> Result<Option<Campaign>, WacastError> {
        queries::campaigns::get_campaign(self.db()?, id).await
    }

    async fn begin_run(
        &self,
        id: &str,
        allowed_from: &[CampaignStatus],
        spec: &RunSpec,
    ) -> Result<Campaign, WacastError> {
        queries::campaigns::begin_run(self.db()?, id, allowed_from, spec).await
    }

    async fn transition_campaign(
        &self,
        id: &str,
        from: &[CampaignStatus],
        to: CampaignStatus,
    ) -> Result<bool, WacastError> {
        queries::campaigns::transition_campaign(self.db()?, id, from, to).await
    }

    async fn finish_campaign(&self, id: &str) -> Result<Option<CampaignStatus>, WacastError> {
        queries::campaigns::finish_campaign(self.db()?, id).await
    }

    async fn insert_recipients(
        &self,
        campaign_id: &str,
        recipients: &[CampaignRecipient],
    ) -> Result<usize, WacastError> {
        queries::recipients::insert_recipients(self.db()?, campaign_id, recipients).await
    }

    async fn list_recipients(
        &self,
        campaign_id: &str,
        status: Option<RecipientStatus>,
    ) -> Result<Vec<CampaignRecipient>, WacastError> {
        queries::recipients::list_recipients(self.db()?, campaign_id, status).await
    }

    async fn get_recipients(
        &self,
        campaign_id: &str,
        ids: &[String],
    ) -> Result<Vec<CampaignRecipient>, WacastError> {
        queries::recipients::get_recipients(self.db()?, campaign_id, ids).await
    }

    async fn reopen_skipped(
        &self,
        campaign_id: &str,
        ids: Option<&[String]>,
    ) -> Result<usize, WacastError> {
        queries::recipients::reopen_skipped(self.db()?, campaign_id, ids).await
    }

    async fn campaign_stats(&self, campaign_id: &str) -> Result<CampaignStats, WacastError> {
        queries::recipients::campaign_stats(self.db()?, campaign_id).await
    }

    async fn upsert_template(&self, template: &MessageTemplate) -> Result<(), WacastError> {
        queries::templates::upsert_template(self.db()?, template).await
    }

    async fn get_template(&self, name: &str) -> Result<Option<MessageTemplate>, WacastError> {
        queries::templates::get_template(self.db()?, name).await
    }
}

#[async_trait]
impl ReceiptStore for SqliteStorage {
    async fn find_recipient_by_message_id(
        &self,
        message_id: &str,
    ) -> Result<Option<CampaignRecipient>, WacastError> {
        queries::recipients::find_by_message_id(self.db()?, message_id).await
    }

    async fn apply_receipt(
        &self,
        message_id: &str,
        status: DeliveryStatus,
        at: &str,
    ) -> Result<Option<ReceiptChange>, WacastError> {
        queries::recipients::apply_receipt(self.db()?, message_id, status, at).await
    }

    async fn apply_delivery_failure(
        &self,
        message_id: &str,
        failure: &FailureDetail,
        at: &str,
    ) -> Result<Option<bool>, WacastError> {
        queries::recipients::apply_delivery_failure(self.db()?, message_id, failure, at).await
    }
}

#[async_trait]
impl ThrottleStore for SqliteStorage {
    async fn load_throttle(&self, sender_id: &str) -> Result<Option<ThrottleState>, WacastError> {
        queries::throttle::load_throttle(self.db()?, sender_id).await
    }

    async fn save_throttle(&self, state: &ThrottleState) -> Result<(), WacastError> {
        queries::throttle::save_throttle(self.db()?, state).await
    }
}

#[async_trait]
impl SuppressionStore for SqliteStorage {
    async fn get_suppression(&self, phone: &str) -> Result<Option<SuppressionEntry>, WacastError> {
        queries::suppressions::get_suppression(self.db()?, phone).await
    }

    async fn upsert_suppression(
        &self,
        phone: &str,
        reason: &str,
        source: SuppressionSource,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<SuppressionEntry, WacastError> {
        queries::suppressions::upsert_suppression(self.db()?, phone, reason, source, expires_at)
            .await
    }

    async fn deactivate_suppression(&self, phone: &str) -> Result<bool, WacastError> {
        queries::suppressions::deactivate_suppression(self.db()?, phone).await
    }

    async fn list_suppressions(
        &self,
        active_only: bool,
        limit: usize,
    ) -> Result<Vec<SuppressionEntry>, WacastError> {
        queries::suppressions::list_suppressions(self.db()?, active_only, limit).await
    }

    async fn record_failure(
        &self,
        phone: &str,
        code: i64,
        campaign_id: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<(), WacastError> {
        queries::suppressions::record_failure(self.db()?, phone, code, campaign_id, at).await
    }

    async fn count_failures_since(
        &self,
        phone: &str,
        codes: &[i64],
        since: DateTime<Utc>,
    ) -> Result<i64, WacastError> {
        queries::suppressions::count_failures_since(self.db()?, phone, codes, since).await
    }

    async fn record_opt_out(&self, phone: &str, reason: &str) -> Result<bool, WacastError> {
        queries::suppressions::record_opt_out(self.db()?, phone, reason).await
    }

    async fn is_opted_out(&self, phone: &str) -> Result<bool, WacastError> {
        queries::suppressions::is_opted_out(self.db()?, phone).await
    }

    async fn clear_opt_out(&self, phone: &str) -> Result<bool, WacastError> {
        queries::suppressions::clear_opt_out(self.db()?, phone).await
    }
}

#[async_trait]
impl StatusEventStore for SqliteStorage {
    async fn record_status_event(
        &self,
        event: &NewStatusEvent,
    ) -> Result<RecordOutcome, WacastError> {
        queries::status_events::record_status_event(self.db()?, event).await
    }

    async fn set_event_state(
        &self,
        id: i64,
        state: EventState,
        last_error: Option<&str>,
    ) -> Result<(), WacastError> {
        queries::status_events::set_event_state(self.db()?, id, state, last_error).await
    }

    async fn list_events(
        &self,
        states: &[EventState],
        max_attempts: i64,
        limit: usize,
    ) -> Result<Vec<StatusEvent>, WacastError> {
        queries::status_events::list_events(self.db()?, states, max_attempts, limit).await
    }
}

#[async_trait]
impl JobQueue for SqliteStorage {
    async fn enqueue(
        &self,
        queue_name: &str,
        idempotency_key: &str,
        group_key: Option<&str>,
        payload: &str,
        not_before: Option<DateTime<Utc>>,
    ) -> Result<Option<i64>, WacastError> {
        queries::queue::enqueue(
            self.db()?,
            queue_name,
            idempotency_key,
            group_key,
            payload,
            not_before,
        )
        .await
    }

    async fn dequeue(&self, queue_name: &str) -> Result<Option<QueueEntry>, WacastError> {
        queries::queue::dequeue(self.db()?, queue_name, self.job_lock_secs).await
    }

    async fn ack(&self, id: i64) -> Result<(), WacastError> {
        queries::queue::ack(self.db()?, id).await
    }

    async fn fail(&self, id: i64) -> Result<(), WacastError> {
        queries::queue::fail(self.db()?, id).await
    }

    async fn count_outstanding(&self, group_key: &str) -> Result<i64, WacastError> {
        queries::queue::count_outstanding(self.db()?, group_key).await
    }

    async fn requeue_expired(&self, queue_name: &str) -> Result<usize, WacastError> {
        queries::queue::requeue_expired(self.db()?, queue_name).await
    }
}

#[async_trait]
impl AlertStore for SqliteStorage {
    async fn insert_alert(&self, alert: &NewAlert) -> Result<i64, WacastError> {
        queries::alerts::insert_alert(self.db()?, alert).await
    }

    async fn list_alerts(&self, limit: usize) -> Result<Vec<OperatorAlert>, WacastError> {
        queries::alerts::list_alerts(self.db()?, limit).await
    }
}
