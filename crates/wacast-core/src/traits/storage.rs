// SPDX-FileCopyrightText: 2026 Wacast Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Storage traits for the dispatch-and-reconciliation engine.
//!
//! Each component depends only on the narrow store it mutates. Every
//! mutation is a conditional update that reports whether a row changed, so
//! concurrent callers are safe without holding a global lock.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::WacastError;
use crate::template::{MessageTemplate, TemplateVariables};
use crate::traits::adapter::PluginAdapter;
use crate::types::{
    Campaign, CampaignRecipient, CampaignStats, CampaignStatus, ClaimToken, DeliveryStatus,
    EventState, FailureDetail, NewStatusEvent, OperatorAlert, QueueEntry, ReceiptChange,
    RecipientStatus, RecordOutcome, SkipDetail, StatusEvent, SuppressionEntry,
    SuppressionSource, ThrottleState,
};

/// Adapter for storage and persistence backends.
#[async_trait]
pub trait StorageAdapter: PluginAdapter {
    /// Initializes the storage backend (migrations, connection, etc.).
    async fn initialize(&self) -> Result<(), WacastError>;

    /// Closes the storage backend, flushing pending writes and releasing connections.
    async fn close(&self) -> Result<(), WacastError>;
}

/// Per-recipient state transitions.
///
/// `claim` is the sole idempotency mechanism for sends: it moves a
/// recipient `pending -> sending` only if it is still `pending`. The
/// terminal updates are conditional as well and keep campaign counters in
/// step with recipient rows.
#[async_trait]
pub trait ClaimStore: Send + Sync {
    /// Claim a recipient for sending. `None` means another attempt already
    /// claimed or finished it.
    async fn claim(
        &self,
        campaign_id: &str,
        recipient_id: &str,
    ) -> Result<Option<ClaimToken>, WacastError>;

    /// Return a claimed recipient to `pending` (`sending -> pending`).
    async fn release_claim(&self, token: &ClaimToken) -> Result<bool, WacastError>;

    /// `sending -> sent`, recording the external message id.
    async fn mark_sent(&self, token: &ClaimToken, message_id: &str) -> Result<bool, WacastError>;

    /// `pending|sending -> failed`.
    async fn mark_failed(
        &self,
        campaign_id: &str,
        recipient_id: &str,
        failure: &FailureDetail,
    ) -> Result<bool, WacastError>;

    /// `pending -> skipped`.
    async fn mark_skipped(
        &self,
        campaign_id: &str,
        recipient_id: &str,
        skip: &SkipDetail,
    ) -> Result<bool, WacastError>;
}

/// What a new dispatch run changes on the campaign. `None` keeps the stored value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSpec {
    pub template_name: Option<String>,
    pub template_variables: Option<TemplateVariables>,
    pub sender_id: Option<String>,
}

/// Campaigns, their recipient snapshots, and the templates they send.
#[async_trait]
pub trait CampaignStore: Send + Sync {
    async fn create_campaign(&self, campaign: &Campaign) -> Result<(), WacastError>;

    async fn get_campaign(&self, id: &str) -> Result<Option<Campaign>, WacastError>;

    /// Move the campaign to `sending` from one of `allowed_from`, record
    /// `started_at` if unset, and bump `dispatch_run`.
    ///
    /// Fails with `NotFound` or `InvalidState`.
    async fn begin_run(
        &self,
        id: &str,
        allowed_from: &[CampaignStatus],
        spec: &RunSpec,
    ) -> Result<Campaign, WacastError>;

    /// Conditional status change; `false` if the campaign was not in `from`.
    async fn transition_campaign(
        &self,
        id: &str,
        from: &[CampaignStatus],
        to: CampaignStatus,
    ) -> Result<bool, WacastError>;

    /// Finish a `sending` campaign: `failed` when it has recipients and every
    /// one of them failed or was skipped, `completed` otherwise.
    ///
    /// Returns the new status, or `None` if the campaign was not `sending`.
    async fn finish_campaign(&self, id: &str) -> Result<Option<CampaignStatus>, WacastError>;

    /// Insert recipient rows, ignoring ones already present for the same
    /// campaign and phone. Returns how many were inserted.
    async fn insert_recipients(
        &self,
        campaign_id: &str,
        recipients: &[CampaignRecipient],
    ) -> Result<usize, WacastError>;

    async fn list_recipients(
        &self,
        campaign_id: &str,
        status: Option<RecipientStatus>,
    ) -> Result<Vec<CampaignRecipient>, WacastError>;

    async fn get_recipients(
        &self,
        campaign_id: &str,
        ids: &[String],
    ) -> Result<Vec<CampaignRecipient>, WacastError>;

    /// `skipped -> pending` for all skipped recipients, or only `ids`.
    async fn reopen_skipped(
        &self,
        campaign_id: &str,
        ids: Option<&[String]>,
    ) -> Result<usize, WacastError>;

    async fn campaign_stats(&self, campaign_id: &str) -> Result<CampaignStats, WacastError>;

    async fn upsert_template(&self, template: &MessageTemplate) -> Result<(), WacastError>;

    async fn get_template(&self, name: &str) -> Result<Option<MessageTemplate>, WacastError>;
}

/// Applies asynchronous delivery receipts to recipient rows, keyed by message id.
#[async_trait]
pub trait ReceiptStore: Send + Sync {
    async fn find_recipient_by_message_id(
        &self,
        message_id: &str,
    ) -> Result<Option<CampaignRecipient>, WacastError>;

    /// Monotonically record a `delivered` or `read` receipt. A read also
    /// sets the delivery mark when it is missing.
    ///
    /// Returns `None` when no recipient carries `message_id`.
    async fn apply_receipt(
        &self,
        message_id: &str,
        status: DeliveryStatus,
        at: &str,
    ) -> Result<Option<ReceiptChange>, WacastError>;

    /// Mark a sent recipient `failed` from an asynchronous failure report.
    ///
    /// Returns `None` when unmatched, `Some(false)` when already failed.
    async fn apply_delivery_failure(
        &self,
        message_id: &str,
        failure: &FailureDetail,
        at: &str,
    ) -> Result<Option<bool>, WacastError>;
}

/// Per-sender learned throughput.
#[async_trait]
pub trait ThrottleStore: Send + Sync {
    async fn load_throttle(&self, sender_id: &str) -> Result<Option<ThrottleState>, WacastError>;

    async fn save_throttle(&self, state: &ThrottleState) -> Result<(), WacastError>;
}

/// Phone deny-list, failure history, and recipient opt-outs.
#[async_trait]
pub trait SuppressionStore: Send + Sync {
    async fn get_suppression(&self, phone: &str) -> Result<Option<SuppressionEntry>, WacastError>;

    /// Insert or re-activate an entry, bumping its suppression count.
    async fn upsert_suppression(
        &self,
        phone: &str,
        reason: &str,
        source: SuppressionSource,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<SuppressionEntry, WacastError>;

    async fn deactivate_suppression(&self, phone: &str) -> Result<bool, WacastError>;

    async fn list_suppressions(
        &self,
        active_only: bool,
        limit: usize,
    ) -> Result<Vec<SuppressionEntry>, WacastError>;

    async fn record_failure(
        &self,
        phone: &str,
        code: i64,
        campaign_id: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<(), WacastError>;

    /// Failures for `phone` with one of `codes` at or after `since`.
    async fn count_failures_since(
        &self,
        phone: &str,
        codes: &[i64],
        since: DateTime<Utc>,
    ) -> Result<i64, WacastError>;

    /// Returns `true` if the phone was not opted out before.
    async fn record_opt_out(&self, phone: &str, reason: &str) -> Result<bool, WacastError>;

    async fn is_opted_out(&self, phone: &str) -> Result<bool, WacastError>;

    async fn clear_opt_out(&self, phone: &str) -> Result<bool, WacastError>;
}

/// Append-first log of inbound status notifications.
#[async_trait]
pub trait StatusEventStore: Send + Sync {
    /// Durably record an event. The (message id, status) pair is unique.
    async fn record_status_event(
        &self,
        event: &NewStatusEvent,
    ) -> Result<RecordOutcome, WacastError>;

    /// Record one processing attempt.
    async fn set_event_state(
        &self,
        id: i64,
        state: EventState,
        last_error: Option<&str>,
    ) -> Result<(), WacastError>;

    /// Events in one of `states` with fewer than `max_attempts` attempts, oldest first.
    async fn list_events(
        &self,
        states: &[EventState],
        max_attempts: i64,
        limit: usize,
    ) -> Result<Vec<StatusEvent>, WacastError>;
}

/// Durable, crash-safe job queue.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Enqueue unless a job with the same idempotency key exists.
    ///
    /// A job with `not_before` is not dequeued until that instant.
    async fn enqueue(
        &self,
        queue_name: &str,
        idempotency_key: &str,
        group_key: Option<&str>,
        payload: &str,
        not_before: Option<DateTime<Utc>>,
    ) -> Result<Option<i64>, WacastError>;

    /// Lock and return the oldest pending job that is due.
    async fn dequeue(&self, queue_name: &str) -> Result<Option<QueueEntry>, WacastError>;

    async fn ack(&self, id: i64) -> Result<(), WacastError>;

    /// Return the job to `pending`, or mark it `failed` once out of attempts.
    async fn fail(&self, id: i64) -> Result<(), WacastError>;

    /// Jobs in `group_key` that are pending or processing.
    async fn count_outstanding(&self, group_key: &str) -> Result<i64, WacastError>;

    /// Return `processing` jobs whose lock expired to `pending`.
    async fn requeue_expired(&self, queue_name: &str) -> Result<usize, WacastError>;
}

/// An alert about to be persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAlert {
    pub campaign_id: Option<String>,
    pub message_id: Option<String>,
    pub code: Option<i64>,
    pub title: String,
    pub message: String,
}

/// Operator-visible alerts.
#[async_trait]
pub trait AlertStore: Send + Sync {
    async fn insert_alert(&self, alert: &NewAlert) -> Result<i64, WacastError>;

    async fn list_alerts(&self, limit: usize) -> Result<Vec<OperatorAlert>, WacastError>;
}
