// SPDX-FileCopyrightText: 2026 Wacast Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types used across traits and the Wacast engine.

use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::template::TemplateVariables;
use crate::vendor::ErrorCategory;

/// Format a timestamp the way every table stores it (`2026-01-01T00:00:00.000Z`).
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Current time in storage format.
pub fn now_timestamp() -> String {
    format_timestamp(Utc::now())
}

/// Parse a stored or vendor timestamp.
///
/// Accepts RFC 3339 strings and the unix-seconds strings the vendor puts
/// in webhook `timestamp` fields.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    raw.parse::<i64>()
        .ok()
        .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
}

/// Health status reported by adapter health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Adapter is fully operational.
    Healthy,
    /// Adapter is operational but experiencing issues.
    Degraded(String),
    /// Adapter is not operational.
    Unhealthy(String),
}

/// Identifies the kind of adapter behind a trait object.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum AdapterType {
    Storage,
    Sender,
    Observability,
}

// --- Campaigns ---

/// Lifecycle status of a campaign.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum CampaignStatus {
    Draft,
    Scheduled,
    Sending,
    Paused,
    Completed,
    Failed,
    Cancelled,
}

impl CampaignStatus {
    /// Terminal statuses only move again through an explicit operator action.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Whether `self -> next` is a legal transition.
    ///
    /// Transitions are monotonic except `sending <-> paused`. Re-opening a
    /// finished campaign for a resend of skipped recipients is the one
    /// sanctioned way back to `sending`.
    pub fn can_transition_to(self, next: CampaignStatus) -> bool {
        use CampaignStatus::*;
        match (self, next) {
            (Draft | Scheduled, Sending | Cancelled) => true,
            (Draft, Scheduled) => true,
            (Sending, Paused | Completed | Failed | Cancelled) => true,
            (Paused, Sending | Cancelled) => true,
            (Completed | Failed, Sending) => true,
            _ => false,
        }
    }
}

/// A unit of bulk send.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Campaign {
    pub id: String,
    pub name: String,
    pub status: CampaignStatus,
    /// Template dispatched by the most recent run.
    pub template_name: Option<String>,
    /// Variables dispatched by the most recent run.
    pub template_variables: Option<TemplateVariables>,
    /// Outbound phone number id; falls back to the configured sender.
    pub sender_id: Option<String>,
    pub recipients: i64,
    pub sent: i64,
    pub failed: i64,
    pub skipped: i64,
    pub delivered: i64,
    pub read: i64,
    /// Incremented by every start, resume, or resend.
    pub dispatch_run: i64,
    pub started_at: Option<String>,
    pub first_dispatch_at: Option<String>,
    pub last_sent_at: Option<String>,
    pub completed_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl Campaign {
    /// A fresh draft campaign with zeroed counters.
    pub fn draft(id: impl Into<String>, name: impl Into<String>) -> Self {
        let now = now_timestamp();
        Self {
            id: id.into(),
            name: name.into(),
            status: CampaignStatus::Draft,
            template_name: None,
            template_variables: None,
            sender_id: None,
            recipients: 0,
            sent: 0,
            failed: 0,
            skipped: 0,
            delivered: 0,
            read: 0,
            dispatch_run: 0,
            started_at: None,
            first_dispatch_at: None,
            last_sent_at: None,
            completed_at: None,
            created_at: now.clone(),
            updated_at: now,
        }
    }
}

/// Aggregate counts computed from recipient rows.
///
/// `delivered` counts every recipient with either a delivery or a read
/// receipt: a read implies delivery even when the delivery event never
/// arrived.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignStats {
    pub recipients: i64,
    pub pending: i64,
    pub sending: i64,
    pub sent: i64,
    pub failed: i64,
    pub skipped: i64,
    pub delivered: i64,
    pub read: i64,
}

// --- Recipients ---

/// Per-recipient dispatch state machine: `pending -> sending -> {sent|failed|skipped}`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RecipientStatus {
    Pending,
    Sending,
    Sent,
    Failed,
    Skipped,
}

/// Closed set of reasons a recipient is skipped before any network call.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, EnumString, Serialize,
    Deserialize,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SkipCode {
    InvalidPhone,
    MissingVariable,
    OptOut,
    Suppressed,
    InvalidTemplate,
}

/// Why a recipient was skipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkipDetail {
    pub code: SkipCode,
    pub reason: String,
}

/// Why a recipient failed, as reported by the vendor or the transport.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureDetail {
    /// Vendor error code; `None` for transport failures and timeouts.
    pub code: Option<i64>,
    pub title: String,
    pub details: Option<String>,
    /// Vendor trace id (`fbtrace_id`).
    pub trace_id: Option<String>,
}

/// Recipient data supplied with a dispatch request or loaded from the snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecipientInput {
    #[serde(default)]
    pub contact_id: Option<String>,
    pub phone: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub custom_fields: BTreeMap<String, String>,
    #[serde(default)]
    pub opted_out: bool,
}

/// One (campaign, contact) pairing targeted for a single send.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CampaignRecipient {
    pub id: String,
    pub campaign_id: String,
    pub contact_id: Option<String>,
    pub phone: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub custom_fields: BTreeMap<String, String>,
    pub opted_out: bool,
    pub status: RecipientStatus,
    /// External send identifier; set only on `sent`.
    pub message_id: Option<String>,
    /// Correlation id carried through logs for this recipient.
    pub trace_id: String,
    pub failure: Option<FailureDetail>,
    pub skip: Option<SkipDetail>,
    pub sending_at: Option<String>,
    pub sent_at: Option<String>,
    pub failed_at: Option<String>,
    pub skipped_at: Option<String>,
    pub delivered_at: Option<String>,
    pub read_at: Option<String>,
}

impl CampaignRecipient {
    /// Build a pending recipient row from dispatch input.
    pub fn pending(id: String, campaign_id: &str, trace_id: String, input: RecipientInput) -> Self {
        Self {
            id,
            campaign_id: campaign_id.to_string(),
            contact_id: input.contact_id,
            phone: input.phone,
            name: input.name,
            email: input.email,
            custom_fields: input.custom_fields,
            opted_out: input.opted_out,
            status: RecipientStatus::Pending,
            message_id: None,
            trace_id,
            failure: None,
            skip: None,
            sending_at: None,
            sent_at: None,
            failed_at: None,
            skipped_at: None,
            delivered_at: None,
            read_at: None,
        }
    }
}

/// Proof that a worker won the `pending -> sending` transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimToken {
    pub campaign_id: String,
    pub recipient_id: String,
    pub claimed_at: String,
}

// --- Delivery status ---

/// Canonical delivery status after vendor normalization.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Sent,
    Delivered,
    Read,
    Failed,
}

/// Processing state of a persisted webhook status event.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum EventState {
    Pending,
    Applied,
    Unmatched,
    Error,
}

impl EventState {
    /// Whether an event in this state has been fully processed.
    pub fn is_settled(self) -> bool {
        matches!(self, Self::Applied | Self::Unmatched)
    }
}

/// One inbound webhook status notification, persisted before it is applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusEvent {
    pub id: i64,
    pub message_id: String,
    pub status: DeliveryStatus,
    pub event_ts: Option<String>,
    pub recipient_phone: Option<String>,
    /// Vendor error attached to `failed` notifications, as JSON.
    pub error_json: Option<String>,
    pub state: EventState,
    pub attempts: i64,
    pub last_error: Option<String>,
    pub created_at: String,
}

/// A status event about to be persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct NewStatusEvent {
    pub message_id: String,
    pub status: DeliveryStatus,
    pub event_ts: Option<String>,
    pub recipient_phone: Option<String>,
    pub error_json: Option<String>,
}

/// Result of durably recording a status event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    /// First sighting of this (message id, status) pair.
    Recorded(i64),
    /// Seen before but never settled; process it again.
    Replay(i64),
    /// Seen and settled; skip silently.
    Duplicate,
}

/// Result of applying a status to recipient state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ApplyOutcome {
    Applied,
    Unmatched,
    AlreadyTerminal,
}

/// Outcome of a delivery/read receipt update on a recipient row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReceiptChange {
    /// The row gained its first delivery mark (directly or implied by read).
    pub delivered: bool,
    /// The row gained its first read mark.
    pub read: bool,
}

// --- Throttling ---

/// Learned throughput target for one sender identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThrottleState {
    pub sender_id: String,
    /// Messages per second.
    pub target_rate: f64,
    pub cooldown_until: Option<DateTime<Utc>>,
    pub last_increase_at: Option<DateTime<Utc>>,
    pub last_decrease_at: Option<DateTime<Utc>>,
}

impl ThrottleState {
    /// A state at the configured start rate with no history.
    pub fn initial(sender_id: &str, start_rate: f64) -> Self {
        Self {
            sender_id: sender_id.to_string(),
            target_rate: start_rate,
            cooldown_until: None,
            last_increase_at: None,
            last_decrease_at: None,
        }
    }
}

// --- Suppression ---

/// Where a suppression entry came from.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SuppressionSource {
    /// Recipient asked to stop receiving messages.
    OptOut,
    /// Vendor reported the recipient opted out or blocked the sender.
    VendorOptOut,
    /// Promoted by the auto-suppression engine after repeated failures.
    Auto,
    /// Added by an operator.
    Manual,
}

/// A standing deny-list entry for one normalized phone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuppressionEntry {
    pub phone: String,
    pub reason: String,
    pub source: SuppressionSource,
    pub is_active: bool,
    pub expires_at: Option<DateTime<Utc>>,
    /// How many times this phone has been suppressed; drives TTL escalation.
    pub suppression_count: i64,
    pub created_at: String,
    pub updated_at: String,
}

impl SuppressionEntry {
    /// Active and not past its expiry at `now`.
    pub fn is_effective(&self, now: DateTime<Utc>) -> bool {
        self.is_active && self.expires_at.is_none_or(|exp| exp > now)
    }
}

// --- Alerts ---

/// An operator-visible alert raised for a critical vendor error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperatorAlert {
    pub id: i64,
    pub campaign_id: Option<String>,
    pub message_id: Option<String>,
    pub code: Option<i64>,
    pub title: String,
    pub message: String,
    pub created_at: String,
}

// --- Queue ---

/// A durable queue entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueEntry {
    pub id: i64,
    pub queue_name: String,
    pub idempotency_key: String,
    pub group_key: Option<String>,
    pub payload: String,
    pub status: String,
    pub attempts: i32,
    pub max_attempts: i32,
    pub created_at: String,
    pub updated_at: String,
    pub locked_until: Option<String>,
    /// Not handed out before this instant.
    pub available_at: Option<String>,
}

// --- Observability ---

/// Why a sender's target rate moved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
pub enum RateChangeReason {
    Throttled,
    Stable,
    Reset,
}

/// Side-channel events emitted next to core state transitions.
///
/// Delivered to [`crate::EventSink`]s on a best-effort basis; a sink
/// failure never affects the transition it describes.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchEvent {
    RecipientSent {
        campaign_id: String,
        recipient_id: String,
        message_id: String,
        latency_secs: f64,
    },
    RecipientFailed {
        campaign_id: String,
        recipient_id: String,
        code: Option<i64>,
        category: ErrorCategory,
    },
    RecipientSkipped {
        campaign_id: String,
        recipient_id: String,
        code: SkipCode,
    },
    RateChanged {
        sender_id: String,
        previous: f64,
        next: f64,
        reason: RateChangeReason,
    },
    BatchCompleted {
        campaign_id: String,
        batch_index: usize,
        sent: usize,
        failed: usize,
        skipped: usize,
    },
    CampaignFinished {
        campaign_id: String,
        status: CampaignStatus,
    },
    StatusApplied {
        message_id: String,
        status: DeliveryStatus,
        outcome: ApplyOutcome,
    },
    PhoneSuppressed {
        phone: String,
        source: SuppressionSource,
        expires_at: Option<DateTime<Utc>>,
    },
    CriticalAlert {
        campaign_id: Option<String>,
        message_id: Option<String>,
        code: Option<i64>,
        title: String,
        message: String,
    },
}
