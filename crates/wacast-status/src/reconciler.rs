// SPDX-FileCopyrightText: 2026 Wacast Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Apply normalized delivery statuses to recipient state.

use std::sync::Arc;

use tracing::{debug, info, warn};
use wacast_core::{
    ApplyOutcome, DeliveryStatus, DispatchEvent, ErrorCategory, EventSinks, FailureDetail,
    ReceiptStore, StatusEvent, SuppressionSource, VendorError, WacastError, format_timestamp,
    now_timestamp, parse_timestamp,
};
use wacast_suppression::{AutoSuppressionEngine, FailureContext, SuppressionRegistry};

/// One status to apply, from a webhook or a stored event.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusReport {
    pub message_id: String,
    pub status: DeliveryStatus,
    /// Vendor timestamp (unix seconds or RFC 3339).
    pub event_ts: Option<String>,
    /// Phone the vendor reported the status for.
    pub recipient_phone: Option<String>,
    pub error: Option<VendorError>,
}

impl From<&StatusEvent> for StatusReport {
    fn from(event: &StatusEvent) -> Self {
        Self {
            message_id: event.message_id.clone(),
            status: event.status,
            event_ts: event.event_ts.clone(),
            recipient_phone: event.recipient_phone.clone(),
            error: event
                .error_json
                .as_deref()
                .and_then(|raw| serde_json::from_str(raw).ok()),
        }
    }
}

pub struct StatusReconciler {
    receipts: Arc<dyn ReceiptStore>,
    registry: Arc<SuppressionRegistry>,
    auto_suppression: Arc<AutoSuppressionEngine>,
    sinks: EventSinks,
}

impl StatusReconciler {
    pub fn new(
        receipts: Arc<dyn ReceiptStore>,
        registry: Arc<SuppressionRegistry>,
        auto_suppression: Arc<AutoSuppressionEngine>,
        sinks: EventSinks,
    ) -> Self {
        Self {
            receipts,
            registry,
            auto_suppression,
            sinks,
        }
    }

    /// Apply one status idempotently.
    ///
    /// `Unmatched` is not an error: the webhook can outrun the write that
    /// records the message id.
    pub async fn apply(&self, report: &StatusReport) -> Result<ApplyOutcome, WacastError> {
        let at = report
            .event_ts
            .as_deref()
            .and_then(parse_timestamp)
            .map(format_timestamp)
            .unwrap_or_else(now_timestamp);

        let outcome = match report.status {
            DeliveryStatus::Sent => {
                match self
                    .receipts
                    .find_recipient_by_message_id(&report.message_id)
                    .await?
                {
                    Some(_) => ApplyOutcome::Applied,
                    None => ApplyOutcome::Unmatched,
                }
            }
            DeliveryStatus::Delivered | DeliveryStatus::Read => {
                match self
                    .receipts
                    .apply_receipt(&report.message_id, report.status, &at)
                    .await?
                {
                    None => ApplyOutcome::Unmatched,
                    Some(change) if change.delivered || change.read => ApplyOutcome::Applied,
                    Some(_) => ApplyOutcome::AlreadyTerminal,
                }
            }
            DeliveryStatus::Failed => self.apply_failure(report, &at).await?,
        };

        match outcome {
            ApplyOutcome::Unmatched => info!(
                message_id = %report.message_id,
                status = %report.status,
                "no recipient for message id; queued for reconciliation"
            ),
            _ => debug!(message_id = %report.message_id, status = %report.status, %outcome, "status applied"),
        }
        self.sinks
            .emit(DispatchEvent::StatusApplied {
                message_id: report.message_id.clone(),
                status: report.status,
                outcome,
            })
            .await;
        Ok(outcome)
    }

    async fn apply_failure(
        &self,
        report: &StatusReport,
        at: &str,
    ) -> Result<ApplyOutcome, WacastError> {
        let failure = report
            .error
            .as_ref()
            .map(VendorError::to_failure)
            .unwrap_or_else(|| FailureDetail {
                code: None,
                title: "delivery failed".into(),
                details: None,
                trace_id: None,
            });
        match self
            .receipts
            .apply_delivery_failure(&report.message_id, &failure, at)
            .await?
        {
            None => return Ok(ApplyOutcome::Unmatched),
            Some(false) => return Ok(ApplyOutcome::AlreadyTerminal),
            Some(true) => {}
        }

        // Everything below is best-effort.
        let recipient = match self
            .receipts
            .find_recipient_by_message_id(&report.message_id)
            .await
        {
            Ok(recipient) => recipient,
            Err(e) => {
                warn!(message_id = %report.message_id, error = %e, "recipient lookup failed");
                None
            }
        };
        let campaign_id = recipient.as_ref().map(|r| r.campaign_id.clone());
        let phone = recipient
            .as_ref()
            .map(|r| r.phone.clone())
            .or_else(|| report.recipient_phone.clone());

        warn!(
            message_id = %report.message_id,
            campaign_id = ?campaign_id,
            code = ?failure.code,
            title = %failure.title,
            "delivery failed"
        );

        let Some(error) = report.error.as_ref() else {
            return Ok(ApplyOutcome::Applied);
        };
        let category = error.category();

        if let Some(phone) = phone.as_deref() {
            if category == ErrorCategory::OptOut {
                if let Err(e) = self
                    .registry
                    .suppress(phone, &failure.title, SuppressionSource::VendorOptOut, None)
                    .await
                {
                    warn!(error = %e, "failed to suppress opted-out phone");
                }
            }
            let context = FailureContext {
                campaign_id: campaign_id.clone(),
                message_id: Some(report.message_id.clone()),
            };
            self.auto_suppression
                .observe(phone, error.code, &context)
                .await;
        }

        if category.is_critical() {
            self.sinks
                .emit(DispatchEvent::CriticalAlert {
                    campaign_id,
                    message_id: Some(report.message_id.clone()),
                    code: Some(error.code),
                    title: failure.title.clone(),
                    message: failure.details.clone().unwrap_or_else(|| failure.title.clone()),
                })
                .await;
        }
        Ok(ApplyOutcome::Applied)
    }
}

#[cfg(test)]
mod tests {
    use wacast_core::{
        AlertSink, AlertStore, CampaignStore, ReceiptStore, RecipientStatus, SuppressionStore,
    };

    use super::*;
    use crate::test_support::{reconciler, sent_recipient, storage};

    fn report(message_id: &str, status: DeliveryStatus) -> StatusReport {
        StatusReport {
            message_id: message_id.into(),
            status,
            event_ts: Some("1700000000".into()),
            recipient_phone: None,
            error: None,
        }
    }

    fn failed(message_id: &str, code: i64) -> StatusReport {
        StatusReport {
            error: Some(VendorError {
                code,
                title: Some(format!("error {code}")),
                ..VendorError::default()
            }),
            ..report(message_id, DeliveryStatus::Failed)
        }
    }

    #[tokio::test]
    async fn delivered_twice_counts_once() {
        let (store, _dir) = storage().await;
        sent_recipient(&store, "5511999990001", "wamid.1").await;
        let reconciler = reconciler(&store, EventSinks::new());

        let first = reconciler
            .apply(&report("wamid.1", DeliveryStatus::Delivered))
            .await
            .unwrap();
        let second = reconciler
            .apply(&report("wamid.1", DeliveryStatus::Delivered))
            .await
            .unwrap();
        assert_eq!(first, ApplyOutcome::Applied);
        assert_eq!(second, ApplyOutcome::AlreadyTerminal);

        let campaign = store.get_campaign("c1").await.unwrap().unwrap();
        assert_eq!(campaign.delivered, 1);
        let recipient = store
            .find_recipient_by_message_id("wamid.1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            recipient.delivered_at.as_deref(),
            Some("2023-11-14T22:13:20.000Z")
        );
    }

    #[tokio::test]
    async fn read_without_delivered_implies_delivery() {
        let (store, _dir) = storage().await;
        sent_recipient(&store, "5511999990001", "wamid.1").await;
        let reconciler = reconciler(&store, EventSinks::new());

        reconciler
            .apply(&report("wamid.1", DeliveryStatus::Read))
            .await
            .unwrap();
        // A late delivered changes nothing.
        let late = reconciler
            .apply(&report("wamid.1", DeliveryStatus::Delivered))
            .await
            .unwrap();
        assert_eq!(late, ApplyOutcome::AlreadyTerminal);

        let stats = store.campaign_stats("c1").await.unwrap();
        assert_eq!(stats.delivered, 1);
        assert_eq!(stats.read, 1);
    }

    #[tokio::test]
    async fn unknown_message_is_unmatched() {
        let (store, _dir) = storage().await;
        let reconciler = reconciler(&store, EventSinks::new());
        for status in [
            DeliveryStatus::Sent,
            DeliveryStatus::Delivered,
            DeliveryStatus::Failed,
        ] {
            let outcome = reconciler.apply(&report("wamid.x", status)).await.unwrap();
            assert_eq!(outcome, ApplyOutcome::Unmatched);
        }
    }

    #[tokio::test]
    async fn failure_is_applied_once_and_feeds_auto_suppression() {
        let (store, _dir) = storage().await;
        sent_recipient(&store, "5511999990001", "wamid.1").await;
        let reconciler = reconciler(&store, EventSinks::new());

        let first = reconciler.apply(&failed("wamid.1", 131_026)).await.unwrap();
        let again = reconciler.apply(&failed("wamid.1", 131_026)).await.unwrap();
        assert_eq!(first, ApplyOutcome::Applied);
        assert_eq!(again, ApplyOutcome::AlreadyTerminal);

        let campaign = store.get_campaign("c1").await.unwrap().unwrap();
        assert_eq!((campaign.sent, campaign.failed), (0, 1));
        let recipient = store
            .find_recipient_by_message_id("wamid.1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(recipient.status, RecipientStatus::Failed);

        // Threshold is 1 in the test configuration.
        let entry = store.get_suppression("5511999990001").await.unwrap().unwrap();
        assert_eq!(entry.source, SuppressionSource::Auto);
        assert!(entry.expires_at.is_some());
    }

    #[tokio::test]
    async fn opt_out_failure_suppresses_and_critical_failure_alerts() {
        let (store, _dir) = storage().await;
        sent_recipient(&store, "5511999990001", "wamid.1").await;
        sent_recipient(&store, "5511999990002", "wamid.2").await;
        let sinks = EventSinks::new().with(Arc::new(AlertSink::new(store.clone())));
        let reconciler = reconciler(&store, sinks);

        reconciler.apply(&failed("wamid.1", 131_050)).await.unwrap();
        let entry = store.get_suppression("5511999990001").await.unwrap().unwrap();
        assert_eq!(entry.source, SuppressionSource::VendorOptOut);
        assert!(entry.expires_at.is_none());

        reconciler.apply(&failed("wamid.2", 132_001)).await.unwrap();
        let alerts = store.list_alerts(10).await.unwrap();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].code, Some(132_001));
        assert_eq!(alerts[0].campaign_id.as_deref(), Some("c1"));
        assert_eq!(alerts[0].message_id.as_deref(), Some("wamid.2"));
    }

    #[test]
    fn stored_event_error_json_round_trips_into_report() {
        let event = StatusEvent {
            id: 1,
            message_id: "wamid.9".into(),
            status: DeliveryStatus::Failed,
            event_ts: None,
            recipient_phone: Some("5511999990009".into()),
            error_json: Some(r#"{"code":131026,"title":"Message undeliverable"}"#.into()),
            state: wacast_core::EventState::Unmatched,
            attempts: 1,
            last_error: None,
            created_at: now_timestamp(),
        };
        let report = StatusReport::from(&event);
        assert_eq!(report.error.map(|e| e.code), Some(131_026));
        assert_eq!(report.recipient_phone.as_deref(), Some("5511999990009"));
    }
}
