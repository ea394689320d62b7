// SPDX-FileCopyrightText: 2026 Wacast Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Webhook ingestion: authenticate, deduplicate, persist, then apply.
//!
//! Every status notification is written to `status_events` before it is
//! applied. The unique (message id, status) pair on that table is the
//! dedup guard: a settled pair short-circuits, an unsettled one is applied
//! again. While the table is missing (mid-migration) ingestion carries on
//! without durability and falls back to an in-memory guard.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use wacast_config::model::WebhookConfig;
use wacast_core::{
    ApplyOutcome, DeliveryStatus, EventState, NewStatusEvent, RecordOutcome, StatusEvent,
    StatusEventStore, WacastError,
};
use wacast_suppression::SuppressionRegistry;
use wacast_whatsapp::{StatusNotification, WebhookPayload, normalize_status, verify_signature};

use crate::reconciler::{StatusReconciler, StatusReport};

/// Attempts before a stored event stops being reconciled.
const MAX_EVENT_ATTEMPTS: i64 = 10;

/// Per-request ingestion counts, returned as the webhook response body.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestSummary {
    pub statuses: usize,
    pub applied: usize,
    pub unmatched: usize,
    pub already_terminal: usize,
    pub duplicates: usize,
    /// Vendor statuses outside the canonical set.
    pub ignored: usize,
    /// Recorded but failed to apply; left for reconciliation.
    pub errors: usize,
    pub opt_outs: usize,
}

impl IngestSummary {
    fn count(&mut self, outcome: ApplyOutcome) {
        match outcome {
            ApplyOutcome::Applied => self.applied += 1,
            ApplyOutcome::Unmatched => self.unmatched += 1,
            ApplyOutcome::AlreadyTerminal => self.already_terminal += 1,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileSummary {
    pub examined: usize,
    pub applied: usize,
    pub unmatched: usize,
    pub errors: usize,
}

pub struct WebhookIngestor {
    events: Arc<dyn StatusEventStore>,
    reconciler: Arc<StatusReconciler>,
    registry: Arc<SuppressionRegistry>,
    app_secret: Option<String>,
    opt_out_keywords: Vec<String>,
    recent: DashMap<(String, DeliveryStatus), Instant>,
    dedup_ttl: Duration,
}

impl WebhookIngestor {
    pub fn new(
        events: Arc<dyn StatusEventStore>,
        reconciler: Arc<StatusReconciler>,
        registry: Arc<SuppressionRegistry>,
        app_secret: Option<String>,
        config: &WebhookConfig,
    ) -> Self {
        if app_secret.as_deref().is_none_or(str::is_empty) {
            warn!("no webhook app secret configured; unsigned callbacks will be accepted");
        }
        Self {
            events,
            reconciler,
            registry,
            app_secret: app_secret.filter(|s| !s.is_empty()),
            opt_out_keywords: config
                .opt_out_keywords
                .iter()
                .map(|k| k.trim().to_uppercase())
                .collect(),
            recent: DashMap::new(),
            dedup_ttl: Duration::from_secs(config.dedup_ttl_secs),
        }
    }

    /// Ingest one raw webhook body.
    ///
    /// `Signature` and `Payload` errors reject the request; any other error
    /// means an event could not be persisted and the vendor should retry.
    pub async fn ingest(
        &self,
        raw: &[u8],
        signature: Option<&str>,
    ) -> Result<IngestSummary, WacastError> {
        match self.app_secret.as_deref() {
            Some(secret) => verify_signature(raw, signature, secret)?,
            None => debug!("accepting unsigned webhook"),
        }
        let payload = WebhookPayload::parse(raw)?;
        self.prune_recent();

        let mut summary = IngestSummary::default();
        for notification in payload.statuses() {
            summary.statuses += 1;
            self.ingest_status(notification, &mut summary).await?;
        }

        for message in payload.messages() {
            let Some(text) = message.text_content() else {
                continue;
            };
            let keyword = text.trim().to_uppercase();
            if !self.opt_out_keywords.contains(&keyword) {
                continue;
            }
            match self
                .registry
                .record_opt_out(&message.from, &format!("keyword {keyword}"))
                .await
            {
                Ok(_) => {
                    info!(phone = %message.from, keyword, "opt-out keyword received");
                    summary.opt_outs += 1;
                }
                Err(e) => warn!(phone = %message.from, error = %e, "failed to record opt-out"),
            }
        }

        debug!(?summary, "webhook ingested");
        Ok(summary)
    }

    async fn ingest_status(
        &self,
        notification: &StatusNotification,
        summary: &mut IngestSummary,
    ) -> Result<(), WacastError> {
        let Some(status) = normalize_status(&notification.status) else {
            debug!(message_id = %notification.id, raw = %notification.status, "ignoring vendor status");
            summary.ignored += 1;
            return Ok(());
        };
        let key = (notification.id.clone(), status);
        if self.seen_recently(&key) {
            summary.duplicates += 1;
            return Ok(());
        }

        let event = NewStatusEvent {
            message_id: notification.id.clone(),
            status,
            event_ts: notification.timestamp.clone(),
            recipient_phone: notification.recipient_id.clone(),
            error_json: notification
                .error()
                .and_then(|e| serde_json::to_string(e).ok()),
        };
        let event_id = match self.events.record_status_event(&event).await {
            Ok(RecordOutcome::Recorded(id) | RecordOutcome::Replay(id)) => Some(id),
            Ok(RecordOutcome::Duplicate) => {
                debug!(message_id = %event.message_id, %status, "duplicate status");
                summary.duplicates += 1;
                return Ok(());
            }
            Err(WacastError::SchemaMissing { table }) => {
                warn!(%table, "status event table missing; applying without durability");
                None
            }
            Err(e) => return Err(e),
        };

        let report = StatusReport {
            message_id: event.message_id,
            status,
            event_ts: event.event_ts,
            recipient_phone: event.recipient_phone,
            error: notification.error().cloned(),
        };
        match self.reconciler.apply(&report).await {
            Ok(outcome) => {
                summary.count(outcome);
                self.settle(event_id, outcome).await;
                self.recent.insert(key, Instant::now());
            }
            Err(e) => {
                warn!(message_id = %report.message_id, error = %e, "status apply failed; kept for reconciliation");
                summary.errors += 1;
                if let Some(id) = event_id {
                    if let Err(e2) = self
                        .events
                        .set_event_state(id, EventState::Error, Some(&e.to_string()))
                        .await
                    {
                        warn!(event_id = id, error = %e2, "failed to record event error");
                    }
                }
            }
        }
        Ok(())
    }

    async fn settle(&self, event_id: Option<i64>, outcome: ApplyOutcome) {
        let Some(id) = event_id else {
            return;
        };
        let state = match outcome {
            ApplyOutcome::Unmatched => EventState::Unmatched,
            ApplyOutcome::Applied | ApplyOutcome::AlreadyTerminal => EventState::Applied,
        };
        if let Err(e) = self.events.set_event_state(id, state, None).await {
            warn!(event_id = id, error = %e, "failed to settle status event");
        }
    }

    fn seen_recently(&self, key: &(String, DeliveryStatus)) -> bool {
        self.recent
            .get(key)
            .is_some_and(|seen| seen.elapsed() < self.dedup_ttl)
    }

    fn prune_recent(&self) {
        let ttl = self.dedup_ttl;
        self.recent.retain(|_, seen| seen.elapsed() < ttl);
    }

    /// Re-apply stored events that were unmatched or failed to apply.
    pub async fn reconcile_unmatched(&self, limit: usize) -> Result<ReconcileSummary, WacastError> {
        let events = self
            .events
            .list_events(
                &[EventState::Unmatched, EventState::Error],
                MAX_EVENT_ATTEMPTS,
                limit,
            )
            .await?;
        let mut summary = ReconcileSummary {
            examined: events.len(),
            ..ReconcileSummary::default()
        };
        for event in &events {
            self.reconcile_event(event, &mut summary).await;
        }
        if summary.applied > 0 || summary.errors > 0 {
            info!(?summary, "reconciliation pass finished");
        }
        Ok(summary)
    }

    async fn reconcile_event(&self, event: &StatusEvent, summary: &mut ReconcileSummary) {
        match self.reconciler.apply(&StatusReport::from(event)).await {
            Ok(outcome) => {
                match outcome {
                    ApplyOutcome::Unmatched => summary.unmatched += 1,
                    _ => summary.applied += 1,
                }
                self.settle(Some(event.id), outcome).await;
            }
            Err(e) => {
                summary.errors += 1;
                if let Err(e2) = self
                    .events
                    .set_event_state(event.id, EventState::Error, Some(&e.to_string()))
                    .await
                {
                    warn!(event_id = event.id, error = %e2, "failed to record event error");
                }
            }
        }
    }

    /// Periodic reconciliation until `cancel` fires.
    pub async fn run_reconciliation(
        &self,
        interval: Duration,
        limit: usize,
        cancel: CancellationToken,
    ) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }
            if let Err(e) = self.reconcile_unmatched(limit).await {
                warn!(error = %e, "reconciliation pass failed");
            }
        }
        debug!("reconciliation loop stopped");
    }
}
