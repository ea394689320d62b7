// SPDX-FileCopyrightText: 2026 Wacast Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bounded-concurrency executor for one batch.
//!
//! N workers share an index cursor over the batch and take recipients one
//! at a time until the batch is exhausted. A worker error or panic only
//! fails the recipient it was processing.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use futures::FutureExt;
use futures::future::join_all;
use tracing::{Instrument, debug, info_span, warn};
use wacast_core::{
    CampaignRecipient, DispatchEvent, ErrorCategory, FailureDetail, MessageTemplate, SendOutcome,
    SkipCode, SuppressionSource, TemplateMessage, TemplateVariables, VendorError, WacastError,
};
use wacast_suppression::FailureContext;

use crate::DispatchDeps;
use crate::precheck::{Precheck, PrecheckGuard, PrecheckSkip};
use crate::rate::Pacer;

/// What a batch sends and from where.
#[derive(Debug, Clone)]
pub struct BatchContext {
    pub campaign_id: String,
    pub sender_id: String,
    /// `None` when the template is unknown; every recipient then skips.
    pub template: Option<MessageTemplate>,
    pub variables: TemplateVariables,
    pub batch_index: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchResult {
    pub sent: usize,
    pub failed: usize,
    pub skipped: usize,
    /// Recipients released back to `pending` after a throughput rejection.
    pub throttled: Vec<String>,
    /// Recipients another attempt had already claimed or finished.
    pub already_claimed: usize,
    /// Throughput rejections observed, including ones after the first.
    pub throttle_signals: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Sent,
    Failed,
    Skipped,
    Throttled,
    AlreadyClaimed,
}

struct BatchState<'a> {
    ctx: &'a BatchContext,
    pacer: Pacer,
    /// Set by the first throttle signal; later signals leave the rate alone.
    throttle_latch: AtomicBool,
    throttle_signals: AtomicUsize,
}

pub struct BatchWorkerPool {
    deps: DispatchDeps,
    guard: PrecheckGuard,
    send_timeout: Duration,
}

impl BatchWorkerPool {
    pub fn new(deps: DispatchDeps, guard: PrecheckGuard, send_timeout: Duration) -> Self {
        Self {
            deps,
            guard,
            send_timeout,
        }
    }

    /// Run `recipients` through the send pipeline with `concurrency` workers.
    pub async fn run(
        &self,
        ctx: &BatchContext,
        recipients: &[CampaignRecipient],
        concurrency: usize,
    ) -> BatchResult {
        let state = BatchState {
            ctx,
            pacer: self.deps.rate.pacer(&ctx.sender_id).await,
            throttle_latch: AtomicBool::new(false),
            throttle_signals: AtomicUsize::new(0),
        };
        let cursor = AtomicUsize::new(0);
        let workers = concurrency.clamp(1, recipients.len().max(1));
        let (cursor, state_ref) = (&cursor, &state);

        let runs = (0..workers).map(|_| async move {
            let mut outcomes = Vec::new();
            loop {
                let i = cursor.fetch_add(1, Ordering::SeqCst);
                let Some(recipient) = recipients.get(i) else {
                    break;
                };
                let span = info_span!(
                    "recipient",
                    campaign_id = %ctx.campaign_id,
                    recipient_id = %recipient.id,
                    trace_id = %recipient.trace_id,
                );
                let attempt = AssertUnwindSafe(self.process(state_ref, recipient))
                    .catch_unwind()
                    .instrument(span)
                    .await;
                let outcome = match attempt {
                    Ok(Ok(outcome)) => outcome,
                    Ok(Err(e)) => self.fail_unhandled(ctx, recipient, &e.to_string()).await,
                    Err(_) => self.fail_unhandled(ctx, recipient, "worker panicked").await,
                };
                outcomes.push((recipient.id.clone(), outcome));
            }
            outcomes
        });

        let mut result = BatchResult::default();
        for (recipient_id, outcome) in join_all(runs).await.into_iter().flatten() {
            match outcome {
                Outcome::Sent => result.sent += 1,
                Outcome::Failed => result.failed += 1,
                Outcome::Skipped => result.skipped += 1,
                Outcome::Throttled => result.throttled.push(recipient_id),
                Outcome::AlreadyClaimed => result.already_claimed += 1,
            }
        }
        result.throttle_signals = state.throttle_signals.load(Ordering::SeqCst);
        result
    }

    async fn process(
        &self,
        state: &BatchState<'_>,
        recipient: &CampaignRecipient,
    ) -> Result<Outcome, WacastError> {
        let ctx = state.ctx;
        let message =
            match self
                .guard
                .check(recipient, ctx.template.as_ref(), &ctx.variables)?
            {
                Precheck::Send(message) => message,
                Precheck::Skip(skip) => return self.skip(ctx, recipient, skip).await,
            };

        if let Some(entry) = self.deps.registry.is_suppressed(&message.to).await? {
            let skip = PrecheckSkip::new(
                SkipCode::Suppressed,
                format!("suppressed ({}): {}", entry.source, entry.reason),
            );
            return self.skip(ctx, recipient, skip).await;
        }
        if self.deps.registry.is_opted_out(&message.to).await? {
            let skip = PrecheckSkip::new(SkipCode::OptOut, "phone opted out");
            return self.skip(ctx, recipient, skip).await;
        }

        state.pacer.wait().await;

        let Some(token) = self.deps.claims.claim(&ctx.campaign_id, &recipient.id).await? else {
            debug!("already claimed; skipping silently");
            return Ok(Outcome::AlreadyClaimed);
        };

        let started = Instant::now();
        let response = tokio::time::timeout(
            self.send_timeout,
            self.deps.sender.send_template(&ctx.sender_id, &message),
        )
        .await;

        match response {
            Err(_) => {
                let failure = FailureDetail {
                    code: None,
                    title: "send timed out".into(),
                    details: Some(format!("no response within {:?}", self.send_timeout)),
                    trace_id: None,
                };
                self.fail(ctx, recipient, &failure, ErrorCategory::Retryable)
                    .await
            }
            Ok(Err(e)) => {
                let failure = FailureDetail {
                    code: None,
                    title: "send failed".into(),
                    details: Some(e.to_string()),
                    trace_id: None,
                };
                self.fail(ctx, recipient, &failure, ErrorCategory::Retryable)
                    .await
            }
            Ok(Ok(SendOutcome::Accepted { message_id })) => {
                if !self.deps.claims.mark_sent(&token, &message_id).await? {
                    warn!(%message_id, "claim lost before the send was recorded");
                    return Ok(Outcome::AlreadyClaimed);
                }
                debug!(%message_id, "sent");
                self.deps
                    .sinks
                    .emit(DispatchEvent::RecipientSent {
                        campaign_id: ctx.campaign_id.clone(),
                        recipient_id: recipient.id.clone(),
                        message_id,
                        latency_secs: started.elapsed().as_secs_f64(),
                    })
                    .await;
                Ok(Outcome::Sent)
            }
            Ok(Ok(SendOutcome::Rejected(error))) if error.is_throttle() => {
                state.throttle_signals.fetch_add(1, Ordering::SeqCst);
                if !state.throttle_latch.swap(true, Ordering::SeqCst) {
                    match self
                        .deps
                        .rate
                        .record_throughput_exceeded(&ctx.sender_id)
                        .await
                    {
                        Ok(change) => state.pacer.set_rate(change.next),
                        Err(e) => warn!(error = %e, "failed to record throttle signal"),
                    }
                }
                self.deps.claims.release_claim(&token).await?;
                Ok(Outcome::Throttled)
            }
            Ok(Ok(SendOutcome::Rejected(error))) => {
                self.reject(ctx, recipient, &message, &error).await
            }
        }
    }

    async fn skip(
        &self,
        ctx: &BatchContext,
        recipient: &CampaignRecipient,
        skip: PrecheckSkip,
    ) -> Result<Outcome, WacastError> {
        if !self
            .deps
            .claims
            .mark_skipped(&ctx.campaign_id, &recipient.id, &skip.detail())
            .await?
        {
            return Ok(Outcome::AlreadyClaimed);
        }
        debug!(code = %skip.code, reason = %skip.reason, "skipped");
        self.deps
            .sinks
            .emit(DispatchEvent::RecipientSkipped {
                campaign_id: ctx.campaign_id.clone(),
                recipient_id: recipient.id.clone(),
                code: skip.code,
            })
            .await;
        Ok(Outcome::Skipped)
    }

    async fn fail(
        &self,
        ctx: &BatchContext,
        recipient: &CampaignRecipient,
        failure: &FailureDetail,
        category: ErrorCategory,
    ) -> Result<Outcome, WacastError> {
        self.deps
            .claims
            .mark_failed(&ctx.campaign_id, &recipient.id, failure)
            .await?;
        warn!(
            code = ?failure.code,
            %category,
            title = %failure.title,
            details = ?failure.details,
            "send failed"
        );
        self.deps
            .sinks
            .emit(DispatchEvent::RecipientFailed {
                campaign_id: ctx.campaign_id.clone(),
                recipient_id: recipient.id.clone(),
                code: failure.code,
                category,
            })
            .await;
        Ok(Outcome::Failed)
    }

    /// Terminal vendor rejection other than throttling.
    async fn reject(
        &self,
        ctx: &BatchContext,
        recipient: &CampaignRecipient,
        message: &TemplateMessage,
        error: &VendorError,
    ) -> Result<Outcome, WacastError> {
        let category = error.category();
        let failure = error.to_failure();
        let outcome = self.fail(ctx, recipient, &failure, category).await?;

        // Side effects below are best-effort.
        if category == ErrorCategory::OptOut {
            if let Err(e) = self
                .deps
                .registry
                .suppress(
                    &message.to,
                    &failure.title,
                    SuppressionSource::VendorOptOut,
                    None,
                )
                .await
            {
                warn!(error = %e, "failed to suppress opted-out phone");
            }
        }
        let context = FailureContext {
            campaign_id: Some(ctx.campaign_id.clone()),
            message_id: None,
        };
        self.deps
            .auto_suppression
            .observe(&message.to, error.code, &context)
            .await;
        if category.is_critical() {
            self.deps
                .sinks
                .emit(DispatchEvent::CriticalAlert {
                    campaign_id: Some(ctx.campaign_id.clone()),
                    message_id: None,
                    code: Some(error.code),
                    title: failure.title.clone(),
                    message: failure.details.clone().unwrap_or_else(|| failure.title.clone()),
                })
                .await;
        }
        Ok(outcome)
    }

    /// Last resort for an error or panic escaping the pipeline.
    async fn fail_unhandled(
        &self,
        ctx: &BatchContext,
        recipient: &CampaignRecipient,
        reason: &str,
    ) -> Outcome {
        warn!(
            campaign_id = %ctx.campaign_id,
            recipient_id = %recipient.id,
            reason,
            "recipient pipeline aborted"
        );
        let failure = FailureDetail {
            code: None,
            title: "internal error".into(),
            details: Some(reason.to_string()),
            trace_id: None,
        };
        match self
            .deps
            .claims
            .mark_failed(&ctx.campaign_id, &recipient.id, &failure)
            .await
        {
            Ok(true) => {
                self.deps
                    .sinks
                    .emit(DispatchEvent::RecipientFailed {
                        campaign_id: ctx.campaign_id.clone(),
                        recipient_id: recipient.id.clone(),
                        code: None,
                        category: ErrorCategory::Unknown,
                    })
                    .await;
                Outcome::Failed
            }
            Ok(false) => Outcome::AlreadyClaimed,
            Err(e) => {
                warn!(recipient_id = %recipient.id, error = %e, "could not record failure");
                Outcome::Failed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use wacast_core::{
        CampaignStatus, CampaignStore, ClaimStore, RecipientInput, RecipientStatus, RunSpec,
        SuppressionStore, THROUGHPUT_EXCEEDED,
    };

    use super::*;
    use crate::test_support::{Reply, ScriptedSender, deps, seed_campaign, storage, template};

    fn recipients(n: usize) -> Vec<CampaignRecipient> {
        (0..n)
            .map(|i| {
                CampaignRecipient::pending(
                    format!("c1:{i}"),
                    "c1",
                    format!("trace-{i}"),
                    RecipientInput {
                        contact_id: Some(format!("contact-{i}")),
                        phone: format!("+55119999{i:05}"),
                        name: Some(format!("Cliente {i}")),
                        ..RecipientInput::default()
                    },
                )
            })
            .collect()
    }

    fn ctx() -> BatchContext {
        BatchContext {
            campaign_id: "c1".into(),
            sender_id: "pn-1".into(),
            template: Some(template()),
            variables: TemplateVariables {
                body: vec!["{{name}}".into(), "SPRING10".into()],
                ..TemplateVariables::default()
            },
            batch_index: 0,
        }
    }

    async fn setup(
        n: usize,
        sender: Arc<ScriptedSender>,
    ) -> (
        BatchWorkerPool,
        Arc<wacast_storage::SqliteStorage>,
        Vec<CampaignRecipient>,
        tempfile::TempDir,
    ) {
        let (store, dir) = storage().await;
        seed_campaign(&store, "c1").await;
        let list = recipients(n);
        store.insert_recipients("c1", &list).await.unwrap();
        store
            .begin_run("c1", &[CampaignStatus::Draft], &RunSpec::default())
            .await
            .unwrap();
        let pool = BatchWorkerPool::new(
            deps(&store, sender),
            PrecheckGuard::default(),
            Duration::from_secs(5),
        );
        (pool, store, list, dir)
    }

    #[tokio::test]
    async fn sends_every_recipient_once() {
        let sender = Arc::new(ScriptedSender::default());
        let (pool, store, list, _dir) = setup(12, sender.clone()).await;

        let result = pool.run(&ctx(), &list, 4).await;
        assert_eq!(result.sent, 12);
        assert_eq!(result.failed + result.skipped, 0);
        assert_eq!(sender.calls(), 12);

        // A duplicate execution of the same batch sends nothing.
        let again = pool.run(&ctx(), &list, 4).await;
        assert_eq!(again.sent, 0);
        assert_eq!(again.already_claimed, 12);
        assert_eq!(sender.calls(), 12);

        let campaign = store.get_campaign("c1").await.unwrap().unwrap();
        assert_eq!(campaign.sent, 12);
    }

    #[tokio::test]
    async fn skips_precheck_failures_and_suppressed_phones() {
        let sender = Arc::new(ScriptedSender::default());
        let (pool, store, mut list, _dir) = setup(5, sender.clone()).await;
        list[1].name = None;
        store
            .upsert_suppression("5511999900002", "bounced", SuppressionSource::Manual, None)
            .await
            .unwrap();
        store.record_opt_out("5511999900003", "STOP").await.unwrap();

        let result = pool.run(&ctx(), &list, 2).await;
        assert_eq!(result.sent, 2);
        assert_eq!(result.skipped, 3);
        assert_eq!(sender.calls(), 2);

        let skipped = store
            .list_recipients("c1", Some(RecipientStatus::Skipped))
            .await
            .unwrap();
        let codes: Vec<_> = skipped
            .iter()
            .map(|r| r.skip.as_ref().unwrap().code)
            .collect();
        assert_eq!(
            codes,
            vec![SkipCode::MissingVariable, SkipCode::Suppressed, SkipCode::OptOut]
        );
    }

    #[tokio::test]
    async fn one_throttle_signal_per_batch_lowers_rate_once() {
        let sender = Arc::new(ScriptedSender::with_script([
            Reply::Accept,
            Reply::Reject(THROUGHPUT_EXCEEDED),
            Reply::Reject(THROUGHPUT_EXCEEDED),
            Reply::Reject(THROUGHPUT_EXCEEDED),
        ]));
        let (pool, store, list, _dir) = setup(6, sender).await;

        let result = pool.run(&ctx(), &list, 3).await;
        assert_eq!(result.throttle_signals, 3);
        assert_eq!(result.throttled.len(), 3);
        assert_eq!(result.sent, 3);

        let target = pool.deps.rate.get_target("pn-1").await.unwrap();
        assert_eq!(target.rate, 500.0);
        assert!(target.cooldown_until.is_some());

        // Throttled recipients are back to pending, not failed.
        let pending = store
            .list_recipients("c1", Some(RecipientStatus::Pending))
            .await
            .unwrap();
        assert_eq!(pending.len(), 3);
    }

    #[tokio::test]
    async fn errors_and_panics_fail_only_their_recipient() {
        let sender = Arc::new(ScriptedSender::with_script([
            Reply::Transport,
            Reply::Panic,
            Reply::Reject(131_026),
        ]));
        let (pool, store, list, _dir) = setup(5, sender).await;

        let result = pool.run(&ctx(), &list, 1).await;
        assert_eq!(result.failed, 3);
        assert_eq!(result.sent, 2);

        let failed = store
            .list_recipients("c1", Some(RecipientStatus::Failed))
            .await
            .unwrap();
        assert_eq!(failed.len(), 3);
        assert!(failed.iter().any(|r| r.failure.as_ref().unwrap().code == Some(131_026)));
        assert!(
            failed
                .iter()
                .any(|r| r.failure.as_ref().unwrap().details.as_deref()
                    == Some("worker panicked"))
        );
    }

    #[tokio::test]
    async fn vendor_opt_out_suppresses_phone() {
        let sender = Arc::new(ScriptedSender::with_script([Reply::Reject(131_050)]));
        let (pool, store, list, _dir) = setup(1, sender).await;

        let result = pool.run(&ctx(), &list, 1).await;
        assert_eq!(result.failed, 1);
        let entry = store.get_suppression("5511999900000").await.unwrap().unwrap();
        assert_eq!(entry.source, SuppressionSource::VendorOptOut);
        assert!(entry.is_active);
    }

    #[tokio::test]
    async fn missing_identity_becomes_failed() {
        let sender = Arc::new(ScriptedSender::default());
        let (pool, store, mut list, _dir) = setup(2, sender.clone()).await;
        list[0].contact_id = None;

        let result = pool.run(&ctx(), &list, 1).await;
        assert_eq!(result.failed, 1);
        assert_eq!(result.sent, 1);
        assert_eq!(sender.calls(), 1);
        let failed = store
            .get_recipients("c1", &["c1:0".to_string()])
            .await
            .unwrap();
        assert_eq!(failed[0].status, RecipientStatus::Failed);
        // The claim path never ran for it.
        assert!(store.claim("c1", "c1:0").await.unwrap().is_none());
    }
}
