// SPDX-FileCopyrightText: 2026 Wacast Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Campaign dispatch state machine: init, batches, completion.
//!
//! `start` snapshots recipients, moves the campaign to `sending` and
//! enqueues one durable job per batch. Each job is executed by
//! [`DispatchOrchestrator::send_batch`], which is safe to re-run: only
//! `pending` recipients are processed and the claim guards each send.
//! The pause check happens once per batch, not per recipient.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;
use wacast_config::WacastConfig;
use wacast_core::{
    Campaign, CampaignRecipient, CampaignStats, CampaignStatus, DispatchEvent, ErrorCategory,
    FailureDetail, RecipientInput, RecipientStatus, RunSpec, SkipCode, THROUGHPUT_EXCEEDED,
    TemplateVariables, WacastError,
};

use crate::DispatchDeps;
use crate::pool::{BatchContext, BatchResult, BatchWorkerPool};
use crate::precheck::{DryRunReport, Precheck, PrecheckGuard, PrecheckSkip};

/// Queue name for batch jobs.
pub const DISPATCH_QUEUE: &str = "dispatch";

const MAX_BATCH_SIZE: usize = 200;
const MAX_CONCURRENCY: usize = 50;

/// Durable description of one batch step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchJobPayload {
    pub campaign_id: String,
    pub run: i64,
    pub batch_index: usize,
    pub recipient_ids: Vec<String>,
    /// Throttle retry generation; 0 for the first attempt.
    #[serde(default)]
    pub retry: u32,
}

impl BatchJobPayload {
    pub fn idempotency_key(&self) -> String {
        let key = format!("{}:{}:{}", self.campaign_id, self.run, self.batch_index);
        if self.retry == 0 {
            key
        } else {
            format!("{key}:r{}", self.retry)
        }
    }
}

/// Body of `POST /dispatch`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchRequest {
    pub campaign_id: String,
    pub template_name: String,
    /// `None` dispatches the campaign's stored recipient snapshot.
    #[serde(default)]
    pub recipients: Option<Vec<RecipientInput>>,
    #[serde(default)]
    pub template_variables: Option<TemplateVariables>,
    /// Outbound phone number id; defaults to the configured one.
    #[serde(default)]
    pub sender_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchAccepted {
    pub campaign_id: String,
    pub run: i64,
    pub batches: usize,
    pub queued_recipients: usize,
}

/// Result of reopening skipped recipients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResendOutcome {
    pub reopened: usize,
    /// `None` when nothing was reopened or the campaign is paused.
    pub dispatch: Option<DispatchAccepted>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DispatchSettings {
    pub batch_size: usize,
    pub concurrency: usize,
    pub send_timeout: Duration,
    pub max_throttle_retries: u32,
    pub default_country_code: Option<String>,
    pub default_sender: Option<String>,
}

impl DispatchSettings {
    pub fn from_config(config: &WacastConfig) -> Self {
        Self {
            batch_size: config.dispatch.batch_size.clamp(1, MAX_BATCH_SIZE),
            concurrency: config.dispatch.concurrency.clamp(1, MAX_CONCURRENCY),
            send_timeout: Duration::from_secs(config.dispatch.send_timeout_secs.max(1)),
            max_throttle_retries: config.dispatch.max_throttle_retries,
            default_country_code: config.precheck.default_country_code.clone(),
            default_sender: config.whatsapp.phone_number_id.clone(),
        }
    }
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self::from_config(&WacastConfig::default())
    }
}

pub struct DispatchOrchestrator {
    deps: DispatchDeps,
    settings: DispatchSettings,
    guard: PrecheckGuard,
    pool: BatchWorkerPool,
}

impl DispatchOrchestrator {
    pub fn new(deps: DispatchDeps, settings: DispatchSettings) -> Self {
        let guard = PrecheckGuard::new(settings.default_country_code.clone());
        let pool = BatchWorkerPool::new(deps.clone(), guard.clone(), settings.send_timeout);
        Self {
            deps,
            settings,
            guard,
            pool,
        }
    }

    pub fn settings(&self) -> &DispatchSettings {
        &self.settings
    }

    async fn campaign(&self, id: &str) -> Result<Campaign, WacastError> {
        self.deps
            .campaigns
            .get_campaign(id)
            .await?
            .ok_or_else(|| WacastError::not_found("campaign", id))
    }

    /// Init phase: snapshot recipients, enter `sending`, enqueue batches.
    pub async fn start(&self, request: DispatchRequest) -> Result<DispatchAccepted, WacastError> {
        let campaign_id = request.campaign_id.as_str();
        let campaign = self.campaign(campaign_id).await?;
        if campaign.status == CampaignStatus::Paused || campaign.status.is_terminal() {
            return Err(WacastError::invalid_state(format!(
                "campaign {campaign_id} is {} and cannot be dispatched",
                campaign.status
            )));
        }
        if self
            .deps
            .campaigns
            .get_template(&request.template_name)
            .await?
            .is_none()
        {
            return Err(WacastError::Payload(format!(
                "unknown template `{}`",
                request.template_name
            )));
        }

        match request.recipients {
            Some(inputs) => {
                let rows = snapshot_rows(campaign_id, inputs)?;
                let inserted = self
                    .deps
                    .campaigns
                    .insert_recipients(campaign_id, &rows)
                    .await?;
                debug!(campaign_id, inserted, supplied = rows.len(), "recipient snapshot stored");
            }
            None => {
                let existing = self
                    .deps
                    .campaigns
                    .list_recipients(campaign_id, None)
                    .await?;
                if existing.is_empty() {
                    return Err(WacastError::Payload(format!(
                        "campaign {campaign_id} has no recipients"
                    )));
                }
            }
        }

        let spec = RunSpec {
            template_name: Some(request.template_name.clone()),
            template_variables: request.template_variables,
            sender_id: request.sender_id,
        };
        let campaign = self
            .deps
            .campaigns
            .begin_run(
                campaign_id,
                &[
                    CampaignStatus::Draft,
                    CampaignStatus::Scheduled,
                    CampaignStatus::Sending,
                ],
                &spec,
            )
            .await?;
        let accepted = self.enqueue_run(&campaign).await?;
        info!(
            campaign_id,
            run = accepted.run,
            batches = accepted.batches,
            recipients = accepted.queued_recipients,
            "dispatch started"
        );
        Ok(accepted)
    }

    /// Enqueue every pending recipient of the campaign's current run.
    async fn enqueue_run(&self, campaign: &Campaign) -> Result<DispatchAccepted, WacastError> {
        let pending: Vec<String> = self
            .deps
            .campaigns
            .list_recipients(&campaign.id, Some(RecipientStatus::Pending))
            .await?
            .into_iter()
            .map(|r| r.id)
            .collect();

        let mut batches = 0;
        for (batch_index, chunk) in pending.chunks(self.settings.batch_size).enumerate() {
            let job = BatchJobPayload {
                campaign_id: campaign.id.clone(),
                run: campaign.dispatch_run,
                batch_index,
                recipient_ids: chunk.to_vec(),
                retry: 0,
            };
            self.enqueue(&job, None).await?;
            batches += 1;
        }

        if batches == 0 {
            self.try_complete(&campaign.id).await?;
        }
        Ok(DispatchAccepted {
            campaign_id: campaign.id.clone(),
            run: campaign.dispatch_run,
            batches,
            queued_recipients: pending.len(),
        })
    }

    async fn enqueue(
        &self,
        job: &BatchJobPayload,
        not_before: Option<DateTime<Utc>>,
    ) -> Result<(), WacastError> {
        let payload =
            serde_json::to_string(job).map_err(|e| WacastError::Internal(e.to_string()))?;
        let key = job.idempotency_key();
        let id = self
            .deps
            .queue
            .enqueue(
                DISPATCH_QUEUE,
                &key,
                Some(&job.campaign_id),
                &payload,
                not_before,
            )
            .await?;
        if id.is_none() {
            debug!(key, "batch already enqueued");
        }
        Ok(())
    }

    /// One batch step. A no-op unless the campaign is `sending`.
    pub async fn send_batch(&self, job: &BatchJobPayload) -> Result<BatchResult, WacastError> {
        let campaign = self.campaign(&job.campaign_id).await?;
        if campaign.status != CampaignStatus::Sending {
            info!(
                campaign_id = %campaign.id,
                batch_index = job.batch_index,
                status = %campaign.status,
                "campaign not sending; batch left untouched"
            );
            return Ok(BatchResult::default());
        }

        let template = match campaign.template_name.as_deref() {
            Some(name) => self.deps.campaigns.get_template(name).await?,
            None => None,
        };
        let sender_id = campaign
            .sender_id
            .clone()
            .or_else(|| self.settings.default_sender.clone())
            .ok_or_else(|| {
                WacastError::Config(
                    "no sender id: set whatsapp.phone_number_id or pass senderId".into(),
                )
            })?;

        let recipients: Vec<CampaignRecipient> = self
            .deps
            .campaigns
            .get_recipients(&campaign.id, &job.recipient_ids)
            .await?
            .into_iter()
            .filter(|r| r.status == RecipientStatus::Pending)
            .collect();
        if recipients.is_empty() {
            debug!(campaign_id = %campaign.id, batch_index = job.batch_index, "nothing pending in batch");
            return Ok(BatchResult::default());
        }

        let ctx = BatchContext {
            campaign_id: campaign.id.clone(),
            sender_id: sender_id.clone(),
            template,
            variables: campaign.template_variables.clone().unwrap_or_default(),
            batch_index: job.batch_index,
        };
        let mut result = self
            .pool
            .run(&ctx, &recipients, self.settings.concurrency)
            .await;

        if !result.throttled.is_empty() {
            result.failed += self
                .retry_throttled(job, &sender_id, &result.throttled)
                .await?;
        }
        if result.throttle_signals == 0 && result.sent > 0 {
            if let Err(e) = self.deps.rate.record_stable_batch(&sender_id).await {
                warn!(sender_id, error = %e, "failed to record stable batch");
            }
        }

        info!(
            campaign_id = %campaign.id,
            batch_index = job.batch_index,
            retry = job.retry,
            sent = result.sent,
            failed = result.failed,
            skipped = result.skipped,
            throttled = result.throttled.len(),
            "batch completed"
        );
        self.deps
            .sinks
            .emit(DispatchEvent::BatchCompleted {
                campaign_id: campaign.id.clone(),
                batch_index: job.batch_index,
                sent: result.sent,
                failed: result.failed,
                skipped: result.skipped,
            })
            .await;
        Ok(result)
    }

    /// Re-enqueue throttled recipients behind the sender's cooldown, or
    /// fail them once out of retries.
    ///
    /// Returns how many were failed. Throttle failures never decide the
    /// campaign's final status on their own.
    async fn retry_throttled(
        &self,
        job: &BatchJobPayload,
        sender_id: &str,
        recipient_ids: &[String],
    ) -> Result<usize, WacastError> {
        let retry = job.retry + 1;
        if retry <= self.settings.max_throttle_retries {
            let not_before = self.deps.rate.get_target(sender_id).await?.cooldown_until;
            let next = BatchJobPayload {
                recipient_ids: recipient_ids.to_vec(),
                retry,
                ..job.clone()
            };
            self.enqueue(&next, not_before).await?;
            debug!(
                key = %next.idempotency_key(),
                count = recipient_ids.len(),
                not_before = ?not_before,
                "throttled recipients re-enqueued"
            );
            return Ok(0);
        }

        let failure = FailureDetail {
            code: Some(THROUGHPUT_EXCEEDED),
            title: "throughput exceeded".into(),
            details: Some(format!(
                "still throttled after {} retries",
                self.settings.max_throttle_retries
            )),
            trace_id: None,
        };
        let mut failed = 0;
        for id in recipient_ids {
            if self
                .deps
                .claims
                .mark_failed(&job.campaign_id, id, &failure)
                .await?
            {
                failed += 1;
                self.deps
                    .sinks
                    .emit(DispatchEvent::RecipientFailed {
                        campaign_id: job.campaign_id.clone(),
                        recipient_id: id.clone(),
                        code: Some(THROUGHPUT_EXCEEDED),
                        category: ErrorCategory::Throttle,
                    })
                    .await;
            }
        }
        warn!(campaign_id = %job.campaign_id, failed, "throttle retries exhausted");
        Ok(failed)
    }

    /// Completion phase, once no batch of the campaign is outstanding.
    ///
    /// Returns the final status if the campaign finished now.
    pub async fn try_complete(
        &self,
        campaign_id: &str,
    ) -> Result<Option<CampaignStatus>, WacastError> {
        if self.deps.queue.count_outstanding(campaign_id).await? > 0 {
            return Ok(None);
        }
        let Some(status) = self.deps.campaigns.finish_campaign(campaign_id).await? else {
            return Ok(None);
        };
        info!(campaign_id, %status, "campaign finished");
        self.deps
            .sinks
            .emit(DispatchEvent::CampaignFinished {
                campaign_id: campaign_id.to_string(),
                status,
            })
            .await;
        Ok(Some(status))
    }

    /// `sending -> paused`. Batches already running finish.
    pub async fn pause(&self, campaign_id: &str) -> Result<(), WacastError> {
        let changed = self
            .deps
            .campaigns
            .transition_campaign(
                campaign_id,
                &[CampaignStatus::Sending],
                CampaignStatus::Paused,
            )
            .await?;
        if changed {
            info!(campaign_id, "campaign paused");
            return Ok(());
        }
        match self.campaign(campaign_id).await?.status {
            CampaignStatus::Paused => Ok(()),
            other => Err(WacastError::invalid_state(format!(
                "campaign {campaign_id} is {other} and cannot be paused"
            ))),
        }
    }

    /// `paused -> sending` under a new run with the remaining recipients.
    pub async fn resume(&self, campaign_id: &str) -> Result<DispatchAccepted, WacastError> {
        let campaign = self
            .deps
            .campaigns
            .begin_run(campaign_id, &[CampaignStatus::Paused], &RunSpec::default())
            .await?;
        let accepted = self.enqueue_run(&campaign).await?;
        info!(campaign_id, run = accepted.run, batches = accepted.batches, "campaign resumed");
        Ok(accepted)
    }

    pub async fn cancel(&self, campaign_id: &str) -> Result<(), WacastError> {
        let changed = self
            .deps
            .campaigns
            .transition_campaign(
                campaign_id,
                &[
                    CampaignStatus::Draft,
                    CampaignStatus::Scheduled,
                    CampaignStatus::Sending,
                    CampaignStatus::Paused,
                ],
                CampaignStatus::Cancelled,
            )
            .await?;
        if changed {
            info!(campaign_id, "campaign cancelled");
            return Ok(());
        }
        let status = self.campaign(campaign_id).await?.status;
        Err(WacastError::invalid_state(format!(
            "campaign {campaign_id} is {status} and cannot be cancelled"
        )))
    }

    /// Reopen skipped recipients (all, or only `ids`) and send them.
    ///
    /// On a paused campaign the reopened recipients wait for `resume`.
    pub async fn resend_skipped(
        &self,
        campaign_id: &str,
        ids: Option<&[String]>,
    ) -> Result<ResendOutcome, WacastError> {
        let campaign = self.campaign(campaign_id).await?;
        let reopenable = [
            CampaignStatus::Sending,
            CampaignStatus::Paused,
            CampaignStatus::Completed,
            CampaignStatus::Failed,
        ];
        if !reopenable.contains(&campaign.status) {
            return Err(WacastError::invalid_state(format!(
                "campaign {campaign_id} is {} and has nothing to resend",
                campaign.status
            )));
        }

        let reopened = self.deps.campaigns.reopen_skipped(campaign_id, ids).await?;
        info!(campaign_id, reopened, "skipped recipients reopened");
        if reopened == 0 || campaign.status == CampaignStatus::Paused {
            return Ok(ResendOutcome {
                reopened,
                dispatch: None,
            });
        }

        let campaign = self
            .deps
            .campaigns
            .begin_run(
                campaign_id,
                &[
                    CampaignStatus::Sending,
                    CampaignStatus::Completed,
                    CampaignStatus::Failed,
                ],
                &RunSpec::default(),
            )
            .await?;
        let dispatch = self.enqueue_run(&campaign).await?;
        Ok(ResendOutcome {
            reopened,
            dispatch: Some(dispatch),
        })
    }

    pub async fn stats(&self, campaign_id: &str) -> Result<CampaignStats, WacastError> {
        self.campaign(campaign_id).await?;
        self.deps.campaigns.campaign_stats(campaign_id).await
    }

    pub async fn get_campaign(&self, campaign_id: &str) -> Result<Campaign, WacastError> {
        self.campaign(campaign_id).await
    }

    /// Dry run over the campaign's pending recipients, including the
    /// suppression and opt-out lookups the worker pool would make.
    pub async fn precheck(
        &self,
        campaign_id: &str,
        template_name: Option<&str>,
        variables: Option<TemplateVariables>,
    ) -> Result<DryRunReport, WacastError> {
        let campaign = self.campaign(campaign_id).await?;
        let template = match template_name.or(campaign.template_name.as_deref()) {
            Some(name) => self.deps.campaigns.get_template(name).await?,
            None => None,
        };
        let variables = variables
            .or(campaign.template_variables)
            .unwrap_or_default();
        let recipients = self
            .deps
            .campaigns
            .list_recipients(campaign_id, Some(RecipientStatus::Pending))
            .await?;

        let mut report = self
            .guard
            .dry_run(&recipients, template.as_ref(), &variables);
        for recipient in &recipients {
            let Ok(Precheck::Send(message)) =
                self.guard.check(recipient, template.as_ref(), &variables)
            else {
                continue;
            };
            if let Some(entry) = self.deps.registry.is_suppressed(&message.to).await? {
                report.demote(
                    &recipient.id,
                    PrecheckSkip::new(SkipCode::Suppressed, entry.reason),
                );
            } else if self.deps.registry.is_opted_out(&message.to).await? {
                report.demote(
                    &recipient.id,
                    PrecheckSkip::new(SkipCode::OptOut, "phone opted out"),
                );
            }
        }
        Ok(report)
    }
}

/// Build pending rows from request input, rejecting missing identities.
fn snapshot_rows(
    campaign_id: &str,
    inputs: Vec<RecipientInput>,
) -> Result<Vec<CampaignRecipient>, WacastError> {
    if inputs.is_empty() {
        return Err(WacastError::Payload("recipient list is empty".into()));
    }
    inputs
        .into_iter()
        .enumerate()
        .map(|(i, input)| {
            let contact_id = input
                .contact_id
                .as_deref()
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .ok_or_else(|| WacastError::MissingIdentity {
                    recipient_id: format!("recipients[{i}]"),
                })?
                .to_string();
            Ok(CampaignRecipient::pending(
                format!("{campaign_id}:{contact_id}"),
                campaign_id,
                Uuid::new_v4().to_string(),
                input,
            ))
        })
        .collect()
}
