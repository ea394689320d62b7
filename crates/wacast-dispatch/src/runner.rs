// SPDX-FileCopyrightText: 2026 Wacast Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Queue consumer that executes batch jobs.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use wacast_core::{JobQueue, WacastError};

use crate::orchestrator::{BatchJobPayload, DISPATCH_QUEUE, DispatchOrchestrator};

pub struct DispatchRunner {
    orchestrator: Arc<DispatchOrchestrator>,
    queue: Arc<dyn JobQueue>,
    poll_interval: Duration,
}

impl DispatchRunner {
    pub fn new(
        orchestrator: Arc<DispatchOrchestrator>,
        queue: Arc<dyn JobQueue>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            orchestrator,
            queue,
            poll_interval,
        }
    }

    /// Execute at most one job. Returns `false` when the queue was empty.
    pub async fn run_once(&self) -> Result<bool, WacastError> {
        let Some(entry) = self.queue.dequeue(DISPATCH_QUEUE).await? else {
            return Ok(false);
        };

        let job: BatchJobPayload = match serde_json::from_str(&entry.payload) {
            Ok(job) => job,
            Err(e) => {
                error!(job_id = entry.id, error = %e, "unreadable batch job dropped");
                self.queue.ack(entry.id).await?;
                return Ok(true);
            }
        };

        match self.orchestrator.send_batch(&job).await {
            Ok(_) => self.queue.ack(entry.id).await?,
            Err(WacastError::NotFound { entity, id }) => {
                warn!(job_id = entry.id, %entity, %id, "batch target gone; job dropped");
                self.queue.ack(entry.id).await?;
            }
            Err(e) => {
                warn!(
                    job_id = entry.id,
                    key = %entry.idempotency_key,
                    attempts = entry.attempts,
                    error = %e,
                    "batch failed; will retry"
                );
                self.queue.fail(entry.id).await?;
            }
        }

        if let Err(e) = self.orchestrator.try_complete(&job.campaign_id).await {
            warn!(campaign_id = %job.campaign_id, error = %e, "completion check failed");
        }
        Ok(true)
    }

    /// Run jobs until the queue is empty. Returns how many ran.
    pub async fn drain(&self) -> Result<usize, WacastError> {
        let mut ran = 0;
        while self.run_once().await? {
            ran += 1;
        }
        Ok(ran)
    }

    /// Poll the queue until `cancel` fires. The current job always finishes.
    pub async fn run(&self, cancel: CancellationToken) {
        let poll_ms = u64::try_from(self.poll_interval.as_millis()).unwrap_or(u64::MAX);
        info!(poll_ms, "dispatch runner started");
        self.requeue_expired().await;

        loop {
            if cancel.is_cancelled() {
                break;
            }
            let idle = match self.run_once().await {
                Ok(ran) => !ran,
                Err(e) => {
                    error!(error = %e, "dispatch runner error");
                    true
                }
            };
            if idle {
                self.requeue_expired().await;
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(self.poll_interval) => {}
                }
            }
        }
        info!("dispatch runner stopped");
    }

    async fn requeue_expired(&self) {
        match self.queue.requeue_expired(DISPATCH_QUEUE).await {
            Ok(0) => {}
            Ok(n) => info!(count = n, "expired batch jobs re-queued"),
            Err(e) => debug!(error = %e, "requeue of expired jobs failed"),
        }
    }
}
