// SPDX-FileCopyrightText: 2026 Wacast Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Rate-controlled batch dispatch.
//!
//! A dispatch request becomes a set of durable batch jobs in the queue.
//! [`DispatchRunner`] pulls each job and hands it to the
//! [`DispatchOrchestrator`], which drives the recipients of the batch
//! through a [`BatchWorkerPool`]: precheck, suppression and opt-out
//! lookups, pacing, claim, send, and result application. The
//! [`RateController`] learns the sender's sustainable throughput from
//! the outcome of every batch.

pub mod orchestrator;
pub mod pool;
pub mod precheck;
pub mod rate;
pub mod runner;

use std::sync::Arc;

use wacast_core::{CampaignStore, ClaimStore, EventSinks, JobQueue, MessageSender};
use wacast_suppression::{AutoSuppressionEngine, SuppressionRegistry};

pub use orchestrator::{
    BatchJobPayload, DISPATCH_QUEUE, DispatchAccepted, DispatchOrchestrator, DispatchRequest,
    DispatchSettings, ResendOutcome,
};
pub use pool::{BatchContext, BatchResult, BatchWorkerPool};
pub use precheck::{DryRunReport, DryRunSkip, Precheck, PrecheckGuard, PrecheckSkip};
pub use rate::{Pacer, RateChange, RateController, RateIncrease, RateTarget};
pub use runner::DispatchRunner;

/// Collaborators shared by the orchestrator and its worker pool.
#[derive(Clone)]
pub struct DispatchDeps {
    pub campaigns: Arc<dyn CampaignStore>,
    pub claims: Arc<dyn ClaimStore>,
    pub queue: Arc<dyn JobQueue>,
    pub sender: Arc<dyn MessageSender>,
    pub rate: Arc<RateController>,
    pub registry: Arc<SuppressionRegistry>,
    pub auto_suppression: Arc<AutoSuppressionEngine>,
    pub sinks: EventSinks,
}
