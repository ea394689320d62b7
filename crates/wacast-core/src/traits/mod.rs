// SPDX-FileCopyrightText: 2026 Wacast Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Adapter and store trait definitions.
//!
//! Adapters extend the [`PluginAdapter`] base trait and use
//! `#[async_trait]` for dynamic dispatch compatibility.

pub mod adapter;
pub mod observability;
pub mod sender;
pub mod storage;

pub use adapter::PluginAdapter;
pub use observability::{AlertSink, EventSink, EventSinks};
pub use sender::{MessageSender, SendOutcome};
pub use storage::{
    AlertStore, CampaignStore, ClaimStore, JobQueue, NewAlert, ReceiptStore, RunSpec,
    StatusEventStore, StorageAdapter, SuppressionStore, ThrottleStore,
};
