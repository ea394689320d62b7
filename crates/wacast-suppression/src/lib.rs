// SPDX-FileCopyrightText: 2026 Wacast Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Recipient suppression for the Wacast dispatch engine.
//!
//! [`SuppressionRegistry`] is the deny-list consulted before every send.
//! [`AutoSuppressionEngine`] watches failure codes across campaigns and
//! promotes repeat offenders into the registry with an escalating TTL.

pub mod engine;
pub mod registry;

pub use engine::{AutoSuppressionEngine, AutoSuppressionOutcome, FailureContext};
pub use registry::SuppressionRegistry;
