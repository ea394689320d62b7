// SPDX-FileCopyrightText: 2026 Wacast Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Wacast integration tests.
//!
//! Provides a scripted vendor double and a fully wired engine over a
//! temporary SQLite database, for fast and deterministic tests without
//! network access.
//!
//! # Components
//!
//! - [`MockSender`] - Vendor sender replaying scripted replies
//! - [`TestHarness`] - Storage, orchestrator, runner and ingestor wired together

pub mod harness;
pub mod mock_sender;

pub use harness::{TestHarness, TestHarnessBuilder};
pub use mock_sender::{MockReply, MockSender};
