// SPDX-FileCopyrightText: 2026 Wacast Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! WhatsApp Cloud API adapter for the Wacast dispatch engine.
//!
//! Covers both directions of vendor traffic: the outbound template send
//! ([`CloudApiClient`], a [`wacast_core::MessageSender`]) and the inbound
//! webhook (payload model, signature verification, subscription handshake,
//! and status normalization).

pub mod client;
pub mod signature;
pub mod types;
pub mod webhook;

pub use client::CloudApiClient;
pub use signature::{SIGNATURE_HEADERS, sign_payload, verify_signature};
pub use webhook::{
    InboundMessage, StatusNotification, WebhookPayload, normalize_status, verify_subscription,
};
