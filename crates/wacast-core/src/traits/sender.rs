// SPDX-FileCopyrightText: 2026 Wacast Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Sender adapter trait for the external messaging vendor.

use async_trait::async_trait;

use crate::error::WacastError;
use crate::template::TemplateMessage;
use crate::traits::adapter::PluginAdapter;
use crate::vendor::VendorError;

/// What the vendor said about one send attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// Accepted; the id joins asynchronous status callbacks to the recipient.
    Accepted { message_id: String },
    /// Rejected with a structured vendor error.
    Rejected(VendorError),
}

/// Adapter for the outbound template-message API.
///
/// Transport failures (connection refused, unreadable body) are returned as
/// `Err`; anything the vendor answered, success or structured rejection, is
/// an `Ok(SendOutcome)`.
#[async_trait]
pub trait MessageSender: PluginAdapter {
    /// Sends one template message from `sender_id` (the outbound phone number id).
    async fn send_template(
        &self,
        sender_id: &str,
        message: &TemplateMessage,
    ) -> Result<SendOutcome, WacastError>;
}
