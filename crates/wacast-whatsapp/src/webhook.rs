// SPDX-FileCopyrightText: 2026 Wacast Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Inbound webhook payload model.
//!
//! Only the parts of the notification the engine acts on are modelled;
//! unknown fields are ignored so new vendor fields never break ingestion.

use serde::Deserialize;
use wacast_core::{DeliveryStatus, VendorError, WacastError};

/// Top-level webhook body.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebhookPayload {
    #[serde(default)]
    pub object: Option<String>,
    #[serde(default)]
    pub entry: Vec<Entry>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Entry {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub changes: Vec<Change>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Change {
    #[serde(default)]
    pub field: Option<String>,
    #[serde(default)]
    pub value: ChangeValue,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChangeValue {
    #[serde(default)]
    pub metadata: Option<Metadata>,
    #[serde(default)]
    pub statuses: Vec<StatusNotification>,
    #[serde(default)]
    pub messages: Vec<InboundMessage>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Metadata {
    #[serde(default)]
    pub phone_number_id: Option<String>,
    #[serde(default)]
    pub display_phone_number: Option<String>,
}

/// One delivery status notification.
#[derive(Debug, Clone, Deserialize)]
pub struct StatusNotification {
    /// External message id (`wamid...`).
    pub id: String,
    /// Raw vendor status string; see [`normalize_status`].
    pub status: String,
    /// Unix seconds, as a string.
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub recipient_id: Option<String>,
    #[serde(default)]
    pub errors: Vec<VendorError>,
}

impl StatusNotification {
    /// The first attached error, if any.
    pub fn error(&self) -> Option<&VendorError> {
        self.errors.first()
    }
}

/// A message a contact sent to the business number.
#[derive(Debug, Clone, Deserialize)]
pub struct InboundMessage {
    pub from: String,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub text: Option<TextBody>,
    #[serde(default)]
    pub button: Option<ButtonReply>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TextBody {
    pub body: String,
}

/// Quick-reply button press.
#[derive(Debug, Clone, Deserialize)]
pub struct ButtonReply {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub payload: Option<String>,
}

impl InboundMessage {
    /// User-visible text of a text message or quick-reply press.
    pub fn text_content(&self) -> Option<&str> {
        self.text
            .as_ref()
            .map(|t| t.body.as_str())
            .or_else(|| self.button.as_ref().and_then(|b| b.text.as_deref()))
    }
}

impl WebhookPayload {
    /// Parse a raw webhook body.
    pub fn parse(raw: &[u8]) -> Result<Self, WacastError> {
        serde_json::from_slice(raw).map_err(|e| WacastError::Payload(e.to_string()))
    }

    /// Every status notification in the payload, in order.
    pub fn statuses(&self) -> impl Iterator<Item = &StatusNotification> {
        self.entry
            .iter()
            .flat_map(|e| e.changes.iter())
            .flat_map(|c| c.value.statuses.iter())
    }

    /// Every inbound message in the payload, in order.
    pub fn messages(&self) -> impl Iterator<Item = &InboundMessage> {
        self.entry
            .iter()
            .flat_map(|e| e.changes.iter())
            .flat_map(|c| c.value.messages.iter())
    }
}

/// Map a vendor status string onto the canonical set.
///
/// Vendor API versions and BSPs spell the same state differently. Anything
/// outside the recognised synonyms (`deleted`, `warning`, ...) yields `None`
/// and is ignored by ingestion.
pub fn normalize_status(raw: &str) -> Option<DeliveryStatus> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "sent" | "accepted" | "submitted" | "server" => Some(DeliveryStatus::Sent),
        "delivered" | "delivery" => Some(DeliveryStatus::Delivered),
        "read" | "seen" | "viewed" | "played" => Some(DeliveryStatus::Read),
        "failed" | "failure" | "undelivered" | "undeliverable" | "rejected" | "error" => {
            Some(DeliveryStatus::Failed)
        }
        _ => None,
    }
}

/// Answer the subscription handshake (`GET /webhook`).
///
/// Returns the challenge to echo iff the mode is `subscribe` and the token
/// matches the configured verify token. An unconfigured token rejects.
pub fn verify_subscription(
    mode: Option<&str>,
    token: Option<&str>,
    challenge: Option<&str>,
    expected_token: Option<&str>,
) -> Option<String> {
    let expected = expected_token.filter(|t| !t.is_empty())?;
    if mode? != "subscribe" || token? != expected {
        return None;
    }
    challenge.map(str::to_string)
}
