// SPDX-FileCopyrightText: 2026 Wacast Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Wacast dispatch engine.

use thiserror::Error;

/// The primary error type used across all Wacast traits and core operations.
#[derive(Debug, Error)]
pub enum WacastError {
    /// Configuration errors (invalid TOML, missing required fields, type mismatches).
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage backend errors (database connection, query failure, serialization).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A table the operation depends on does not exist yet.
    ///
    /// Raised while a deployment is mid-migration; callers with a
    /// compatibility path (webhook ingestion) fall back instead of failing.
    #[error("table `{table}` does not exist")]
    SchemaMissing { table: String },

    /// Messaging vendor transport errors (connection failure, unreadable response).
    #[error("vendor error: {message}")]
    Vendor {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// A referenced entity does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// The entity exists but is in a state that forbids the operation.
    #[error("invalid state: {message}")]
    InvalidState { message: String },

    /// A recipient reached the dispatch path without a contact identity.
    #[error("recipient {recipient_id} has no contact identity")]
    MissingIdentity { recipient_id: String },

    /// Webhook signature missing or invalid.
    #[error("webhook signature verification failed")]
    Signature,

    /// Malformed inbound payload.
    #[error("invalid payload: {0}")]
    Payload(String),

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl WacastError {
    /// Shorthand for [`WacastError::NotFound`].
    pub fn not_found(entity: &str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity: entity.to_string(),
            id: id.into(),
        }
    }

    /// Shorthand for [`WacastError::InvalidState`].
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }
}
