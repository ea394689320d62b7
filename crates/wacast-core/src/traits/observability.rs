// SPDX-FileCopyrightText: 2026 Wacast Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Best-effort event sinks for metrics, alerts, and telemetry.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use crate::error::WacastError;
use crate::traits::storage::{AlertStore, NewAlert};
use crate::types::DispatchEvent;

/// Receives side-channel events emitted next to core state transitions.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Records one event.
    async fn record(&self, event: &DispatchEvent) -> Result<(), WacastError>;
}

/// Fan-out over every configured sink.
///
/// `emit` never fails: sink errors are logged and dropped so the state
/// transition that produced the event is unaffected.
#[derive(Clone, Default)]
pub struct EventSinks {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl EventSinks {
    /// An empty fan-out.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a sink.
    pub fn with(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Number of registered sinks.
    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    /// Whether no sinks are registered.
    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    /// Emit an event to every sink, ignoring failures.
    pub async fn emit(&self, event: DispatchEvent) {
        for sink in &self.sinks {
            if let Err(e) = sink.record(&event).await {
                warn!(error = %e, ?event, "event sink failed; continuing");
            }
        }
    }
}

impl std::fmt::Debug for EventSinks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSinks")
            .field("sinks", &self.sinks.len())
            .finish()
    }
}

/// Persists [`DispatchEvent::CriticalAlert`] events as operator alerts.
pub struct AlertSink {
    store: Arc<dyn AlertStore>,
}

impl AlertSink {
    pub fn new(store: Arc<dyn AlertStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl EventSink for AlertSink {
    async fn record(&self, event: &DispatchEvent) -> Result<(), WacastError> {
        if let DispatchEvent::CriticalAlert {
            campaign_id,
            message_id,
            code,
            title,
            message,
        } = event
        {
            let alert = NewAlert {
                campaign_id: campaign_id.clone(),
                message_id: message_id.clone(),
                code: *code,
                title: title.clone(),
                message: message.clone(),
            };
            self.store.insert_alert(&alert).await?;
        }
        Ok(())
    }
}
