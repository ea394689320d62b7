// SPDX-FileCopyrightText: 2026 Wacast Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Global phone deny-list.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::info;
use wacast_core::{
    DispatchEvent, EventSinks, SuppressionEntry, SuppressionSource, SuppressionStore,
    WacastError, normalize_phone,
};

/// Deny-list keyed by normalized phone.
///
/// A lookup is a single read; there is no ordering between concurrent
/// writers beyond the store's upsert.
pub struct SuppressionRegistry {
    store: Arc<dyn SuppressionStore>,
    sinks: EventSinks,
}

/// Registry key for a phone. Inputs that do not normalize are used as given.
pub(crate) fn key(phone: &str) -> String {
    normalize_phone(phone, None).unwrap_or_else(|| phone.trim().to_string())
}

impl SuppressionRegistry {
    pub fn new(store: Arc<dyn SuppressionStore>, sinks: EventSinks) -> Self {
        Self { store, sinks }
    }

    /// The entry currently blocking `phone`, if any.
    pub async fn is_suppressed(&self, phone: &str) -> Result<Option<SuppressionEntry>, WacastError> {
        self.is_suppressed_at(phone, Utc::now()).await
    }

    pub async fn is_suppressed_at(
        &self,
        phone: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<SuppressionEntry>, WacastError> {
        let entry = self.store.get_suppression(&key(phone)).await?;
        Ok(entry.filter(|e| e.is_effective(now)))
    }

    /// Whether the contact behind `phone` asked to stop receiving messages.
    pub async fn is_opted_out(&self, phone: &str) -> Result<bool, WacastError> {
        self.store.is_opted_out(&key(phone)).await
    }

    /// Insert or re-activate a suppression.
    pub async fn suppress(
        &self,
        phone: &str,
        reason: &str,
        source: SuppressionSource,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<SuppressionEntry, WacastError> {
        let entry = self
            .store
            .upsert_suppression(&key(phone), reason, source, expires_at)
            .await?;
        info!(
            phone = %entry.phone,
            %source,
            expires_at = ?entry.expires_at,
            count = entry.suppression_count,
            "phone suppressed"
        );
        self.sinks
            .emit(DispatchEvent::PhoneSuppressed {
                phone: entry.phone.clone(),
                source,
                expires_at: entry.expires_at,
            })
            .await;
        Ok(entry)
    }

    /// Record an explicit opt-out and block the phone indefinitely.
    pub async fn record_opt_out(
        &self,
        phone: &str,
        reason: &str,
    ) -> Result<SuppressionEntry, WacastError> {
        self.store.record_opt_out(&key(phone), reason).await?;
        self.suppress(phone, reason, SuppressionSource::OptOut, None)
            .await
    }

    /// Remove a phone from the deny-list and forget its opt-out.
    ///
    /// Returns whether anything was lifted.
    pub async fn lift(&self, phone: &str) -> Result<bool, WacastError> {
        let phone = key(phone);
        let deactivated = self.store.deactivate_suppression(&phone).await?;
        let cleared = self.store.clear_opt_out(&phone).await?;
        if deactivated || cleared {
            info!(%phone, "suppression lifted");
        }
        Ok(deactivated || cleared)
    }

    pub async fn list(
        &self,
        active_only: bool,
        limit: usize,
    ) -> Result<Vec<SuppressionEntry>, WacastError> {
        self.store.list_suppressions(active_only, limit).await
    }
}
