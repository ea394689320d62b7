// SPDX-FileCopyrightText: 2026 Wacast Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Automatic suppression of repeatedly failing phones.
//!
//! Every failure with a configured code is appended to the phone's failure
//! history. When the count inside the sliding window reaches the threshold
//! the phone is suppressed. The TTL escalates with each offense: the n-th
//! suppression uses `ttl_steps_days[n - 1]`, and the last step repeats.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, warn};
use wacast_config::model::SuppressionConfig;
use wacast_core::{SuppressionSource, SuppressionStore, WacastError};

use crate::registry::{SuppressionRegistry, key};

/// Where a failure came from.
#[derive(Debug, Clone, Default)]
pub struct FailureContext {
    pub campaign_id: Option<String>,
    pub message_id: Option<String>,
}

/// Result of feeding one failure to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AutoSuppressionOutcome {
    /// The phone is suppressed after this failure.
    pub suppressed: bool,
    /// Counted failures inside the window, including this one.
    pub recent_count: i64,
    pub expires_at: Option<DateTime<Utc>>,
}

pub struct AutoSuppressionEngine {
    config: SuppressionConfig,
    store: Arc<dyn SuppressionStore>,
    registry: Arc<SuppressionRegistry>,
}

impl AutoSuppressionEngine {
    pub fn new(
        config: SuppressionConfig,
        store: Arc<dyn SuppressionStore>,
        registry: Arc<SuppressionRegistry>,
    ) -> Self {
        Self {
            config,
            store,
            registry,
        }
    }

    /// Whether failures with `code` count toward suppression.
    pub fn tracks(&self, code: i64) -> bool {
        self.config.auto_enabled && self.config.failure_codes.contains(&code)
    }

    /// TTL for a phone that has been suppressed `previous` times before.
    pub fn ttl_for(&self, previous: i64) -> Duration {
        let steps = &self.config.ttl_steps_days;
        let idx = usize::try_from(previous.max(0))
            .unwrap_or(usize::MAX)
            .min(steps.len().saturating_sub(1));
        Duration::days(i64::from(steps.get(idx).copied().unwrap_or(0)))
    }

    pub async fn on_failure(
        &self,
        phone: &str,
        code: i64,
        ctx: &FailureContext,
    ) -> Result<AutoSuppressionOutcome, WacastError> {
        self.on_failure_at(phone, code, ctx, Utc::now()).await
    }

    pub async fn on_failure_at(
        &self,
        phone: &str,
        code: i64,
        ctx: &FailureContext,
        now: DateTime<Utc>,
    ) -> Result<AutoSuppressionOutcome, WacastError> {
        if !self.tracks(code) {
            return Ok(AutoSuppressionOutcome::default());
        }
        let phone = key(phone);
        let phone = phone.as_str();

        self.store
            .record_failure(phone, code, ctx.campaign_id.as_deref(), now)
            .await?;
        let since = now - Duration::days(i64::from(self.config.window_days));
        let recent_count = self
            .store
            .count_failures_since(phone, &self.config.failure_codes, since)
            .await?;

        if recent_count < i64::from(self.config.threshold) {
            debug!(phone, code, recent_count, "failure recorded below threshold");
            return Ok(AutoSuppressionOutcome {
                suppressed: false,
                recent_count,
                expires_at: None,
            });
        }

        let existing = self.store.get_suppression(phone).await?;
        if let Some(entry) = existing.as_ref().filter(|e| e.is_effective(now)) {
            return Ok(AutoSuppressionOutcome {
                suppressed: true,
                recent_count,
                expires_at: entry.expires_at,
            });
        }

        let previous = existing.map(|e| e.suppression_count).unwrap_or(0);
        let expires_at = now + self.ttl_for(previous);
        let reason = format!(
            "{recent_count} failures with code {code} within {} days",
            self.config.window_days
        );
        let entry = self
            .registry
            .suppress(phone, &reason, SuppressionSource::Auto, Some(expires_at))
            .await?;
        debug!(
            phone,
            campaign_id = ?ctx.campaign_id,
            message_id = ?ctx.message_id,
            "auto-suppression threshold crossed"
        );
        Ok(AutoSuppressionOutcome {
            suppressed: true,
            recent_count,
            expires_at: entry.expires_at,
        })
    }

    /// Best-effort variant for the send and webhook paths: errors are
    /// logged and swallowed.
    pub async fn observe(
        &self,
        phone: &str,
        code: i64,
        ctx: &FailureContext,
    ) -> Option<AutoSuppressionOutcome> {
        match self.on_failure(phone, code, ctx).await {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                warn!(phone, code, error = %e, "auto-suppression failed; continuing");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::storage;
    use wacast_core::EventSinks;

    fn config() -> SuppressionConfig {
        SuppressionConfig {
            auto_enabled: true,
            failure_codes: vec![131_026],
            window_days: 30,
            threshold: 3,
            ttl_steps_days: vec![7, 30, 90],
        }
    }

    async fn engine(config: SuppressionConfig) -> (AutoSuppressionEngine, tempfile::TempDir) {
        let (store, dir) = storage().await;
        let registry = Arc::new(SuppressionRegistry::new(store.clone(), EventSinks::new()));
        (AutoSuppressionEngine::new(config, store, registry), dir)
    }

    #[tokio::test]
    async fn threshold_triggers_short_first_suppression() {
        let (engine, _dir) = engine(config()).await;
        let ctx = FailureContext::default();
        let now = Utc::now();

        for expected in 1..=2 {
            let outcome = engine.on_failure_at("5511999990000", 131_026, &ctx, now).await.unwrap();
            assert!(!outcome.suppressed);
            assert_eq!(outcome.recent_count, expected);
        }
        let outcome = engine.on_failure_at("5511999990000", 131_026, &ctx, now).await.unwrap();
        assert!(outcome.suppressed);
        assert_eq!(outcome.recent_count, 3);
        let expires = outcome.expires_at.unwrap();
        assert!((expires - now - Duration::days(7)).num_seconds().abs() <= 1);
    }

    #[tokio::test]
    async fn untracked_codes_are_ignored() {
        let (engine, _dir) = engine(config()).await;
        let ctx = FailureContext::default();
        for _ in 0..5 {
            let outcome = engine.on_failure("5511999990000", 131_047, &ctx).await.unwrap();
            assert_eq!(outcome, AutoSuppressionOutcome::default());
        }
    }

    #[tokio::test]
    async fn failures_outside_window_do_not_count() {
        let (engine, _dir) = engine(config()).await;
        let ctx = FailureContext::default();
        let now = Utc::now();
        for days_ago in [60, 45] {
            engine
                .on_failure_at("5511999990000", 131_026, &ctx, now - Duration::days(days_ago))
                .await
                .unwrap();
        }
        let outcome = engine.on_failure_at("5511999990000", 131_026, &ctx, now).await.unwrap();
        assert_eq!(outcome.recent_count, 1);
        assert!(!outcome.suppressed);
    }

    #[tokio::test]
    async fn repeat_offenses_escalate_ttl() {
        let (engine, _dir) = engine(SuppressionConfig {
            threshold: 1,
            ..config()
        })
        .await;
        let ctx = FailureContext::default();
        let t0 = DateTime::from_timestamp(Utc::now().timestamp(), 0).unwrap() - Duration::days(200);

        let first = engine.on_failure_at("5511999990000", 131_026, &ctx, t0).await.unwrap();
        assert_eq!(first.expires_at, Some(t0 + Duration::days(7)));

        // Still suppressed: no re-escalation.
        let during = t0 + Duration::days(1);
        let again = engine.on_failure_at("5511999990000", 131_026, &ctx, during).await.unwrap();
        assert_eq!(again.expires_at, first.expires_at);

        let t1 = t0 + Duration::days(10);
        let second = engine.on_failure_at("5511999990000", 131_026, &ctx, t1).await.unwrap();
        assert_eq!(second.expires_at, Some(t1 + Duration::days(30)));

        let t2 = t1 + Duration::days(40);
        let third = engine.on_failure_at("5511999990000", 131_026, &ctx, t2).await.unwrap();
        assert_eq!(third.expires_at, Some(t2 + Duration::days(90)));
    }

    #[tokio::test]
    async fn last_ttl_step_repeats() {
        let (engine, _dir) = engine(SuppressionConfig {
            ttl_steps_days: vec![7, 30],
            ..config()
        })
        .await;
        assert_eq!(engine.ttl_for(0), Duration::days(7));
        assert_eq!(engine.ttl_for(1), Duration::days(30));
        assert_eq!(engine.ttl_for(5), Duration::days(30));
    }

    #[tokio::test]
    async fn disabled_engine_records_nothing() {
        let (engine, _dir) = engine(SuppressionConfig {
            auto_enabled: false,
            threshold: 1,
            ..config()
        })
        .await;
        let outcome = engine
            .observe("5511999990000", 131_026, &FailureContext::default())
            .await
            .unwrap();
        assert!(!outcome.suppressed);
    }
}
