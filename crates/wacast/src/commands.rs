// SPDX-FileCopyrightText: 2026 Wacast Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! One-shot operator commands. Each prints a JSON report on stdout.

use serde::Serialize;

use wacast_config::WacastConfig;
use wacast_core::{EventSinks, WacastError};

use crate::engine::{Engine, sender_for};

async fn engine(config: &WacastConfig) -> Result<Engine, WacastError> {
    Engine::build(config, sender_for(config), EventSinks::new()).await
}

fn print_json<T: Serialize>(value: &T) -> Result<(), WacastError> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| WacastError::Internal(format!("failed to render report: {e}")))?;
    println!("{text}");
    Ok(())
}

/// `wacast precheck <campaign>`: dry run over the pending recipients.
pub async fn precheck(
    config: &WacastConfig,
    campaign_id: &str,
    template: Option<&str>,
) -> Result<(), WacastError> {
    let engine = engine(config).await?;
    let report = engine
        .orchestrator
        .precheck(campaign_id, template, None)
        .await?;
    print_json(&report)
}

/// `wacast reconcile`: re-apply unmatched and errored status events.
pub async fn reconcile(config: &WacastConfig, limit: usize) -> Result<(), WacastError> {
    let engine = engine(config).await?;
    let summary = engine.ingestor.reconcile_unmatched(limit).await?;
    print_json(&summary)
}

/// `wacast reset-throttle <sender>`.
pub async fn reset_throttle(config: &WacastConfig, sender_id: &str) -> Result<(), WacastError> {
    let engine = engine(config).await?;
    let change = engine.rate.reset(sender_id).await?;
    print_json(&serde_json::json!({
        "senderId": sender_id,
        "previous": change.previous,
        "rate": change.next,
    }))
}

/// `wacast resend-skipped <campaign>`: reopen skipped recipients and
/// enqueue them. A running `serve` picks the batches up.
pub async fn resend_skipped(
    config: &WacastConfig,
    campaign_id: &str,
    recipient_ids: &[String],
) -> Result<(), WacastError> {
    let engine = engine(config).await?;
    let ids = (!recipient_ids.is_empty()).then_some(recipient_ids);
    let outcome = engine
        .orchestrator
        .resend_skipped(campaign_id, ids)
        .await?;
    print_json(&outcome)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(dir: &tempfile::TempDir) -> WacastConfig {
        let mut config = WacastConfig::default();
        config.storage.database_path = dir.path().join("cmd.db").to_string_lossy().to_string();
        config
    }

    #[tokio::test]
    async fn reconcile_on_empty_database() {
        let dir = tempfile::tempdir().unwrap();
        reconcile(&config(&dir), 10).await.unwrap();
    }

    #[tokio::test]
    async fn reset_throttle_creates_state() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(&dir);
        reset_throttle(&config, "pn-1").await.unwrap();

        let engine = engine(&config).await.unwrap();
        let target = engine.rate.get_target("pn-1").await.unwrap();
        assert_eq!(target.rate, config.throttle.start_rate);
    }

    #[tokio::test]
    async fn unknown_campaign_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let err = precheck(&config(&dir), "missing", None).await.unwrap_err();
        assert!(matches!(err, WacastError::NotFound { .. }));
        let err = resend_skipped(&config(&dir), "missing", &[]).await.unwrap_err();
        assert!(matches!(err, WacastError::NotFound { .. }));
    }
}
