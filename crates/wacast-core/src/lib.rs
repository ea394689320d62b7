// SPDX-FileCopyrightText: 2026 Wacast Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Wacast dispatch engine.
//!
//! This crate provides the foundational trait definitions, error types, and
//! domain types used throughout the Wacast workspace: campaigns and their
//! recipient state machine, delivery statuses, throttle and suppression
//! state, the vendor error catalogue, and phone normalization.

pub mod error;
pub mod phone;
pub mod template;
pub mod traits;
pub mod types;
pub mod vendor;

// Re-export key items at crate root for ergonomic imports.
pub use error::WacastError;
pub use phone::normalize_phone;
pub use template::{
    ComponentKind, ComponentParameters, MessageTemplate, TemplateComponent, TemplateMessage,
    TemplateVariables,
};
pub use types::*;
pub use vendor::{ErrorCategory, THROUGHPUT_EXCEEDED, VendorError, categorize};

pub use traits::{
    AlertSink, AlertStore, CampaignStore, ClaimStore, EventSink, EventSinks, JobQueue,
    MessageSender, NewAlert, PluginAdapter, ReceiptStore, RunSpec, SendOutcome,
    StatusEventStore, StorageAdapter, SuppressionStore, ThrottleStore,
};

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn campaign_transitions_are_monotonic_except_pause() {
        use CampaignStatus::*;
        assert!(Sending.can_transition_to(Paused));
        assert!(Paused.can_transition_to(Sending));
        assert!(Draft.can_transition_to(Sending));
        assert!(!Sending.can_transition_to(Draft));
        assert!(!Cancelled.can_transition_to(Sending));
        assert!(!Completed.can_transition_to(Paused));
        // Resend of skipped recipients re-opens a finished campaign.
        assert!(Completed.can_transition_to(Sending));
    }

    #[test]
    fn skip_codes_use_screaming_snake_case() {
        assert_eq!(SkipCode::MissingVariable.to_string(), "MISSING_VARIABLE");
        assert_eq!(SkipCode::from_str("OPT_OUT").unwrap(), SkipCode::OptOut);
        let json = serde_json::to_string(&SkipCode::InvalidPhone).unwrap();
        assert_eq!(json, "\"INVALID_PHONE\"");
    }

    #[test]
    fn status_enums_round_trip_through_strings() {
        for status in [
            RecipientStatus::Pending,
            RecipientStatus::Sending,
            RecipientStatus::Sent,
            RecipientStatus::Failed,
            RecipientStatus::Skipped,
        ] {
            assert_eq!(RecipientStatus::from_str(&status.to_string()).unwrap(), status);
        }
        assert_eq!(
            CampaignStatus::from_str("paused").unwrap(),
            CampaignStatus::Paused
        );
        assert_eq!(EventState::Unmatched.to_string(), "unmatched");
    }

    #[test]
    fn event_state_settlement() {
        assert!(EventState::Applied.is_settled());
        assert!(EventState::Unmatched.is_settled());
        assert!(!EventState::Pending.is_settled());
        assert!(!EventState::Error.is_settled());
    }

    #[test]
    fn suppression_expiry() {
        let now = chrono::Utc::now();
        let mut entry = SuppressionEntry {
            phone: "5511999990000".into(),
            reason: "test".into(),
            source: SuppressionSource::Auto,
            is_active: true,
            expires_at: Some(now + chrono::Duration::days(7)),
            suppression_count: 1,
            created_at: now_timestamp(),
            updated_at: now_timestamp(),
        };
        assert!(entry.is_effective(now));
        assert!(!entry.is_effective(now + chrono::Duration::days(8)));
        entry.expires_at = None;
        assert!(entry.is_effective(now + chrono::Duration::days(365)));
        entry.is_active = false;
        assert!(!entry.is_effective(now));
    }

    #[test]
    fn timestamps_parse_rfc3339_and_unix_seconds() {
        let ts = parse_timestamp("1700000000").unwrap();
        assert_eq!(ts.timestamp(), 1_700_000_000);
        let formatted = format_timestamp(ts);
        assert_eq!(formatted, "2023-11-14T22:13:20.000Z");
        assert_eq!(parse_timestamp(&formatted), Some(ts));
        assert_eq!(parse_timestamp("yesterday"), None);
    }

    #[test]
    fn all_traits_are_exported() {
        fn _assert_plugin_adapter<T: PluginAdapter>() {}
        fn _assert_sender<T: MessageSender>() {}
        fn _assert_storage<T: StorageAdapter>() {}
        fn _assert_claims<T: ClaimStore>() {}
        fn _assert_campaigns<T: CampaignStore>() {}
        fn _assert_receipts<T: ReceiptStore>() {}
        fn _assert_throttle<T: ThrottleStore>() {}
        fn _assert_suppression<T: SuppressionStore>() {}
        fn _assert_events<T: StatusEventStore>() {}
        fn _assert_queue<T: JobQueue>() {}
        fn _assert_alerts<T: AlertStore>() {}
        fn _assert_sink<T: EventSink>() {}
    }
}
