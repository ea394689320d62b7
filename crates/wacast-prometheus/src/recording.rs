// SPDX-FileCopyrightText: 2026 Wacast Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Metric registration and recording helpers.
//!
//! Uses the metrics-rs facade so any recorder (Prometheus, statsd, etc.)
//! can collect these metrics.

use metrics::{describe_counter, describe_gauge, describe_histogram};

/// Register all Wacast metric descriptions.
///
/// Called once at startup after the recorder is installed.
pub fn register_metrics() {
    describe_counter!(
        "wacast_recipients_total",
        "Recipients reaching a terminal dispatch outcome"
    );
    describe_histogram!(
        "wacast_send_latency_seconds",
        "Vendor send call latency in seconds"
    );
    describe_gauge!("wacast_target_rate", "Current target send rate per sender");
    describe_counter!("wacast_rate_changes_total", "Target rate adjustments");
    describe_counter!("wacast_batches_total", "Completed dispatch batches");
    describe_counter!("wacast_campaigns_finished_total", "Campaigns reaching a final status");
    describe_counter!("wacast_status_events_total", "Applied delivery status callbacks");
    describe_counter!("wacast_suppressions_total", "Phones added to the suppression list");
    describe_counter!("wacast_critical_alerts_total", "Operator alerts raised");
}

/// Record a successful send.
pub fn record_sent(latency_secs: f64) {
    metrics::counter!("wacast_recipients_total", "outcome" => "sent").increment(1);
    metrics::histogram!("wacast_send_latency_seconds").record(latency_secs);
}

/// Record a failed recipient by error category.
pub fn record_failed(category: &str) {
    metrics::counter!(
        "wacast_recipients_total",
        "outcome" => "failed",
        "category" => category.to_string()
    )
    .increment(1);
}

/// Record a skipped recipient by skip code.
pub fn record_skipped(code: &str) {
    metrics::counter!(
        "wacast_recipients_total",
        "outcome" => "skipped",
        "code" => code.to_string()
    )
    .increment(1);
}

pub fn set_target_rate(sender_id: &str, rate: f64, reason: &str) {
    metrics::gauge!("wacast_target_rate", "sender" => sender_id.to_string()).set(rate);
    metrics::counter!("wacast_rate_changes_total", "reason" => reason.to_string()).increment(1);
}

pub fn record_batch() {
    metrics::counter!("wacast_batches_total").increment(1);
}

pub fn record_campaign_finished(status: &str) {
    metrics::counter!("wacast_campaigns_finished_total", "status" => status.to_string())
        .increment(1);
}

pub fn record_status_event(status: &str, outcome: &str) {
    metrics::counter!(
        "wacast_status_events_total",
        "status" => status.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

pub fn record_suppression(source: &str) {
    metrics::counter!("wacast_suppressions_total", "source" => source.to_string()).increment(1);
}

pub fn record_critical_alert() {
    metrics::counter!("wacast_critical_alerts_total").increment(1);
}
