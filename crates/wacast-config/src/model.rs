// SPDX-FileCopyrightText: 2026 Wacast Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Wacast dispatch engine.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use serde::{Deserialize, Serialize};

/// Top-level Wacast configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable overrides.
/// All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct WacastConfig {
    /// Service identity and logging.
    #[serde(default)]
    pub service: ServiceConfig,

    /// Storage backend settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// WhatsApp Cloud API credentials and webhook secrets.
    #[serde(default)]
    pub whatsapp: WhatsAppConfig,

    /// Batch and worker pool sizing.
    #[serde(default)]
    pub dispatch: DispatchConfig,

    /// Adaptive rate control.
    #[serde(default)]
    pub throttle: ThrottleConfig,

    /// Automatic suppression of repeatedly failing phones.
    #[serde(default)]
    pub suppression: SuppressionConfig,

    /// Webhook ingestion and reconciliation.
    #[serde(default)]
    pub webhook: WebhookConfig,

    /// Recipient precheck.
    #[serde(default)]
    pub precheck: PrecheckConfig,

    /// HTTP gateway.
    #[serde(default)]
    pub gateway: GatewayConfig,
}

/// Service identity configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceConfig {
    /// Name reported in logs and health responses.
    #[serde(default = "default_service_name")]
    pub name: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            log_level: default_log_level(),
        }
    }
}

fn default_service_name() -> String {
    "wacast".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Storage backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL (Write-Ahead Logging) mode for SQLite.
    #[serde(default = "default_wal_mode")]
    pub wal_mode: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: default_wal_mode(),
        }
    }
}

fn default_database_path() -> String {
    dirs::data_dir()
        .map(|p| p.join("wacast").join("wacast.db"))
        .unwrap_or_else(|| std::path::PathBuf::from("wacast.db"))
        .to_string_lossy()
        .into_owned()
}

fn default_wal_mode() -> bool {
    true
}

/// WhatsApp Cloud API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct WhatsAppConfig {
    /// Graph API base URL.
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// Graph API version path segment.
    #[serde(default = "default_api_version")]
    pub api_version: String,

    /// Default outbound phone number id (the sender identity).
    #[serde(default)]
    pub phone_number_id: Option<String>,

    /// System user access token.
    #[serde(default)]
    pub access_token: Option<String>,

    /// App secret for `X-Hub-Signature-256` verification. `None` accepts unsigned webhooks.
    #[serde(default)]
    pub app_secret: Option<String>,

    /// Token expected in the subscription handshake.
    #[serde(default)]
    pub verify_token: Option<String>,
}

impl Default for WhatsAppConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            api_version: default_api_version(),
            phone_number_id: None,
            access_token: None,
            app_secret: None,
            verify_token: None,
        }
    }
}

fn default_api_base_url() -> String {
    "https://graph.facebook.com".to_string()
}

fn default_api_version() -> String {
    "v21.0".to_string()
}

/// Batch and worker pool configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DispatchConfig {
    /// Recipients per batch job. Clamped to 1..=200 at use.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Parallel workers per batch. Clamped to 1..=50 at use.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Wall-clock limit on a single vendor send call.
    #[serde(default = "default_send_timeout_secs")]
    pub send_timeout_secs: u64,

    /// Retry batches for throttled recipients before they are marked failed.
    #[serde(default = "default_max_throttle_retries")]
    pub max_throttle_retries: u32,

    /// Runner poll interval when the queue is empty.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// How long a dequeued batch job stays locked.
    #[serde(default = "default_job_lock_secs")]
    pub job_lock_secs: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            concurrency: default_concurrency(),
            send_timeout_secs: default_send_timeout_secs(),
            max_throttle_retries: default_max_throttle_retries(),
            poll_interval_ms: default_poll_interval_ms(),
            job_lock_secs: default_job_lock_secs(),
        }
    }
}

fn default_batch_size() -> usize {
    10
}

fn default_concurrency() -> usize {
    1
}

fn default_send_timeout_secs() -> u64 {
    60
}

fn default_max_throttle_retries() -> u32 {
    3
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_job_lock_secs() -> u64 {
    300
}

/// Adaptive rate control configuration (messages per second).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ThrottleConfig {
    #[serde(default = "default_start_rate")]
    pub start_rate: f64,

    #[serde(default = "default_min_rate")]
    pub min_rate: f64,

    #[serde(default = "default_max_rate")]
    pub max_rate: f64,

    /// Additive increase after a stable batch.
    #[serde(default = "default_increase_step")]
    pub increase_step: f64,

    /// Multiplicative decrease on a throttle signal.
    #[serde(default = "default_decrease_factor")]
    pub decrease_factor: f64,

    /// No increases for this long after a decrease.
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,

    /// Minimum spacing between two increases.
    #[serde(default = "default_min_increase_gap_secs")]
    pub min_increase_gap_secs: u64,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            start_rate: default_start_rate(),
            min_rate: default_min_rate(),
            max_rate: default_max_rate(),
            increase_step: default_increase_step(),
            decrease_factor: default_decrease_factor(),
            cooldown_secs: default_cooldown_secs(),
            min_increase_gap_secs: default_min_increase_gap_secs(),
        }
    }
}

fn default_start_rate() -> f64 {
    30.0
}

fn default_min_rate() -> f64 {
    5.0
}

fn default_max_rate() -> f64 {
    80.0
}

fn default_increase_step() -> f64 {
    5.0
}

fn default_decrease_factor() -> f64 {
    0.5
}

fn default_cooldown_secs() -> u64 {
    60
}

fn default_min_increase_gap_secs() -> u64 {
    30
}

/// Automatic suppression configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SuppressionConfig {
    #[serde(default = "default_auto_enabled")]
    pub auto_enabled: bool,

    /// Vendor codes counted toward the threshold.
    #[serde(default = "default_failure_codes")]
    pub failure_codes: Vec<i64>,

    /// Sliding window length.
    #[serde(default = "default_window_days")]
    pub window_days: u32,

    /// Failures within the window that trigger suppression.
    #[serde(default = "default_threshold")]
    pub threshold: u32,

    /// Suppression TTLs for the first, second, ... offense. The last step repeats.
    #[serde(default = "default_ttl_steps_days")]
    pub ttl_steps_days: Vec<u32>,
}

impl Default for SuppressionConfig {
    fn default() -> Self {
        Self {
            auto_enabled: default_auto_enabled(),
            failure_codes: default_failure_codes(),
            window_days: default_window_days(),
            threshold: default_threshold(),
            ttl_steps_days: default_ttl_steps_days(),
        }
    }
}

fn default_auto_enabled() -> bool {
    true
}

fn default_failure_codes() -> Vec<i64> {
    vec![131_026]
}

fn default_window_days() -> u32 {
    30
}

fn default_threshold() -> u32 {
    3
}

fn default_ttl_steps_days() -> Vec<u32> {
    vec![7, 30, 90]
}

/// Webhook ingestion configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct WebhookConfig {
    /// Inbound message texts (case-insensitive) that opt the sender out.
    #[serde(default = "default_opt_out_keywords")]
    pub opt_out_keywords: Vec<String>,

    /// Lifetime of in-memory dedup entries while the event table is missing.
    #[serde(default = "default_dedup_ttl_secs")]
    pub dedup_ttl_secs: u64,

    /// Interval of the background reconciliation pass.
    #[serde(default = "default_reconcile_interval_secs")]
    pub reconcile_interval_secs: u64,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            opt_out_keywords: default_opt_out_keywords(),
            dedup_ttl_secs: default_dedup_ttl_secs(),
            reconcile_interval_secs: default_reconcile_interval_secs(),
        }
    }
}

fn default_opt_out_keywords() -> Vec<String> {
    ["STOP", "PARAR", "SAIR", "CANCELAR", "UNSUBSCRIBE"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_dedup_ttl_secs() -> u64 {
    600
}

fn default_reconcile_interval_secs() -> u64 {
    60
}

/// Recipient precheck configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PrecheckConfig {
    /// Country code prepended to numbers written without one (e.g. `"55"`).
    #[serde(default)]
    pub default_country_code: Option<String>,
}

/// HTTP gateway configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    #[serde(default = "default_gateway_host")]
    pub host: String,

    #[serde(default = "default_gateway_port")]
    pub port: u16,

    /// Bearer token for the operator API. `None` rejects every operator request.
    #[serde(default)]
    pub bearer_token: Option<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_gateway_host(),
            port: default_gateway_port(),
            bearer_token: None,
        }
    }
}

fn default_gateway_host() -> String {
    "127.0.0.1".to_string()
}

fn default_gateway_port() -> u16 {
    3000
}
