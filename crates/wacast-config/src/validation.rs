// SPDX-FileCopyrightText: 2026 Wacast Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that cannot be expressed via serde attributes,
//! such as rate ordering, non-empty paths, and valid bind hosts.

use crate::diagnostic::ConfigError;
use crate::model::WacastConfig;

/// Validate a deserialized configuration for semantic correctness.
///
/// Returns `Ok(())` if all validations pass, or `Err(Vec<ConfigError>)` with
/// all collected validation errors (does not fail fast).
pub fn validate_config(config: &WacastConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    let host = config.gateway.host.trim();
    if host.is_empty() {
        errors.push(ConfigError::validation("gateway.host", "must not be empty"));
    } else {
        let is_valid_ip = host.parse::<std::net::IpAddr>().is_ok();
        let is_valid_hostname = host
            .chars()
            .all(|c| c.is_alphanumeric() || c == '.' || c == '-' || c == ':');
        if !is_valid_ip && !is_valid_hostname {
            errors.push(ConfigError::validation(
                "gateway.host",
                format!("`{host}` is not a valid IP address or hostname"),
            ));
        }
    }

    if config.storage.database_path.trim().is_empty() {
        errors.push(ConfigError::validation(
            "storage.database_path",
            "must not be empty",
        ));
    }

    let t = &config.throttle;
    if t.min_rate <= 0.0 {
        errors.push(
            ConfigError::validation("throttle.min_rate", format!("must be positive, got {}", t.min_rate))
                .with_help("min_rate is the floor a throttled sender is cut back to; a zero floor stops sending"),
        );
    }
    if t.start_rate < t.min_rate || t.start_rate > t.max_rate {
        errors.push(
            ConfigError::validation(
                "throttle.start_rate",
                format!(
                    "must lie within [min_rate, max_rate] = [{}, {}], got {}",
                    t.min_rate, t.max_rate, t.start_rate
                ),
            )
            .with_help(format!(
                "rates must be ordered min_rate <= start_rate <= max_rate; new senders begin at start_rate, e.g. start_rate = {}",
                t.min_rate.max(t.max_rate.min(t.start_rate))
            )),
        );
    }
    if !(t.decrease_factor > 0.0 && t.decrease_factor < 1.0) {
        errors.push(
            ConfigError::validation(
                "throttle.decrease_factor",
                format!("must be between 0 and 1 (exclusive), got {}", t.decrease_factor),
            )
            .with_help("the rate is multiplied by this factor on a throughput error; 0.5 halves it, 1 or more would never slow down"),
        );
    }
    if t.increase_step <= 0.0 {
        errors.push(ConfigError::validation(
            "throttle.increase_step",
            format!("must be positive, got {}", t.increase_step),
        ));
    }

    let d = &config.dispatch;
    if d.send_timeout_secs == 0 {
        errors.push(ConfigError::validation(
            "dispatch.send_timeout_secs",
            "must be at least 1",
        ));
    }
    if d.job_lock_secs < d.send_timeout_secs {
        errors.push(
            ConfigError::validation(
                "dispatch.job_lock_secs",
                format!(
                    "{} is shorter than dispatch.send_timeout_secs ({})",
                    d.job_lock_secs, d.send_timeout_secs
                ),
            )
            .with_help("a lock that expires before a send times out lets a second runner pick up the same batch"),
        );
    }

    let s = &config.suppression;
    if s.threshold < 1 {
        errors.push(ConfigError::validation("suppression.threshold", "must be at least 1"));
    }
    if s.window_days < 1 {
        errors.push(ConfigError::validation("suppression.window_days", "must be at least 1"));
    }
    if s.ttl_steps_days.is_empty() {
        errors.push(
            ConfigError::validation("suppression.ttl_steps_days", "must list at least one step")
                .with_help("e.g. ttl_steps_days = [7, 30, 90]"),
        );
    }

    if let Some(cc) = &config.precheck.default_country_code
        && (cc.is_empty() || cc.len() > 3 || !cc.chars().all(|c| c.is_ascii_digit()))
    {
        errors.push(
            ConfigError::validation(
                "precheck.default_country_code",
                format!("must be 1-3 digits, got `{cc}`"),
            )
            .with_help("use the calling code without `+`, e.g. \"55\""),
        );
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
