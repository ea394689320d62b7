// SPDX-FileCopyrightText: 2026 Wacast Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./wacast.toml` > `~/.config/wacast/wacast.toml` > `/etc/wacast/wacast.toml`
//! with environment variable overrides via `WACAST_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use crate::model::WacastConfig;

/// Top-level sections, used to map `WACAST_<SECTION>_<KEY>` to `section.key`.
const SECTIONS: &[&str] = &[
    "service",
    "storage",
    "whatsapp",
    "dispatch",
    "throttle",
    "suppression",
    "webhook",
    "precheck",
    "gateway",
];

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/wacast/wacast.toml` (system-wide)
/// 3. `~/.config/wacast/wacast.toml` (user XDG config)
/// 4. `./wacast.toml` (local directory)
/// 5. `WACAST_*` environment variables
pub fn load_config() -> Result<WacastConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string only (no XDG lookup, no env).
///
/// Used for testing and explicit configuration.
pub fn load_config_from_str(toml_content: &str) -> Result<WacastConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(WacastConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<WacastConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(WacastConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Build the Figment used internally for config loading.
pub fn build_figment() -> Figment {
    Figment::new()
        .merge(Serialized::defaults(WacastConfig::default()))
        .merge(Toml::file("/etc/wacast/wacast.toml"))
        .merge(Toml::file(
            dirs::config_dir()
                .map(|d| d.join("wacast/wacast.toml"))
                .unwrap_or_default(),
        ))
        .merge(Toml::file("wacast.toml"))
        .merge(env_provider())
}

/// Create the environment variable provider using explicit `map()` for section-to-dot mapping.
///
/// Uses `Env::map()` and not `Env::split("_")`: key names contain underscores,
/// so `WACAST_WHATSAPP_ACCESS_TOKEN` must map to `whatsapp.access_token`, not
/// `whatsapp.access.token`.
fn env_provider() -> Env {
    Env::prefixed("WACAST_").map(|key| map_env_key(key.as_str()).into())
}

/// Map a lowercased, prefix-stripped env key to its dotted config path.
pub(crate) fn map_env_key(key: &str) -> String {
    for section in SECTIONS {
        if let Some(rest) = key
            .strip_prefix(section)
            .and_then(|rest| rest.strip_prefix('_'))
        {
            return format!("{section}.{rest}");
        }
    }
    key.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_keys_map_to_sections() {
        assert_eq!(
            map_env_key("whatsapp_access_token"),
            "whatsapp.access_token"
        );
        assert_eq!(map_env_key("dispatch_batch_size"), "dispatch.batch_size");
        assert_eq!(
            map_env_key("webhook_opt_out_keywords"),
            "webhook.opt_out_keywords"
        );
        assert_eq!(map_env_key("unrelated"), "unrelated");
    }
}
