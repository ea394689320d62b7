// SPDX-FileCopyrightText: 2026 Wacast Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests for the Wacast configuration system.

use std::io::Write;

use wacast_config::diagnostic::ConfigError;
use wacast_config::model::WacastConfig;
use wacast_config::{
    load_and_validate_path, load_and_validate_str, load_config, load_config_from_str,
};

/// Valid TOML with all known sections deserializes successfully.
#[test]
fn valid_toml_deserializes_into_wacast_config() {
    let toml = r#"
[service]
name = "bulk-sender"
log_level = "debug"

[storage]
database_path = "/tmp/wacast-test.db"
wal_mode = false

[whatsapp]
phone_number_id = "1098765"
access_token = "EAAG-test"
app_secret = "shh"
verify_token = "handshake"

[dispatch]
batch_size = 50
concurrency = 4
send_timeout_secs = 30

[throttle]
start_rate = 20.0
min_rate = 2.0
max_rate = 60.0

[suppression]
failure_codes = [131026, 131049]
threshold = 2
ttl_steps_days = [1, 7]

[webhook]
opt_out_keywords = ["STOP"]

[precheck]
default_country_code = "55"

[gateway]
host = "0.0.0.0"
port = 8080
bearer_token = "operator-secret"
"#;

    let config = load_config_from_str(toml).expect("valid TOML should deserialize");
    assert_eq!(config.service.name, "bulk-sender");
    assert_eq!(config.service.log_level, "debug");
    assert_eq!(config.storage.database_path, "/tmp/wacast-test.db");
    assert!(!config.storage.wal_mode);
    assert_eq!(config.whatsapp.phone_number_id.as_deref(), Some("1098765"));
    assert_eq!(config.whatsapp.app_secret.as_deref(), Some("shh"));
    assert_eq!(config.dispatch.batch_size, 50);
    assert_eq!(config.dispatch.concurrency, 4);
    assert_eq!(config.dispatch.send_timeout_secs, 30);
    assert_eq!(config.throttle.start_rate, 20.0);
    assert_eq!(config.suppression.failure_codes, vec![131_026, 131_049]);
    assert_eq!(config.suppression.ttl_steps_days, vec![1, 7]);
    assert_eq!(config.webhook.opt_out_keywords, vec!["STOP"]);
    assert_eq!(config.precheck.default_country_code.as_deref(), Some("55"));
    assert_eq!(config.gateway.port, 8080);
    assert_eq!(config.gateway.bearer_token.as_deref(), Some("operator-secret"));
}

/// Empty config produces defaults for every section.
#[test]
fn empty_config_uses_defaults() {
    let config = load_config_from_str("").expect("empty config is valid");
    assert_eq!(config.service.name, "wacast");
    assert_eq!(config.whatsapp.api_base_url, "https://graph.facebook.com");
    assert_eq!(config.whatsapp.api_version, "v21.0");
    assert!(config.whatsapp.app_secret.is_none());
    assert_eq!(config.dispatch.batch_size, 10);
    assert_eq!(config.dispatch.concurrency, 1);
    assert_eq!(config.dispatch.send_timeout_secs, 60);
    assert_eq!(config.throttle.start_rate, 30.0);
    assert_eq!(config.throttle.min_rate, 5.0);
    assert_eq!(config.throttle.max_rate, 80.0);
    assert_eq!(config.throttle.decrease_factor, 0.5);
    assert_eq!(config.suppression.failure_codes, vec![131_026]);
    assert_eq!(config.suppression.ttl_steps_days, vec![7, 30, 90]);
    assert!(config.webhook.opt_out_keywords.contains(&"STOP".to_string()));
    assert_eq!(config.gateway.host, "127.0.0.1");
    assert!(config.gateway.bearer_token.is_none());
}

/// Unknown field in a section is rejected with a typo suggestion.
#[test]
fn unknown_field_gets_suggestion() {
    let toml = r#"
[dispatch]
bacth_size = 20
"#;

    let errors = load_and_validate_str(toml).expect_err("should reject unknown field");
    let unknown = errors
        .iter()
        .find_map(|e| match e {
            ConfigError::UnknownKey {
                section,
                key,
                suggestion,
                ..
            } => Some((section.clone(), key.clone(), suggestion.clone())),
            _ => None,
        })
        .expect("should produce UnknownKey");
    assert_eq!(unknown.0, "dispatch");
    assert_eq!(unknown.1, "bacth_size");
    assert_eq!(unknown.2.as_deref(), Some("batch_size"));
}

/// Unknown top-level section is rejected.
#[test]
fn unknown_section_is_rejected() {
    let toml = r#"
[telegram]
bot_token = "abc"
"#;
    assert!(load_config_from_str(toml).is_err());
}

/// A misspelled section name suggests the real one.
#[test]
fn misspelled_section_gets_suggestion() {
    let toml = r#"
[throtle]
min_rate = 5.0
"#;
    let errors = load_and_validate_str(toml).expect_err("should reject unknown section");
    let suggestion = errors
        .iter()
        .find_map(|e| match e {
            ConfigError::UnknownSection {
                section,
                suggestion,
                ..
            } if section == "throtle" => Some(suggestion.clone()),
            _ => None,
        })
        .expect("should produce UnknownSection");
    assert_eq!(suggestion.as_deref(), Some("throttle"));
}

/// Wrong value type produces an InvalidType diagnostic.
#[test]
fn wrong_type_is_reported() {
    let toml = r#"
[dispatch]
concurrency = "many"
"#;
    let errors = load_and_validate_str(toml).expect_err("should reject wrong type");
    assert!(
        errors
            .iter()
            .any(|e| matches!(e, ConfigError::InvalidType { .. })),
        "expected InvalidType, got {errors:?}"
    );
}

/// Semantic validation runs after a successful parse.
#[test]
fn validation_rejects_inverted_rates() {
    let toml = r#"
[throttle]
min_rate = 50.0
max_rate = 10.0
start_rate = 30.0
"#;
    let errors = load_and_validate_str(toml).expect_err("rates are inconsistent");
    assert!(
        errors
            .iter()
            .any(|e| matches!(e, ConfigError::Validation { key, help: Some(_), .. } if key == "throttle.start_rate"))
    );
}

/// Environment variables override file values, with section mapping.
#[test]
fn env_overrides_file_values() {
    figment::Jail::expect_with(|jail| {
        jail.create_file(
            "wacast.toml",
            r#"
[dispatch]
batch_size = 20

[whatsapp]
phone_number_id = "from-file"
"#,
        )?;
        jail.set_env("WACAST_DISPATCH_BATCH_SIZE", "40");
        jail.set_env("WACAST_WHATSAPP_ACCESS_TOKEN", "from-env");

        let config: WacastConfig = load_config().map_err(|e| e.to_string())?;
        assert_eq!(config.dispatch.batch_size, 40);
        assert_eq!(config.whatsapp.phone_number_id.as_deref(), Some("from-file"));
        assert_eq!(config.whatsapp.access_token.as_deref(), Some("from-env"));
        Ok(())
    });
}

/// An explicit config path is loaded and validated.
#[test]
fn explicit_path_is_loaded() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "[gateway]\nport = 4100").unwrap();
    let config = load_and_validate_path(file.path()).expect("valid file");
    assert_eq!(config.gateway.port, 4100);
}
