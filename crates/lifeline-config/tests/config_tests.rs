// SPDX-FileCopyrightText: 2026 Lifeline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests for the Lifeline configuration system.

use lifeline_config::diagnostic::ConfigError;
use lifeline_config::model::LifelineConfig;
use lifeline_config::{load_and_validate_path, load_and_validate_str, load_config_from_str};

/// Valid TOML with all known sections deserializes successfully.
#[test]
fn valid_toml_deserializes_into_lifeline_config() {
    let toml = r#"
[app]
log_level = "debug"

[storage]
database_path = "/tmp/device.db"
busy_timeout_ms = 1000

[relay]
max_attempts = 4
base_delay_ms = 500
max_delay_ms = 8000
jitter_ratio = 0.0
request_timeout_secs = 15
lease_margin_secs = 5
retain_completed = 50

[trigger]
sub_events_required = 2
min_quiet_interval_ms = 200
gesture_window_ms = 2000
cooldown_ms = 4000

[worker]
poll_interval_ms = 500
orphan_grace_ms = 10000

[gateway]
host = "0.0.0.0"
port = 9000
database_path = "/tmp/gateway.db"

[[gateway.principals]]
name = "Asha"
token = "tok-asha"
"#;

    let config = load_config_from_str(toml).expect("valid TOML should deserialize");
    assert_eq!(config.app.log_level, "debug");
    assert_eq!(config.storage.database_path, "/tmp/device.db");
    assert_eq!(config.storage.busy_timeout_ms, 1000);
    assert_eq!(config.relay.max_attempts, 4);
    assert_eq!(config.relay.base_delay_ms, 500);
    assert_eq!(config.relay.jitter_ratio, 0.0);
    assert_eq!(config.relay.retain_completed, 50);
    assert_eq!(config.trigger.sub_events_required, 2);
    assert_eq!(config.worker.orphan_grace_ms, 10000);
    assert_eq!(config.gateway.port, 9000);
    assert_eq!(config.gateway.principals.len(), 1);
    assert_eq!(config.gateway.principals[0].name, "Asha");
}

/// Omitted sections fall back to defaults.
#[test]
fn empty_toml_yields_defaults() {
    let config = load_config_from_str("").expect("empty TOML is valid");
    let defaults = LifelineConfig::default();
    assert_eq!(config.relay.max_attempts, defaults.relay.max_attempts);
    assert_eq!(config.trigger.cooldown_ms, defaults.trigger.cooldown_ms);
    assert!(config.gateway.principals.is_empty());
}

/// Unknown field in [relay] produces an UnknownKey diagnostic with a suggestion.
#[test]
fn unknown_relay_field_suggests_correction() {
    let toml = r#"
[relay]
max_atempts = 3
"#;

    let errors = load_and_validate_str(toml).expect_err("should reject unknown field");
    assert_eq!(errors.len(), 1);
    match &errors[0] {
        ConfigError::UnknownKey {
            key, suggestion, ..
        } => {
            assert_eq!(key, "max_atempts");
            assert_eq!(suggestion.as_deref(), Some("max_attempts"));
        }
        other => panic!("expected UnknownKey, got {other:?}"),
    }
}

/// Unknown top-level section is rejected.
#[test]
fn unknown_section_is_rejected() {
    let toml = r#"
[telemetry]
enabled = true
"#;

    let err = load_config_from_str(toml).expect_err("should reject unknown section");
    let err_str = format!("{err}");
    assert!(
        err_str.contains("unknown field") || err_str.contains("telemetry"),
        "error should mention the bad key, got: {err_str}"
    );
}

/// Wrong value type produces an InvalidType diagnostic.
#[test]
fn wrong_type_is_reported() {
    let toml = r#"
[relay]
max_attempts = "five"
"#;

    let errors = load_and_validate_str(toml).expect_err("should reject wrong type");
    assert!(
        matches!(errors[0], ConfigError::InvalidType { .. }),
        "got: {:?}",
        errors[0]
    );
}

/// Semantic validation runs after successful deserialization.
#[test]
fn semantic_validation_runs_after_parse() {
    let toml = r#"
[relay]
jitter_ratio = 2.0
"#;

    let errors = load_and_validate_str(toml).expect_err("jitter above 1 is invalid");
    assert!(matches!(errors[0], ConfigError::Validation { .. }));
}

/// Explicit config files load and validate.
#[test]
fn explicit_path_loads() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("custom.toml");
    std::fs::write(&path, "[worker]\npoll_interval_ms = 750\n").unwrap();

    let config = load_and_validate_path(&path).expect("file should load");
    assert_eq!(config.worker.poll_interval_ms, 750);
}
