// SPDX-FileCopyrightText: 2026 Lifeline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that serde attributes cannot express:
//! non-empty paths, a backoff policy that stays monotonic, a debounce
//! interval shorter than the gesture window, unique gateway tokens.

use std::collections::HashSet;

use crate::diagnostic::ConfigError;
use crate::model::LifelineConfig;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Validate a deserialized configuration for semantic correctness.
///
/// Returns `Ok(())` if all validations pass, or `Err(Vec<ConfigError>)` with
/// all collected validation errors (does not fail fast).
pub fn validate_config(config: &LifelineConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();
    let mut fail = |message: String| errors.push(ConfigError::Validation { message });

    if !LOG_LEVELS.contains(&config.app.log_level.to_ascii_lowercase().as_str()) {
        fail(format!(
            "app.log_level `{}` is not one of {}",
            config.app.log_level,
            LOG_LEVELS.join(", ")
        ));
    }

    if config.storage.database_path.trim().is_empty() {
        fail("storage.database_path must not be empty".to_string());
    }

    // Relay backoff policy.
    let relay = &config.relay;
    if relay.max_attempts == 0 {
        fail("relay.max_attempts must be at least 1".to_string());
    }
    if relay.base_delay_ms == 0 {
        fail("relay.base_delay_ms must be greater than 0".to_string());
    }
    if relay.max_delay_ms < relay.base_delay_ms {
        fail(format!(
            "relay.max_delay_ms ({}) must be >= relay.base_delay_ms ({})",
            relay.max_delay_ms, relay.base_delay_ms
        ));
    }
    if !(0.0..=1.0).contains(&relay.jitter_ratio) {
        fail(format!(
            "relay.jitter_ratio must be within 0.0..=1.0, got {}",
            relay.jitter_ratio
        ));
    }
    if relay.request_timeout_secs == 0 {
        fail("relay.request_timeout_secs must be greater than 0".to_string());
    }

    // Gesture recognizer.
    let trigger = &config.trigger;
    if trigger.sub_events_required == 0 {
        fail("trigger.sub_events_required must be at least 1".to_string());
    }
    if trigger.min_quiet_interval_ms >= trigger.gesture_window_ms {
        fail(format!(
            "trigger.min_quiet_interval_ms ({}) must be shorter than trigger.gesture_window_ms ({})",
            trigger.min_quiet_interval_ms, trigger.gesture_window_ms
        ));
    }

    if config.worker.poll_interval_ms == 0 {
        fail("worker.poll_interval_ms must be greater than 0".to_string());
    }

    // Gateway.
    let gateway = &config.gateway;
    if gateway.host.trim().is_empty() {
        fail("gateway.host must not be empty".to_string());
    } else {
        let host = gateway.host.trim();
        let is_valid_ip = host.parse::<std::net::IpAddr>().is_ok();
        let is_valid_hostname = host
            .chars()
            .all(|c| c.is_alphanumeric() || c == '.' || c == '-');
        if !is_valid_ip && !is_valid_hostname {
            fail(format!(
                "gateway.host `{host}` is not a valid IP address or hostname"
            ));
        }
    }
    if gateway.database_path.trim().is_empty() {
        fail("gateway.database_path must not be empty".to_string());
    }

    let mut seen_tokens = HashSet::new();
    for principal in &gateway.principals {
        if principal.name.trim().is_empty() {
            fail("gateway.principals entries must have a non-empty name".to_string());
        }
        if principal.token.trim().is_empty() {
            fail(format!(
                "gateway principal `{}` must have a non-empty token",
                principal.name
            ));
        } else if !seen_tokens.insert(principal.token.as_str()) {
            fail(format!(
                "gateway principal `{}` reuses a token already assigned to another principal",
                principal.name
            ));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PrincipalConfig;

    fn messages(config: &LifelineConfig) -> Vec<String> {
        match validate_config(config) {
            Ok(()) => Vec::new(),
            Err(errors) => errors.iter().map(|e| e.to_string()).collect(),
        }
    }

    #[test]
    fn defaults_are_valid() {
        assert!(validate_config(&LifelineConfig::default()).is_ok());
    }

    #[test]
    fn jitter_above_one_is_rejected() {
        let mut config = LifelineConfig::default();
        config.relay.jitter_ratio = 1.5;
        let msgs = messages(&config);
        assert_eq!(msgs.len(), 1);
        assert!(msgs[0].contains("jitter_ratio"));
    }

    #[test]
    fn collects_all_errors() {
        let mut config = LifelineConfig::default();
        config.relay.max_attempts = 0;
        config.relay.max_delay_ms = 10;
        config.trigger.min_quiet_interval_ms = 5_000;
        config.app.log_level = "loud".to_string();
        let msgs = messages(&config);
        assert_eq!(msgs.len(), 4, "got: {msgs:?}");
    }

    #[test]
    fn duplicate_gateway_tokens_are_rejected() {
        let mut config = LifelineConfig::default();
        config.gateway.principals = vec![
            PrincipalConfig {
                name: "asha".to_string(),
                token: "same".to_string(),
            },
            PrincipalConfig {
                name: "bikram".to_string(),
                token: "same".to_string(),
            },
        ];
        let msgs = messages(&config);
        assert_eq!(msgs.len(), 1);
        assert!(msgs[0].contains("bikram"));
    }

    #[test]
    fn bad_gateway_host_is_rejected() {
        let mut config = LifelineConfig::default();
        config.gateway.host = "not a host!".to_string();
        assert!(messages(&config)[0].contains("gateway.host"));
    }

    #[test]
    fn parsed_principal_without_token_is_rejected() {
        let toml_str = r#"
            [[gateway.principals]]
            name = "asha"
            token = ""
        "#;
        let config: LifelineConfig = toml::from_str(toml_str).unwrap();
        let msgs = messages(&config);
        assert_eq!(msgs.len(), 1, "got: {msgs:?}");
        assert!(msgs[0].contains("asha"));
    }
}
