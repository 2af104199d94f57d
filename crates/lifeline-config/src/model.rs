// SPDX-FileCopyrightText: 2026 Lifeline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Lifeline emergency relay.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use serde::{Deserialize, Serialize};

/// Top-level Lifeline configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable overrides.
/// All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LifelineConfig {
    /// Process-wide settings.
    #[serde(default)]
    pub app: AppConfig,

    /// Local durable store shared by the main and background contexts.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Delivery retry and bookkeeping settings.
    #[serde(default)]
    pub relay: RelayConfig,

    /// Gesture recognition settings.
    #[serde(default)]
    pub trigger: TriggerConfig,

    /// Background execution context settings.
    #[serde(default)]
    pub worker: WorkerConfig,

    /// Ingestion endpoint stub settings.
    #[serde(default)]
    pub gateway: GatewayConfig,
}

/// Process-wide configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Local store configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file. Both execution contexts must point
    /// at the same file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// How long a writer waits on another process's lock before failing.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

fn default_database_path() -> String {
    dirs::data_dir()
        .map(|p| p.join("lifeline").join("lifeline.db"))
        .unwrap_or_else(|| std::path::PathBuf::from("lifeline.db"))
        .to_string_lossy()
        .to_string()
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

/// Delivery retry configuration.
///
/// Backoff for attempt `n` (1-based) is `base_delay_ms * 2^(n-1)` scaled by a
/// random factor in `[1, 1 + jitter_ratio)` and capped at `max_delay_ms`.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RelayConfig {
    /// Total attempts per trigger, including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay after the first failed attempt.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Upper bound on any single backoff delay.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Jitter as a fraction of the un-jittered delay. Must be within 0..=1
    /// so successive delays never shrink.
    #[serde(default = "default_jitter_ratio")]
    pub jitter_ratio: f64,

    /// Timeout for a single HTTP request to the ingestion endpoint.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Extra time on top of the request timeout before an in-flight claim
    /// is considered abandoned.
    #[serde(default = "default_lease_margin_secs")]
    pub lease_margin_secs: u64,

    /// Number of acknowledged/failed rows kept in the attempt log.
    #[serde(default = "default_retain_completed")]
    pub retain_completed: u32,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            jitter_ratio: default_jitter_ratio(),
            request_timeout_secs: default_request_timeout_secs(),
            lease_margin_secs: default_lease_margin_secs(),
            retain_completed: default_retain_completed(),
        }
    }
}

fn default_max_attempts() -> u32 {
    5
}

fn default_base_delay_ms() -> u64 {
    1_000
}

fn default_max_delay_ms() -> u64 {
    60_000
}

fn default_jitter_ratio() -> f64 {
    0.2
}

fn default_request_timeout_secs() -> u64 {
    20
}

fn default_lease_margin_secs() -> u64 {
    10
}

fn default_retain_completed() -> u32 {
    200
}

/// Gesture recognizer configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TriggerConfig {
    /// Sub-events (presses, shakes) that make up one gesture.
    #[serde(default = "default_sub_events_required")]
    pub sub_events_required: u32,

    /// Sub-events closer together than this are treated as one contact.
    #[serde(default = "default_min_quiet_interval_ms")]
    pub min_quiet_interval_ms: u64,

    /// The whole gesture must complete within this window.
    #[serde(default = "default_gesture_window_ms")]
    pub gesture_window_ms: u64,

    /// Sub-events are ignored for this long after a recognized gesture.
    #[serde(default = "default_cooldown_ms")]
    pub cooldown_ms: u64,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            sub_events_required: default_sub_events_required(),
            min_quiet_interval_ms: default_min_quiet_interval_ms(),
            gesture_window_ms: default_gesture_window_ms(),
            cooldown_ms: default_cooldown_ms(),
        }
    }
}

fn default_sub_events_required() -> u32 {
    3
}

fn default_min_quiet_interval_ms() -> u64 {
    300
}

fn default_gesture_window_ms() -> u64 {
    3_000
}

fn default_cooldown_ms() -> u64 {
    5_000
}

/// Background worker configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct WorkerConfig {
    /// How often the worker scans the attempt log.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// A pending row overdue by this much is taken over even while the
    /// stored lifecycle state still says foreground.
    #[serde(default = "default_orphan_grace_ms")]
    pub orphan_grace_ms: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            orphan_grace_ms: default_orphan_grace_ms(),
        }
    }
}

fn default_poll_interval_ms() -> u64 {
    2_000
}

fn default_orphan_grace_ms() -> u64 {
    30_000
}

/// Ingestion endpoint stub configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    /// Host address to bind.
    #[serde(default = "default_gateway_host")]
    pub host: String,

    /// Port to bind.
    #[serde(default = "default_gateway_port")]
    pub port: u16,

    /// Server-side event database. Kept apart from the device store.
    #[serde(default = "default_gateway_database_path")]
    pub database_path: String,

    /// Bearer tokens accepted by the endpoint and the principal each maps to.
    #[serde(default)]
    pub principals: Vec<PrincipalConfig>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_gateway_host(),
            port: default_gateway_port(),
            database_path: default_gateway_database_path(),
            principals: Vec::new(),
        }
    }
}

fn default_gateway_host() -> String {
    "127.0.0.1".to_string()
}

fn default_gateway_port() -> u16 {
    8080
}

fn default_gateway_database_path() -> String {
    dirs::data_dir()
        .map(|p| p.join("lifeline").join("gateway.db"))
        .unwrap_or_else(|| std::path::PathBuf::from("gateway.db"))
        .to_string_lossy()
        .to_string()
}

/// A named principal and its bearer token.
#[derive(Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PrincipalConfig {
    /// Display name used in notifications ("dependent name").
    pub name: String,
    /// Bearer token presented by this principal's devices.
    pub token: String,
}

impl std::fmt::Debug for PrincipalConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrincipalConfig")
            .field("name", &self.name)
            .field("token", &"[redacted]")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relay_defaults_match_documented_policy() {
        let relay = RelayConfig::default();
        assert_eq!(relay.max_attempts, 5);
        assert_eq!(relay.base_delay_ms, 1_000);
        assert_eq!(relay.request_timeout_secs, 20);
        assert!((0.0..=1.0).contains(&relay.jitter_ratio));
    }

    #[test]
    fn principal_debug_redacts_token() {
        let principal = PrincipalConfig {
            name: "asha".to_string(),
            token: "tok-secret".to_string(),
        };
        let debug = format!("{principal:?}");
        assert!(debug.contains("asha"));
        assert!(!debug.contains("tok-secret"));
    }

    #[test]
    fn default_database_paths_differ() {
        let config = LifelineConfig::default();
        assert_ne!(config.storage.database_path, config.gateway.database_path);
    }
}
