// SPDX-FileCopyrightText: 2026 Lifeline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `lifeline status` command implementation.
//!
//! Reports what the shared store knows (sign-in, lifecycle, open and recent
//! deliveries, undismissed notices) and probes the gateway health endpoint.
//! The access token itself is never printed.

use std::time::Duration;

use lifeline_config::LifelineConfig;
use lifeline_core::{DeliveryAttempt, LifecycleState, LifelineError};
use lifeline_relay::CredentialCache;
use lifeline_storage::queries::{attempts, notices};
use lifeline_storage::Database;
use serde::{Deserialize, Serialize};

/// Deliveries listed under "recent".
const RECENT_ATTEMPTS: usize = 5;

/// Health endpoint response from the gateway.
#[derive(Debug, Deserialize)]
struct HealthResponse {
    status: String,
    uptime_secs: u64,
}

/// Gateway reachability for `--json` mode.
#[derive(Debug, Serialize)]
pub struct GatewayStatus {
    pub running: bool,
    pub status: String,
    pub uptime_secs: Option<u64>,
    pub uptime_human: Option<String>,
    pub host: String,
    pub port: u16,
}

/// Structured status output for `--json` mode.
#[derive(Debug, Serialize)]
pub struct StatusReport {
    pub signed_in: bool,
    pub backend_base_url: Option<String>,
    pub lifecycle: LifecycleState,
    pub open_deliveries: i64,
    pub active_notices: usize,
    pub recent: Vec<DeliveryAttempt>,
    pub gateway: Option<GatewayStatus>,
}

/// Format seconds into a human-readable duration string.
fn format_uptime(secs: u64) -> String {
    let days = secs / 86400;
    let hours = (secs % 86400) / 3600;
    let minutes = (secs % 3600) / 60;

    if days > 0 {
        format!("{days}d {hours}h {minutes}m")
    } else if hours > 0 {
        format!("{hours}h {minutes}m")
    } else {
        format!("{minutes}m")
    }
}

/// Run the `lifeline status` command.
pub async fn run_status(config: &LifelineConfig, json: bool) -> Result<(), LifelineError> {
    let db = crate::open_store(config).await?;
    let mut report = collect(&db).await?;
    report.gateway = Some(probe_gateway(&config.gateway.host, config.gateway.port).await?);

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).unwrap_or_else(|_| "{}".to_string())
        );
    } else {
        print_report(&report);
    }
    Ok(())
}

/// Local state from the shared store.
pub(crate) async fn collect(db: &Database) -> Result<StatusReport, LifelineError> {
    let snapshot = CredentialCache::new(db.clone()).get().await?;
    Ok(StatusReport {
        signed_in: snapshot.usable().is_some(),
        lifecycle: snapshot.lifecycle_or_default(),
        backend_base_url: snapshot.backend_base_url,
        open_deliveries: attempts::count_open(db).await?,
        active_notices: notices::list_active(db).await?.len(),
        recent: attempts::list_recent(db, RECENT_ATTEMPTS).await?,
        gateway: None,
    })
}

async fn probe_gateway(host: &str, port: u16) -> Result<GatewayStatus, LifelineError> {
    let url = format!("http://{host}:{port}/health");
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(3))
        .build()
        .map_err(|e| LifelineError::Internal(format!("failed to create HTTP client: {e}")))?;

    let health = match client.get(&url).send().await {
        Ok(resp) if resp.status().is_success() => resp.json::<HealthResponse>().await.ok(),
        _ => None,
    };

    Ok(match health {
        Some(health) => GatewayStatus {
            running: true,
            status: health.status,
            uptime_secs: Some(health.uptime_secs),
            uptime_human: Some(format_uptime(health.uptime_secs)),
            host: host.to_string(),
            port,
        },
        None => GatewayStatus {
            running: false,
            status: "not running".to_string(),
            uptime_secs: None,
            uptime_human: None,
            host: host.to_string(),
            port,
        },
    })
}

fn print_report(report: &StatusReport) {
    println!();
    println!("  lifeline status");
    println!("  {}", "-".repeat(35));

    match (report.signed_in, &report.backend_base_url) {
        (true, Some(url)) => println!("    Signed in:  yes ({url})"),
        _ => println!("    Signed in:  no"),
    }
    println!("    Lifecycle:  {}", report.lifecycle);
    println!("    Open:       {} delivery(ies)", report.open_deliveries);
    println!("    Notices:    {}", report.active_notices);

    if let Some(gateway) = &report.gateway {
        match &gateway.uptime_human {
            Some(uptime) if gateway.running => {
                println!("    Gateway:    [OK] {} (uptime: {uptime})", gateway.status)
            }
            _ => println!(
                "    Gateway:    [FAIL] not running at http://{}:{}/health",
                gateway.host, gateway.port
            ),
        }
    }

    if !report.recent.is_empty() {
        println!();
        println!("  Recent deliveries");
        for attempt in &report.recent {
            let failure = attempt
                .failure
                .map(|f| format!(" ({f})"))
                .unwrap_or_default();
            println!(
                "    {}  {:<12} attempt {}{failure}",
                attempt.trigger_id, attempt.outcome, attempt.attempt_number
            );
        }
    }
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use lifeline_core::{TriggerEvent, TriggerKind};
    use lifeline_test_utils::TestStore;
    use secrecy::SecretString;

    #[test]
    fn format_uptime_minutes() {
        assert_eq!(format_uptime(120), "2m");
    }

    #[test]
    fn format_uptime_hours() {
        assert_eq!(format_uptime(3720), "1h 2m");
    }

    #[test]
    fn format_uptime_days() {
        assert_eq!(format_uptime(90060), "1d 1h 1m");
    }

    #[tokio::test]
    async fn fresh_store_reports_signed_out_foreground() {
        let store = TestStore::new().await.unwrap();
        let report = collect(&store.db).await.unwrap();
        assert!(!report.signed_in);
        assert_eq!(report.lifecycle, LifecycleState::Foreground);
        assert_eq!(report.open_deliveries, 0);
        assert!(report.recent.is_empty());
    }

    #[tokio::test]
    async fn report_counts_open_rows_and_hides_token() {
        let store = TestStore::new().await.unwrap();
        let cache = CredentialCache::new(store.db.clone());
        cache
            .set(&SecretString::from("secret-token".to_string()), "https://api.example")
            .await
            .unwrap();
        cache.set_lifecycle(LifecycleState::Background).await.unwrap();
        let event = TriggerEvent::new(TriggerKind::Voice, LifecycleState::Background, None);
        attempts::record(&store.db, &event, Utc::now()).await.unwrap();

        let report = collect(&store.db).await.unwrap();
        assert!(report.signed_in);
        assert_eq!(report.lifecycle, LifecycleState::Background);
        assert_eq!(report.open_deliveries, 1);
        assert_eq!(report.recent.len(), 1);

        let json = serde_json::to_string(&report).unwrap();
        assert!(json.contains("\"signed_in\":true"));
        assert!(!json.contains("secret-token"));
    }

    #[tokio::test]
    async fn unreachable_gateway_reports_not_running() {
        // Port 9 (discard) is not expected to serve HTTP.
        let status = probe_gateway("127.0.0.1", 9).await.unwrap();
        assert!(!status.running);
        assert_eq!(status.status, "not running");
    }
}
