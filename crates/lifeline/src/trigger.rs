// SPDX-FileCopyrightText: 2026 Lifeline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `lifeline trigger`: raise an emergency from the main application context.
//!
//! The event is stamped with the stored lifecycle state and handed to a
//! main-context relay. The command returns once the trigger is acknowledged,
//! has failed, or has been left to the worker.

use std::sync::Arc;
use std::time::Duration;

use lifeline_config::LifelineConfig;
use lifeline_core::{
    DeliveryAttempt, DeliveryOutcome, ExecutionContext, GeoPoint, IngestionClient, LifelineError,
    TriggerKind,
};
use lifeline_core::types::MAX_EVENT_TYPE_LEN;
use lifeline_relay::{
    CredentialCache, EmergencyRelay, HttpIngestionClient, RelayOptions, TriggerSource,
};
use lifeline_storage::Database;

#[derive(Debug, Clone)]
pub struct TriggerArgs {
    pub kind: TriggerKind,
    /// (latitude, longitude)
    pub location: Option<(f64, f64)>,
    pub event_type: Option<String>,
}

pub async fn run_trigger(config: &LifelineConfig, args: TriggerArgs) -> Result<(), LifelineError> {
    let db = crate::open_store(config).await?;
    let client = HttpIngestionClient::new(Duration::from_secs(config.relay.request_timeout_secs))?;
    let attempt = raise(&db, Arc::new(client), config, args).await?;
    db.close().await?;
    print_attempt(&attempt);
    Ok(())
}

pub(crate) async fn raise(
    db: &Database,
    client: Arc<dyn IngestionClient>,
    config: &LifelineConfig,
    args: TriggerArgs,
) -> Result<DeliveryAttempt, LifelineError> {
    let location = args.location.map(|(lat, lng)| GeoPoint::new(lat, lng));
    if let Some(point) = &location {
        if !point.is_valid() {
            return Err(LifelineError::Config(format!(
                "location out of range: ({}, {})",
                point.latitude, point.longitude
            )));
        }
    }

    if let Some(detail) = &args.event_type {
        if detail.trim().is_empty() || detail.len() > MAX_EVENT_TYPE_LEN {
            return Err(LifelineError::Config(format!(
                "event type must be 1 to {MAX_EVENT_TYPE_LEN} bytes"
            )));
        }
    }

    let source = TriggerSource::new(CredentialCache::new(db.clone()));
    let mut event = source.on_gesture(args.kind, location).await;
    if let Some(detail) = args.event_type {
        event = event.with_event_type(detail);
    }

    let relay = EmergencyRelay::new(
        db.clone(),
        client,
        ExecutionContext::Main,
        RelayOptions::from_config(&config.relay),
    );
    Ok(relay.send(event).await)
}

fn print_attempt(attempt: &DeliveryAttempt) {
    println!("trigger {}", attempt.trigger_id);
    match attempt.outcome {
        DeliveryOutcome::Acknowledged => println!(
            "  acknowledged after {} attempt(s), server event {}",
            attempt.attempt_number,
            attempt
                .server_event_id
                .map(|id| id.to_string())
                .unwrap_or_default()
        ),
        DeliveryOutcome::Failed => println!(
            "  failed after {} attempt(s): {}",
            attempt.attempt_number,
            attempt
                .failure
                .map(|f| f.to_string())
                .unwrap_or_else(|| "unknown".to_string())
        ),
        DeliveryOutcome::Pending | DeliveryOutcome::Sent => {
            println!("  {}; the background worker will finish it", attempt.outcome)
        }
    }
}
