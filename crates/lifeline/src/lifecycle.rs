// SPDX-FileCopyrightText: 2026 Lifeline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `lifeline lifecycle <state>`: report an OS lifecycle transition.
//!
//! The new state is durable before the command returns. Reporting
//! `foreground` also resumes due deliveries from the main context and prints
//! the undismissed notices.

use std::sync::Arc;
use std::time::Duration;

use lifeline_config::LifelineConfig;
use lifeline_core::{ExecutionContext, IngestionClient, LifecycleState, LifelineError, Notice};
use lifeline_relay::{EmergencyRelay, HttpIngestionClient, LifecycleTracker, RelayOptions, TransitionOutcome};
use lifeline_storage::Database;

pub async fn run_lifecycle(config: &LifelineConfig, state: LifecycleState) -> Result<(), LifelineError> {
    let db = crate::open_store(config).await?;
    let client = HttpIngestionClient::new(Duration::from_secs(config.relay.request_timeout_secs))?;
    let (outcome, notices) = report(&db, Arc::new(client), config, state).await?;
    db.close().await?;

    match outcome {
        TransitionOutcome::Applied { from, to } => println!("lifecycle {from} -> {to}"),
        TransitionOutcome::Unchanged(state) => println!("lifecycle already {state}"),
    }
    for notice in &notices {
        println!("  notice #{}: {}", notice.id, notice.message);
    }
    Ok(())
}

/// Apply one transition and wait for its follow-up work.
pub(crate) async fn report(
    db: &Database,
    client: Arc<dyn IngestionClient>,
    config: &LifelineConfig,
    state: LifecycleState,
) -> Result<(TransitionOutcome, Vec<Notice>), LifelineError> {
    let relay = Arc::new(EmergencyRelay::new(
        db.clone(),
        client,
        ExecutionContext::Main,
        RelayOptions::from_config(&config.relay),
    ));
    let (handle, task) = LifecycleTracker::new(db.clone())
        .with_relay(relay)
        .start()
        .await?;

    let outcome = handle.transition(state).await?;
    handle.flush().await?;
    let notices = handle.notices().borrow().clone();

    drop(handle);
    task.await
        .map_err(|e| LifelineError::Internal(format!("lifecycle task failed: {e}")))?;
    Ok((outcome, notices))
}
