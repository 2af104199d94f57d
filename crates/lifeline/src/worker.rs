// SPDX-FileCopyrightText: 2026 Lifeline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `lifeline worker`: the always-on background execution context.
//!
//! Runs as its own process next to the main application, sharing nothing
//! with it but the SQLite file.

use std::sync::Arc;
use std::time::Duration;

use lifeline_config::LifelineConfig;
use lifeline_core::{DeliveryOutcome, ExecutionContext, LifelineError};
use lifeline_relay::{
    BackgroundWorker, EmergencyRelay, HttpIngestionClient, RelayOptions, WorkerOptions,
};
use tracing::info;

use crate::shutdown;

pub async fn run_worker(config: &LifelineConfig, once: bool) -> Result<(), LifelineError> {
    let db = crate::open_store(config).await?;
    let client = HttpIngestionClient::new(Duration::from_secs(config.relay.request_timeout_secs))?;
    let relay = Arc::new(EmergencyRelay::new(
        db.clone(),
        Arc::new(client),
        ExecutionContext::Background,
        RelayOptions::from_config(&config.relay),
    ));
    let worker = BackgroundWorker::new(db.clone(), relay, WorkerOptions::from_config(&config.worker))?;

    if once {
        let done = worker.run_once().await?;
        let acknowledged = done
            .iter()
            .filter(|a| a.outcome == DeliveryOutcome::Acknowledged)
            .count();
        println!(
            "Drove {} due deliveries: {acknowledged} acknowledged",
            done.len()
        );
    } else {
        let cancel = shutdown::install_signal_handler();
        let completed = worker.run(cancel).await?;
        info!(completed, "worker shutdown complete");
    }

    db.close().await?;
    Ok(())
}
