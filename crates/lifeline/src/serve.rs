// SPDX-FileCopyrightText: 2026 Lifeline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `lifeline serve`: the ingestion endpoint stub.

use std::sync::Arc;
use std::time::Duration;

use lifeline_config::LifelineConfig;
use lifeline_core::LifelineError;
use lifeline_gateway::{GatewayState, TracingNotifier};
use lifeline_storage::Database;
use tracing::info;

use crate::shutdown;

pub async fn run_serve(config: &LifelineConfig) -> Result<(), LifelineError> {
    info!("starting lifeline serve");

    let db = Database::open_with_timeout(
        &config.gateway.database_path,
        Duration::from_millis(config.storage.busy_timeout_ms),
    )
    .await?;
    let state = GatewayState::new(db.clone(), Arc::new(TracingNotifier));

    let cancel = shutdown::install_signal_handler();
    lifeline_gateway::serve(&config.gateway, state, cancel).await?;

    db.close().await?;
    info!("lifeline serve shutdown complete");
    Ok(())
}
