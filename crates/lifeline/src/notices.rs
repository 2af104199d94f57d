// SPDX-FileCopyrightText: 2026 Lifeline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `lifeline notices`: list or dismiss persistent notices.

use chrono::Utc;
use lifeline_config::LifelineConfig;
use lifeline_core::LifelineError;
use lifeline_storage::queries::{alerts, notices};

/// Local alerts shown alongside the notices.
const RECENT_ALERTS: usize = 10;

pub async fn run_notices(config: &LifelineConfig, dismiss: Option<i64>) -> Result<(), LifelineError> {
    let db = crate::open_store(config).await?;

    if let Some(id) = dismiss {
        if notices::dismiss(&db, id, Utc::now()).await? {
            println!("Dismissed notice #{id}");
        } else {
            println!("No undismissed notice #{id}");
        }
        return Ok(());
    }

    let active = notices::list_active(&db).await?;
    if active.is_empty() {
        println!("No undismissed notices");
    }
    for notice in &active {
        let trigger = notice
            .trigger_id
            .map(|id| format!(" (trigger {id})"))
            .unwrap_or_default();
        println!(
            "#{} [{}] {}{trigger}",
            notice.id,
            notice.created_at.format("%Y-%m-%d %H:%M:%S"),
            notice.message
        );
    }

    let recent = alerts::list_recent(&db, RECENT_ALERTS).await?;
    if !recent.is_empty() {
        println!();
        println!("Local alerts:");
        for alert in &recent {
            println!(
                "  {} {} trigger {} ({})",
                alert.created_at.format("%Y-%m-%d %H:%M:%S"),
                alert.kind,
                alert.trigger_id,
                alert.reason
            );
        }
    }
    Ok(())
}
