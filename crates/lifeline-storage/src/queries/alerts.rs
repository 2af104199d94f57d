// SPDX-FileCopyrightText: 2026 Lifeline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Local-only alerts raised when a trigger cannot be delivered at all.

use chrono::{DateTime, Utc};
use lifeline_core::{FailureKind, LifelineError, LocalAlert, TriggerKind};
use rusqlite::{params, Row};
use uuid::Uuid;

use crate::database::{encode_ts, map_tr_err, parse_col, Database};

fn map_alert(row: &Row<'_>) -> rusqlite::Result<LocalAlert> {
    Ok(LocalAlert {
        id: row.get(0)?,
        trigger_id: parse_col(row, 1)?,
        kind: parse_col(row, 2)?,
        reason: parse_col(row, 3)?,
        created_at: parse_col(row, 4)?,
    })
}

/// Record a local alert for `trigger_id`. Returns the new row id.
pub async fn record(
    db: &Database,
    trigger_id: Uuid,
    kind: TriggerKind,
    reason: FailureKind,
    now: DateTime<Utc>,
) -> Result<i64, LifelineError> {
    let trigger_id = trigger_id.to_string();
    let kind = kind.to_string();
    let reason = reason.to_string();
    let now = encode_ts(now);
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO local_alerts (trigger_id, kind, reason, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![trigger_id, kind, reason, now],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
        .map_err(map_tr_err)
}

/// Most recent local alerts, newest first.
pub async fn list_recent(db: &Database, limit: usize) -> Result<Vec<LocalAlert>, LifelineError> {
    let limit = i64::try_from(limit).unwrap_or(i64::MAX);
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, trigger_id, kind, reason, created_at
                 FROM local_alerts ORDER BY id DESC LIMIT ?1",
            )?;
            let rows = stmt.query_map(params![limit], map_alert)?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

/// Local alerts raised for one trigger.
pub async fn list_for_trigger(db: &Database, trigger_id: Uuid) -> Result<Vec<LocalAlert>, LifelineError> {
    let trigger_id = trigger_id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, trigger_id, kind, reason, created_at
                 FROM local_alerts WHERE trigger_id = ?1 ORDER BY id ASC",
            )?;
            let rows = stmt.query_map(params![trigger_id], map_alert)?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}
