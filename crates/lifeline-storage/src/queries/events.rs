// SPDX-FileCopyrightText: 2026 Lifeline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Server-side SOS event table behind the ingestion endpoint.
//!
//! `trigger_id` is unique: ingesting the same trigger again returns the
//! original row id instead of creating a second event.

use chrono::{DateTime, Utc};
use lifeline_core::{GeoPoint, LifecycleState, LifelineError, TriggerEvent, TriggerKind};
use rusqlite::{params, OptionalExtension, Row, TransactionBehavior};
use uuid::Uuid;

use crate::database::{encode_ts, map_tr_err, parse_col, Database};

/// Result of [`ingest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestOutcome {
    pub server_event_id: i64,
    /// `false` when the trigger had already been ingested.
    pub created: bool,
}

/// A persisted server-side event.
#[derive(Debug, Clone, PartialEq)]
pub struct SosEventRecord {
    pub id: i64,
    pub trigger_id: Uuid,
    pub principal: String,
    pub kind: TriggerKind,
    pub event_type: String,
    pub app_state: LifecycleState,
    pub location: Option<GeoPoint>,
    pub detected_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

fn map_record(row: &Row<'_>) -> rusqlite::Result<SosEventRecord> {
    let latitude: Option<f64> = row.get(6)?;
    let longitude: Option<f64> = row.get(7)?;
    Ok(SosEventRecord {
        id: row.get(0)?,
        trigger_id: parse_col(row, 1)?,
        principal: row.get(2)?,
        kind: parse_col(row, 3)?,
        event_type: row.get(4)?,
        app_state: parse_col(row, 5)?,
        location: latitude.zip(longitude).map(|(lat, lng)| GeoPoint::new(lat, lng)),
        detected_at: parse_col(row, 8)?,
        created_at: parse_col(row, 9)?,
    })
}

/// Persist `event` for `principal`, or return the existing row for its trigger.
pub async fn ingest(
    db: &Database,
    principal: &str,
    event: &TriggerEvent,
    now: DateTime<Utc>,
) -> Result<IngestOutcome, LifelineError> {
    let trigger_id = event.trigger_id.to_string();
    let principal = principal.to_string();
    let kind = event.kind.to_string();
    let event_type = event.event_type_or_kind();
    let app_state = event.lifecycle_state_at_detection.to_string();
    let latitude = event.location.map(|p| p.latitude);
    let longitude = event.location.map(|p| p.longitude);
    let detected_at = encode_ts(event.detected_at);
    let now = encode_ts(now);
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let existing: Option<i64> = tx
                .query_row(
                    "SELECT id FROM sos_events WHERE trigger_id = ?1",
                    params![trigger_id],
                    |row| row.get(0),
                )
                .optional()?;
            let outcome = match existing {
                Some(id) => IngestOutcome {
                    server_event_id: id,
                    created: false,
                },
                None => {
                    tx.execute(
                        "INSERT INTO sos_events
                             (trigger_id, principal, kind, event_type, app_state,
                              latitude, longitude, detected_at, created_at)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                        params![
                            trigger_id,
                            principal,
                            kind,
                            event_type,
                            app_state,
                            latitude,
                            longitude,
                            detected_at,
                            now
                        ],
                    )?;
                    IngestOutcome {
                        server_event_id: tx.last_insert_rowid(),
                        created: true,
                    }
                }
            };
            tx.commit()?;
            Ok(outcome)
        })
        .await
        .map_err(map_tr_err)
}

/// Fetch event `id`.
pub async fn get(db: &Database, id: i64) -> Result<Option<SosEventRecord>, LifelineError> {
    db.connection()
        .call(move |conn| {
            conn.query_row(
                "SELECT id, trigger_id, principal, kind, event_type, app_state,
                        latitude, longitude, detected_at, created_at
                 FROM sos_events WHERE id = ?1",
                params![id],
                map_record,
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

/// Total number of stored events.
pub async fn count(db: &Database) -> Result<i64, LifelineError> {
    db.connection()
        .call(|conn| conn.query_row("SELECT COUNT(*) FROM sos_events", [], |row| row.get(0)))
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn replay_returns_original_id() {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path().join("server.db").to_str().unwrap())
            .await
            .unwrap();
        let event = TriggerEvent::new(
            TriggerKind::Motion,
            LifecycleState::Terminated,
            Some(GeoPoint::new(27.7172, 85.3240)),
        );

        let first = ingest(&db, "asha", &event, Utc::now()).await.unwrap();
        assert!(first.created);
        let replay = ingest(&db, "asha", &event, Utc::now()).await.unwrap();
        assert!(!replay.created);
        assert_eq!(replay.server_event_id, first.server_event_id);
        assert_eq!(count(&db).await.unwrap(), 1);

        let stored = get(&db, first.server_event_id).await.unwrap().unwrap();
        assert_eq!(stored.trigger_id, event.trigger_id);
        assert_eq!(stored.kind, TriggerKind::Motion);
        assert_eq!(stored.event_type, "motion");
        assert_eq!(stored.app_state, LifecycleState::Terminated);
        assert_eq!(stored.location, Some(GeoPoint::new(27.7172, 85.3240)));

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn distinct_triggers_get_distinct_ids() {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path().join("server.db").to_str().unwrap())
            .await
            .unwrap();
        let a = TriggerEvent::new(TriggerKind::Manual, LifecycleState::Foreground, None);
        let b = TriggerEvent::new(TriggerKind::Manual, LifecycleState::Foreground, None)
            .with_event_type("fall detected");

        let ia = ingest(&db, "asha", &a, Utc::now()).await.unwrap();
        let ib = ingest(&db, "asha", &b, Utc::now()).await.unwrap();
        assert_ne!(ia.server_event_id, ib.server_event_id);
        assert_eq!(
            get(&db, ib.server_event_id).await.unwrap().unwrap().event_type,
            "fall detected"
        );
        assert!(get(&db, 9999).await.unwrap().is_none());

        db.close().await.unwrap();
    }
}
