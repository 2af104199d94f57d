// SPDX-FileCopyrightText: 2026 Lifeline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Delivery Attempt log: one row per trigger, updated in place across retries.
//!
//! A context may only start network I/O for a trigger after [`claim`] moved
//! its row to `sent`. The claim runs inside a `BEGIN IMMEDIATE` transaction so
//! the main process and the background worker cannot both win it. A `sent`
//! row whose lease has expired belongs to a context that died mid-attempt and
//! can be claimed again.

use chrono::{DateTime, Utc};
use lifeline_core::{
    DeliveryAttempt, ExecutionContext, FailureKind, LifelineError, TriggerEvent,
};
use rusqlite::types::Type;
use rusqlite::{params, OptionalExtension, Row, TransactionBehavior};
use uuid::Uuid;

use crate::database::{encode_ts, map_tr_err, parse_col, parse_opt_col, Database};

const COLUMNS: &str = "trigger_id, attempt_number, outcome, next_retry_at, server_event_id,
                       failure, owner, lease_until, created_at, updated_at";

fn map_attempt(row: &Row<'_>) -> rusqlite::Result<DeliveryAttempt> {
    Ok(DeliveryAttempt {
        trigger_id: parse_col(row, 0)?,
        attempt_number: row.get(1)?,
        outcome: parse_col(row, 2)?,
        next_retry_at: parse_opt_col(row, 3)?,
        server_event_id: row.get(4)?,
        failure: parse_opt_col(row, 5)?,
        owner: parse_opt_col(row, 6)?,
        lease_until: parse_opt_col(row, 7)?,
        created_at: parse_col(row, 8)?,
        updated_at: parse_col(row, 9)?,
    })
}

fn map_event(row: &Row<'_>) -> rusqlite::Result<TriggerEvent> {
    let raw: String = row.get(0)?;
    serde_json::from_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, Type::Text, Box::new(e)))
}

/// Record a new `pending` row for `event`, due immediately.
///
/// Returns `false` (and changes nothing) if the trigger is already recorded.
pub async fn record(
    db: &Database,
    event: &TriggerEvent,
    now: DateTime<Utc>,
) -> Result<bool, LifelineError> {
    let trigger_id = event.trigger_id.to_string();
    let event_json = serde_json::to_string(event)?;
    let now = encode_ts(now);
    db.connection()
        .call(move |conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO delivery_attempts
                     (trigger_id, event, attempt_number, outcome, next_retry_at,
                      created_at, updated_at)
                 VALUES (?1, ?2, 0, 'pending', ?3, ?3, ?3)",
                params![trigger_id, event_json, now],
            )?;
            Ok(inserted > 0)
        })
        .await
        .map_err(map_tr_err)
}

/// Record a row that is terminal from the start: no attempt will be made.
///
/// Returns `false` if the trigger is already recorded.
pub async fn record_failed(
    db: &Database,
    event: &TriggerEvent,
    failure: FailureKind,
    now: DateTime<Utc>,
) -> Result<bool, LifelineError> {
    let trigger_id = event.trigger_id.to_string();
    let event_json = serde_json::to_string(event)?;
    let failure = failure.to_string();
    let now = encode_ts(now);
    db.connection()
        .call(move |conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO delivery_attempts
                     (trigger_id, event, attempt_number, outcome, failure,
                      created_at, updated_at)
                 VALUES (?1, ?2, 0, 'failed', ?3, ?4, ?4)",
                params![trigger_id, event_json, failure, now],
            )?;
            Ok(inserted > 0)
        })
        .await
        .map_err(map_tr_err)
}

/// Fetch the row for `trigger_id`.
pub async fn get(db: &Database, trigger_id: Uuid) -> Result<Option<DeliveryAttempt>, LifelineError> {
    let trigger_id = trigger_id.to_string();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                &format!("SELECT {COLUMNS} FROM delivery_attempts WHERE trigger_id = ?1"),
                params![trigger_id],
                map_attempt,
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

/// Fetch the stored trigger event for `trigger_id`.
pub async fn get_event(db: &Database, trigger_id: Uuid) -> Result<Option<TriggerEvent>, LifelineError> {
    let trigger_id = trigger_id.to_string();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                "SELECT event FROM delivery_attempts WHERE trigger_id = ?1",
                params![trigger_id],
                map_event,
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

/// Atomically claim the row for one attempt.
///
/// Succeeds when the row is `pending` or is `sent` with a lease that expired
/// before `now`. With `respect_schedule`, a `pending` row is only claimable
/// once its `next_retry_at` has passed; the owner driving its own retry loop
/// passes `false` because it already waited out the delay.
///
/// On success the row moves to `sent`, `attempt_number` is incremented and
/// the lease is held by `owner` until `lease_until`. Returns `None` when
/// another context holds the row or it is terminal.
pub async fn claim(
    db: &Database,
    trigger_id: Uuid,
    owner: ExecutionContext,
    now: DateTime<Utc>,
    lease_until: DateTime<Utc>,
    respect_schedule: bool,
) -> Result<Option<DeliveryAttempt>, LifelineError> {
    let trigger_id = trigger_id.to_string();
    let owner = owner.to_string();
    let now = encode_ts(now);
    let lease_until = encode_ts(lease_until);
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let changed = tx.execute(
                "UPDATE delivery_attempts
                 SET outcome = 'sent',
                     attempt_number = attempt_number + 1,
                     owner = ?2,
                     lease_until = ?3,
                     updated_at = ?4
                 WHERE trigger_id = ?1
                   AND ((outcome = 'pending'
                         AND (?5 = 0 OR next_retry_at IS NULL OR next_retry_at <= ?4))
                        OR (outcome = 'sent' AND lease_until IS NOT NULL AND lease_until < ?4))",
                params![trigger_id, owner, lease_until, now, respect_schedule],
            )?;
            let claimed = if changed == 1 {
                Some(tx.query_row(
                    &format!("SELECT {COLUMNS} FROM delivery_attempts WHERE trigger_id = ?1"),
                    params![trigger_id],
                    map_attempt,
                )?)
            } else {
                None
            };
            tx.commit()?;
            Ok(claimed)
        })
        .await
        .map_err(map_tr_err)
}

/// Mark the row acknowledged with the server's event id.
///
/// An acknowledgment is authoritative whoever holds the claim, so any
/// non-`acknowledged` row is updated. Returns whether the row changed.
pub async fn acknowledge(
    db: &Database,
    trigger_id: Uuid,
    server_event_id: i64,
    now: DateTime<Utc>,
) -> Result<bool, LifelineError> {
    let trigger_id = trigger_id.to_string();
    let now = encode_ts(now);
    db.connection()
        .call(move |conn| {
            let changed = conn.execute(
                "UPDATE delivery_attempts
                 SET outcome = 'acknowledged', server_event_id = ?2, failure = NULL,
                     next_retry_at = NULL, lease_until = NULL, updated_at = ?3
                 WHERE trigger_id = ?1 AND outcome != 'acknowledged'",
                params![trigger_id, server_event_id, now],
            )?;
            Ok(changed > 0)
        })
        .await
        .map_err(map_tr_err)
}

/// Hand an in-flight row back to `pending` after a retryable failure.
///
/// Only the context holding the claim may release it. Returns whether the
/// row changed.
pub async fn release(
    db: &Database,
    trigger_id: Uuid,
    owner: ExecutionContext,
    failure: FailureKind,
    next_retry_at: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<bool, LifelineError> {
    let trigger_id = trigger_id.to_string();
    let owner = owner.to_string();
    let failure = failure.to_string();
    let next_retry_at = encode_ts(next_retry_at);
    let now = encode_ts(now);
    db.connection()
        .call(move |conn| {
            let changed = conn.execute(
                "UPDATE delivery_attempts
                 SET outcome = 'pending', failure = ?3, next_retry_at = ?4,
                     owner = NULL, lease_until = NULL, updated_at = ?5
                 WHERE trigger_id = ?1 AND outcome = 'sent' AND owner = ?2",
                params![trigger_id, owner, failure, next_retry_at, now],
            )?;
            Ok(changed > 0)
        })
        .await
        .map_err(map_tr_err)
}

/// Move an in-flight row to `failed`.
///
/// Like [`release`], only the context holding the claim may fail it; a
/// context whose lease was taken over changes nothing. Returns whether the
/// row changed.
pub async fn fail(
    db: &Database,
    trigger_id: Uuid,
    owner: ExecutionContext,
    failure: FailureKind,
    now: DateTime<Utc>,
) -> Result<bool, LifelineError> {
    let trigger_id = trigger_id.to_string();
    let owner = owner.to_string();
    let failure = failure.to_string();
    let now = encode_ts(now);
    db.connection()
        .call(move |conn| {
            let changed = conn.execute(
                "UPDATE delivery_attempts
                 SET outcome = 'failed', failure = ?3, next_retry_at = NULL,
                     lease_until = NULL, updated_at = ?4
                 WHERE trigger_id = ?1 AND outcome = 'sent' AND owner = ?2",
                params![trigger_id, owner, failure, now],
            )?;
            Ok(changed > 0)
        })
        .await
        .map_err(map_tr_err)
}

/// Events whose rows a context may claim: `pending` rows due at or before
/// `due_before`, and `sent` rows whose lease expired before `now`.
///
/// Oldest first.
pub async fn list_due(
    db: &Database,
    due_before: DateTime<Utc>,
    now: DateTime<Utc>,
    limit: usize,
) -> Result<Vec<TriggerEvent>, LifelineError> {
    let due_before = encode_ts(due_before);
    let now = encode_ts(now);
    let limit = i64::try_from(limit).unwrap_or(i64::MAX);
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT event FROM delivery_attempts
                 WHERE (outcome = 'pending' AND (next_retry_at IS NULL OR next_retry_at <= ?1))
                    OR (outcome = 'sent' AND lease_until IS NOT NULL AND lease_until < ?2)
                 ORDER BY created_at ASC
                 LIMIT ?3",
            )?;
            let rows = stmt.query_map(params![due_before, now, limit], map_event)?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

/// Most recently updated rows, newest first.
pub async fn list_recent(db: &Database, limit: usize) -> Result<Vec<DeliveryAttempt>, LifelineError> {
    let limit = i64::try_from(limit).unwrap_or(i64::MAX);
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {COLUMNS} FROM delivery_attempts
                 ORDER BY updated_at DESC, trigger_id ASC
                 LIMIT ?1"
            ))?;
            let rows = stmt.query_map(params![limit], map_attempt)?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

/// Number of rows that are not yet terminal.
pub async fn count_open(db: &Database) -> Result<i64, LifelineError> {
    db.connection()
        .call(|conn| {
            conn.query_row(
                "SELECT COUNT(*) FROM delivery_attempts WHERE outcome IN ('pending', 'sent')",
                [],
                |row| row.get(0),
            )
        })
        .await
        .map_err(map_tr_err)
}

/// Delete terminal rows beyond the `retain` most recently updated.
///
/// `pending` and `sent` rows are never touched. Returns the number deleted.
pub async fn prune_completed(db: &Database, retain: usize) -> Result<usize, LifelineError> {
    let retain = i64::try_from(retain).unwrap_or(i64::MAX);
    db.connection()
        .call(move |conn| {
            conn.execute(
                "DELETE FROM delivery_attempts
                 WHERE outcome IN ('acknowledged', 'failed')
                   AND trigger_id NOT IN (
                       SELECT trigger_id FROM delivery_attempts
                       WHERE outcome IN ('acknowledged', 'failed')
                       ORDER BY updated_at DESC, trigger_id ASC
                       LIMIT ?1)",
                params![retain],
            )
        })
        .await
        .map_err(map_tr_err)
}
