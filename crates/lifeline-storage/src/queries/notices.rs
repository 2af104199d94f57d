// SPDX-FileCopyrightText: 2026 Lifeline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Persistent, dismissible notices surfaced on the next foreground transition.

use chrono::{DateTime, Utc};
use lifeline_core::{LifelineError, Notice, NoticeKind};
use rusqlite::{params, Row};
use uuid::Uuid;

use crate::database::{encode_ts, map_tr_err, parse_col, parse_opt_col, Database};

fn map_notice(row: &Row<'_>) -> rusqlite::Result<Notice> {
    Ok(Notice {
        id: row.get(0)?,
        trigger_id: parse_opt_col(row, 1)?,
        kind: parse_col(row, 2)?,
        message: row.get(3)?,
        created_at: parse_col(row, 4)?,
        dismissed_at: parse_opt_col(row, 5)?,
    })
}

/// Record a notice of `kind` for `trigger_id`.
///
/// At most one notice of each kind exists per trigger; a repeat returns
/// `None` without writing.
pub async fn record(
    db: &Database,
    trigger_id: Option<Uuid>,
    kind: NoticeKind,
    now: DateTime<Utc>,
) -> Result<Option<i64>, LifelineError> {
    let trigger_id = trigger_id.map(|id| id.to_string());
    let kind_str = kind.to_string();
    let message = kind.message().to_string();
    let now = encode_ts(now);
    db.connection()
        .call(move |conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO notices (trigger_id, kind, message, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![trigger_id, kind_str, message, now],
            )?;
            Ok((inserted > 0).then(|| conn.last_insert_rowid()))
        })
        .await
        .map_err(map_tr_err)
}

/// Undismissed notices, oldest first.
pub async fn list_active(db: &Database) -> Result<Vec<Notice>, LifelineError> {
    db.connection()
        .call(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, trigger_id, kind, message, created_at, dismissed_at
                 FROM notices
                 WHERE dismissed_at IS NULL
                 ORDER BY id ASC",
            )?;
            let rows = stmt.query_map([], map_notice)?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

/// Dismiss notice `id`. Returns `false` if it does not exist or was already dismissed.
pub async fn dismiss(db: &Database, id: i64, now: DateTime<Utc>) -> Result<bool, LifelineError> {
    let now = encode_ts(now);
    db.connection()
        .call(move |conn| {
            let changed = conn.execute(
                "UPDATE notices SET dismissed_at = ?2 WHERE id = ?1 AND dismissed_at IS NULL",
                params![id, now],
            )?;
            Ok(changed > 0)
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    async fn setup_db() -> (Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
        (db, dir)
    }

    #[tokio::test]
    async fn record_list_dismiss() {
        let (db, _dir) = setup_db().await;
        let trigger = Uuid::new_v4();
        let now = Utc::now();

        let id = record(&db, Some(trigger), NoticeKind::RetryExhausted, now)
            .await
            .unwrap()
            .expect("first notice is written");

        let active = list_active(&db).await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, id);
        assert_eq!(active[0].trigger_id, Some(trigger));
        assert_eq!(active[0].kind, NoticeKind::RetryExhausted);
        assert_eq!(active[0].message, NoticeKind::RetryExhausted.message());

        assert!(dismiss(&db, id, now).await.unwrap());
        assert!(!dismiss(&db, id, now).await.unwrap());
        assert!(list_active(&db).await.unwrap().is_empty());

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn one_notice_per_trigger_and_kind() {
        let (db, _dir) = setup_db().await;
        let trigger = Uuid::new_v4();
        let now = Utc::now();

        assert!(record(&db, Some(trigger), NoticeKind::NoCredential, now).await.unwrap().is_some());
        assert!(record(&db, Some(trigger), NoticeKind::NoCredential, now).await.unwrap().is_none());
        assert!(record(&db, Some(trigger), NoticeKind::ServerRejected, now).await.unwrap().is_some());
        assert_eq!(list_active(&db).await.unwrap().len(), 2);

        db.close().await.unwrap();
    }
}
