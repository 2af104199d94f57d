// SPDX-FileCopyrightText: 2026 Lifeline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Database connection management with PRAGMA setup, WAL mode, and lifecycle.
//!
//! Within a process, all access is serialized through tokio-rusqlite's single
//! background thread: `Database` wraps one `tokio_rusqlite::Connection` and
//! every query module goes through `connection().call()`. Do NOT open extra
//! connections for writes. Across processes (main app and background worker)
//! SQLite's file lock and `busy_timeout` serialize writers.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use lifeline_core::LifelineError;
use rusqlite::types::Type;
use rusqlite::Row;
use tracing::debug;

use crate::migrations;

/// Busy timeout used by [`Database::open`].
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Handle to the SQLite store. Cheap to clone; clones share one connection thread.
#[derive(Clone)]
pub struct Database {
    conn: tokio_rusqlite::Connection,
    path: String,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").field("path", &self.path).finish()
    }
}

impl Database {
    /// Open (or create) the database at `path` and run pending migrations.
    pub async fn open(path: &str) -> Result<Self, LifelineError> {
        Self::open_with_timeout(path, DEFAULT_BUSY_TIMEOUT).await
    }

    /// Open with an explicit busy timeout for cross-process lock contention.
    pub async fn open_with_timeout(
        path: &str,
        busy_timeout: Duration,
    ) -> Result<Self, LifelineError> {
        if let Some(parent) = Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(LifelineError::storage)?;
            }
        }

        let conn = tokio_rusqlite::Connection::open(path)
            .await
            .map_err(|e| LifelineError::Storage {
                source: Box::new(e),
            })?;

        conn.call(move |conn| -> Result<(), rusqlite::Error> {
            conn.busy_timeout(busy_timeout)?;
            // FULL sync: a credential or attempt write is on disk before the
            // call returns, so the other execution context can see it even if
            // this process is killed right after.
            conn.execute_batch(
                "PRAGMA journal_mode = WAL;
                 PRAGMA synchronous = FULL;
                 PRAGMA foreign_keys = ON;",
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)?;

        conn.call(|conn| migrations::run_migrations(conn).map_err(|e| e.to_string()))
            .await
            .map_err(|e| LifelineError::Storage {
                source: format!("migration failed: {e}").into(),
            })?;

        debug!(path, "database opened");
        Ok(Self {
            conn,
            path: path.to_string(),
        })
    }

    /// The underlying tokio-rusqlite connection.
    pub fn connection(&self) -> &tokio_rusqlite::Connection {
        &self.conn
    }

    /// Filesystem path this database was opened from.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Checkpoint the WAL and close the connection.
    pub async fn close(self) -> Result<(), LifelineError> {
        self.conn
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)?;
        self.conn
            .close()
            .await
            .map_err(|e| LifelineError::Storage {
                source: Box::new(e),
            })?;
        debug!("database closed");
        Ok(())
    }
}

/// Convert a tokio-rusqlite error into [`LifelineError::Storage`].
pub(crate) fn map_tr_err(e: tokio_rusqlite::Error<rusqlite::Error>) -> LifelineError {
    LifelineError::Storage {
        source: Box::new(e),
    }
}

/// Canonical timestamp encoding. Fixed width, so text comparison in SQL
/// orders the same as time.
pub(crate) fn encode_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Read a TEXT column and parse it with `FromStr` (enums, UUIDs, timestamps).
pub(crate) fn parse_col<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: String = row.get(idx)?;
    raw.parse::<T>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Nullable variant of [`parse_col`].
pub(crate) fn parse_opt_col<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| {
        s.parse::<T>()
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
    })
    .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn open_creates_parent_dirs_and_runs_migrations() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested/dir/lifeline.db");
        let db = Database::open(path.to_str().unwrap()).await.unwrap();

        let tables: Vec<String> = db
            .connection()
            .call(|conn| -> Result<Vec<String>, rusqlite::Error> {
                let mut stmt = conn.prepare(
                    "SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name",
                )?;
                let rows = stmt.query_map([], |row| row.get(0))?;
                rows.collect()
            })
            .await
            .unwrap();

        for table in ["delivery_attempts", "kv", "local_alerts", "notices", "sos_events"] {
            assert!(tables.iter().any(|t| t == table), "missing table {table}");
        }
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn wal_mode_is_enabled() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("wal.db");
        let db = Database::open(path.to_str().unwrap()).await.unwrap();

        let mode: String = db
            .connection()
            .call(|conn| -> Result<String, rusqlite::Error> {
                conn.query_row("PRAGMA journal_mode", [], |row| row.get(0))
            })
            .await
            .unwrap();
        assert_eq!(mode.to_lowercase(), "wal");
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn reopen_is_idempotent() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("reopen.db");
        let path = path.to_str().unwrap();

        Database::open(path).await.unwrap().close().await.unwrap();
        let db = Database::open(path).await.unwrap();
        assert_eq!(db.path(), path);
        db.close().await.unwrap();
    }

    #[test]
    fn timestamps_sort_lexicographically() {
        let early = DateTime::parse_from_rfc3339("2026-03-01T09:59:59.999Z")
            .unwrap()
            .with_timezone(&Utc);
        let late = early + chrono::Duration::milliseconds(1);
        assert!(encode_ts(early) < encode_ts(late));
        assert_eq!(encode_ts(early), "2026-03-01T09:59:59.999Z");
    }
}
