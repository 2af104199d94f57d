// SPDX-FileCopyrightText: 2026 Lifeline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Durable key-value store shared by the main process and the background worker.
//!
//! Holds the mirrored credential (`accessToken`, `backendBaseUrl`) and the
//! current `appLifecycleState`. Every write commits before the future resolves.

use chrono::Utc;
use lifeline_core::LifelineError;
use rusqlite::{params, OptionalExtension};

use crate::database::{encode_ts, map_tr_err, Database};

/// Key holding the mirrored bearer token.
pub const ACCESS_TOKEN: &str = "accessToken";
/// Key holding the backend base URL.
pub const BACKEND_BASE_URL: &str = "backendBaseUrl";
/// Key holding the last reported lifecycle state.
pub const APP_LIFECYCLE_STATE: &str = "appLifecycleState";

/// Raw credential fields as stored, read in a single query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoredCredential {
    pub access_token: Option<String>,
    pub backend_base_url: Option<String>,
    pub lifecycle_state: Option<String>,
}

/// Result of [`store_credential`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialWrite {
    Stored,
    /// A different base URL is already stored; nothing was written.
    BaseUrlConflict { existing: String },
}

/// Get the value stored under `key`.
pub async fn get(db: &Database, key: &str) -> Result<Option<String>, LifelineError> {
    let key = key.to_string();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                "SELECT value FROM kv WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

/// Insert or replace the value stored under `key`.
pub async fn set(db: &Database, key: &str, value: &str) -> Result<(), LifelineError> {
    let key = key.to_string();
    let value = value.to_string();
    let now = encode_ts(Utc::now());
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO kv (key, value, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value,
                                                updated_at = excluded.updated_at",
                params![key, value, now],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Delete `key`. Returns whether a row was removed.
pub async fn delete(db: &Database, key: &str) -> Result<bool, LifelineError> {
    let key = key.to_string();
    db.connection()
        .call(move |conn| {
            let changed = conn.execute("DELETE FROM kv WHERE key = ?1", params![key])?;
            Ok(changed > 0)
        })
        .await
        .map_err(map_tr_err)
}

/// Read token, base URL and lifecycle state together.
pub async fn load_credential(db: &Database) -> Result<StoredCredential, LifelineError> {
    db.connection()
        .call(|conn| {
            let mut stmt = conn.prepare("SELECT key, value FROM kv WHERE key IN (?1, ?2, ?3)")?;
            let rows = stmt.query_map(
                params![ACCESS_TOKEN, BACKEND_BASE_URL, APP_LIFECYCLE_STATE],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
            )?;

            let mut stored = StoredCredential::default();
            for row in rows {
                let (key, value) = row?;
                match key.as_str() {
                    ACCESS_TOKEN => stored.access_token = Some(value),
                    BACKEND_BASE_URL => stored.backend_base_url = Some(value),
                    _ => stored.lifecycle_state = Some(value),
                }
            }
            Ok(stored)
        })
        .await
        .map_err(map_tr_err)
}

/// Store token and base URL atomically.
///
/// The base URL is fixed once set: a different URL is refused until
/// [`clear_credential`] runs.
pub async fn store_credential(
    db: &Database,
    token: &str,
    base_url: &str,
) -> Result<CredentialWrite, LifelineError> {
    let token = token.to_string();
    let base_url = base_url.to_string();
    let now = encode_ts(Utc::now());
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;

            let existing: Option<String> = tx
                .query_row(
                    "SELECT value FROM kv WHERE key = ?1",
                    params![BACKEND_BASE_URL],
                    |row| row.get(0),
                )
                .optional()?;
            if let Some(existing) = existing {
                if existing != base_url {
                    tx.commit()?;
                    return Ok(CredentialWrite::BaseUrlConflict { existing });
                }
            }

            for (key, value) in [(ACCESS_TOKEN, &token), (BACKEND_BASE_URL, &base_url)] {
                tx.execute(
                    "INSERT INTO kv (key, value, updated_at) VALUES (?1, ?2, ?3)
                     ON CONFLICT(key) DO UPDATE SET value = excluded.value,
                                                    updated_at = excluded.updated_at",
                    params![key, value, now],
                )?;
            }
            tx.commit()?;
            Ok(CredentialWrite::Stored)
        })
        .await
        .map_err(map_tr_err)
}

/// Remove token and base URL. The lifecycle state is left in place.
pub async fn clear_credential(db: &Database) -> Result<(), LifelineError> {
    db.connection()
        .call(|conn| {
            conn.execute(
                "DELETE FROM kv WHERE key IN (?1, ?2)",
                params![ACCESS_TOKEN, BACKEND_BASE_URL],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}
