// SPDX-FileCopyrightText: 2026 Lifeline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Temp-store harness shared by relay, gateway and CLI tests.
//!
//! `TestStore` owns a temp directory holding one SQLite file and a
//! configuration tuned for tests: no jitter and short delays, so timing
//! assertions are exact.

use lifeline_config::model::LifelineConfig;
use lifeline_core::LifelineError;
use lifeline_storage::Database;

/// A temp database plus matching configuration.
pub struct TestStore {
    pub db: Database,
    pub config: LifelineConfig,
    dir: tempfile::TempDir,
}

impl TestStore {
    /// Create a fresh store. Backoff is 1 s doubling without jitter.
    pub async fn new() -> Result<Self, LifelineError> {
        let dir = tempfile::TempDir::new().map_err(LifelineError::storage)?;
        let db_path = dir.path().join("lifeline.db").to_string_lossy().to_string();

        let mut config = LifelineConfig::default();
        config.storage.database_path = db_path.clone();
        config.gateway.database_path = dir.path().join("gateway.db").to_string_lossy().to_string();
        config.relay.jitter_ratio = 0.0;

        let db = Database::open(&db_path).await?;
        Ok(Self { db, config, dir })
    }

    /// Open a second, independent connection to the same file, as another
    /// process would.
    pub async fn open_second(&self) -> Result<Database, LifelineError> {
        Database::open(&self.config.storage.database_path).await
    }

    /// Directory holding the database files.
    pub fn path(&self) -> &std::path::Path {
        self.dir.path()
    }
}
