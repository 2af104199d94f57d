// SPDX-FileCopyrightText: 2026 Lifeline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite persistence layer for the Lifeline emergency relay.
//!
//! Provides WAL-mode SQLite storage with embedded migrations, a single-writer
//! concurrency model via `tokio-rusqlite`, and typed operations for the
//! durable credential cache, the per-trigger delivery log, user-visible
//! notices, local alert fallbacks, and the server-side event table.

pub mod database;
pub mod migrations;
pub mod queries;

pub use database::Database;
pub use queries::events::IngestOutcome;
pub use queries::kv::CredentialWrite;
