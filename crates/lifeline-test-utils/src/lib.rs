// SPDX-FileCopyrightText: 2026 Lifeline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Lifeline integration tests.
//!
//! Provides mock collaborators and temp-store helpers for fast,
//! deterministic, CI-runnable tests without a real backend.
//!
//! # Components
//!
//! - [`MockIngestion`] - Scripted ingestion client that records every submit
//! - [`MockSession`] - Session provider with a settable token
//! - [`RecordingNotifier`] - Notifier that captures dispatched notifications
//! - [`TestStore`] - Temp SQLite database plus test-friendly config

pub mod harness;
pub mod mock_ingestion;
pub mod mock_session;
pub mod recording_notifier;

pub use harness::TestStore;
pub use mock_ingestion::{MockIngestion, SubmitCall};
pub use mock_session::MockSession;
pub use recording_notifier::RecordingNotifier;
