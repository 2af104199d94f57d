// SPDX-FileCopyrightText: 2026 Lifeline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Emergency relay for Lifeline.
//!
//! Gets an emergency trigger from detection to a server acknowledgment no
//! matter what the app lifecycle is doing:
//!
//! - [`CredentialCache`] mirrors the access token and lifecycle state into
//!   storage readable by both execution contexts
//! - [`LifecycleTracker`] applies OS lifecycle reports and resumes work on
//!   foreground
//! - [`TriggerService`] turns sensor events into trigger events
//! - [`EmergencyRelay`] delivers with durable, bounded retry
//! - [`BackgroundWorker`] keeps delivering while the main process is away

pub mod backoff;
pub mod client;
pub mod credential;
pub mod lifecycle;
pub mod relay;
pub mod trigger;
pub mod worker;

pub use backoff::BackoffPolicy;
pub use client::HttpIngestionClient;
pub use credential::{CredentialCache, CredentialSnapshot};
pub use lifecycle::{LifecycleHandle, LifecycleTracker, TransitionOutcome};
pub use relay::{EmergencyRelay, RelayOptions};
pub use trigger::{GestureConfig, GestureRecognizer, SensorEvent, TriggerService, TriggerSource};
pub use worker::{BackgroundWorker, WorkerOptions};
