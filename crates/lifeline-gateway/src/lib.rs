// SPDX-FileCopyrightText: 2026 Lifeline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Ingestion endpoint stub for Lifeline.
//!
//! Accepts SOS events from authenticated principals, stores each trigger
//! exactly once, and fans out push notifications for new events.

pub mod auth;
pub mod handlers;
pub mod notify;
pub mod server;

pub use auth::{AuthConfig, Principal};
pub use notify::TracingNotifier;
pub use server::{build_router, serve, GatewayState};
