// SPDX-FileCopyrightText: 2026 Lifeline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Collaborator traits at the seams between the relay and the outside world.
//!
//! All traits use `#[async_trait]` for dynamic dispatch through `Arc<dyn _>`.

pub mod ingestion;
pub mod notifier;
pub mod session;

pub use ingestion::IngestionClient;
pub use notifier::Notifier;
pub use session::SessionProvider;
