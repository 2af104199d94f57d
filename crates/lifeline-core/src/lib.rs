// SPDX-FileCopyrightText: 2026 Lifeline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Lifeline emergency relay.
//!
//! Holds the error taxonomy, the domain types that cross process and crate
//! boundaries (trigger events, delivery attempts, lifecycle state), the
//! collaborator traits, and the notification routing table.

pub mod error;
pub mod notification;
pub mod traits;
pub mod types;

pub use error::{DeliveryError, FailureKind, LifelineError};
pub use types::{
    DeliveryAttempt, DeliveryOutcome, ExecutionContext, GeoPoint, IngestionAck, LifecycleState,
    LocalAlert, Notice, NoticeKind, TriggerEvent, TriggerKind,
};

pub use traits::{IngestionClient, Notifier, SessionProvider};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_traits_are_object_safe() {
        fn _ingestion(_: &dyn IngestionClient) {}
        fn _notifier(_: &dyn Notifier) {}
        fn _session(_: &dyn SessionProvider) {}
    }

    #[test]
    fn lifeline_error_has_all_variants() {
        let _config = LifelineError::Config("test".into());
        let _storage = LifelineError::storage(std::io::Error::other("test"));
        let _http = LifelineError::Http {
            message: "test".into(),
            source: None,
        };
        let _credential = LifelineError::Credential("test".into());
        let _lifecycle = LifelineError::Lifecycle("test".into());
        let _timeout = LifelineError::Timeout {
            duration: std::time::Duration::from_secs(20),
        };
        let _internal = LifelineError::Internal("test".into());
    }
}
