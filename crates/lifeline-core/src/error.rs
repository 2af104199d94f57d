// SPDX-FileCopyrightText: 2026 Lifeline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Lifeline emergency relay.
//!
//! Two layers live here:
//! - [`LifelineError`] covers infrastructure faults (config, storage, HTTP
//!   plumbing) and is propagated with `?`.
//! - [`FailureKind`] is the delivery taxonomy. The relay never propagates a
//!   delivery failure as an error; it records the kind on the Delivery Attempt.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use thiserror::Error;

/// The primary error type used across all Lifeline crates.
#[derive(Debug, Error)]
pub enum LifelineError {
    /// Configuration errors (invalid TOML, missing required fields, bad values).
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage backend errors (database open, query failure, migration).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// HTTP plumbing errors (client construction, server bind).
    #[error("http error: {message}")]
    Http {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Credential cache misuse (conflicting base URL, invalid token value).
    #[error("credential error: {0}")]
    Credential(String),

    /// Lifecycle tracker errors (rejected transition, tracker stopped).
    #[error("lifecycle error: {0}")]
    Lifecycle(String),

    /// Serialization of a persisted record failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl LifelineError {
    /// Wrap any storage-layer error.
    pub fn storage<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        LifelineError::Storage {
            source: Box::new(err),
        }
    }
}

/// Why a delivery did not (yet) complete.
///
/// Persisted on the Delivery Attempt as its snake_case string form.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// No access token in the credential cache. Fatal for the attempt.
    NoCredential,
    /// Connection refused, DNS failure, or request timeout.
    NetworkUnavailable,
    /// 5xx, 408 or 429 from the ingestion endpoint.
    ServerError,
    /// 401 from the ingestion endpoint; a refreshed token may be mirrored
    /// before the next attempt.
    Unauthorized,
    /// 2xx whose body could not be parsed as an acknowledgment.
    MalformedResponse,
    /// Any other 4xx. The event itself was refused; retrying cannot help.
    ServerRejected,
    /// Attempt budget spent without an acknowledgment.
    RetryExhausted,
    /// The relay could not persist its own bookkeeping.
    LocalStorage,
}

impl FailureKind {
    /// Whether a failure of this kind is eligible for another attempt.
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            FailureKind::NetworkUnavailable
                | FailureKind::ServerError
                | FailureKind::Unauthorized
                | FailureKind::MalformedResponse
        )
    }
}

/// A single failed delivery attempt as reported by an ingestion client.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct DeliveryError {
    pub kind: FailureKind,
    pub message: String,
}

impl DeliveryError {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn retry_policy_matches_taxonomy() {
        assert!(FailureKind::NetworkUnavailable.is_retryable());
        assert!(FailureKind::ServerError.is_retryable());
        assert!(FailureKind::Unauthorized.is_retryable());
        assert!(FailureKind::MalformedResponse.is_retryable());

        assert!(!FailureKind::NoCredential.is_retryable());
        assert!(!FailureKind::ServerRejected.is_retryable());
        assert!(!FailureKind::RetryExhausted.is_retryable());
        assert!(!FailureKind::LocalStorage.is_retryable());
    }

    #[test]
    fn failure_kind_string_form_is_snake_case() {
        assert_eq!(FailureKind::NoCredential.to_string(), "no_credential");
        assert_eq!(
            FailureKind::from_str("retry_exhausted").unwrap(),
            FailureKind::RetryExhausted
        );
        let json = serde_json::to_string(&FailureKind::ServerRejected).unwrap();
        assert_eq!(json, "\"server_rejected\"");
    }

    #[test]
    fn delivery_error_display_includes_kind() {
        let err = DeliveryError::new(FailureKind::ServerError, "503 Service Unavailable");
        assert_eq!(err.to_string(), "server_error: 503 Service Unavailable");
    }

    #[test]
    fn storage_helper_boxes_source() {
        let err = LifelineError::storage(std::io::Error::other("disk full"));
        assert!(err.to_string().contains("disk full"));
    }
}
