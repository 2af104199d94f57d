// SPDX-FileCopyrightText: 2026 Lifeline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain types shared by the relay, storage, and gateway crates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

use crate::error::FailureKind;

/// Maximum length of the free-text `eventType` detail.
pub const MAX_EVENT_TYPE_LEN: usize = 64;

/// OS-reported running state of the main application process.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    Foreground,
    Background,
    Terminated,
}

impl LifecycleState {
    /// Whether the main process may move from `self` to `next`.
    ///
    /// Reporting the current state again is allowed and is a no-op for the
    /// tracker. Nothing leaves `Terminated`.
    pub fn can_transition_to(self, next: LifecycleState) -> bool {
        use LifecycleState::*;
        match (self, next) {
            (Terminated, _) => false,
            (a, b) if a == b => true,
            (Foreground, Background) | (Background, Foreground) => true,
            (_, Terminated) => true,
            _ => false,
        }
    }
}

/// Which execution context is running a piece of relay code.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ExecutionContext {
    /// The application process itself.
    Main,
    /// The always-on worker that outlives the application process.
    Background,
}

impl ExecutionContext {
    /// Whether this context is the one allowed to start attempts while the
    /// main process is in `state`.
    pub fn is_active(self, state: LifecycleState) -> bool {
        match self {
            ExecutionContext::Main => state == LifecycleState::Foreground,
            ExecutionContext::Background => state != LifecycleState::Foreground,
        }
    }
}

/// What detected the emergency.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TriggerKind {
    Manual,
    Motion,
    Voice,
    Gesture,
}

/// A WGS84 coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Both coordinates are finite and within their valid ranges.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }
}

/// An emergency trigger, created once at detection time and never mutated.
///
/// This is also the wire body of `POST /sos/events`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerEvent {
    /// Client-generated identifier; the dedup key for every retry.
    pub trigger_id: Uuid,
    pub kind: TriggerKind,
    /// Free-text detail such as "double_shake" or "fall". Defaults to the kind.
    #[serde(default)]
    pub event_type: Option<String>,
    pub detected_at: DateTime<Utc>,
    pub lifecycle_state_at_detection: LifecycleState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<GeoPoint>,
}

impl TriggerEvent {
    /// Create a new trigger stamped with a fresh id and the current time.
    pub fn new(kind: TriggerKind, state: LifecycleState, location: Option<GeoPoint>) -> Self {
        Self {
            trigger_id: Uuid::new_v4(),
            kind,
            event_type: None,
            detected_at: Utc::now(),
            lifecycle_state_at_detection: state,
            location,
        }
    }

    /// Attach a free-text event detail.
    pub fn with_event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_type = Some(event_type.into());
        self
    }

    /// The event detail, falling back to the trigger kind.
    pub fn event_type_or_kind(&self) -> String {
        self.event_type
            .clone()
            .unwrap_or_else(|| self.kind.to_string())
    }
}

/// Successful response body from the ingestion endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestionAck {
    pub server_event_id: i64,
}

/// Outcome column of the Delivery Attempt log.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum DeliveryOutcome {
    /// Waiting for the next attempt (or the first one).
    Pending,
    /// An attempt is in flight; the owner holds the claim until `lease_until`.
    Sent,
    /// The server acknowledged the event. Terminal.
    Acknowledged,
    /// Delivery will not be attempted again. Terminal.
    Failed,
}

impl DeliveryOutcome {
    pub fn is_terminal(self) -> bool {
        matches!(self, DeliveryOutcome::Acknowledged | DeliveryOutcome::Failed)
    }
}

/// Bookkeeping row for one trigger. Exactly one exists per `trigger_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryAttempt {
    pub trigger_id: Uuid,
    /// Number of attempts started so far (0 before the first claim).
    pub attempt_number: u32,
    pub outcome: DeliveryOutcome,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub server_event_id: Option<i64>,
    pub failure: Option<FailureKind>,
    pub owner: Option<ExecutionContext>,
    pub lease_until: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Category of a persistent, dismissible notice.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum NoticeKind {
    NoCredential,
    RetryExhausted,
    ServerRejected,
}

impl NoticeKind {
    /// The notice a terminal failure should leave behind, if any.
    pub fn for_failure(kind: FailureKind) -> Option<NoticeKind> {
        match kind {
            FailureKind::NoCredential => Some(NoticeKind::NoCredential),
            FailureKind::RetryExhausted => Some(NoticeKind::RetryExhausted),
            FailureKind::ServerRejected => Some(NoticeKind::ServerRejected),
            _ => None,
        }
    }

    /// User-facing text shown on the next foreground.
    pub fn message(self) -> &'static str {
        match self {
            NoticeKind::NoCredential => {
                "An emergency alert could not be sent because you were signed out. \
                 A local alarm was raised instead."
            }
            NoticeKind::RetryExhausted => {
                "An emergency alert could not be delivered after several attempts. \
                 Your guardians may not have been notified."
            }
            NoticeKind::ServerRejected => {
                "An emergency alert was refused by the server. \
                 Your guardians may not have been notified."
            }
        }
    }
}

/// A notice surfaced the next time the application is foregrounded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notice {
    pub id: i64,
    pub trigger_id: Option<Uuid>,
    pub kind: NoticeKind,
    pub message: String,
    pub created_at: DateTime<Utc>,
    pub dismissed_at: Option<DateTime<Utc>>,
}

/// Record of a local-only alert raised instead of (or before) delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalAlert {
    pub id: i64,
    pub trigger_id: Uuid,
    pub kind: TriggerKind,
    pub reason: FailureKind,
    pub created_at: DateTime<Utc>,
}
