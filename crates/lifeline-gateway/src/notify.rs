// SPDX-FileCopyrightText: 2026 Lifeline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Notification fan-out for newly ingested SOS events.
//!
//! Guardians of the triggering principal get an SOS alert (`MOTION_DETECTION`
//! for motion triggers, `SOS_EVENT` otherwise) carrying the detail-view
//! payload. The principal's own devices get a `SAFETY_STATUS` confirmation.

use async_trait::async_trait;
use lifeline_core::notification::{Audience, NotificationType, PushNotification, SosAlertPayload};
use lifeline_core::{LifelineError, Notifier, TriggerEvent, TriggerKind};
use tracing::{info, warn};

/// Confirmation shown on the triggering user's own devices.
pub const OWNER_CONFIRMATION: &str = "SOS sent to your emergency contacts.";

/// Notifier that only logs. Push transport is outside this service.
#[derive(Debug, Clone, Default)]
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    async fn dispatch(&self, notification: PushNotification) -> Result<(), LifelineError> {
        info!(
            kind = %notification.kind,
            channel = %notification.kind.channel(),
            critical = notification.kind.is_critical(),
            audience = ?notification.audience,
            title = notification.title.as_str(),
            event_id = notification.data.get("event_id").map(String::as_str),
            "push notification dispatched"
        );
        Ok(())
    }
}

/// Build the notifications for a newly created event.
pub fn notifications_for(
    principal: &str,
    server_event_id: i64,
    event: &TriggerEvent,
) -> Vec<PushNotification> {
    let alert_type = match event.kind {
        TriggerKind::Motion => NotificationType::MotionDetection,
        _ => NotificationType::SosEvent,
    };
    let payload = SosAlertPayload {
        event_id: server_event_id,
        dependent_name: principal.to_string(),
        trigger_type: event.event_type_or_kind(),
        latitude: event.location.map(|p| p.latitude),
        longitude: event.location.map(|p| p.longitude),
        voice_message_url: None,
        triggered_at: Some(event.detected_at),
    };

    let guardians = PushNotification {
        audience: Audience::GuardiansOf(principal.to_string()),
        kind: alert_type,
        title: format!("{principal} needs help"),
        body: alert_body(event.kind).to_string(),
        data: payload.to_data(alert_type),
    };

    let mut owner_data = std::collections::BTreeMap::new();
    owner_data.insert("type".to_string(), NotificationType::SafetyStatus.to_string());
    owner_data.insert("event_id".to_string(), server_event_id.to_string());
    let owner = PushNotification {
        audience: Audience::Owner(principal.to_string()),
        kind: NotificationType::SafetyStatus,
        title: "SOS sent".to_string(),
        body: OWNER_CONFIRMATION.to_string(),
        data: owner_data,
    };

    vec![guardians, owner]
}

fn alert_body(kind: TriggerKind) -> &'static str {
    match kind {
        TriggerKind::Manual => "An SOS alert was triggered.",
        TriggerKind::Motion => "A possible fall or impact was detected.",
        TriggerKind::Voice => "An SOS voice keyword was detected.",
        TriggerKind::Gesture => "An emergency gesture was detected.",
    }
}

/// Dispatch every notification. Failures are logged, never propagated:
/// the event is already stored. Returns how many were dispatched.
pub async fn fan_out(notifier: &dyn Notifier, notifications: Vec<PushNotification>) -> usize {
    let mut dispatched = 0;
    for notification in notifications {
        let kind = notification.kind;
        match notifier.dispatch(notification).await {
            Ok(()) => dispatched += 1,
            Err(e) => warn!(kind = %kind, error = %e, "notification dispatch failed"),
        }
    }
    dispatched
}
