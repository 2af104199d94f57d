// SPDX-FileCopyrightText: 2026 Lifeline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Push notification types and the tap-to-route table.
//!
//! The gateway builds the flat string data map with [`SosAlertPayload::to_data`];
//! the client side resolves a tapped notification's data map with [`route_for`].

use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Notification `type` values carried in the data map.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationType {
    SosEvent,
    PanicMode,
    MotionDetection,
    SosAcknowledged,
    CountdownWarning,
    SafetyStatus,
    TrackingActive,
    EvidenceCollection,
    PermissionRequired,
    BatteryWarning,
    ServiceDisabled,
}

/// Delivery channel (Android notification channel / APNs category).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum NotificationChannel {
    SosAlerts,
    SecurityUpdates,
    LocationTracking,
    AppSystem,
}

impl NotificationType {
    pub fn channel(self) -> NotificationChannel {
        use NotificationType::*;
        match self {
            SosEvent | PanicMode | MotionDetection => NotificationChannel::SosAlerts,
            SosAcknowledged | CountdownWarning | SafetyStatus => {
                NotificationChannel::SecurityUpdates
            }
            TrackingActive | EvidenceCollection => NotificationChannel::LocationTracking,
            PermissionRequired | BatteryWarning | ServiceDisabled => NotificationChannel::AppSystem,
        }
    }

    /// Only SOS alerts bypass do-not-disturb.
    pub fn is_critical(self) -> bool {
        self.channel() == NotificationChannel::SosAlerts
    }
}

/// Who a notification is addressed to. Resolving an audience into device
/// tokens is the push transport's job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "audience", content = "principal", rename_all = "snake_case")]
pub enum Audience {
    /// Guardians and app-using emergency contacts of the named principal.
    GuardiansOf(String),
    /// The principal's own devices.
    Owner(String),
}

/// A notification handed to the push transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushNotification {
    pub audience: Audience,
    pub kind: NotificationType,
    pub title: String,
    pub body: String,
    pub data: BTreeMap<String, String>,
}

/// Fields passed through to the SOS detail view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SosAlertPayload {
    pub event_id: i64,
    pub dependent_name: String,
    pub trigger_type: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub voice_message_url: Option<String>,
    pub triggered_at: Option<DateTime<Utc>>,
}

impl SosAlertPayload {
    /// Flatten into the string map carried by push data messages.
    pub fn to_data(&self, kind: NotificationType) -> BTreeMap<String, String> {
        let mut data = BTreeMap::new();
        data.insert("type".to_string(), kind.to_string());
        data.insert("event_id".to_string(), self.event_id.to_string());
        data.insert("dependent_name".to_string(), self.dependent_name.clone());
        data.insert("trigger_type".to_string(), self.trigger_type.clone());
        if let (Some(lat), Some(lng)) = (self.latitude, self.longitude) {
            data.insert("lat".to_string(), lat.to_string());
            data.insert("lng".to_string(), lng.to_string());
        }
        if let Some(url) = &self.voice_message_url {
            data.insert("voice_message_url".to_string(), url.clone());
        }
        if let Some(at) = self.triggered_at {
            data.insert("triggered_at".to_string(), at.to_rfc3339());
        }
        data
    }

    /// Parse from a push data map. Returns `None` without a numeric `event_id`.
    pub fn from_data(data: &BTreeMap<String, String>) -> Option<Self> {
        let event_id = data.get("event_id")?.parse().ok()?;
        let coord = |key: &str| data.get(key).and_then(|v| v.parse::<f64>().ok());
        Some(Self {
            event_id,
            dependent_name: data.get("dependent_name").cloned().unwrap_or_default(),
            trigger_type: data
                .get("trigger_type")
                .cloned()
                .unwrap_or_else(|| "manual".to_string()),
            latitude: coord("lat"),
            longitude: coord("lng"),
            voice_message_url: data
                .get("voice_message_url")
                .filter(|v| !v.is_empty())
                .cloned(),
            triggered_at: data
                .get("triggered_at")
                .and_then(|v| DateTime::parse_from_rfc3339(v).ok())
                .map(|dt| dt.with_timezone(&Utc)),
        })
    }
}

/// Where a tapped notification navigates.
#[derive(Debug, Clone, PartialEq)]
pub enum Route {
    /// SOS detail view keyed by the server event id.
    SosDetail(SosAlertPayload),
    /// Status screen for an event the user raised themselves.
    SosStatus { event_id: Option<i64> },
    /// Live location map.
    LiveMap { event_id: Option<i64> },
    /// Permissions and service settings.
    Settings,
    /// Fallback for unknown or incomplete notifications.
    Home,
}

/// Resolve a tapped notification's data map into a route.
pub fn route_for(data: &BTreeMap<String, String>) -> Route {
    let Some(kind) = data
        .get("type")
        .and_then(|t| NotificationType::from_str(t).ok())
    else {
        return Route::Home;
    };
    let event_id = data.get("event_id").and_then(|v| v.parse().ok());

    use NotificationType::*;
    match kind {
        SosEvent | PanicMode | MotionDetection => match SosAlertPayload::from_data(data) {
            Some(payload) => Route::SosDetail(payload),
            None => Route::Home,
        },
        SosAcknowledged | CountdownWarning | SafetyStatus => Route::SosStatus { event_id },
        TrackingActive | EvidenceCollection => Route::LiveMap { event_id },
        PermissionRequired | BatteryWarning | ServiceDisabled => Route::Settings,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sos_payload() -> SosAlertPayload {
        SosAlertPayload {
            event_id: 17,
            dependent_name: "Asha".to_string(),
            trigger_type: "motion".to_string(),
            latitude: Some(27.71),
            longitude: Some(85.32),
            voice_message_url: None,
            triggered_at: None,
        }
    }

    #[test]
    fn sos_types_route_to_detail_view() {
        let data = sos_payload().to_data(NotificationType::MotionDetection);
        match route_for(&data) {
            Route::SosDetail(payload) => {
                assert_eq!(payload.event_id, 17);
                assert_eq!(payload.dependent_name, "Asha");
                assert_eq!(payload.latitude, Some(27.71));
            }
            other => panic!("expected SOS detail, got {other:?}"),
        }
    }

    #[test]
    fn sos_without_event_id_falls_back_home() {
        let mut data = BTreeMap::new();
        data.insert("type".to_string(), "SOS_EVENT".to_string());
        assert_eq!(route_for(&data), Route::Home);
    }

    #[test]
    fn status_and_system_types_route() {
        let mut data = BTreeMap::new();
        data.insert("type".to_string(), "SAFETY_STATUS".to_string());
        data.insert("event_id".to_string(), "9".to_string());
        assert_eq!(route_for(&data), Route::SosStatus { event_id: Some(9) });

        data.insert("type".to_string(), "BATTERY_WARNING".to_string());
        assert_eq!(route_for(&data), Route::Settings);

        data.insert("type".to_string(), "TRACKING_ACTIVE".to_string());
        assert_eq!(route_for(&data), Route::LiveMap { event_id: Some(9) });
    }

    #[test]
    fn unknown_type_routes_home() {
        let mut data = BTreeMap::new();
        data.insert("type".to_string(), "PROMO".to_string());
        assert_eq!(route_for(&data), Route::Home);
        assert_eq!(route_for(&BTreeMap::new()), Route::Home);
    }

    #[test]
    fn channels() {
        assert_eq!(
            NotificationType::PanicMode.channel(),
            NotificationChannel::SosAlerts
        );
        assert_eq!(
            NotificationType::EvidenceCollection.channel(),
            NotificationChannel::LocationTracking
        );
        assert!(NotificationType::SosEvent.is_critical());
        assert!(!NotificationType::SafetyStatus.is_critical());
    }

    #[test]
    fn empty_voice_url_is_ignored() {
        let mut data = sos_payload().to_data(NotificationType::SosEvent);
        data.insert("voice_message_url".to_string(), String::new());
        let parsed = SosAlertPayload::from_data(&data).unwrap();
        assert_eq!(parsed.voice_message_url, None);
    }
}
