// SPDX-FileCopyrightText: 2026 Lifeline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP request handlers for the ingestion endpoint.
//!
//! Handles POST /sos/events and GET /health.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Extension, Json,
};
use chrono::Utc;
use lifeline_core::types::MAX_EVENT_TYPE_LEN;
use lifeline_core::{IngestionAck, TriggerEvent};
use lifeline_storage::queries::events;
use serde::Serialize;

use crate::auth::Principal;
use crate::notify;
use crate::server::GatewayState;

/// Response body for GET /health.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
}

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn error(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
        .into_response()
}

/// Semantic checks the JSON shape cannot express.
pub fn validate(event: &TriggerEvent) -> Result<(), String> {
    if let Some(location) = &event.location {
        if !location.is_valid() {
            return Err(format!(
                "location out of range: ({}, {})",
                location.latitude, location.longitude
            ));
        }
    }
    if let Some(event_type) = &event.event_type {
        if event_type.trim().is_empty() {
            return Err("eventType must not be empty".to_string());
        }
        if event_type.len() > MAX_EVENT_TYPE_LEN {
            return Err(format!(
                "eventType longer than {MAX_EVENT_TYPE_LEN} bytes"
            ));
        }
    }
    Ok(())
}

/// POST /sos/events
///
/// Persists the event once per `triggerId`: `201` with a new
/// `serverEventId`, or `200` with the original one on replay. Only new
/// events fan out notifications.
pub async fn post_sos_event(
    State(state): State<GatewayState>,
    Extension(Principal(principal)): Extension<Principal>,
    Json(event): Json<TriggerEvent>,
) -> Response {
    if let Err(message) = validate(&event) {
        tracing::debug!(trigger_id = %event.trigger_id, %message, "rejected SOS event");
        return error(StatusCode::BAD_REQUEST, message);
    }

    let outcome = match events::ingest(&state.db, &principal, &event, Utc::now()).await {
        Ok(outcome) => outcome,
        Err(e) => {
            tracing::error!(trigger_id = %event.trigger_id, error = %e, "failed to persist SOS event");
            return error(StatusCode::INTERNAL_SERVER_ERROR, "storage unavailable");
        }
    };

    let ack = IngestionAck {
        server_event_id: outcome.server_event_id,
    };
    if !outcome.created {
        tracing::info!(
            trigger_id = %event.trigger_id,
            server_event_id = ack.server_event_id,
            "duplicate SOS event; returning original id"
        );
        return (StatusCode::OK, Json(ack)).into_response();
    }

    tracing::info!(
        trigger_id = %event.trigger_id,
        server_event_id = ack.server_event_id,
        principal = principal.as_str(),
        kind = %event.kind,
        lifecycle = %event.lifecycle_state_at_detection,
        "SOS event stored"
    );
    let notifications = notify::notifications_for(&principal, ack.server_event_id, &event);
    notify::fan_out(state.notifier.as_ref(), notifications).await;

    (StatusCode::CREATED, Json(ack)).into_response()
}

/// GET /health
pub async fn get_health(State(state): State<GatewayState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.started.elapsed().as_secs(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use lifeline_core::{GeoPoint, LifecycleState, TriggerKind};

    fn event() -> TriggerEvent {
        TriggerEvent::new(TriggerKind::Manual, LifecycleState::Foreground, None)
    }

    #[test]
    fn plain_event_is_valid() {
        assert!(validate(&event()).is_ok());
    }

    #[test]
    fn out_of_range_location_is_invalid() {
        let mut ev = event();
        ev.location = Some(GeoPoint::new(91.0, 0.0));
        assert!(validate(&ev).unwrap_err().contains("out of range"));
    }

    #[test]
    fn blank_or_long_event_type_is_invalid() {
        assert!(validate(&event().with_event_type("  ")).is_err());
        assert!(validate(&event().with_event_type("x".repeat(65))).is_err());
        assert!(validate(&event().with_event_type("double_shake")).is_ok());
    }

    #[test]
    fn health_response_serializes() {
        let resp = HealthResponse {
            status: "ok".to_string(),
            version: "0.1.0".to_string(),
            uptime_secs: 42,
        };
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("\"status\":\"ok\""));
        assert!(json.contains("\"uptime_secs\":42"));
    }
}
