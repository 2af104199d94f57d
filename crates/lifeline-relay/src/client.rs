// SPDX-FileCopyrightText: 2026 Lifeline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP client for the SOS ingestion endpoint.
//!
//! Provides [`HttpIngestionClient`], which posts one trigger event per call
//! and classifies the result into the delivery failure taxonomy. It never
//! retries on its own; the relay owns the retry schedule.

use std::time::Duration;

use async_trait::async_trait;
use lifeline_core::{
    DeliveryError, FailureKind, IngestionAck, IngestionClient, LifelineError, TriggerEvent,
};
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use tracing::debug;

/// Path of the ingestion endpoint relative to the backend base URL.
pub const INGESTION_PATH: &str = "/sos/events";

/// reqwest-backed [`IngestionClient`].
#[derive(Debug, Clone)]
pub struct HttpIngestionClient {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpIngestionClient {
    /// Creates a client whose every request is bounded by `timeout`.
    pub fn new(timeout: Duration) -> Result<Self, LifelineError> {
        let client = reqwest::Client::builder()
            .connect_timeout(timeout)
            .user_agent(concat!("lifeline/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| LifelineError::Http {
                message: format!("failed to build HTTP client: {e}"),
                source: Some(Box::new(e)),
            })?;
        Ok(Self { client, timeout })
    }
}

#[async_trait]
impl IngestionClient for HttpIngestionClient {
    async fn submit(
        &self,
        base_url: &str,
        access_token: &SecretString,
        event: &TriggerEvent,
    ) -> Result<IngestionAck, DeliveryError> {
        let url = format!("{}{INGESTION_PATH}", base_url.trim_end_matches('/'));

        let response = self
            .client
            .post(&url)
            .bearer_auth(access_token.expose_secret())
            .timeout(self.timeout)
            .json(event)
            .send()
            .await
            .map_err(|e| {
                let message = if e.is_timeout() {
                    format!("request timed out after {:?}", self.timeout)
                } else {
                    format!("HTTP request failed: {e}")
                };
                DeliveryError::new(FailureKind::NetworkUnavailable, message)
            })?;

        let status = response.status();
        debug!(status = %status, trigger_id = %event.trigger_id, "ingestion response received");

        let body = response.text().await.map_err(|e| {
            DeliveryError::new(
                FailureKind::NetworkUnavailable,
                format!("failed to read response body: {e}"),
            )
        })?;

        if status.is_success() {
            return serde_json::from_str::<IngestionAck>(&body).map_err(|e| {
                DeliveryError::new(
                    FailureKind::MalformedResponse,
                    format!("failed to parse acknowledgment: {e}"),
                )
            });
        }

        Err(DeliveryError::new(
            classify_status(status),
            format!("endpoint returned {status}: {}", truncate(&body, 200)),
        ))
    }
}

/// Maps a non-success status to a failure kind.
pub fn classify_status(status: StatusCode) -> FailureKind {
    match status.as_u16() {
        401 => FailureKind::Unauthorized,
        408 | 429 => FailureKind::ServerError,
        500..=599 => FailureKind::ServerError,
        _ => FailureKind::ServerRejected,
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
