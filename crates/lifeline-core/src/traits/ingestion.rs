// SPDX-FileCopyrightText: 2026 Lifeline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Client side of the SOS event-ingestion endpoint.

use async_trait::async_trait;
use secrecy::SecretString;

use crate::error::DeliveryError;
use crate::types::{IngestionAck, TriggerEvent};

/// Sends one trigger event to the backend.
///
/// Implementations perform exactly one request per call and classify the
/// outcome into a [`DeliveryError`]; retry and bookkeeping belong to the relay.
#[async_trait]
pub trait IngestionClient: Send + Sync + 'static {
    async fn submit(
        &self,
        base_url: &str,
        access_token: &SecretString,
        event: &TriggerEvent,
    ) -> Result<IngestionAck, DeliveryError>;
}
