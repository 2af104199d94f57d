// SPDX-FileCopyrightText: 2026 Lifeline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock ingestion client for deterministic relay tests.
//!
//! `MockIngestion` implements `IngestionClient` with a scripted queue of
//! outcomes. When the queue is empty every submit is acknowledged, and
//! repeated submits of one trigger get the same server event id, like the
//! real endpoint.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use lifeline_core::{DeliveryError, FailureKind, IngestionAck, IngestionClient, TriggerEvent};
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::Mutex;
use tokio::time::Instant;
use uuid::Uuid;

/// One recorded call to [`MockIngestion::submit`](IngestionClient::submit).
#[derive(Debug, Clone)]
pub struct SubmitCall {
    /// Tokio clock reading at call time (advances under paused time).
    pub at: Instant,
    pub base_url: String,
    pub token: String,
    pub event: TriggerEvent,
}

#[derive(Default)]
struct State {
    script: VecDeque<Result<IngestionAck, DeliveryError>>,
    calls: Vec<SubmitCall>,
    ids: HashMap<Uuid, i64>,
    next_id: i64,
}

/// A scripted ingestion client.
#[derive(Clone, Default)]
pub struct MockIngestion {
    state: Arc<Mutex<State>>,
}

impl MockIngestion {
    /// Create a client that acknowledges everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a client that fails with `kind` `n` times, then acknowledges.
    pub fn failing(kind: FailureKind, n: usize) -> Self {
        let script = (0..n)
            .map(|i| Err(DeliveryError::new(kind, format!("scripted failure {}", i + 1))))
            .collect();
        Self {
            state: Arc::new(Mutex::new(State {
                script,
                ..State::default()
            })),
        }
    }

    /// Append a scripted failure.
    pub async fn push_failure(&self, kind: FailureKind, message: &str) {
        self.state
            .lock()
            .await
            .script
            .push_back(Err(DeliveryError::new(kind, message)));
    }

    /// Append a scripted acknowledgment with a fixed server event id.
    pub async fn push_ack(&self, server_event_id: i64) {
        self.state
            .lock()
            .await
            .script
            .push_back(Ok(IngestionAck { server_event_id }));
    }

    /// Every call made so far, in order.
    pub async fn calls(&self) -> Vec<SubmitCall> {
        self.state.lock().await.calls.clone()
    }

    /// Number of calls made so far.
    pub async fn call_count(&self) -> usize {
        self.state.lock().await.calls.len()
    }
}

#[async_trait]
impl IngestionClient for MockIngestion {
    async fn submit(
        &self,
        base_url: &str,
        access_token: &SecretString,
        event: &TriggerEvent,
    ) -> Result<IngestionAck, DeliveryError> {
        let mut state = self.state.lock().await;
        state.calls.push(SubmitCall {
            at: Instant::now(),
            base_url: base_url.to_string(),
            token: access_token.expose_secret().to_string(),
            event: event.clone(),
        });

        match state.script.pop_front() {
            Some(scripted) => {
                if let Ok(ack) = &scripted {
                    state.ids.insert(event.trigger_id, ack.server_event_id);
                }
                scripted
            }
            None => {
                if let Some(id) = state.ids.get(&event.trigger_id) {
                    return Ok(IngestionAck {
                        server_event_id: *id,
                    });
                }
                state.next_id += 1;
                let id = state.next_id;
                state.ids.insert(event.trigger_id, id);
                Ok(IngestionAck {
                    server_event_id: id,
                })
            }
        }
    }
}
