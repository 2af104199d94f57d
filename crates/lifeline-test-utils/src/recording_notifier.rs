// SPDX-FileCopyrightText: 2026 Lifeline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Notifier that captures dispatched notifications for assertions.

use std::sync::Arc;

use async_trait::async_trait;
use lifeline_core::notification::PushNotification;
use lifeline_core::{LifelineError, Notifier};
use tokio::sync::Mutex;

#[derive(Clone, Default)]
pub struct RecordingNotifier {
    sent: Arc<Mutex<Vec<PushNotification>>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything dispatched so far, in order.
    pub async fn sent(&self) -> Vec<PushNotification> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn dispatch(&self, notification: PushNotification) -> Result<(), LifelineError> {
        self.sent.lock().await.push(notification);
        Ok(())
    }
}
