// SPDX-FileCopyrightText: 2026 Lifeline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Push notification fan-out collaborator.

use async_trait::async_trait;

use crate::error::LifelineError;
use crate::notification::PushNotification;

/// Hands notifications to a pub/sub push transport.
#[async_trait]
pub trait Notifier: Send + Sync + 'static {
    async fn dispatch(&self, notification: PushNotification) -> Result<(), LifelineError>;
}
