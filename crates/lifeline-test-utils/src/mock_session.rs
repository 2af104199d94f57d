// SPDX-FileCopyrightText: 2026 Lifeline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Session provider with a settable token.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use lifeline_core::{LifelineError, SessionProvider};
use secrecy::SecretString;
use tokio::sync::Mutex;

/// A session provider whose current token is controlled by the test.
///
/// `refresh_if_expired` returns the token set with [`MockSession::set_refreshed`]
/// if any (and makes it current), otherwise the current token.
#[derive(Clone, Default)]
pub struct MockSession {
    current: Arc<Mutex<Option<String>>>,
    refreshed: Arc<Mutex<Option<String>>>,
    refresh_calls: Arc<AtomicUsize>,
}

impl MockSession {
    /// A signed-in session holding `token`.
    pub fn signed_in(token: &str) -> Self {
        Self {
            current: Arc::new(Mutex::new(Some(token.to_string()))),
            ..Self::default()
        }
    }

    /// A signed-out session.
    pub fn signed_out() -> Self {
        Self::default()
    }

    /// The token the next refresh will hand out.
    pub async fn set_refreshed(&self, token: &str) {
        *self.refreshed.lock().await = Some(token.to_string());
    }

    /// How many times `refresh_if_expired` ran.
    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionProvider for MockSession {
    async fn access_token(&self) -> Option<SecretString> {
        self.current.lock().await.clone().map(SecretString::from)
    }

    async fn refresh_if_expired(&self) -> Result<Option<SecretString>, LifelineError> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        let mut current = self.current.lock().await;
        if let Some(fresh) = self.refreshed.lock().await.take() {
            *current = Some(fresh);
        }
        Ok(current.clone().map(SecretString::from))
    }
}
