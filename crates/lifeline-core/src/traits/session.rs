// SPDX-FileCopyrightText: 2026 Lifeline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Identity/session collaborator. Token issuance happens elsewhere.

use async_trait::async_trait;
use secrecy::SecretString;

use crate::error::LifelineError;

/// The main process's view of the signed-in session.
#[async_trait]
pub trait SessionProvider: Send + Sync + 'static {
    /// The token the main process currently uses for its own calls.
    async fn access_token(&self) -> Option<SecretString>;

    /// Refresh the token if it has expired. Returns the token to mirror,
    /// or `None` when signed out.
    async fn refresh_if_expired(&self) -> Result<Option<SecretString>, LifelineError>;
}
