// SPDX-FileCopyrightText: 2026 Lifeline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Credential cache shared by the main process and the background worker.
//!
//! The main process owns the access token and mirrors every change into the
//! SQLite file; the worker only reads. Every write is a committed transaction
//! before the returned future resolves, so a token stored before the process
//! is terminated is visible to the worker.

use std::str::FromStr;

use lifeline_core::{LifecycleState, LifelineError};
use lifeline_storage::queries::kv;
use lifeline_storage::{CredentialWrite, Database};
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, warn};

/// What the cache holds at one instant.
pub struct CredentialSnapshot {
    pub access_token: Option<SecretString>,
    pub backend_base_url: Option<String>,
    /// Last lifecycle state reported by the main process.
    pub lifecycle: Option<LifecycleState>,
}

impl CredentialSnapshot {
    /// Token and base URL, if both are present. Delivery needs both.
    pub fn usable(&self) -> Option<(&SecretString, &str)> {
        match (&self.access_token, &self.backend_base_url) {
            (Some(token), Some(url)) if !token.expose_secret().is_empty() => {
                Some((token, url.as_str()))
            }
            _ => None,
        }
    }

    /// Lifecycle state, defaulting to `Foreground` for a fresh install.
    pub fn lifecycle_or_default(&self) -> LifecycleState {
        self.lifecycle.unwrap_or(LifecycleState::Foreground)
    }
}

impl std::fmt::Debug for CredentialSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialSnapshot")
            .field(
                "access_token",
                &self.access_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("backend_base_url", &self.backend_base_url)
            .field("lifecycle", &self.lifecycle)
            .finish()
    }
}

/// Durable credential store. Cheap to clone.
#[derive(Debug, Clone)]
pub struct CredentialCache {
    db: Database,
}

impl CredentialCache {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Store token and base URL.
    ///
    /// The base URL is constant once set; a different one is rejected with
    /// [`LifelineError::Credential`] until [`clear`](Self::clear) runs.
    pub async fn set(&self, token: &SecretString, base_url: &str) -> Result<(), LifelineError> {
        let base_url = base_url.trim_end_matches('/');
        if base_url.is_empty() {
            return Err(LifelineError::Credential("base URL must not be empty".into()));
        }
        match kv::store_credential(&self.db, token.expose_secret(), base_url).await? {
            CredentialWrite::Stored => {
                debug!(base_url, "credential stored");
                Ok(())
            }
            CredentialWrite::BaseUrlConflict { existing } => Err(LifelineError::Credential(
                format!("base URL already set to {existing}; clear the credential first"),
            )),
        }
    }

    /// Re-mirror a refreshed token, keeping the stored base URL.
    pub async fn mirror_token(&self, token: &SecretString) -> Result<(), LifelineError> {
        let stored = kv::load_credential(&self.db).await?;
        let Some(base_url) = stored.backend_base_url else {
            return Err(LifelineError::Credential(
                "cannot mirror a token before a base URL is set".into(),
            ));
        };
        self.set(token, &base_url).await
    }

    /// Read the current snapshot.
    pub async fn get(&self) -> Result<CredentialSnapshot, LifelineError> {
        let stored = kv::load_credential(&self.db).await?;
        Ok(CredentialSnapshot {
            access_token: stored.access_token.map(SecretString::from),
            backend_base_url: stored.backend_base_url,
            lifecycle: stored.lifecycle_state.as_deref().and_then(parse_lifecycle),
        })
    }

    /// Remove token and base URL.
    pub async fn clear(&self) -> Result<(), LifelineError> {
        kv::clear_credential(&self.db).await?;
        debug!("credential cleared");
        Ok(())
    }

    /// Write the colocated lifecycle field.
    pub async fn set_lifecycle(&self, state: LifecycleState) -> Result<(), LifelineError> {
        kv::set(&self.db, kv::APP_LIFECYCLE_STATE, &state.to_string()).await
    }

    /// Read the colocated lifecycle field.
    pub async fn lifecycle(&self) -> Result<Option<LifecycleState>, LifelineError> {
        let raw = kv::get(&self.db, kv::APP_LIFECYCLE_STATE).await?;
        Ok(raw.as_deref().and_then(parse_lifecycle))
    }
}

fn parse_lifecycle(raw: &str) -> Option<LifecycleState> {
    match LifecycleState::from_str(raw) {
        Ok(state) => Some(state),
        Err(_) => {
            warn!(value = raw, "ignoring unrecognized stored lifecycle state");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lifeline_test_utils::TestStore;

    fn secret(s: &str) -> SecretString {
        SecretString::from(s.to_string())
    }

    #[tokio::test]
    async fn empty_cache_is_not_usable() {
        let store = TestStore::new().await.unwrap();
        let cache = CredentialCache::new(store.db.clone());

        let snapshot = cache.get().await.unwrap();
        assert!(snapshot.usable().is_none());
        assert_eq!(snapshot.lifecycle_or_default(), LifecycleState::Foreground);
    }

    #[tokio::test]
    async fn set_get_clear() {
        let store = TestStore::new().await.unwrap();
        let cache = CredentialCache::new(store.db.clone());

        cache.set(&secret("tok-1"), "https://api.example/").await.unwrap();
        let snapshot = cache.get().await.unwrap();
        let (token, url) = snapshot.usable().unwrap();
        assert_eq!(token.expose_secret(), "tok-1");
        assert_eq!(url, "https://api.example", "trailing slash trimmed");

        cache.clear().await.unwrap();
        assert!(cache.get().await.unwrap().usable().is_none());
    }

    #[tokio::test]
    async fn base_url_is_fixed_until_clear() {
        let store = TestStore::new().await.unwrap();
        let cache = CredentialCache::new(store.db.clone());

        cache.set(&secret("a"), "https://one.example").await.unwrap();
        let err = cache
            .set(&secret("b"), "https://two.example")
            .await
            .unwrap_err();
        assert!(matches!(err, LifelineError::Credential(_)));

        cache.mirror_token(&secret("c")).await.unwrap();
        let snapshot = cache.get().await.unwrap();
        assert_eq!(snapshot.access_token.unwrap().expose_secret(), "c");
        assert_eq!(snapshot.backend_base_url.as_deref(), Some("https://one.example"));
    }

    #[tokio::test]
    async fn mirror_without_base_url_fails() {
        let store = TestStore::new().await.unwrap();
        let cache = CredentialCache::new(store.db.clone());
        assert!(cache.mirror_token(&secret("x")).await.is_err());
    }

    #[tokio::test]
    async fn writes_are_visible_to_another_connection() {
        let store = TestStore::new().await.unwrap();
        let main = CredentialCache::new(store.db.clone());
        let worker = CredentialCache::new(store.open_second().await.unwrap());

        main.set(&secret("tok"), "https://api.example").await.unwrap();
        main.set_lifecycle(LifecycleState::Terminated).await.unwrap();

        let seen = worker.get().await.unwrap();
        assert!(seen.usable().is_some());
        assert_eq!(seen.lifecycle, Some(LifecycleState::Terminated));
        assert_eq!(
            worker.lifecycle().await.unwrap(),
            Some(LifecycleState::Terminated)
        );
    }

    #[test]
    fn debug_redacts_token() {
        let snapshot = CredentialSnapshot {
            access_token: Some(secret("super-secret")),
            backend_base_url: Some("https://api.example".into()),
            lifecycle: None,
        };
        let rendered = format!("{snapshot:?}");
        assert!(!rendered.contains("super-secret"));
        assert!(rendered.contains("REDACTED"));
    }
}
