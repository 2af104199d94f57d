// SPDX-FileCopyrightText: 2026 Lifeline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `lifeline login` and `lifeline logout`.
//!
//! Login mirrors a token issued elsewhere into the shared store; it does not
//! authenticate anyone. Logout clears it, after which every trigger fails
//! closed with a local alert.

use lifeline_config::LifelineConfig;
use lifeline_core::LifelineError;
use lifeline_relay::CredentialCache;
use secrecy::SecretString;
use tracing::info;

pub async fn run_login(
    config: &LifelineConfig,
    token: String,
    base_url: &str,
) -> Result<(), LifelineError> {
    let db = crate::open_store(config).await?;
    let cache = CredentialCache::new(db.clone());
    login(&cache, SecretString::from(token), base_url).await?;
    db.close().await?;
    println!("Signed in; background delivery will use {base_url}");
    Ok(())
}

pub async fn run_logout(config: &LifelineConfig) -> Result<(), LifelineError> {
    let db = crate::open_store(config).await?;
    CredentialCache::new(db.clone()).clear().await?;
    db.close().await?;
    info!("credential cleared");
    println!("Signed out; triggers will raise a local alert only");
    Ok(())
}

async fn login(
    cache: &CredentialCache,
    token: SecretString,
    base_url: &str,
) -> Result<(), LifelineError> {
    let base_url = base_url.trim();
    if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
        return Err(LifelineError::Credential(format!(
            "backend base URL must start with http:// or https://, got '{base_url}'"
        )));
    }
    cache.set(&token, base_url).await?;
    info!(base_url, "credential mirrored");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use lifeline_test_utils::TestStore;
    use secrecy::ExposeSecret;

    fn secret(s: &str) -> SecretString {
        SecretString::from(s.to_string())
    }

    #[tokio::test]
    async fn login_stores_token_and_url() {
        let store = TestStore::new().await.unwrap();
        let cache = CredentialCache::new(store.db.clone());
        login(&cache, secret("tok"), "https://api.example/")
            .await
            .unwrap();

        let snapshot = cache.get().await.unwrap();
        let (token, url) = snapshot.usable().unwrap();
        assert_eq!(token.expose_secret(), "tok");
        assert_eq!(url, "https://api.example");
    }

    #[tokio::test]
    async fn login_rejects_non_http_url() {
        let store = TestStore::new().await.unwrap();
        let cache = CredentialCache::new(store.db.clone());
        let err = login(&cache, secret("tok"), "api.example").await.unwrap_err();
        assert!(matches!(err, LifelineError::Credential(_)));
    }

    #[tokio::test]
    async fn login_to_another_backend_is_refused() {
        let store = TestStore::new().await.unwrap();
        let cache = CredentialCache::new(store.db.clone());
        login(&cache, secret("a"), "https://one.example").await.unwrap();
        assert!(login(&cache, secret("b"), "https://two.example").await.is_err());
    }
}
