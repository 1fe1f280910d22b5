//! Access-token lifecycle.
//!
//! [`TokenManager::ensure_valid`] is the single gate between stored
//! credentials and provider calls: fetches never start with a token inside
//! the expiry margin. The actual refresh POST sits behind the
//! [`TokenRefresher`] trait so the manager can be tested without a network.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;

use super::{AuthError, Result};
use crate::config::OAuthClientSettings;
use crate::domain::{Credential, Provider};
use crate::storage::CredentialStore;

pub(crate) const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
pub(crate) const MICROSOFT_TOKEN_URL: &str =
    "https://login.microsoftonline.com/common/oauth2/v2.0/token";

/// Assumed lifetime when the provider omits `expires_in`.
const DEFAULT_TOKEN_LIFETIME_SECS: i64 = 3600;

/// Token material returned by a successful refresh.
pub struct RefreshedTokens {
    pub access_token: String,
    /// Present only when the provider rotated the refresh token.
    pub refresh_token: Option<String>,
    pub expires_in: Option<i64>,
}

/// Exchanges a refresh token for fresh token material.
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn refresh(&self, provider: Provider, refresh_token: &str) -> Result<RefreshedTokens>;
}

/// OAuth token endpoint response.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
}

/// Production refresher: form-encoded POST to the provider token endpoint.
pub struct HttpTokenRefresher {
    client: reqwest::Client,
    google: OAuthClientSettings,
    microsoft: OAuthClientSettings,
    google_token_url: String,
    microsoft_token_url: String,
}

impl HttpTokenRefresher {
    pub fn new(
        client: reqwest::Client,
        google: OAuthClientSettings,
        microsoft: OAuthClientSettings,
    ) -> Self {
        Self {
            client,
            google,
            microsoft,
            google_token_url: GOOGLE_TOKEN_URL.to_string(),
            microsoft_token_url: MICROSOFT_TOKEN_URL.to_string(),
        }
    }

    /// Overrides the token endpoints (for tests).
    pub fn with_token_urls(
        mut self,
        google_token_url: impl Into<String>,
        microsoft_token_url: impl Into<String>,
    ) -> Self {
        self.google_token_url = google_token_url.into();
        self.microsoft_token_url = microsoft_token_url.into();
        self
    }
}

#[async_trait]
impl TokenRefresher for HttpTokenRefresher {
    async fn refresh(&self, provider: Provider, refresh_token: &str) -> Result<RefreshedTokens> {
        let (url, settings) = match provider {
            Provider::Google => (&self.google_token_url, &self.google),
            Provider::Microsoft => (&self.microsoft_token_url, &self.microsoft),
            // App-passwords are static; nothing to refresh.
            Provider::Imap => return Err(AuthError::CredentialExpired),
        };

        let params = [
            ("client_id", settings.client_id.as_str()),
            ("client_secret", settings.client_secret.as_str()),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ];

        let response = self.client.post(url).form(&params).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::TokenExchange {
                status: status.as_u16(),
                body,
            });
        }

        let token_response: TokenResponse = response.json().await?;
        Ok(RefreshedTokens {
            access_token: token_response.access_token,
            refresh_token: token_response.refresh_token,
            expires_in: token_response.expires_in,
        })
    }
}

/// Guarantees a usable access token before any provider call.
pub struct TokenManager {
    refresher: Arc<dyn TokenRefresher>,
    store: Arc<dyn CredentialStore>,
}

impl TokenManager {
    pub fn new(refresher: Arc<dyn TokenRefresher>, store: Arc<dyn CredentialStore>) -> Self {
        Self { refresher, store }
    }

    /// Returns a credential whose access token is valid.
    ///
    /// Fresh or non-expiring credentials pass through unchanged. Expired ones
    /// are refreshed, persisted, and returned with the new token material.
    /// A credential that cannot be refreshed yields
    /// [`AuthError::CredentialExpired`]; a stale token is never returned.
    pub async fn ensure_valid(&self, credential: &Credential) -> Result<Credential> {
        if !credential.needs_refresh() {
            return Ok(credential.clone());
        }
        self.refresh_now(credential).await
    }

    /// Refreshes unconditionally, regardless of the stored expiry.
    ///
    /// Used when a provider rejects a token that still looks fresh by the
    /// clock (revocation, clock skew on the provider side).
    pub async fn refresh_now(&self, credential: &Credential) -> Result<Credential> {
        let Some(refresh_token) = credential.refresh_token.clone() else {
            tracing::warn!(
                provider = %credential.provider,
                email = %credential.email,
                "credential expired with no refresh token"
            );
            return Err(AuthError::CredentialExpired);
        };

        let tokens = match self
            .refresher
            .refresh(credential.provider, &refresh_token)
            .await
        {
            Ok(tokens) => tokens,
            Err(AuthError::TokenExchange { status, .. }) => {
                tracing::warn!(
                    provider = %credential.provider,
                    email = %credential.email,
                    status,
                    "refresh rejected by provider"
                );
                return Err(AuthError::CredentialExpired);
            }
            Err(e) => return Err(e),
        };

        let expires_at = Utc::now()
            + chrono::Duration::seconds(tokens.expires_in.unwrap_or(DEFAULT_TOKEN_LIFETIME_SECS));
        let updated = credential.clone().with_refreshed_tokens(
            tokens.access_token,
            tokens.refresh_token,
            Some(expires_at),
        );

        self.store.upsert(&updated).await?;
        tracing::info!(
            provider = %updated.provider,
            email = %updated.email,
            "access token refreshed"
        );
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CredentialId, OwnerId};
    use crate::storage::{StoreError, StoreResult};
    use std::sync::Mutex;

    /// Refresher that returns a canned result and counts calls.
    struct MockRefresher {
        result: fn() -> Result<RefreshedTokens>,
        calls: Mutex<usize>,
    }

    impl MockRefresher {
        fn succeeding() -> Self {
            Self {
                result: || {
                    Ok(RefreshedTokens {
                        access_token: "new-access".to_string(),
                        refresh_token: None,
                        expires_in: Some(3600),
                    })
                },
                calls: Mutex::new(0),
            }
        }

        fn rejecting() -> Self {
            Self {
                result: || {
                    Err(AuthError::TokenExchange {
                        status: 400,
                        body: "invalid_grant".to_string(),
                    })
                },
                calls: Mutex::new(0),
            }
        }

        fn call_count(&self) -> usize {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl TokenRefresher for MockRefresher {
        async fn refresh(
            &self,
            _provider: Provider,
            _refresh_token: &str,
        ) -> Result<RefreshedTokens> {
            *self.calls.lock().unwrap() += 1;
            (self.result)()
        }
    }

    /// Credential store that records upserts.
    #[derive(Default)]
    struct MockStore {
        upserted: Mutex<Vec<Credential>>,
    }

    #[async_trait]
    impl CredentialStore for MockStore {
        async fn upsert(&self, credential: &Credential) -> StoreResult<()> {
            self.upserted.lock().unwrap().push(credential.clone());
            Ok(())
        }

        async fn list(
            &self,
            _owner_id: &OwnerId,
            _provider: Option<Provider>,
        ) -> StoreResult<Vec<Credential>> {
            Ok(self.upserted.lock().unwrap().clone())
        }

        async fn get(
            &self,
            _owner_id: &OwnerId,
            id: &CredentialId,
        ) -> StoreResult<Credential> {
            Err(StoreError::NotFound(id.to_string()))
        }

        async fn delete(&self, _owner_id: &OwnerId, _id: &CredentialId) -> StoreResult<()> {
            Ok(())
        }
    }

    fn expired_credential(refresh_token: Option<&str>) -> Credential {
        Credential::oauth(
            OwnerId::generate(),
            Provider::Google,
            "shop@gmail.com",
            "stale-access",
            refresh_token.map(|s| s.to_string()),
            Some(Utc::now() - chrono::Duration::minutes(5)),
        )
    }

    #[tokio::test]
    async fn fresh_credential_passes_through_without_refresh() {
        let refresher = Arc::new(MockRefresher::succeeding());
        let store = Arc::new(MockStore::default());
        let manager = TokenManager::new(refresher.clone(), store.clone());

        let cred = Credential::oauth(
            OwnerId::generate(),
            Provider::Google,
            "shop@gmail.com",
            "live-access",
            Some("refresh".to_string()),
            Some(Utc::now() + chrono::Duration::hours(1)),
        );

        let out = manager.ensure_valid(&cred).await.unwrap();
        assert_eq!(out.access_token, "live-access");
        assert_eq!(refresher.call_count(), 0);
        assert!(store.upserted.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn static_credential_passes_through() {
        let refresher = Arc::new(MockRefresher::succeeding());
        let manager = TokenManager::new(refresher.clone(), Arc::new(MockStore::default()));

        let cred = Credential::imap(
            OwnerId::generate(),
            "shop@ovh.fr",
            "app-password",
            "ssl0.ovh.net",
            993,
        );
        let out = manager.ensure_valid(&cred).await.unwrap();
        assert_eq!(out.access_token, "app-password");
        assert_eq!(refresher.call_count(), 0);
    }

    #[tokio::test]
    async fn expired_credential_is_refreshed_and_persisted() {
        let refresher = Arc::new(MockRefresher::succeeding());
        let store = Arc::new(MockStore::default());
        let manager = TokenManager::new(refresher.clone(), store.clone());

        let out = manager
            .ensure_valid(&expired_credential(Some("refresh-1")))
            .await
            .unwrap();

        assert_eq!(out.access_token, "new-access");
        assert!(!out.needs_refresh());
        // Rotation did not happen, the old refresh token survives.
        assert_eq!(out.refresh_token.as_deref(), Some("refresh-1"));

        let upserted = store.upserted.lock().unwrap();
        assert_eq!(upserted.len(), 1);
        assert_eq!(upserted[0].access_token, "new-access");
    }

    #[tokio::test]
    async fn expired_without_refresh_token_fails() {
        let refresher = Arc::new(MockRefresher::succeeding());
        let manager = TokenManager::new(refresher.clone(), Arc::new(MockStore::default()));

        let result = manager.ensure_valid(&expired_credential(None)).await;
        assert!(matches!(result, Err(AuthError::CredentialExpired)));
        assert_eq!(refresher.call_count(), 0);
    }

    #[tokio::test]
    async fn rejected_refresh_becomes_credential_expired() {
        let refresher = Arc::new(MockRefresher::rejecting());
        let store = Arc::new(MockStore::default());
        let manager = TokenManager::new(refresher.clone(), store.clone());

        let result = manager
            .ensure_valid(&expired_credential(Some("refresh-1")))
            .await;
        assert!(matches!(result, Err(AuthError::CredentialExpired)));
        assert_eq!(refresher.call_count(), 1);
        assert!(store.upserted.lock().unwrap().is_empty());
    }
}
