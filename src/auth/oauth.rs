//! OAuth authorization-code exchange.
//!
//! Builds provider authorize URLs and turns the redirect callback into a
//! stored credential. The handler never renders UI: every outcome collapses
//! into a [`RedirectIntent`] with a machine-readable tag that the outer
//! boundary turns into a redirect.

use std::sync::Arc;

use serde::Deserialize;
use url::Url;
use uuid::Uuid;

use super::{AuthError, Result};
use crate::config::OAuthClientSettings;
use crate::domain::{Credential, OwnerId, Provider};
use crate::storage::{CredentialStore, OwnerStore};

const GOOGLE_AUTHORIZE_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const MICROSOFT_AUTHORIZE_URL: &str =
    "https://login.microsoftonline.com/common/oauth2/v2.0/authorize";
const GOOGLE_PROFILE_URL: &str = "https://gmail.googleapis.com/gmail/v1/users/me/profile";
const MICROSOFT_PROFILE_URL: &str = "https://graph.microsoft.com/v1.0/me";

const GOOGLE_SCOPES: &str =
    "https://www.googleapis.com/auth/gmail.readonly https://www.googleapis.com/auth/userinfo.email";
const MICROSOFT_SCOPES: &str = "offline_access https://graph.microsoft.com/Mail.Read \
     https://graph.microsoft.com/User.Read";

/// Query parameters of the OAuth redirect callback.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

/// Terminal result of a callback, consumed by the redirect boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RedirectIntent {
    /// Credential stored; the boundary redirects to the connected view.
    Success { provider: Provider, email: String },
    /// Exchange failed; `tag` is stable and machine-readable.
    Failure { tag: &'static str },
}

impl RedirectIntent {
    fn failure(tag: &'static str) -> Self {
        RedirectIntent::Failure { tag }
    }
}

/// Maps an exchange error onto its redirect tag.
fn failure_tag(err: &AuthError) -> &'static str {
    match err {
        AuthError::InvalidState => "invalid_state",
        AuthError::TokenExchange { .. } | AuthError::Http(_) | AuthError::CredentialExpired => {
            "token_exchange_failed"
        }
        AuthError::ProfileFetch(_) => "profile_fetch_failed",
        AuthError::OwnerNotFound(_) => "owner_not_found",
        AuthError::Store(_) => "storage_failed",
    }
}

/// Code-exchange token endpoint response.
#[derive(Debug, Deserialize)]
struct ExchangeTokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
}

/// Gmail profile response.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GmailProfile {
    email_address: Option<String>,
}

/// Graph `/me` response.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphProfile {
    mail: Option<String>,
    user_principal_name: Option<String>,
}

/// Completes OAuth flows for Google and Microsoft mailboxes.
pub struct OAuthExchange {
    client: reqwest::Client,
    google: OAuthClientSettings,
    microsoft: OAuthClientSettings,
    credentials: Arc<dyn CredentialStore>,
    owners: Arc<dyn OwnerStore>,
    google_token_url: String,
    microsoft_token_url: String,
    google_profile_url: String,
    microsoft_profile_url: String,
}

impl OAuthExchange {
    pub fn new(
        client: reqwest::Client,
        google: OAuthClientSettings,
        microsoft: OAuthClientSettings,
        credentials: Arc<dyn CredentialStore>,
        owners: Arc<dyn OwnerStore>,
    ) -> Self {
        Self {
            client,
            google,
            microsoft,
            credentials,
            owners,
            google_token_url: super::tokens::GOOGLE_TOKEN_URL.to_string(),
            microsoft_token_url: super::tokens::MICROSOFT_TOKEN_URL.to_string(),
            google_profile_url: GOOGLE_PROFILE_URL.to_string(),
            microsoft_profile_url: MICROSOFT_PROFILE_URL.to_string(),
        }
    }

    /// Overrides provider endpoints (for tests).
    pub fn with_endpoints(
        mut self,
        token_url: impl Into<String>,
        profile_url: impl Into<String>,
    ) -> Self {
        let token_url = token_url.into();
        let profile_url = profile_url.into();
        self.google_token_url = token_url.clone();
        self.microsoft_token_url = token_url;
        self.google_profile_url = profile_url.clone();
        self.microsoft_profile_url = profile_url;
        self
    }

    /// Generates an unguessable state value for a new flow.
    pub fn generate_state() -> String {
        Uuid::new_v4().to_string()
    }

    /// Builds the provider authorize URL for a new flow.
    ///
    /// Google gets `access_type=offline` and `prompt=consent` so a refresh
    /// token is granted even on re-authorization.
    pub fn authorize_url(&self, provider: Provider, state: &str) -> Option<Url> {
        let (base, settings, scopes) = match provider {
            Provider::Google => (GOOGLE_AUTHORIZE_URL, &self.google, GOOGLE_SCOPES),
            Provider::Microsoft => (MICROSOFT_AUTHORIZE_URL, &self.microsoft, MICROSOFT_SCOPES),
            Provider::Imap => return None,
        };

        let mut url = Url::parse(base).ok()?;
        url.query_pairs_mut()
            .append_pair("client_id", &settings.client_id)
            .append_pair("redirect_uri", &settings.redirect_uri)
            .append_pair("response_type", "code")
            .append_pair("scope", scopes)
            .append_pair("state", state);

        if provider == Provider::Google {
            url.query_pairs_mut()
                .append_pair("access_type", "offline")
                .append_pair("prompt", "consent");
        }

        Some(url)
    }

    /// Handles the OAuth redirect callback end to end.
    ///
    /// Callback parameters are validated before anything touches the
    /// network: a provider `error`, missing parameters, or a state mismatch
    /// all resolve without a single token call.
    pub async fn handle_callback(
        &self,
        provider: Provider,
        owner_id: &OwnerId,
        expected_state: &str,
        params: &CallbackParams,
    ) -> RedirectIntent {
        if params.error.is_some() {
            tracing::info!(provider = %provider, "user denied OAuth consent");
            return RedirectIntent::failure("provider_denied");
        }

        let (Some(code), Some(state)) = (params.code.as_deref(), params.state.as_deref()) else {
            return RedirectIntent::failure("missing_code");
        };

        if state != expected_state {
            tracing::warn!(provider = %provider, "OAuth state mismatch");
            return RedirectIntent::failure("invalid_state");
        }

        match self.complete_exchange(provider, owner_id, code).await {
            Ok(credential) => {
                tracing::info!(
                    provider = %provider,
                    email = %credential.email,
                    "mailbox connected"
                );
                RedirectIntent::Success {
                    provider,
                    email: credential.email,
                }
            }
            Err(e) => {
                tracing::warn!(provider = %provider, error = %e, "OAuth exchange failed");
                RedirectIntent::failure(failure_tag(&e))
            }
        }
    }

    /// Exchanges the authorization code and stores the resulting credential.
    async fn complete_exchange(
        &self,
        provider: Provider,
        owner_id: &OwnerId,
        code: &str,
    ) -> Result<Credential> {
        // Microsoft flows must not leave a credential behind for an unknown
        // owner, so the owner check happens before any provider call.
        if provider == Provider::Microsoft && !self.owners.exists(owner_id).await? {
            return Err(AuthError::OwnerNotFound(owner_id.clone()));
        }

        let tokens = self.exchange_code(provider, code).await?;
        let email = self.fetch_profile_email(provider, &tokens.access_token).await?;

        let expires_at = tokens
            .expires_in
            .map(|secs| chrono::Utc::now() + chrono::Duration::seconds(secs));

        let credential = Credential::oauth(
            owner_id.clone(),
            provider,
            email,
            tokens.access_token,
            tokens.refresh_token,
            expires_at,
        );
        self.credentials.upsert(&credential).await?;
        Ok(credential)
    }

    async fn exchange_code(&self, provider: Provider, code: &str) -> Result<ExchangeTokenResponse> {
        let (url, settings) = match provider {
            Provider::Google => (&self.google_token_url, &self.google),
            Provider::Microsoft => (&self.microsoft_token_url, &self.microsoft),
            Provider::Imap => return Err(AuthError::InvalidState),
        };

        let params = [
            ("client_id", settings.client_id.as_str()),
            ("client_secret", settings.client_secret.as_str()),
            ("code", code),
            ("redirect_uri", settings.redirect_uri.as_str()),
            ("grant_type", "authorization_code"),
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

        Ok(response.json().await?)
    }

    /// Fetches the mailbox address the tokens belong to.
    async fn fetch_profile_email(&self, provider: Provider, access_token: &str) -> Result<String> {
        let url = match provider {
            Provider::Google => &self.google_profile_url,
            Provider::Microsoft => &self.microsoft_profile_url,
            Provider::Imap => return Err(AuthError::ProfileFetch("no profile for imap".into())),
        };

        let response = self
            .client
            .get(url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| AuthError::ProfileFetch(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AuthError::ProfileFetch(format!("HTTP {status}")));
        }

        let email = match provider {
            Provider::Google => {
                let profile: GmailProfile = response
                    .json()
                    .await
                    .map_err(|e| AuthError::ProfileFetch(e.to_string()))?;
                profile.email_address
            }
            Provider::Microsoft => {
                let profile: GraphProfile = response
                    .json()
                    .await
                    .map_err(|e| AuthError::ProfileFetch(e.to_string()))?;
                profile.mail.or(profile.user_principal_name)
            }
            Provider::Imap => None,
        };

        email.ok_or_else(|| AuthError::ProfileFetch("profile carries no address".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CredentialId, Owner};
    use crate::storage::{StoreError, StoreResult};
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MockCredentialStore {
        upserted: Mutex<Vec<Credential>>,
    }

    #[async_trait]
    impl CredentialStore for MockCredentialStore {
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

        async fn get(&self, _owner_id: &OwnerId, id: &CredentialId) -> StoreResult<Credential> {
            Err(StoreError::NotFound(id.to_string()))
        }

        async fn delete(&self, _owner_id: &OwnerId, _id: &CredentialId) -> StoreResult<()> {
            Ok(())
        }
    }

    struct MockOwnerStore {
        exists: bool,
    }

    #[async_trait]
    impl OwnerStore for MockOwnerStore {
        async fn exists(&self, _owner_id: &OwnerId) -> StoreResult<bool> {
            Ok(self.exists)
        }

        async fn get(&self, _owner_id: &OwnerId) -> StoreResult<Option<Owner>> {
            Ok(None)
        }

        async fn insert(&self, _owner: &Owner) -> StoreResult<()> {
            Ok(())
        }
    }

    fn exchange(owner_exists: bool) -> OAuthExchange {
        let settings = OAuthClientSettings {
            client_id: "client".to_string(),
            client_secret: "secret".to_string(),
            redirect_uri: "https://app.example.com/callback".to_string(),
        };
        OAuthExchange::new(
            reqwest::Client::new(),
            settings.clone(),
            settings,
            Arc::new(MockCredentialStore::default()),
            Arc::new(MockOwnerStore {
                exists: owner_exists,
            }),
        )
    }

    fn callback(code: Option<&str>, state: Option<&str>, error: Option<&str>) -> CallbackParams {
        CallbackParams {
            code: code.map(String::from),
            state: state.map(String::from),
            error: error.map(String::from),
        }
    }

    #[test]
    fn google_authorize_url_requests_offline_access() {
        let url = exchange(true)
            .authorize_url(Provider::Google, "state-1")
            .unwrap();
        let query: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();

        assert!(query.contains(&("access_type".to_string(), "offline".to_string())));
        assert!(query.contains(&("prompt".to_string(), "consent".to_string())));
        assert!(query.contains(&("state".to_string(), "state-1".to_string())));
        assert!(query.contains(&("response_type".to_string(), "code".to_string())));
    }

    #[test]
    fn microsoft_authorize_url_omits_google_extras() {
        let url = exchange(true)
            .authorize_url(Provider::Microsoft, "state-1")
            .unwrap();
        assert!(!url.query().unwrap_or_default().contains("access_type"));
    }

    #[test]
    fn imap_has_no_authorize_url() {
        assert!(exchange(true).authorize_url(Provider::Imap, "s").is_none());
    }

    #[tokio::test]
    async fn state_mismatch_short_circuits_before_any_token_call() {
        let ex = exchange(true);
        let owner = OwnerId::generate();

        let intent = ex
            .handle_callback(
                Provider::Google,
                &owner,
                "expected-state",
                &callback(Some("code"), Some("wrong-state"), None),
            )
            .await;

        // A token call would surface as token_exchange_failed; the tag proves
        // validation happened first.
        assert_eq!(intent, RedirectIntent::failure("invalid_state"));
    }

    #[tokio::test]
    async fn provider_error_maps_to_provider_denied() {
        let ex = exchange(true);
        let owner = OwnerId::generate();

        let intent = ex
            .handle_callback(
                Provider::Google,
                &owner,
                "s",
                &callback(Some("code"), Some("s"), Some("access_denied")),
            )
            .await;
        assert_eq!(intent, RedirectIntent::failure("provider_denied"));
    }

    #[tokio::test]
    async fn missing_code_or_state_maps_to_missing_code() {
        let ex = exchange(true);
        let owner = OwnerId::generate();

        let intent = ex
            .handle_callback(Provider::Google, &owner, "s", &callback(None, Some("s"), None))
            .await;
        assert_eq!(intent, RedirectIntent::failure("missing_code"));

        let intent = ex
            .handle_callback(Provider::Google, &owner, "s", &callback(Some("c"), None, None))
            .await;
        assert_eq!(intent, RedirectIntent::failure("missing_code"));
    }

    #[tokio::test]
    async fn microsoft_unknown_owner_maps_to_owner_not_found() {
        let ex = exchange(false);
        let owner = OwnerId::generate();

        let intent = ex
            .handle_callback(
                Provider::Microsoft,
                &owner,
                "s",
                &callback(Some("code"), Some("s"), None),
            )
            .await;
        assert_eq!(intent, RedirectIntent::failure("owner_not_found"));
    }

    #[test]
    fn failure_tags_are_distinct_per_cause() {
        assert_eq!(failure_tag(&AuthError::InvalidState), "invalid_state");
        assert_eq!(
            failure_tag(&AuthError::TokenExchange {
                status: 400,
                body: String::new()
            }),
            "token_exchange_failed"
        );
        assert_eq!(
            failure_tag(&AuthError::ProfileFetch(String::new())),
            "profile_fetch_failed"
        );
        assert_eq!(
            failure_tag(&AuthError::OwnerNotFound(OwnerId::generate())),
            "owner_not_found"
        );
        assert_eq!(
            failure_tag(&AuthError::Store(StoreError::NotFound(String::new()))),
            "storage_failed"
        );
    }
}
