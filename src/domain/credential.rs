//! Stored credential for one (owner, provider, mailbox) triple.
//!
//! OAuth token sets and IMAP app-passwords share one record shape. The
//! composite key (owner_id, provider, email) is unique in storage; writes
//! use upsert semantics on that key.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{CredentialId, OwnerId, Provider};

/// Safety margin applied when deciding whether a token is still usable.
///
/// A token expiring within this window is treated as already expired so a
/// fetch never starts with a token that dies mid-request.
pub const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

/// One owner's stored credential for a single connected mailbox.
#[derive(Clone, Serialize, Deserialize)]
pub struct Credential {
    /// Unique identifier for this record.
    pub id: CredentialId,
    /// Owner (tenant) this credential belongs to.
    pub owner_id: OwnerId,
    /// Provider behind the mailbox.
    pub provider: Provider,
    /// Address of the connected mailbox.
    pub email: String,
    /// OAuth access token, or the IMAP app-password.
    pub access_token: String,
    /// OAuth refresh token. Absent for IMAP (app-passwords are static) and
    /// for providers that did not grant offline access.
    pub refresh_token: Option<String>,
    /// Absolute expiry of the access token. Absent means "does not expire".
    pub expires_at: Option<DateTime<Utc>>,
    /// IMAP server hostname; present for imap credentials only.
    pub imap_host: Option<String>,
    /// IMAP server port; present for imap credentials only.
    pub imap_port: Option<u16>,
    /// When the record was first created.
    pub created_at: DateTime<Utc>,
    /// When the record was last written.
    pub updated_at: DateTime<Utc>,
}

impl Credential {
    /// Creates an OAuth credential for a freshly completed exchange.
    pub fn oauth(
        owner_id: OwnerId,
        provider: Provider,
        email: impl Into<String>,
        access_token: impl Into<String>,
        refresh_token: Option<String>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: CredentialId::generate(),
            owner_id,
            provider,
            email: email.into(),
            access_token: access_token.into(),
            refresh_token,
            expires_at,
            imap_host: None,
            imap_port: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Creates an IMAP credential from a registered app-password.
    pub fn imap(
        owner_id: OwnerId,
        email: impl Into<String>,
        app_password: impl Into<String>,
        imap_host: impl Into<String>,
        imap_port: u16,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: CredentialId::generate(),
            owner_id,
            provider: Provider::Imap,
            email: email.into(),
            access_token: app_password.into(),
            refresh_token: None,
            expires_at: None,
            imap_host: Some(imap_host.into()),
            imap_port: Some(imap_port),
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the access token is expired or expires within [`EXPIRY_MARGIN`].
    ///
    /// A credential without `expires_at` never expires.
    pub fn needs_refresh(&self) -> bool {
        self.needs_refresh_at(Utc::now())
    }

    /// Expiry check against an explicit clock, for deterministic tests.
    pub fn needs_refresh_at(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(expires_at) => {
                let margin = chrono::Duration::from_std(EXPIRY_MARGIN).unwrap_or_default();
                expires_at <= now + margin
            }
            None => false,
        }
    }

    /// Replaces the token material after a successful refresh.
    ///
    /// Providers may rotate the refresh token; when they do not return one,
    /// the existing refresh token is kept.
    pub fn with_refreshed_tokens(
        mut self,
        access_token: String,
        refresh_token: Option<String>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Self {
        self.access_token = access_token;
        if refresh_token.is_some() {
            self.refresh_token = refresh_token;
        }
        self.expires_at = expires_at;
        self.updated_at = Utc::now();
        self
    }
}

// Manual Debug so token material never lands in logs or panic output.
impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("id", &self.id)
            .field("owner_id", &self.owner_id)
            .field("provider", &self.provider)
            .field("email", &self.email)
            .field("access_token", &"<redacted>")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .field("expires_at", &self.expires_at)
            .field("imap_host", &self.imap_host)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn oauth_credential(expires_at: Option<DateTime<Utc>>) -> Credential {
        Credential::oauth(
            OwnerId::generate(),
            Provider::Google,
            "user@gmail.com",
            "ya29.token",
            Some("refresh-1".to_string()),
            expires_at,
        )
    }

    #[test]
    fn static_credential_never_needs_refresh() {
        let cred = Credential::imap(
            OwnerId::generate(),
            "shop@example.com",
            "app-password",
            "imap.example.com",
            993,
        );
        assert!(!cred.needs_refresh());
        assert!(cred.refresh_token.is_none());
        assert!(cred.expires_at.is_none());
    }

    #[test]
    fn future_expiry_does_not_need_refresh() {
        let cred = oauth_credential(Some(Utc::now() + chrono::Duration::hours(1)));
        assert!(!cred.needs_refresh());
    }

    #[test]
    fn past_expiry_needs_refresh() {
        let cred = oauth_credential(Some(Utc::now() - chrono::Duration::minutes(5)));
        assert!(cred.needs_refresh());
    }

    #[test]
    fn expiry_within_margin_needs_refresh() {
        let now = Utc::now();
        let cred = oauth_credential(Some(now + chrono::Duration::seconds(30)));
        assert!(cred.needs_refresh_at(now));
    }

    #[test]
    fn refresh_keeps_existing_refresh_token_when_not_rotated() {
        let cred = oauth_credential(Some(Utc::now() - chrono::Duration::minutes(5)));
        let refreshed = cred.with_refreshed_tokens(
            "new-access".to_string(),
            None,
            Some(Utc::now() + chrono::Duration::hours(1)),
        );

        assert_eq!(refreshed.access_token, "new-access");
        assert_eq!(refreshed.refresh_token, Some("refresh-1".to_string()));
        assert!(!refreshed.needs_refresh());
    }

    #[test]
    fn refresh_adopts_rotated_refresh_token() {
        let cred = oauth_credential(Some(Utc::now()));
        let refreshed = cred.with_refreshed_tokens(
            "new-access".to_string(),
            Some("refresh-2".to_string()),
            None,
        );
        assert_eq!(refreshed.refresh_token, Some("refresh-2".to_string()));
    }

    #[test]
    fn debug_output_redacts_secrets() {
        let cred = oauth_credential(None);
        let debug = format!("{:?}", cred);
        assert!(!debug.contains("ya29.token"));
        assert!(!debug.contains("refresh-1"));
        assert!(debug.contains("user@gmail.com"));
    }
}
