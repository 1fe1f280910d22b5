//! OAuth negotiation and token lifecycle.

pub mod oauth;
pub mod tokens;

use thiserror::Error;

use crate::domain::OwnerId;
use crate::storage::StoreError;

pub use oauth::{CallbackParams, OAuthExchange, RedirectIntent};
pub use tokens::{HttpTokenRefresher, RefreshedTokens, TokenManager, TokenRefresher};

/// Errors from OAuth exchange and token refresh.
///
/// Display output never contains token material; token-exchange bodies are
/// provider error JSON, not credentials.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Callback state did not match the expected value.
    #[error("OAuth state mismatch")]
    InvalidState,

    /// The provider rejected the code or refresh-token exchange.
    #[error("token exchange failed ({status}): {body}")]
    TokenExchange { status: u16, body: String },

    /// The provider profile endpoint did not yield a mailbox address.
    #[error("profile fetch failed: {0}")]
    ProfileFetch(String),

    /// Exchange for an owner that does not exist.
    #[error("owner not found: {0}")]
    OwnerNotFound(OwnerId),

    /// The credential is expired and cannot be refreshed.
    #[error("credential expired and no refresh is possible")]
    CredentialExpired,

    /// Persistence failure.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// Network-level failure talking to the provider.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Result type for auth operations.
pub type Result<T> = std::result::Result<T, AuthError>;
