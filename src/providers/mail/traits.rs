//! Mail provider trait and error types.
//!
//! Each provider adapter turns the messages of one mailbox into the canonical
//! shape. Adapters are stateless: every call receives the credential to use,
//! so the aggregation layer can retry a fetch with refreshed tokens without
//! rebuilding the adapter.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{CanonicalMessage, Credential, Provider};

/// Errors that can occur while fetching messages from a provider.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The provider rejected the credential (HTTP 401 or IMAP login failure).
    /// The caller may refresh the token and retry once.
    #[error("credential rejected by {provider}")]
    Expired { provider: Provider },

    /// The credential is valid but lacks the required scope (HTTP 403).
    /// Retrying will not help; the mailbox must be reconnected.
    #[error("insufficient permissions on {provider}: {detail}")]
    Permission { provider: Provider, detail: String },

    /// The provider returned an unexpected HTTP status.
    #[error("{provider} API error ({status}): {detail}")]
    Http {
        provider: Provider,
        status: u16,
        detail: String,
    },

    /// Network-level failure (DNS, TLS, timeout, connection reset).
    #[error("connection to {provider} failed: {source}")]
    Connection {
        provider: Provider,
        #[source]
        source: anyhow::Error,
    },

    /// The provider response could not be decoded.
    #[error("failed to parse {provider} response: {detail}")]
    Parse { provider: Provider, detail: String },
}

impl FetchError {
    /// Whether a single token refresh followed by a retry is worth attempting.
    pub fn is_retryable_after_refresh(&self) -> bool {
        matches!(self, FetchError::Expired { .. })
    }
}

/// Result type for provider fetch operations.
pub type Result<T> = std::result::Result<T, FetchError>;

/// Read-only access to one kind of mailbox.
#[async_trait]
pub trait MailProvider: Send + Sync {
    /// Which provider this adapter talks to.
    fn provider(&self) -> Provider;

    /// Fetches up to `limit` recent messages, newest first, normalized to
    /// the canonical shape. Messages that cannot be normalized are skipped,
    /// never surfaced as errors.
    async fn fetch_messages(
        &self,
        credential: &Credential,
        limit: usize,
    ) -> Result<Vec<CanonicalMessage>>;
}

/// Maps a non-success HTTP status to the provider-agnostic error taxonomy.
pub(crate) fn status_to_error(provider: Provider, status: u16, body: String) -> FetchError {
    match status {
        401 => FetchError::Expired { provider },
        403 => FetchError::Permission {
            provider,
            detail: body,
        },
        _ => FetchError::Http {
            provider,
            status,
            detail: body,
        },
    }
}
