//! Classifier trait and error types.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{CanonicalMessage, Classification};

/// Errors from a classification backend.
///
/// These never cross the service boundary: the classification router absorbs
/// every variant into the fixed fallback classification.
#[derive(Debug, Error)]
pub enum ClassifierError {
    /// Network or transport failure.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The API rejected the key.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// The API returned a non-success status.
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// The response did not contain a usable classification.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

/// Result type for classifier operations.
pub type Result<T> = std::result::Result<T, ClassifierError>;

/// Assigns a category, priority and suggested action to one message.
#[async_trait]
pub trait Classifier: Send + Sync {
    /// Backend name, for logging.
    fn name(&self) -> &str;

    /// Classifies one message. Implementations must be side-effect free on
    /// failure so the caller can substitute the fallback classification.
    async fn classify(&self, message: &CanonicalMessage) -> Result<Classification>;
}
