//! Core identifier types for domain entities.
//!
//! These newtype wrappers provide type safety for entity identifiers,
//! preventing accidental mixing of different ID types. Identifiers that
//! cross a trust boundary (owner and credential ids arriving from the
//! outside) are validated with [`OwnerId::parse`] / [`CredentialId::parse`]
//! before they reach storage.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// A malformed identifier was supplied where a canonical UUID was expected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("malformed identifier: {0:?}")]
pub struct IdentifierError(pub String);

/// Checks that a string is a canonical hyphenated UUID.
///
/// Only the 36-character hyphenated form is accepted; the braced, simple
/// (hyphen-less) and URN forms the `uuid` crate tolerates are rejected.
fn is_canonical_uuid(s: &str) -> bool {
    s.len() == 36 && Uuid::try_parse(s).is_ok()
}

/// Unique identifier for an owner (the authenticated tenant).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OwnerId(String);

impl OwnerId {
    /// Validates and wraps an externally supplied owner identifier.
    pub fn parse(s: &str) -> Result<Self, IdentifierError> {
        if is_canonical_uuid(s) {
            Ok(Self(s.to_owned()))
        } else {
            Err(IdentifierError(s.to_owned()))
        }
    }

    /// Generates a fresh owner identifier.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a stored credential.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CredentialId(String);

impl CredentialId {
    /// Validates and wraps an externally supplied credential identifier.
    pub fn parse(s: &str) -> Result<Self, IdentifierError> {
        if is_canonical_uuid(s) {
            Ok(Self(s.to_owned()))
        } else {
            Err(IdentifierError(s.to_owned()))
        }
    }

    /// Generates a fresh credential identifier.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CredentialId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The transport/identity provider behind a connected mailbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// Google (Gmail REST API, OAuth 2.0).
    Google,
    /// Microsoft (Graph API, Azure AD OAuth 2.0).
    Microsoft,
    /// Raw IMAP with a static app-password.
    Imap,
}

impl Provider {
    /// Stable lowercase tag used in storage and message id prefixes.
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Google => "google",
            Provider::Microsoft => "microsoft",
            Provider::Imap => "imap",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Provider {
    type Err = IdentifierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "google" => Ok(Provider::Google),
            "microsoft" => Ok(Provider::Microsoft),
            "imap" => Ok(Provider::Imap),
            other => Err(IdentifierError(other.to_owned())),
        }
    }
}
