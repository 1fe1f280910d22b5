//! Domain types shared across the crate.
//!
//! Everything in this module is transport-agnostic: identifiers, the stored
//! credential shape, the canonical message shape, classification results and
//! the minimal owner record.

mod classification;
mod credential;
mod message;
mod owner;
mod types;

pub use classification::{Category, Classification, Priority};
pub use credential::{Credential, EXPIRY_MARGIN};
pub use message::{
    collapse_blank_lines, extract_bare_address, preview_of, strip_html, truncate_chars,
    CanonicalMessage, BODY_MAX_CHARS, PREVIEW_CHARS,
};
pub use owner::Owner;
pub use types::{CredentialId, IdentifierError, OwnerId, Provider};
