//! Owner (tenant) record.
//!
//! The primary user store lives outside this core; only the minimal record
//! needed for owner-existence checks and owner-scoped credential operations
//! is modeled here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::OwnerId;

/// The authenticated tenant on whose behalf credentials are scoped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Owner {
    /// Unique owner identifier.
    pub id: OwnerId,
    /// Primary login address.
    pub email: String,
    /// Business or display name.
    pub name: Option<String>,
    /// When the owner record was created.
    pub created_at: DateTime<Utc>,
}

impl Owner {
    /// Creates a new owner record.
    pub fn new(email: impl Into<String>, name: Option<String>) -> Self {
        Self {
            id: OwnerId::generate(),
            email: email.into(),
            name,
            created_at: Utc::now(),
        }
    }
}
