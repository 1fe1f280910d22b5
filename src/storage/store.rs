//! Store abstractions over the credential and owner tables.
//!
//! Components depend on these traits rather than on SQLite directly, so the
//! token lifecycle and aggregation layers can be exercised against in-memory
//! fakes. Identifier validation happens before these traits are reached: the
//! typed [`OwnerId`] / [`CredentialId`] arguments can only be built through
//! their validating constructors, so malformed identifiers fail fast with a
//! [`StoreError::Validation`] at the boundary instead of leaking into SQL.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{Credential, CredentialId, IdentifierError, Owner, OwnerId, Provider};

use super::database::{Database, DatabaseError};
use super::queries;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Malformed identifier, rejected before any storage access.
    #[error("invalid identifier: {0}")]
    Validation(#[from] IdentifierError),

    /// The requested row does not exist (or belongs to another owner).
    #[error("not found: {0}")]
    NotFound(String),

    /// Underlying database failure.
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),
}

/// Result type for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Persistence contract for credentials.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Idempotent write keyed on (owner_id, provider, email).
    async fn upsert(&self, credential: &Credential) -> StoreResult<()>;

    /// All credentials for an owner, optionally filtered by provider.
    async fn list(&self, owner_id: &OwnerId, provider: Option<Provider>)
        -> StoreResult<Vec<Credential>>;

    /// One credential, scoped to its owner.
    async fn get(&self, owner_id: &OwnerId, id: &CredentialId) -> StoreResult<Credential>;

    /// Deletes a credential; fails with [`StoreError::NotFound`] when the row
    /// does not exist or belongs to another owner.
    async fn delete(&self, owner_id: &OwnerId, id: &CredentialId) -> StoreResult<()>;
}

/// Read contract for the primary user store.
#[async_trait]
pub trait OwnerStore: Send + Sync {
    /// Returns whether the owner record exists.
    async fn exists(&self, owner_id: &OwnerId) -> StoreResult<bool>;

    /// Fetches an owner record.
    async fn get(&self, owner_id: &OwnerId) -> StoreResult<Option<Owner>>;

    /// Inserts a new owner record.
    async fn insert(&self, owner: &Owner) -> StoreResult<()>;
}

/// SQLite-backed credential store.
#[derive(Clone)]
pub struct SqliteCredentialStore {
    db: Database,
}

impl SqliteCredentialStore {
    /// Creates a store over an opened database.
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl CredentialStore for SqliteCredentialStore {
    async fn upsert(&self, credential: &Credential) -> StoreResult<()> {
        queries::credentials::upsert(&self.db, credential).await?;
        tracing::debug!(
            owner_id = %credential.owner_id,
            provider = %credential.provider,
            email = %credential.email,
            "credential upserted"
        );
        Ok(())
    }

    async fn list(
        &self,
        owner_id: &OwnerId,
        provider: Option<Provider>,
    ) -> StoreResult<Vec<Credential>> {
        Ok(queries::credentials::list(&self.db, owner_id, provider).await?)
    }

    async fn get(&self, owner_id: &OwnerId, id: &CredentialId) -> StoreResult<Credential> {
        queries::credentials::get_by_id(&self.db, owner_id, id)
            .await?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    async fn delete(&self, owner_id: &OwnerId, id: &CredentialId) -> StoreResult<()> {
        let deleted = queries::credentials::delete(&self.db, owner_id, id).await?;
        if deleted {
            tracing::info!(owner_id = %owner_id, credential_id = %id, "credential deleted");
            Ok(())
        } else {
            Err(StoreError::NotFound(id.to_string()))
        }
    }
}

/// SQLite-backed owner store.
#[derive(Clone)]
pub struct SqliteOwnerStore {
    db: Database,
}

impl SqliteOwnerStore {
    /// Creates a store over an opened database.
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl OwnerStore for SqliteOwnerStore {
    async fn exists(&self, owner_id: &OwnerId) -> StoreResult<bool> {
        Ok(queries::owners::exists(&self.db, owner_id).await?)
    }

    async fn get(&self, owner_id: &OwnerId) -> StoreResult<Option<Owner>> {
        Ok(queries::owners::get_by_id(&self.db, owner_id).await?)
    }

    async fn insert(&self, owner: &Owner) -> StoreResult<()> {
        queries::owners::insert(&self.db, owner).await?;
        Ok(())
    }
}
