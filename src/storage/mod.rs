//! Persistence layer: SQLite database, schema, and store abstractions.

pub mod database;
pub mod queries;
pub mod schema;
pub mod store;

pub use database::{Database, DatabaseError};
pub use store::{
    CredentialStore, OwnerStore, SqliteCredentialStore, SqliteOwnerStore, StoreError, StoreResult,
};
