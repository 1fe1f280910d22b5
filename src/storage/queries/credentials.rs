//! Credential CRUD operations.
//!
//! Provides database operations for credential rows. All writes are keyed on
//! the (owner_id, provider, email) composite; see the schema's UNIQUE
//! constraint.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};

use crate::domain::{Credential, CredentialId, OwnerId, Provider};
use crate::storage::database::{Database, Result};

const SELECT_COLUMNS: &str = r#"
    id, owner_id, provider, email, access_token, refresh_token,
    expires_at, imap_host, imap_port, created_at, updated_at
"#;

/// Inserts or overwrites the credential for its (owner, provider, email)
/// triple.
///
/// On conflict the existing row keeps its id and created_at; token material,
/// expiry and connection details are replaced.
pub async fn upsert(db: &Database, credential: &Credential) -> Result<()> {
    let credential = credential.clone();

    db.with_conn(move |conn| {
        conn.execute(
            r#"
            INSERT INTO credentials (
                id, owner_id, provider, email, access_token, refresh_token,
                expires_at, imap_host, imap_port, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            ON CONFLICT (owner_id, provider, email) DO UPDATE SET
                access_token = excluded.access_token,
                refresh_token = excluded.refresh_token,
                expires_at = excluded.expires_at,
                imap_host = excluded.imap_host,
                imap_port = excluded.imap_port,
                updated_at = excluded.updated_at
            "#,
            params![
                credential.id.as_str(),
                credential.owner_id.as_str(),
                credential.provider.as_str(),
                credential.email,
                credential.access_token,
                credential.refresh_token,
                credential.expires_at.map(|t| t.to_rfc3339()),
                credential.imap_host,
                credential.imap_port,
                credential.created_at.to_rfc3339(),
                credential.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    })
    .await
}

/// Retrieves one credential by id, scoped to its owner.
pub async fn get_by_id(
    db: &Database,
    owner_id: &OwnerId,
    credential_id: &CredentialId,
) -> Result<Option<Credential>> {
    let owner_id = owner_id.clone();
    let credential_id = credential_id.clone();

    db.with_conn(move |conn| {
        let mut stmt = conn.prepare(&format!(
            "SELECT {SELECT_COLUMNS} FROM credentials WHERE id = ?1 AND owner_id = ?2"
        ))?;
        let result = stmt
            .query_row(
                params![credential_id.as_str(), owner_id.as_str()],
                row_to_credential,
            )
            .optional()?;
        Ok(result)
    })
    .await
}

/// Retrieves all credentials for an owner, optionally filtered by provider.
pub async fn list(
    db: &Database,
    owner_id: &OwnerId,
    provider: Option<Provider>,
) -> Result<Vec<Credential>> {
    let owner_id = owner_id.clone();

    db.with_conn(move |conn| {
        let credentials = match provider {
            Some(provider) => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {SELECT_COLUMNS} FROM credentials
                     WHERE owner_id = ?1 AND provider = ?2 ORDER BY email"
                ))?;
                let rows = stmt.query_map(
                    params![owner_id.as_str(), provider.as_str()],
                    row_to_credential,
                )?;
                rows.collect::<std::result::Result<Vec<_>, _>>()?
            }
            None => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {SELECT_COLUMNS} FROM credentials
                     WHERE owner_id = ?1 ORDER BY provider, email"
                ))?;
                let rows = stmt.query_map([owner_id.as_str()], row_to_credential)?;
                rows.collect::<std::result::Result<Vec<_>, _>>()?
            }
        };
        Ok(credentials)
    })
    .await
}

/// Deletes a credential; returns whether a row belonging to the owner was
/// removed.
pub async fn delete(
    db: &Database,
    owner_id: &OwnerId,
    credential_id: &CredentialId,
) -> Result<bool> {
    let owner_id = owner_id.clone();
    let credential_id = credential_id.clone();

    db.with_conn(move |conn| {
        let affected = conn.execute(
            "DELETE FROM credentials WHERE id = ?1 AND owner_id = ?2",
            params![credential_id.as_str(), owner_id.as_str()],
        )?;
        Ok(affected > 0)
    })
    .await
}

/// Maps a database row to a [`Credential`].
fn row_to_credential(row: &Row<'_>) -> rusqlite::Result<Credential> {
    let id: String = row.get(0)?;
    let owner_id: String = row.get(1)?;
    let provider: String = row.get(2)?;
    let expires_at: Option<String> = row.get(6)?;
    let created_at: String = row.get(9)?;
    let updated_at: String = row.get(10)?;

    let conversion = |idx: usize, e: Box<dyn std::error::Error + Send + Sync>| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, e)
    };

    Ok(Credential {
        id: CredentialId::parse(&id).map_err(|e| conversion(0, Box::new(e)))?,
        owner_id: OwnerId::parse(&owner_id).map_err(|e| conversion(1, Box::new(e)))?,
        provider: provider
            .parse::<Provider>()
            .map_err(|e| conversion(2, Box::new(e)))?,
        email: row.get(3)?,
        access_token: row.get(4)?,
        refresh_token: row.get(5)?,
        expires_at: expires_at
            .map(|t| {
                DateTime::parse_from_rfc3339(&t)
                    .map(|t| t.with_timezone(&Utc))
                    .map_err(|e| conversion(6, Box::new(e)))
            })
            .transpose()?,
        imap_host: row.get(7)?,
        imap_port: row.get(8)?,
        created_at: parse_timestamp(&created_at, 9)?,
        updated_at: parse_timestamp(&updated_at, 10)?,
    })
}

fn parse_timestamp(value: &str, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}
