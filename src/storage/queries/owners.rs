//! Owner CRUD operations.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};

use crate::domain::{Owner, OwnerId};
use crate::storage::database::{Database, Result};

/// Inserts a new owner record.
pub async fn insert(db: &Database, owner: &Owner) -> Result<()> {
    let owner = owner.clone();

    db.with_conn(move |conn| {
        conn.execute(
            "INSERT INTO owners (id, email, name, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                owner.id.as_str(),
                owner.email,
                owner.name,
                owner.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    })
    .await
}

/// Retrieves an owner by id.
pub async fn get_by_id(db: &Database, owner_id: &OwnerId) -> Result<Option<Owner>> {
    let owner_id = owner_id.clone();

    db.with_conn(move |conn| {
        let mut stmt =
            conn.prepare("SELECT id, email, name, created_at FROM owners WHERE id = ?1")?;
        let result = stmt
            .query_row([owner_id.as_str()], row_to_owner)
            .optional()?;
        Ok(result)
    })
    .await
}

/// Returns whether an owner record exists.
pub async fn exists(db: &Database, owner_id: &OwnerId) -> Result<bool> {
    Ok(get_by_id(db, owner_id).await?.is_some())
}

fn row_to_owner(row: &Row<'_>) -> rusqlite::Result<Owner> {
    let id: String = row.get(0)?;
    let created_at: String = row.get(3)?;

    let conversion = |idx: usize, e: Box<dyn std::error::Error + Send + Sync>| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, e)
    };

    Ok(Owner {
        id: OwnerId::parse(&id).map_err(|e| conversion(0, Box::new(e)))?,
        email: row.get(1)?,
        name: row.get(2)?,
        created_at: DateTime::parse_from_rfc3339(&created_at)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|e| conversion(3, Box::new(e)))?,
    })
}
