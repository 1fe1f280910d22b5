//! SQL schema definitions as const strings.
//!
//! Contains the complete SQLite schema for the inlet credential store.

/// SQL to create the owners table.
pub const CREATE_OWNERS: &str = r#"
CREATE TABLE IF NOT EXISTS owners (
    id TEXT PRIMARY KEY,
    email TEXT NOT NULL UNIQUE,
    name TEXT,
    created_at TEXT NOT NULL
)
"#;

/// SQL to create the credentials table.
///
/// The UNIQUE constraint on (owner_id, provider, email) backs the upsert
/// semantics: one row per connected mailbox per owner.
pub const CREATE_CREDENTIALS: &str = r#"
CREATE TABLE IF NOT EXISTS credentials (
    id TEXT PRIMARY KEY,
    owner_id TEXT NOT NULL REFERENCES owners(id) ON DELETE CASCADE,
    provider TEXT NOT NULL,
    email TEXT NOT NULL,
    access_token TEXT NOT NULL,
    refresh_token TEXT,
    expires_at TEXT,
    imap_host TEXT,
    imap_port INTEGER,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE (owner_id, provider, email)
)
"#;

/// SQL to create credential indexes.
pub const CREATE_CREDENTIAL_INDEXES: &str = r#"
CREATE INDEX IF NOT EXISTS idx_credentials_owner ON credentials(owner_id);
CREATE INDEX IF NOT EXISTS idx_credentials_owner_provider ON credentials(owner_id, provider)
"#;

/// Returns all migrations in execution order.
pub fn all_migrations() -> &'static [&'static str] {
    &[CREATE_OWNERS, CREATE_CREDENTIALS, CREATE_CREDENTIAL_INDEXES]
}
