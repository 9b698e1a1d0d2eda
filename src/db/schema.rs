//! Shared-schema DDL for the user table.
//!
//! This crate does not create its tables on its own: shared-schema ownership
//! belongs to the outermost integrator, which calls [`create_tables`] during
//! startup (before [`crate::auth::ensure_default_admin`]) and declares any
//! dependent tables of its own, keyed on `users.id`. Deleting a user cascades
//! to those dependents under the host's foreign-key policy; this core
//! understands that policy but does not enforce it.
//!
//! The statements are portable across the SQLite and PostgreSQL drivers the
//! engine supports. Email uniqueness is case-insensitive, enforced by an
//! expression index over `LOWER(email)`.

use crate::db::pools::Engine;
use crate::errors::{Error, Result};

// Flags are INTEGER 0/1: the Any driver has no boolean in its type map, so
// BOOLEAN columns would be undecodable on SQLite.
const CREATE_USERS: &str = "\
CREATE TABLE IF NOT EXISTS users (
    id            TEXT PRIMARY KEY,
    email         TEXT NOT NULL,
    password_hash TEXT,
    is_active     INTEGER NOT NULL DEFAULT 1,
    is_superuser  INTEGER NOT NULL DEFAULT 0,
    is_verified   INTEGER NOT NULL DEFAULT 0
)";

const CREATE_EMAIL_INDEX: &str = "CREATE UNIQUE INDEX IF NOT EXISTS users_email_lower_idx ON users (LOWER(email))";

/// Create the user table and its indexes if they do not exist. Idempotent.
pub async fn create_tables(engine: &Engine) -> Result<()> {
    for statement in [CREATE_USERS, CREATE_EMAIL_INDEX] {
        sqlx::query(statement)
            .execute(engine.pool())
            .await
            .map_err(|e| Error::Database(e.into()))?;
    }
    Ok(())
}
