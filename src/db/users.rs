//! Database repository for user identity records.

use sqlx::{AnyConnection, FromRow};
use tracing::instrument;
use uuid::Uuid;

use crate::db::errors::{DbError, Result};
use crate::db::repository::Repository;
use crate::types::{UserId, abbrev_uuid};

/// Identity record as exposed to the rest of the crate and to hosts.
///
/// `password_hash` holds the one-way hash only; the plaintext never reaches
/// this layer. `None` means the account cannot log in with a password (for
/// example, a bootstrapped administrator that was created without one).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub password_hash: Option<String>,
    pub is_active: bool,
    pub is_superuser: bool,
    pub is_verified: bool,
}

/// Request for creating a new user record
#[derive(Debug, Clone)]
pub struct UserCreate {
    pub email: String,
    pub password_hash: Option<String>,
    pub is_active: bool,
    pub is_superuser: bool,
    pub is_verified: bool,
}

/// Partial update of a user record. `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct UserUpdate {
    pub password_hash: Option<String>,
    pub is_active: Option<bool>,
    pub is_superuser: Option<bool>,
    pub is_verified: Option<bool>,
}

/// Filter for listing users
#[derive(Debug, Clone)]
pub struct UserFilter {
    pub skip: i64,
    pub limit: i64,
}

impl UserFilter {
    pub fn new(skip: i64, limit: i64) -> Self {
        Self { skip, limit }
    }
}

// Row model. The id column is TEXT and the flags are INTEGER 0/1 so the same
// queries run against every driver the Any pool supports (the Any type map
// has no uuid and no boolean); the public type carries the parsed forms.
#[derive(Debug, FromRow)]
struct UserRow {
    id: String,
    email: String,
    password_hash: Option<String>,
    is_active: i64,
    is_superuser: i64,
    is_verified: i64,
}

impl TryFrom<UserRow> for User {
    type Error = DbError;

    fn try_from(row: UserRow) -> Result<Self> {
        let id = Uuid::parse_str(&row.id).map_err(|e| DbError::Other(anyhow::anyhow!("invalid user id in store: {e}")))?;
        Ok(User {
            id,
            email: row.email,
            password_hash: row.password_hash,
            is_active: row.is_active != 0,
            is_superuser: row.is_superuser != 0,
            is_verified: row.is_verified != 0,
        })
    }
}

const USER_COLUMNS: &str = "id, email, password_hash, is_active, is_superuser, is_verified";

/// Repository over the `users` table, bound to one session's connection.
pub struct Users<'c> {
    db: &'c mut AnyConnection,
}

impl<'c> Users<'c> {
    pub fn new(db: &'c mut AnyConnection) -> Self {
        Self { db }
    }

    /// Look up a user by email. Comparison is case-insensitive.
    #[instrument(skip(self, email), err)]
    pub async fn get_by_email(&mut self, email: &str) -> Result<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE LOWER(email) = LOWER($1)"
        ))
        .bind(email)
        .fetch_optional(&mut *self.db)
        .await
        .map_err(DbError::from)?;

        row.map(User::try_from).transpose()
    }
}

#[async_trait::async_trait]
impl<'c> Repository for Users<'c> {
    type CreateRequest = UserCreate;
    type UpdateRequest = UserUpdate;
    type Response = User;
    type Id = UserId;
    type Filter = UserFilter;

    #[instrument(skip(self, request), err)]
    async fn create(&mut self, request: &Self::CreateRequest) -> Result<Self::Response> {
        // Always generate a new ID for users
        let user_id = Uuid::new_v4();

        let row = sqlx::query_as::<_, UserRow>(&format!(
            "INSERT INTO users (id, email, password_hash, is_active, is_superuser, is_verified)
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING {USER_COLUMNS}"
        ))
        .bind(user_id.to_string())
        .bind(&request.email)
        .bind(&request.password_hash)
        .bind(request.is_active as i64)
        .bind(request.is_superuser as i64)
        .bind(request.is_verified as i64)
        .fetch_one(&mut *self.db)
        .await
        .map_err(DbError::from)?;

        User::try_from(row)
    }

    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&id)), err)]
    async fn get_by_id(&mut self, id: Self::Id) -> Result<Option<Self::Response>> {
        let row = sqlx::query_as::<_, UserRow>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
            .bind(id.to_string())
            .fetch_optional(&mut *self.db)
            .await
            .map_err(DbError::from)?;

        row.map(User::try_from).transpose()
    }

    #[instrument(skip(self, filter), fields(limit = filter.limit, skip = filter.skip), err)]
    async fn list(&mut self, filter: &Self::Filter) -> Result<Vec<Self::Response>> {
        let rows = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users ORDER BY LOWER(email) LIMIT $1 OFFSET $2"
        ))
        .bind(filter.limit)
        .bind(filter.skip)
        .fetch_all(&mut *self.db)
        .await
        .map_err(DbError::from)?;

        rows.into_iter().map(User::try_from).collect()
    }

    #[instrument(skip(self, request), fields(user_id = %abbrev_uuid(&id)), err)]
    async fn update(&mut self, id: Self::Id, request: &Self::UpdateRequest) -> Result<Self::Response> {
        // Atomic update with conditional field updates
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "UPDATE users SET
                password_hash = COALESCE($2, password_hash),
                is_active     = COALESCE($3, is_active),
                is_superuser  = COALESCE($4, is_superuser),
                is_verified   = COALESCE($5, is_verified)
             WHERE id = $1
             RETURNING {USER_COLUMNS}"
        ))
        .bind(id.to_string())
        .bind(&request.password_hash)
        .bind(request.is_active.map(i64::from))
        .bind(request.is_superuser.map(i64::from))
        .bind(request.is_verified.map(i64::from))
        .fetch_optional(&mut *self.db)
        .await
        .map_err(DbError::from)?
        .ok_or(DbError::NotFound)?;

        User::try_from(row)
    }

    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&id)), err)]
    async fn delete(&mut self, id: Self::Id) -> Result<bool> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id.to_string())
            .execute(&mut *self.db)
            .await
            .map_err(DbError::from)?;

        Ok(result.rows_affected() > 0)
    }
}
