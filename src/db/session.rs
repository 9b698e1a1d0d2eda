//! Request-scoped database sessions.
//!
//! A [`Session`] is one unit-of-work scope: exclusively owned by the caller,
//! never shared across concurrent operations, and always returned to the pool
//! when the scope exits. Success is an explicit [`Session::commit`]; every
//! other exit path (an early `?`, a panic, task cancellation) rolls the
//! transaction back when the session drops.
//!
//! [`Sessions`] is the factory, and the factory rather than the session is
//! the substitution point for tests: bind one to an isolated in-memory engine
//! and no test observes another test's data.
//!
//! ```ignore
//! let sessions = engine.sessions();
//!
//! let mut session = sessions.begin().await?;
//! let mut users = Users::new(&mut session);
//! let user = users.get_by_email("user@example.com").await?;
//! session.commit().await?;
//! ```

use std::ops::{Deref, DerefMut};

use sqlx::{Any, AnyConnection, AnyPool, Transaction};

use crate::db::errors::{DbError, Result};
use crate::db::pools::Engine;

/// Factory for unit-of-work sessions, bound to one engine's pool.
///
/// Cheap to clone; clones share the pool. This is what downstream packages
/// hold to run their own queries against the shared store.
#[derive(Debug, Clone)]
pub struct Sessions {
    pool: AnyPool,
}

impl Sessions {
    pub fn new(engine: &Engine) -> Self {
        Self {
            pool: engine.pool().clone(),
        }
    }

    /// Check out a connection and open a transaction for one unit of work.
    ///
    /// Callers must not hold the returned session across unrelated awaits
    /// (e.g. an independent network call); that starves the pool.
    pub async fn begin(&self) -> Result<Session> {
        let tx = self.pool.begin().await.map_err(DbError::from)?;
        Ok(Session { tx })
    }
}

/// One open unit of work. Dereferences to the underlying connection so
/// repositories and raw queries can execute against it directly.
#[derive(Debug)]
pub struct Session {
    tx: Transaction<'static, Any>,
}

impl Session {
    /// Commit the unit of work and return the connection to the pool.
    pub async fn commit(self) -> Result<()> {
        self.tx.commit().await.map_err(DbError::from)
    }

    /// Explicitly roll back. Equivalent to dropping the session, but lets the
    /// caller observe rollback errors.
    pub async fn rollback(self) -> Result<()> {
        self.tx.rollback().await.map_err(DbError::from)
    }
}

impl Deref for Session {
    type Target = AnyConnection;

    fn deref(&self) -> &Self::Target {
        &self.tx
    }
}

impl DerefMut for Session {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.tx
    }
}
