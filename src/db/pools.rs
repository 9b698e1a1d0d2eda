//! Connection pooling strategy and the process-wide database engine.
//!
//! [`PoolStrategy`] classifies a storage URL into one of three pooling
//! policies; [`Engine`] owns the single long-lived pool built from it.
//!
//! # Pooling policy
//!
//! The strategy is decided purely by the shape of the URL, in this precedence:
//!
//! 1. In-memory SQLite (`sqlite::memory:`, or `mode=memory`) uses a single
//!    shared physical connection: the store's contents vanish the moment no
//!    connection stays open, and every handle must see the same data.
//! 2. File-backed SQLite issues a fresh physical connection per checkout and
//!    discards it on return, which sidesteps cross-connection file-lock
//!    contention.
//! 3. A networked store (`postgres://`) gets a bounded queue pool with
//!    standard checkout/acquire-timeout semantics.
//!
//! A malformed or unsupported URL fails fast with a configuration error; this
//! layer never retries.
//!
//! # Lifecycle
//!
//! One engine exists per running application instance, created by
//! [`Engine::start`] and released by [`Engine::stop`]. There is deliberately
//! no process-global cache keyed by URL: two application instances (for
//! example, two concurrent test contexts) each hold their own engine, and
//! shutdown is well-defined. Starting a second engine without stopping the
//! first is a caller error; nothing here will silently hand back the old one.

use std::ops::Deref;
use std::sync::Once;
use std::time::Duration;

use sqlx::{Any, AnyPool, pool::PoolOptions};
use tracing::info;
use url::Url;

use crate::config::Settings;
use crate::db::session::Sessions;
use crate::errors::{Error, Result};

/// Pooling policy derived from the shape of a storage URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolStrategy {
    /// One shared physical connection, never reaped (in-memory SQLite)
    Static,
    /// Fresh connection per checkout, discarded on return (file-backed SQLite)
    PerCheckout,
    /// Bounded queue pool with acquire timeout (networked stores)
    Bounded,
}

impl PoolStrategy {
    /// Classify a storage URL. Malformed or unsupported URLs are a
    /// configuration error, surfaced before any connection is attempted.
    pub fn from_url(database_url: &str) -> Result<Self> {
        let url = Url::parse(database_url).map_err(|e| Error::Configuration {
            message: format!("malformed storage URL: {e}"),
        })?;

        match url.scheme() {
            "sqlite" => {
                let in_memory = url.path().ends_with(":memory:")
                    || url.query_pairs().any(|(k, v)| k == "mode" && v == "memory");
                if in_memory { Ok(Self::Static) } else { Ok(Self::PerCheckout) }
            }
            "postgres" | "postgresql" => Ok(Self::Bounded),
            other => Err(Error::Configuration {
                message: format!("unsupported storage URL scheme '{other}'"),
            }),
        }
    }

    fn pool_options(self) -> PoolOptions<Any> {
        match self {
            // The lone connection must survive idle periods, or the store's
            // contents would be lost between requests.
            Self::Static => PoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None),
            Self::PerCheckout => PoolOptions::new()
                .max_connections(16)
                .min_connections(0)
                .idle_timeout(Duration::ZERO),
            Self::Bounded => PoolOptions::new()
                .max_connections(10)
                .acquire_timeout(Duration::from_secs(30)),
        }
    }
}

static INSTALL_DRIVERS: Once = Once::new();

/// The pooled connection resource to the backing store.
///
/// Exactly one engine exists per running application instance. It is shared
/// by reference (the inner pool is cheaply clonable) with every [`Sessions`]
/// factory derived from it; no session may outlive the pool that produced it.
///
/// Dereferences to the inner [`AnyPool`] for host code that needs direct
/// pool access (schema creation, migrations it owns).
#[derive(Debug, Clone)]
pub struct Engine {
    pool: AnyPool,
    strategy: PoolStrategy,
}

impl Engine {
    /// Create the engine for this application instance.
    ///
    /// Must be invoked exactly once per instance lifetime, wrapping the
    /// entire serving period. Calling it twice without [`Engine::stop`] in
    /// between is a caller error.
    pub async fn start(settings: &Settings) -> Result<Self> {
        INSTALL_DRIVERS.call_once(sqlx::any::install_default_drivers);

        let strategy = PoolStrategy::from_url(&settings.database_url)?;
        let pool = strategy
            .pool_options()
            .connect(&settings.database_url)
            .await
            .map_err(|e| Error::Database(e.into()))?;

        info!(?strategy, "database engine started");
        Ok(Self { pool, strategy })
    }

    /// The pooling policy this engine was built with.
    pub fn strategy(&self) -> PoolStrategy {
        self.strategy
    }

    /// Derive a session factory bound to this engine's pool.
    pub fn sessions(&self) -> Sessions {
        Sessions::new(self)
    }

    pub(crate) fn pool(&self) -> &AnyPool {
        &self.pool
    }

    /// Release all pooled physical connections and invalidate the handle.
    ///
    /// Waits for checked-out connections to be returned, then closes them.
    pub async fn stop(self) {
        self.pool.close().await;
        info!("database engine stopped");
    }
}

/// Dereferences to the inner pool so host code can run its own schema
/// statements without this crate re-exporting executor plumbing.
impl Deref for Engine {
    type Target = AnyPool;

    fn deref(&self) -> &Self::Target {
        &self.pool
    }
}
