//! # authcore: Shared Authentication and Database Foundation
//!
//! `authcore` is the storage and identity layer shared by applications that
//! need user accounts without running their own auth stack. It owns the
//! database engine (connection pooling, session scoping), the identity store
//! (users, flags, password hashes), and the authentication flows (login,
//! token resolution, password reset, email verification, startup admin
//! provisioning). Hosts mount an HTTP surface of their choosing on top; this
//! crate never speaks HTTP.
//!
//! ## Overview
//!
//! Everything hangs off an [`AuthContext`], built once at startup from
//! [`Settings`]. The context starts a database [`Engine`] whose pooling
//! strategy is derived from the URL shape: an in-memory SQLite database gets
//! a single pinned connection (so every session really sees the same data), a
//! file-backed SQLite database gets short-lived per-checkout connections, and
//! PostgreSQL gets a bounded long-lived pool. The same runtime-dispatched
//! queries run against all three.
//!
//! Work happens in [`Session`]s, thin transaction wrappers handed out by
//! [`Sessions`]. A session that is dropped without commit rolls back, which
//! also covers tasks cancelled mid-flight.
//!
//! The [`AuthManager`] drives the flows on top of the store: Argon2id
//! password hashing off the async runtime, three JWT families
//! ([`TokenKind`]) signed with distinct secrets and audiences, and an
//! account model with `is_active`, `is_superuser` and `is_verified` flags
//! that are re-read from the store on every token resolution.
//!
//! Without a configured admin account the crate runs in dev mode: every
//! registration is granted superuser so a fresh instance is usable
//! immediately. Configuring `admin_email`/`admin_password` switches to
//! normal operation, and [`ensure_default_admin`] provisions or promotes
//! that account at startup.
//!
//! ## Quick Start
//!
//! ```no_run
//! use authcore::{AuthContext, Require, Settings};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let settings = Settings::load("authcore.yaml")?;
//!     let ctx = AuthContext::start(settings).await?;
//!     ctx.bootstrap().await?;
//!
//!     let user = ctx.auth().register("alice@example.com", "pw123456").await?;
//!     let token = ctx.auth().login("alice@example.com", "pw123456").await?;
//!     let current = ctx.auth().current_user(&token, Require::ACTIVE).await?;
//!     assert_eq!(current.id, user.id);
//!
//!     ctx.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration
//!
//! See the [`config`] module for the settings file format and the
//! `AUTHCORE_` environment overrides.

pub mod auth;
pub mod config;
pub mod db;
pub mod errors;
pub mod types;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

use bon::Builder;
use tracing::info;

pub use auth::{AuthManager, RegistrationHook, Require, TokenError, TokenKind, ensure_default_admin};
pub use config::Settings;
pub use db::{Engine, PoolStrategy, Session, Sessions, User, create_tables};
pub use errors::{Error, Result};
pub use types::UserId;

/// The assembled engine, settings and authentication service.
///
/// One context per application, built at startup and shared by handle.
/// [`AuthContext::start`] covers the common case; the builder is for hosts
/// that manage the [`Engine`] themselves or attach a registration hook:
///
/// ```ignore
/// let engine = Engine::start(&settings).await?;
/// let ctx = AuthContext::builder()
///     .db(engine)
///     .settings(settings)
///     .registration_hook(hook)
///     .build();
/// ```
#[derive(Clone, Builder)]
pub struct AuthContext {
    pub db: Engine,
    pub settings: Settings,
    pub registration_hook: Option<RegistrationHook>,
}

impl AuthContext {
    /// Validate settings, start the engine and create tables.
    pub async fn start(settings: Settings) -> Result<Self> {
        settings.validate()?;

        let engine = Engine::start(&settings).await?;
        create_tables(&engine).await?;
        info!(strategy = ?engine.strategy(), "authentication context ready");

        Ok(Self::builder().db(engine).settings(settings).build())
    }

    /// Handle for opening database sessions.
    pub fn sessions(&self) -> Sessions {
        self.db.sessions()
    }

    /// The authentication service.
    pub fn auth(&self) -> AuthManager {
        AuthManager::builder()
            .sessions(self.sessions())
            .settings(self.settings.clone())
            .maybe_registration_hook(self.registration_hook.clone())
            .build()
    }

    /// Run the startup admin provisioning against this context's store.
    pub async fn bootstrap(&self) -> Result<Option<User>> {
        ensure_default_admin(&self.sessions(), &self.settings).await
    }

    /// Close the engine, waiting for checked-out connections to be returned.
    pub async fn shutdown(self) {
        self.db.stop().await;
    }
}
