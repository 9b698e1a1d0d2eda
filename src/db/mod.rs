//! Database layer for data persistence and access.
//!
//! This module implements the data access layer using SQLx over the `Any`
//! driver, so the same code runs against SQLite (in-memory or file-backed)
//! and PostgreSQL depending on the configured database URL.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐
//! │ AuthManager │  (auth - business logic)
//! └──────┬──────┘
//!        │
//!        ↓
//! ┌─────────────┐
//! │ Repositories│  (db::users - queries over a session)
//! └──────┬──────┘
//!        │
//!        ↓
//! ┌─────────────┐
//! │  Sessions   │  (db::session - one transaction per unit of work)
//! └──────┬──────┘
//!        │
//!        ↓
//! ┌─────────────┐
//! │   Engine    │  (db::pools - pool sized from the URL shape)
//! └─────────────┘
//! ```
//!
//! # Modules
//!
//! - [`pools`]: [`Engine`] lifecycle and pool sizing strategies
//! - [`session`]: [`Session`] transaction wrapper with rollback-on-drop
//! - [`schema`]: Table creation
//! - [`repository`]: The generic [`Repository`] trait
//! - [`users`]: User records and the [`Users`] repository
//! - [`errors`]: Database-specific error types
//!
//! # Transactions
//!
//! Repositories work over a [`Session`], never the pool directly. A session
//! that is dropped without [`Session::commit`] rolls back, including when the
//! task driving it is cancelled:
//!
//! ```ignore
//! let mut session = engine.sessions().begin().await?;
//! let mut repo = Users::new(&mut session);
//! // ... operations ...
//! session.commit().await?;
//! ```

pub mod errors;
pub mod pools;
pub mod repository;
pub mod schema;
pub mod session;
pub mod users;

pub use errors::DbError;
pub use pools::{Engine, PoolStrategy};
pub use repository::Repository;
pub use schema::create_tables;
pub use session::{Session, Sessions};
pub use users::{User, UserCreate, UserFilter, UserUpdate, Users};
