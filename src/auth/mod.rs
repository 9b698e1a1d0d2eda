//! Authentication and authorization.
//!
//! # Modules
//!
//! - [`manager`]: The [`AuthManager`] service driving every flow
//! - [`token`]: JWT issuing and validation per [`TokenKind`]
//! - [`password`]: Argon2id hashing and verification
//! - [`bootstrap`]: Startup admin account provisioning

pub mod bootstrap;
pub mod manager;
pub mod password;
pub mod token;

pub use bootstrap::ensure_default_admin;
pub use manager::{AuthManager, RegistrationHook, Require};
pub use token::{Claims, TokenError, TokenKind};
