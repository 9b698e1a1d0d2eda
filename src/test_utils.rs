//! Shared helpers for tests.
//!
//! Available to downstream crates through the `test-utils` feature so
//! integration suites can spin up an in-memory stack.

use crate::{
    auth::AuthManager,
    config::Settings,
    db::{Engine, create_tables},
};

/// Settings pointing at an in-memory database with throwaway secrets.
pub fn test_settings() -> Settings {
    Settings {
        database_url: "sqlite::memory:".to_string(),
        secret_key: "test-access-secret".to_string(),
        reset_password_secret: "test-reset-secret".to_string(),
        verification_secret: "test-verification-secret".to_string(),
        token_lifetime_seconds: 3600,
        reset_token_lifetime_seconds: 3600,
        verification_token_lifetime_seconds: 3600,
        admin_email: None,
        admin_password: None,
    }
}

/// Start an in-memory engine with tables created.
pub async fn memory_engine() -> Engine {
    let engine = Engine::start(&test_settings())
        .await
        .expect("in-memory engine should start");
    create_tables(&engine).await.expect("tables should create");
    engine
}

/// An [`AuthManager`] over a fresh in-memory engine.
///
/// Returns the engine too so callers can stop it or open raw sessions.
pub async fn memory_manager() -> (Engine, AuthManager) {
    let engine = memory_engine().await;
    let manager = AuthManager::new(engine.sessions(), test_settings());
    (engine, manager)
}
