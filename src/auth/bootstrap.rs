//! Startup privilege bootstrapping.

use tracing::{info, instrument, warn};

use crate::{
    auth::password::hash_password_blocking,
    config::Settings,
    db::{Repository, Sessions, User, UserCreate, UserUpdate, Users},
    errors::{Error, Result},
};

/// Ensure the configured admin account exists and is a superuser.
///
/// Idempotent, intended to run at every startup:
///
/// - no `admin_email` configured: dev mode, logs a warning and does nothing
/// - no account with that email: creates an active, verified superuser
/// - account exists but is not a superuser: promotes it in place
/// - account already a superuser: no-op
///
/// An existing account's password is never touched, so rotating
/// `admin_password` in the settings does not silently overwrite a password
/// the admin changed themselves.
#[instrument(skip_all)]
pub async fn ensure_default_admin(sessions: &Sessions, settings: &Settings) -> Result<Option<User>> {
    let Some(admin_email) = settings.admin_email.as_deref() else {
        warn!("no admin account configured; running in dev mode where every registration is a superuser");
        return Ok(None);
    };

    let admin_password = settings.admin_password.as_deref().ok_or_else(|| Error::Configuration {
        message: "admin_email is set but admin_password is not".to_string(),
    })?;

    // Hash before opening the session
    let password_hash = hash_password_blocking(admin_password.to_string()).await?;

    let mut session = sessions.begin().await?;
    let mut users = Users::new(&mut session);

    let admin = match users.get_by_email(admin_email).await? {
        None => {
            let created = users
                .create(&UserCreate {
                    email: admin_email.to_string(),
                    password_hash: Some(password_hash),
                    is_active: true,
                    is_superuser: true,
                    is_verified: true,
                })
                .await?;
            info!(email = %admin_email, "created admin account");
            created
        }
        Some(existing) if !existing.is_superuser => {
            let promoted = users
                .update(
                    existing.id,
                    &UserUpdate {
                        is_superuser: Some(true),
                        ..Default::default()
                    },
                )
                .await?;
            info!(email = %admin_email, "promoted existing account to superuser");
            promoted
        }
        Some(existing) => existing,
    };

    session.commit().await?;
    Ok(Some(admin))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{memory_engine, test_settings};

    fn admin_settings() -> Settings {
        Settings {
            admin_email: Some("admin@example.com".to_string()),
            admin_password: Some("admin-pw-123".to_string()),
            ..test_settings()
        }
    }

    #[test_log::test(tokio::test)]
    async fn test_creates_admin_once() {
        let engine = memory_engine().await;
        let sessions = engine.sessions();
        let settings = admin_settings();

        let admin = ensure_default_admin(&sessions, &settings).await.unwrap().unwrap();
        assert!(admin.is_superuser);
        assert!(admin.is_active);
        assert!(admin.is_verified);

        // Second run is a no-op, the password hash in particular is untouched
        let again = ensure_default_admin(&sessions, &settings).await.unwrap().unwrap();
        assert_eq!(again.id, admin.id);
        assert_eq!(again.password_hash, admin.password_hash);

        engine.stop().await;
    }

    #[test_log::test(tokio::test)]
    async fn test_promotes_existing_account() {
        let engine = memory_engine().await;
        let settings = admin_settings();

        // Registered before the admin email was configured, so not a superuser
        let manager = crate::auth::AuthManager::new(engine.sessions(), admin_settings());
        let user = manager.register("admin@example.com", "their-own-pw").await.unwrap();
        assert!(!user.is_superuser);

        let admin = ensure_default_admin(&engine.sessions(), &settings).await.unwrap().unwrap();
        assert_eq!(admin.id, user.id);
        assert!(admin.is_superuser);
        // Their chosen password survives promotion
        assert_eq!(admin.password_hash, user.password_hash);
        manager.login("admin@example.com", "their-own-pw").await.unwrap();

        engine.stop().await;
    }

    #[test_log::test(tokio::test)]
    async fn test_dev_mode_is_a_noop() {
        let engine = memory_engine().await;
        let result = ensure_default_admin(&engine.sessions(), &test_settings()).await.unwrap();
        assert!(result.is_none());
        engine.stop().await;
    }
}
