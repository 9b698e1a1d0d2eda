//! Authentication flows over the identity store.
//!
//! [`AuthManager`] is the crate's main entry point for hosts: registration,
//! login, token-based user resolution, password reset and email
//! verification. Every flow opens its own short-lived [`Session`] and never
//! holds one across a password-hashing call.
//!
//! [`Session`]: crate::db::Session

use std::sync::Arc;

use bon::Builder;
use once_cell::sync::Lazy;
use tracing::{instrument, warn};

use crate::{
    auth::password::{hash_password, hash_password_blocking, verify_password_blocking},
    auth::token::{self, TokenKind},
    config::Settings,
    db::{Repository, Sessions, User, UserCreate, UserUpdate, Users},
    errors::{Error, Result},
    types::UserId,
};

/// Callback invoked after a registration commits.
///
/// Hosts use this for side effects such as sending a welcome email. The
/// user record passed in is already durable.
pub type RegistrationHook = Arc<dyn Fn(&User) + Send + Sync>;

/// Hash verified for unknown emails so login latency does not reveal
/// whether an account exists.
static PHANTOM_HASH: Lazy<String> = Lazy::new(|| hash_password("phantom-timing-equalizer").unwrap_or_default());

/// Privilege requirements for resolving a user from an access token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Require {
    pub active: bool,
    pub superuser: bool,
}

impl Require {
    /// Any user the token resolves to, active or not.
    pub const ANY: Require = Require { active: false, superuser: false };
    /// The user must be active.
    pub const ACTIVE: Require = Require { active: true, superuser: false };
    /// The user must be an active superuser.
    pub const SUPERUSER: Require = Require { active: true, superuser: true };
}

/// Authentication service over a [`Sessions`] handle.
///
/// # Example
///
/// ```ignore
/// let manager = AuthManager::builder()
///     .sessions(engine.sessions())
///     .settings(settings)
///     .build();
/// let user = manager.register("alice@example.com", "pw123456").await?;
/// let token = manager.login("alice@example.com", "pw123456").await?;
/// ```
#[derive(Clone, Builder)]
pub struct AuthManager {
    sessions: Sessions,
    settings: Settings,
    registration_hook: Option<RegistrationHook>,
}

impl AuthManager {
    pub fn new(sessions: Sessions, settings: Settings) -> Self {
        Self {
            sessions,
            settings,
            registration_hook: None,
        }
    }

    /// Check a candidate password against the policy.
    ///
    /// Rejections carry a human-readable reason in
    /// [`Error::WeakPassword`].
    pub fn validate_password(&self, email: &str, plaintext: &str) -> Result<()> {
        if plaintext.len() < 8 {
            return Err(Error::WeakPassword {
                reason: "password must be at least 8 characters".to_string(),
            });
        }
        if !email.is_empty() && plaintext.to_lowercase().contains(&email.to_lowercase()) {
            return Err(Error::WeakPassword {
                reason: "password must not contain the email address".to_string(),
            });
        }
        Ok(())
    }

    /// Register a new account.
    ///
    /// In dev mode (no admin configured) every registered user is granted
    /// superuser, so a freshly started instance is immediately usable.
    /// The decision is read per call: configuring an admin later stops the
    /// grant without a restart.
    #[instrument(skip(self, password), fields(email = %email))]
    pub async fn register(&self, email: &str, password: &str) -> Result<User> {
        self.validate_password(email, password)?;
        let grant_superuser = self.settings.dev_mode();

        // Hash before opening a session so no transaction spans the hash
        let password_hash = hash_password_blocking(password.to_string()).await?;

        let mut session = self.sessions.begin().await?;
        let mut users = Users::new(&mut session);

        if users.get_by_email(email).await?.is_some() {
            return Err(Error::DuplicateEmail);
        }

        let created = users
            .create(&UserCreate {
                email: email.to_string(),
                password_hash: Some(password_hash),
                is_active: true,
                is_superuser: grant_superuser,
                is_verified: false,
            })
            .await
            .map_err(|e| match e {
                // Lost the race against a concurrent registration
                crate::db::DbError::UniqueViolation { .. } => Error::DuplicateEmail,
                other => Error::Database(other),
            })?;

        session.commit().await?;

        if grant_superuser {
            warn!(email = %created.email, "dev mode: granted superuser to new registration");
        }

        if let Some(hook) = &self.registration_hook {
            hook(&created);
        }

        Ok(created)
    }

    /// Authenticate with email and password, returning an access token.
    ///
    /// Unknown email, missing password hash, and wrong password all report
    /// [`Error::InvalidCredentials`]; an inactive account with the right
    /// password reports [`Error::InactiveUser`].
    #[instrument(skip(self, password), fields(email = %email))]
    pub async fn login(&self, email: &str, password: &str) -> Result<String> {
        // Release the session before the hash verification
        let mut session = self.sessions.begin().await?;
        let user = Users::new(&mut session).get_by_email(email).await?;
        session.commit().await?;

        let Some(user) = user else {
            // Burn the same time as a real verification
            let _ = verify_password_blocking(password.to_string(), PHANTOM_HASH.clone()).await;
            return Err(Error::InvalidCredentials);
        };

        let Some(hash) = user.password_hash.clone() else {
            let _ = verify_password_blocking(password.to_string(), PHANTOM_HASH.clone()).await;
            return Err(Error::InvalidCredentials);
        };

        if !verify_password_blocking(password.to_string(), hash).await? {
            return Err(Error::InvalidCredentials);
        }

        if !user.is_active {
            return Err(Error::InactiveUser);
        }

        token::issue(user.id, TokenKind::Access, &self.settings)
    }

    /// Resolve the user behind an access token, re-checking flags against
    /// the store on every call so deactivation takes effect immediately.
    #[instrument(skip(self, access_token))]
    pub async fn current_user(&self, access_token: &str, require: Require) -> Result<User> {
        let claims =
            token::validate(access_token, TokenKind::Access, &self.settings).map_err(|_| Error::Unauthenticated)?;

        let user = self.load_user(claims.sub).await?.ok_or(Error::Unauthenticated)?;

        if require.active && !user.is_active {
            return Err(Error::InactiveUser);
        }
        if require.superuser && !(user.is_superuser && user.is_active) {
            return Err(Error::Forbidden);
        }

        Ok(user)
    }

    /// Like [`current_user`], but an absent, invalid or expired token is
    /// `Ok(None)` rather than an error. A token that resolves to a user who
    /// fails the requirement still errors.
    ///
    /// [`current_user`]: AuthManager::current_user
    pub async fn current_user_optional(&self, access_token: Option<&str>, require: Require) -> Result<Option<User>> {
        let Some(access_token) = access_token else {
            return Ok(None);
        };
        match self.current_user(access_token, require).await {
            Ok(user) => Ok(Some(user)),
            Err(Error::Unauthenticated) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Mint a password-reset token for the account behind `email`.
    ///
    /// Unknown emails report [`Error::InvalidCredentials`]; hosts that want
    /// anti-enumeration swallow that variant and respond as if a message
    /// was sent.
    #[instrument(skip(self), fields(email = %email))]
    pub async fn request_password_reset(&self, email: &str) -> Result<String> {
        let user = self.find_by_email(email).await?.ok_or(Error::InvalidCredentials)?;
        if !user.is_active {
            return Err(Error::InactiveUser);
        }
        token::issue(user.id, TokenKind::PasswordReset, &self.settings)
    }

    /// Set a new password using a reset token.
    #[instrument(skip(self, reset_token, new_password))]
    pub async fn complete_password_reset(&self, reset_token: &str, new_password: &str) -> Result<User> {
        let claims =
            token::validate(reset_token, TokenKind::PasswordReset, &self.settings).map_err(|_| Error::InvalidToken)?;

        let user = self.load_user(claims.sub).await?.ok_or(Error::InvalidToken)?;
        if !user.is_active {
            return Err(Error::InactiveUser);
        }
        self.validate_password(&user.email, new_password)?;

        let password_hash = hash_password_blocking(new_password.to_string()).await?;

        let mut session = self.sessions.begin().await?;
        let updated = Users::new(&mut session)
            .update(
                user.id,
                &UserUpdate {
                    password_hash: Some(password_hash),
                    ..Default::default()
                },
            )
            .await?;
        session.commit().await?;

        Ok(updated)
    }

    /// Mint an email-verification token for the account behind `email`.
    ///
    /// Already-verified accounts still get a token; completing it is a
    /// no-op, so retried verification emails stay harmless.
    #[instrument(skip(self), fields(email = %email))]
    pub async fn request_verification(&self, email: &str) -> Result<String> {
        let user = self.find_by_email(email).await?.ok_or(Error::InvalidCredentials)?;
        if !user.is_active {
            return Err(Error::InactiveUser);
        }
        token::issue(user.id, TokenKind::Verification, &self.settings)
    }

    /// Mark the account behind a verification token as verified.
    #[instrument(skip(self, verification_token))]
    pub async fn complete_verification(&self, verification_token: &str) -> Result<User> {
        let claims = token::validate(verification_token, TokenKind::Verification, &self.settings)
            .map_err(|_| Error::InvalidToken)?;

        let user = self.load_user(claims.sub).await?.ok_or(Error::InvalidToken)?;
        if user.is_verified {
            return Ok(user);
        }

        let mut session = self.sessions.begin().await?;
        let updated = Users::new(&mut session)
            .update(
                user.id,
                &UserUpdate {
                    is_verified: Some(true),
                    ..Default::default()
                },
            )
            .await?;
        session.commit().await?;

        Ok(updated)
    }

    async fn load_user(&self, id: UserId) -> Result<Option<User>> {
        let mut session = self.sessions.begin().await?;
        let user = Users::new(&mut session).get_by_id(id).await?;
        session.commit().await?;
        Ok(user)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        let mut session = self.sessions.begin().await?;
        let user = Users::new(&mut session).get_by_email(email).await?;
        session.commit().await?;
        Ok(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Engine;
    use crate::test_utils::{memory_manager, test_settings};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Settings with an admin configured, so registrations are not granted
    /// superuser.
    fn configured_settings() -> Settings {
        Settings {
            admin_email: Some("admin@example.com".to_string()),
            admin_password: Some("admin-pw-123".to_string()),
            ..test_settings()
        }
    }

    async fn configured_manager() -> (Engine, AuthManager) {
        let engine = crate::test_utils::memory_engine().await;
        let manager = AuthManager::new(engine.sessions(), configured_settings());
        (engine, manager)
    }

    #[test_log::test(tokio::test)]
    async fn test_register_and_login() {
        let (engine, manager) = memory_manager().await;

        let user = manager.register("alice@example.com", "pw123456").await.unwrap();
        assert_eq!(user.email, "alice@example.com");
        assert!(user.is_active);
        assert!(!user.is_verified);

        let access_token = manager.login("alice@example.com", "pw123456").await.unwrap();
        let resolved = manager.current_user(&access_token, Require::ACTIVE).await.unwrap();
        assert_eq!(resolved.id, user.id);

        engine.stop().await;
    }

    #[test_log::test(tokio::test)]
    async fn test_login_failures_are_invalid_credentials() {
        let (engine, manager) = memory_manager().await;
        manager.register("alice@example.com", "pw123456").await.unwrap();

        let err = manager.login("alice@example.com", "pw000000").await.unwrap_err();
        assert!(matches!(err, Error::InvalidCredentials));

        // Unknown account reports the same error as a wrong password
        let err = manager.login("nobody@example.com", "pw123456").await.unwrap_err();
        assert!(matches!(err, Error::InvalidCredentials));

        engine.stop().await;
    }

    #[test_log::test(tokio::test)]
    async fn test_duplicate_registration() {
        let (engine, manager) = memory_manager().await;
        manager.register("alice@example.com", "pw123456").await.unwrap();

        let err = manager.register("Alice@Example.com", "pw654321").await.unwrap_err();
        assert!(matches!(err, Error::DuplicateEmail));

        engine.stop().await;
    }

    #[test_log::test(tokio::test)]
    async fn test_password_policy() {
        let (engine, manager) = memory_manager().await;

        let err = manager.register("alice@example.com", "short").await.unwrap_err();
        assert!(matches!(err, Error::WeakPassword { .. }));

        let err = manager
            .register("alice@example.com", "xxalice@example.comxx")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::WeakPassword { .. }));

        engine.stop().await;
    }

    #[test_log::test(tokio::test)]
    async fn test_dev_mode_grants_superuser() {
        let (engine, manager) = memory_manager().await;

        // The grant applies to every registration, not just the first
        let alice = manager.register("alice@example.com", "pw123456").await.unwrap();
        let bob = manager.register("bob@example.com", "pw654321").await.unwrap();
        assert!(alice.is_superuser);
        assert!(bob.is_superuser);

        engine.stop().await;
    }

    #[test_log::test(tokio::test)]
    async fn test_configured_mode_does_not_grant_superuser() {
        let (engine, manager) = configured_manager().await;
        let user = manager.register("alice@example.com", "pw123456").await.unwrap();
        assert!(!user.is_superuser);
        engine.stop().await;
    }

    #[test_log::test(tokio::test)]
    async fn test_deactivation_takes_effect_immediately() {
        let (engine, manager) = memory_manager().await;
        let user = manager.register("alice@example.com", "pw123456").await.unwrap();
        let access_token = manager.login("alice@example.com", "pw123456").await.unwrap();

        // Deactivate behind the token's back
        let mut session = engine.sessions().begin().await.unwrap();
        Users::new(&mut session)
            .update(user.id, &UserUpdate { is_active: Some(false), ..Default::default() })
            .await
            .unwrap();
        session.commit().await.unwrap();

        let err = manager.current_user(&access_token, Require::ACTIVE).await.unwrap_err();
        assert!(matches!(err, Error::InactiveUser));

        // Require::ANY still resolves the record
        let resolved = manager.current_user(&access_token, Require::ANY).await.unwrap();
        assert!(!resolved.is_active);

        // And a fresh login is refused outright
        let err = manager.login("alice@example.com", "pw123456").await.unwrap_err();
        assert!(matches!(err, Error::InactiveUser));

        engine.stop().await;
    }

    #[test_log::test(tokio::test)]
    async fn test_superuser_requirement() {
        let (engine, manager) = configured_manager().await;
        manager.register("alice@example.com", "pw123456").await.unwrap();
        let access_token = manager.login("alice@example.com", "pw123456").await.unwrap();

        let err = manager.current_user(&access_token, Require::SUPERUSER).await.unwrap_err();
        assert!(matches!(err, Error::Forbidden));

        engine.stop().await;
    }

    #[test_log::test(tokio::test)]
    async fn test_current_user_bad_tokens() {
        let (engine, manager) = memory_manager().await;

        let err = manager.current_user("garbage", Require::ACTIVE).await.unwrap_err();
        assert!(matches!(err, Error::Unauthenticated));

        // A valid token whose user has vanished is also unauthenticated
        let token = crate::auth::token::issue(uuid::Uuid::new_v4(), TokenKind::Access, &test_settings()).unwrap();
        let err = manager.current_user(&token, Require::ACTIVE).await.unwrap_err();
        assert!(matches!(err, Error::Unauthenticated));

        engine.stop().await;
    }

    #[test_log::test(tokio::test)]
    async fn test_current_user_optional() {
        let (engine, manager) = memory_manager().await;
        manager.register("alice@example.com", "pw123456").await.unwrap();
        let access_token = manager.login("alice@example.com", "pw123456").await.unwrap();

        let resolved = manager
            .current_user_optional(Some(&access_token), Require::ACTIVE)
            .await
            .unwrap();
        assert!(resolved.is_some());

        assert!(manager.current_user_optional(None, Require::ACTIVE).await.unwrap().is_none());
        assert!(
            manager
                .current_user_optional(Some("garbage"), Require::ACTIVE)
                .await
                .unwrap()
                .is_none()
        );

        engine.stop().await;
    }

    #[test_log::test(tokio::test)]
    async fn test_password_reset_flow() {
        let (engine, manager) = memory_manager().await;
        manager.register("alice@example.com", "pw123456").await.unwrap();

        let reset_token = manager.request_password_reset("alice@example.com").await.unwrap();
        manager.complete_password_reset(&reset_token, "pw-new-999").await.unwrap();

        let err = manager.login("alice@example.com", "pw123456").await.unwrap_err();
        assert!(matches!(err, Error::InvalidCredentials));
        manager.login("alice@example.com", "pw-new-999").await.unwrap();

        engine.stop().await;
    }

    #[test_log::test(tokio::test)]
    async fn test_password_reset_rejects_wrong_token_kind() {
        let (engine, manager) = memory_manager().await;
        manager.register("alice@example.com", "pw123456").await.unwrap();
        let access_token = manager.login("alice@example.com", "pw123456").await.unwrap();

        let err = manager.complete_password_reset(&access_token, "pw-new-999").await.unwrap_err();
        assert!(matches!(err, Error::InvalidToken));

        engine.stop().await;
    }

    #[test_log::test(tokio::test)]
    async fn test_password_reset_unknown_email() {
        let (engine, manager) = memory_manager().await;
        let err = manager.request_password_reset("nobody@example.com").await.unwrap_err();
        assert!(matches!(err, Error::InvalidCredentials));
        engine.stop().await;
    }

    #[test_log::test(tokio::test)]
    async fn test_password_reset_enforces_policy() {
        let (engine, manager) = memory_manager().await;
        manager.register("alice@example.com", "pw123456").await.unwrap();

        let reset_token = manager.request_password_reset("alice@example.com").await.unwrap();
        let err = manager.complete_password_reset(&reset_token, "short").await.unwrap_err();
        assert!(matches!(err, Error::WeakPassword { .. }));

        // The old password still works
        manager.login("alice@example.com", "pw123456").await.unwrap();

        engine.stop().await;
    }

    #[test_log::test(tokio::test)]
    async fn test_verification_flow() {
        let (engine, manager) = memory_manager().await;
        let user = manager.register("alice@example.com", "pw123456").await.unwrap();
        assert!(!user.is_verified);

        let verification_token = manager.request_verification("alice@example.com").await.unwrap();
        let verified = manager.complete_verification(&verification_token).await.unwrap();
        assert!(verified.is_verified);

        // Completing again is a no-op
        let again = manager.complete_verification(&verification_token).await.unwrap();
        assert!(again.is_verified);

        engine.stop().await;
    }

    #[test_log::test(tokio::test)]
    async fn test_registration_hook_runs_after_commit() {
        let engine = crate::test_utils::memory_engine().await;
        static CALLS: AtomicUsize = AtomicUsize::new(0);

        let manager = AuthManager::builder()
            .sessions(engine.sessions())
            .settings(test_settings())
            .registration_hook(Arc::new(|_user: &User| {
                CALLS.fetch_add(1, Ordering::SeqCst);
            }) as RegistrationHook)
            .build();

        manager.register("alice@example.com", "pw123456").await.unwrap();
        assert_eq!(CALLS.load(Ordering::SeqCst), 1);

        // Failed registrations do not fire the hook
        let _ = manager.register("alice@example.com", "pw123456").await.unwrap_err();
        assert_eq!(CALLS.load(Ordering::SeqCst), 1);

        engine.stop().await;
    }
}
