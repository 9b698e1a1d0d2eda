use crate::db::errors::DbError;
use thiserror::Error as ThisError;

/// Error taxonomy exposed to host applications.
///
/// Everything except [`Error::Configuration`], [`Error::Database`] and
/// [`Error::Internal`] is a recoverable, typed outcome that the host's HTTP
/// layer maps to a client-facing status code. Raw driver errors never cross
/// this boundary.
#[derive(ThisError, Debug)]
pub enum Error {
    /// Malformed storage URL, missing secret, or other invalid settings.
    /// Fatal at startup, never retried.
    #[error("configuration error: {message}")]
    Configuration { message: String },

    /// Registration attempted with an email that already has an account
    #[error("an account with this email address already exists")]
    DuplicateEmail,

    /// Registration or password change rejected by the password policy
    #[error("password rejected: {reason}")]
    WeakPassword { reason: String },

    /// Login failed. Deliberately covers both "no such user" and "wrong
    /// password" so callers cannot enumerate accounts.
    #[error("invalid email or password")]
    InvalidCredentials,

    /// The account exists but has been disabled
    #[error("user account is inactive")]
    InactiveUser,

    /// A password-reset or verification token failed validation
    #[error("invalid or expired token")]
    InvalidToken,

    /// Authentication required but not provided, or the presented token is
    /// expired, mis-signed, or refers to a vanished user
    #[error("not authenticated")]
    Unauthenticated,

    /// The caller is authenticated but lacks the required privilege
    #[error("insufficient privileges")]
    Forbidden,

    /// Database operation error. Transient storage failures (connection
    /// drop, pool exhaustion) surface here; retry policy belongs to the host.
    #[error(transparent)]
    Database(#[from] DbError),

    /// Generic internal service error
    #[error("failed to {operation}")]
    Internal { operation: String },
}

impl Error {
    /// Returns a user-safe error message, without leaking internal implementation details
    pub fn user_message(&self) -> String {
        match self {
            Error::Configuration { .. } => "Service misconfigured".to_string(),
            Error::DuplicateEmail => "An account with this email address already exists".to_string(),
            Error::WeakPassword { reason } => format!("Password rejected: {reason}"),
            Error::InvalidCredentials => "Invalid email or password".to_string(),
            Error::InactiveUser => "This account is inactive".to_string(),
            Error::InvalidToken => "Invalid or expired token".to_string(),
            Error::Unauthenticated => "Authentication required".to_string(),
            Error::Forbidden => "Insufficient privileges".to_string(),
            Error::Database(db_err) => match db_err {
                DbError::NotFound => "Resource not found".to_string(),
                DbError::UniqueViolation { .. } => "Resource already exists".to_string(),
                DbError::Other(_) => "Database error occurred".to_string(),
            },
            Error::Internal { .. } => "Internal server error".to_string(),
        }
    }

    /// Whether this error should be logged at error level (unexpected) rather
    /// than as a routine client failure.
    pub fn is_internal(&self) -> bool {
        matches!(self, Error::Internal { .. } | Error::Database(DbError::Other(_)) | Error::Configuration { .. })
    }
}

/// Type alias for service operation results
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_messages_do_not_leak_detail() {
        let err = Error::Internal {
            operation: "connect to secret-host:5432".to_string(),
        };
        assert!(!err.user_message().contains("secret-host"));

        let err = Error::Database(DbError::Other(anyhow::anyhow!("TLS handshake with 10.0.0.3 failed")));
        assert!(!err.user_message().contains("10.0.0.3"));
    }

    #[test]
    fn test_internal_classification() {
        assert!(Error::Internal { operation: "x".into() }.is_internal());
        assert!(!Error::InvalidCredentials.is_internal());
        assert!(!Error::Unauthenticated.is_internal());
    }
}
