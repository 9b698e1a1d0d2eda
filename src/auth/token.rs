//! JWT issuing and validation for the three token families.
//!
//! Each [`TokenKind`] signs with its own secret and carries its own audience
//! claim, so a token minted for one purpose can never be replayed for
//! another. Expiry is checked manually against an injectable clock rather
//! than by the JWT library, which lets tests exercise expiry without
//! sleeping.

use chrono::{DateTime, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::{config::Settings, errors::Error, types::UserId};

/// The purpose a token was minted for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// Session access token returned by login.
    Access,
    /// Single-purpose token for completing a password reset.
    PasswordReset,
    /// Single-purpose token for confirming an email address.
    Verification,
}

impl TokenKind {
    /// The audience claim stamped into tokens of this kind.
    pub fn audience(&self) -> &'static str {
        match self {
            TokenKind::Access => "authcore:access",
            TokenKind::PasswordReset => "authcore:reset",
            TokenKind::Verification => "authcore:verify",
        }
    }

    fn secret<'a>(&self, settings: &'a Settings) -> &'a str {
        match self {
            TokenKind::Access => &settings.secret_key,
            TokenKind::PasswordReset => &settings.reset_password_secret,
            TokenKind::Verification => &settings.verification_secret,
        }
    }

    fn lifetime(&self, settings: &Settings) -> chrono::Duration {
        match self {
            TokenKind::Access => settings.access_token_lifetime(),
            TokenKind::PasswordReset => settings.reset_token_lifetime(),
            TokenKind::Verification => settings.verification_token_lifetime(),
        }
    }
}

/// Why a token was rejected.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TokenError {
    /// Not a decodable JWT at all.
    #[error("malformed token")]
    Malformed,
    /// Decoded fine but its expiry has passed.
    #[error("expired token")]
    Expired,
    /// Signature or audience does not match this token kind.
    #[error("bad signature")]
    BadSignature,
}

/// Claims carried by every token.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: UserId,
    pub aud: String,
    pub exp: i64,
    pub iat: i64,
}

/// Issue a token for `user_id` expiring after the kind's configured lifetime.
pub fn issue(user_id: UserId, kind: TokenKind, settings: &Settings) -> Result<String, Error> {
    issue_at(user_id, kind, settings, Utc::now())
}

/// Issue a token as if the current time were `now`.
pub fn issue_at(user_id: UserId, kind: TokenKind, settings: &Settings, now: DateTime<Utc>) -> Result<String, Error> {
    let claims = Claims {
        sub: user_id,
        aud: kind.audience().to_string(),
        exp: (now + kind.lifetime(settings)).timestamp(),
        iat: now.timestamp(),
    };

    let key = EncodingKey::from_secret(kind.secret(settings).as_bytes());
    encode(&Header::default(), &claims, &key).map_err(|e| Error::Internal {
        operation: format!("create JWT: {e}"),
    })
}

/// Validate a token against the given kind's secret and audience.
pub fn validate(token: &str, kind: TokenKind, settings: &Settings) -> Result<Claims, TokenError> {
    validate_at(token, kind, settings, Utc::now())
}

/// Validate a token as if the current time were `now`.
///
/// Signature and audience are always checked first, so an expired token
/// presented with the wrong secret reports [`TokenError::BadSignature`],
/// while an expired token that would otherwise verify reports
/// [`TokenError::Expired`].
pub fn validate_at(token: &str, kind: TokenKind, settings: &Settings, now: DateTime<Utc>) -> Result<Claims, TokenError> {
    let key = DecodingKey::from_secret(kind.secret(settings).as_bytes());
    let mut validation = Validation::new(Algorithm::HS256);
    // Expiry is checked below against the injected clock.
    validation.validate_exp = false;
    validation.set_audience(&[kind.audience()]);

    let token_data = decode::<Claims>(token, &key, &validation).map_err(|e| match e.kind() {
        jsonwebtoken::errors::ErrorKind::InvalidSignature
        | jsonwebtoken::errors::ErrorKind::InvalidAudience => TokenError::BadSignature,
        _ => TokenError::Malformed,
    })?;

    if token_data.claims.exp < now.timestamp() {
        return Err(TokenError::Expired);
    }

    Ok(token_data.claims)
}
