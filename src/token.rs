use chrono::Utc;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::Config;
use crate::error::AppError;
use crate::models::Role;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub role: Role,
    pub iat: usize,
    pub exp: usize,
}

/// Which secret a token is signed with. A token of one kind never verifies as the other.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Session,
    Invitation,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("token expired")]
    Expired,

    #[error("invalid token")]
    Invalid,
}

impl From<TokenError> for AppError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Expired => AppError::TokenExpired,
            TokenError::Invalid => AppError::Unauthorized("Invalid token".to_string()),
        }
    }
}

struct Keys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl Keys {
    fn from_secret(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        }
    }
}

pub struct TokenService {
    session: Keys,
    invitation: Keys,
    session_ttl: chrono::Duration,
    invitation_ttl: chrono::Duration,
    validation: Validation,
}

impl TokenService {
    pub fn from_config(config: &Config) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        Self {
            session: Keys::from_secret(&config.jwt_secret),
            invitation: Keys::from_secret(&config.email_secret),
            session_ttl: config.session_ttl,
            invitation_ttl: config.invitation_ttl,
            validation,
        }
    }

    fn keys(&self, kind: TokenKind) -> &Keys {
        match kind {
            TokenKind::Session => &self.session,
            TokenKind::Invitation => &self.invitation,
        }
    }

    pub fn issue(
        &self,
        subject: &str,
        role: Role,
        kind: TokenKind,
        ttl: chrono::Duration,
    ) -> Result<String, AppError> {
        let now = Utc::now();
        let claims = Claims {
            sub: subject.to_string(),
            role,
            iat: now.timestamp().max(0) as usize,
            exp: (now + ttl).timestamp().max(0) as usize,
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.keys(kind).encoding)
            .map_err(|e| AppError::InternalError(format!("failed to sign token: {}", e)))
    }

    pub fn issue_session(&self, subject: &str, role: Role) -> Result<String, AppError> {
        self.issue(subject, role, TokenKind::Session, self.session_ttl)
    }

    pub fn issue_invitation(&self, subject: &str) -> Result<String, AppError> {
        self.issue(subject, Role::Creator, TokenKind::Invitation, self.invitation_ttl)
    }

    pub fn verify(&self, token: &str, kind: TokenKind) -> Result<Claims, TokenError> {
        decode::<Claims>(token, &self.keys(kind).decoding, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Invalid,
            })
    }
}

/// Pulls the credential out of an `Authorization: Bearer <token>` header value.
pub fn bearer(header: &str) -> Option<&str> {
    header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty() && *token != "null")
}
