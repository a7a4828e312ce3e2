use jsonwebtoken::{decode, encode, errors::ErrorKind, DecodingKey, EncodingKey, Header, Validation};
use thiserror::Error;
use time::{Duration, OffsetDateTime};
use tracing::debug;
use uuid::Uuid;

use super::claims::{Claims, TokenKind};
use crate::config::JwtConfig;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("session expired")]
    Expired,
    #[error("invalid session token")]
    Invalid,
    #[error("{0:?} token required")]
    WrongKind(TokenKind),
}

/// Access and refresh tokens handed out at login.
#[derive(Debug)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
}

/// HS256 keys for account sessions, built once from `JwtConfig`.
pub struct SessionKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    issuer: String,
    audience: String,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl SessionKeys {
    pub fn from_config(cfg: &JwtConfig) -> Self {
        let mut validation = Validation::default();
        validation.set_audience(&[cfg.audience.as_str()]);
        validation.set_issuer(&[cfg.issuer.as_str()]);
        Self {
            encoding: EncodingKey::from_secret(cfg.secret.as_bytes()),
            decoding: DecodingKey::from_secret(cfg.secret.as_bytes()),
            validation,
            issuer: cfg.issuer.clone(),
            audience: cfg.audience.clone(),
            access_ttl: Duration::minutes(cfg.ttl_minutes.max(0)),
            refresh_ttl: Duration::minutes(cfg.refresh_ttl_minutes.max(0)),
        }
    }

    pub fn issue(&self, account_id: Uuid, kind: TokenKind) -> anyhow::Result<String> {
        let issued_at = OffsetDateTime::now_utc();
        let ttl = match kind {
            TokenKind::Access => self.access_ttl,
            TokenKind::Refresh => self.refresh_ttl,
        };
        let claims = Claims {
            sub: account_id,
            iat: issued_at.unix_timestamp() as usize,
            exp: (issued_at + ttl).unix_timestamp() as usize,
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            kind,
        };
        Ok(encode(&Header::default(), &claims, &self.encoding)?)
    }

    pub fn issue_pair(&self, account_id: Uuid) -> anyhow::Result<TokenPair> {
        Ok(TokenPair {
            access: self.issue(account_id, TokenKind::Access)?,
            refresh: self.issue(account_id, TokenKind::Refresh)?,
        })
    }

    /// Validates signature, issuer, audience and expiry, then the token kind.
    pub fn decode(&self, token: &str, expected: TokenKind) -> Result<Claims, TokenError> {
        let claims = decode::<Claims>(token, &self.decoding, &self.validation)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Invalid,
            })?
            .claims;
        if claims.kind != expected {
            return Err(TokenError::WrongKind(expected));
        }
        debug!(account_id = %claims.sub, kind = ?claims.kind, "session token accepted");
        Ok(claims)
    }
}
