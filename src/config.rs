use anyhow::Context;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
    pub refresh_ttl_minutes: i64,
}

/// Endpoint of a JSON mail API (`POST {from, to, subject, text}` with a bearer key).
#[derive(Debug, Clone, Deserialize)]
pub struct MailApiConfig {
    pub url: String,
    pub key: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MailConfig {
    /// Sender address for every outgoing message.
    pub from: String,
    /// When unset, messages are logged instead of delivered.
    pub api: Option<MailApiConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub jwt: JwtConfig,
    pub mail: MailConfig,
    /// Host used in confirmation links when the request carries no `Host` header.
    pub public_host: String,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL")?;
        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET").context("JWT_SECRET")?,
            issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "accounts".into()),
            audience: std::env::var("JWT_AUDIENCE").unwrap_or_else(|_| "accounts-users".into()),
            ttl_minutes: std::env::var("JWT_TTL_MINUTES")
                .ok()
                .and_then(|v| v.parse::<i64>().ok())
                .unwrap_or(60),
            refresh_ttl_minutes: std::env::var("JWT_REFRESH_TTL_MINUTES")
                .ok()
                .and_then(|v| v.parse::<i64>().ok())
                .unwrap_or(60 * 24 * 14),
        };

        let api = match std::env::var("MAIL_API_URL") {
            Ok(url) => Some(MailApiConfig {
                url,
                key: std::env::var("MAIL_API_KEY").context("MAIL_API_KEY is required with MAIL_API_URL")?,
            }),
            Err(_) => None,
        };
        let mail = MailConfig {
            from: std::env::var("EMAIL_FROM").context("EMAIL_FROM")?,
            api,
        };

        let public_host = std::env::var("PUBLIC_HOST").unwrap_or_else(|_| "localhost:8080".into());

        Ok(Self {
            database_url,
            jwt,
            mail,
            public_host,
        })
    }
}
