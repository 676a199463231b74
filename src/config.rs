use std::env;
use std::str::FromStr;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{name} has an invalid value: {value}")]
    Invalid { name: &'static str, value: String },

    #[error("JWT_SECRET and EMAIL_SECRET must be different")]
    SharedSecret,
}

/// The fixed admin identity. Admin is not a stored account.
#[derive(Debug, Clone)]
pub struct AdminConfig {
    pub id: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub endpoint: Option<String>,
    pub access_key: String,
    pub secret_key: String,
    pub bucket: String,
    /// Base used to build public asset URLs, e.g. `http://localhost:9000`.
    pub public_url: String,
}

#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub from: String,
}

/// Process configuration, read once at startup and shared read-only.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: Option<String>,
    pub bind_addr: String,
    pub cors_allowed_origins: Vec<String>,
    pub client_url: String,
    pub jwt_secret: String,
    pub email_secret: String,
    pub session_ttl: chrono::Duration,
    pub invitation_ttl: chrono::Duration,
    pub bcrypt_cost: u32,
    pub admin: AdminConfig,
    pub storage: StorageConfig,
    pub smtp: SmtpConfig,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let jwt_secret = required("JWT_SECRET")?;
        let email_secret = required("EMAIL_SECRET")?;
        if jwt_secret == email_secret {
            return Err(ConfigError::SharedSecret);
        }

        let endpoint = optional("MINIO_ENDPOINT");
        let storage = StorageConfig {
            public_url: optional("MEDIA_PUBLIC_URL")
                .or_else(|| endpoint.clone())
                .unwrap_or_else(|| "http://localhost:9000".to_string()),
            endpoint,
            access_key: optional("MINIO_ACCESS_KEY").unwrap_or_else(|| "minio".to_string()),
            secret_key: optional("MINIO_SECRET_KEY").unwrap_or_else(|| "minio123".to_string()),
            bucket: optional("MINIO_BUCKET").unwrap_or_else(|| "videos".to_string()),
        };

        let smtp = SmtpConfig {
            host: optional("SMTP_HOST").unwrap_or_default(),
            port: parsed("SMTP_PORT", 465)?,
            username: optional("SMTP_USERNAME"),
            password: optional("SMTP_PASSWORD"),
            from: optional("SMTP_FROM").unwrap_or_else(|| "noreply@localhost".to_string()),
        };

        Ok(Self {
            database_url: optional("DATABASE_URL"),
            bind_addr: optional("BIND_ADDR").unwrap_or_else(|| "0.0.0.0:5050".to_string()),
            cors_allowed_origins: optional("CORS_ALLOWED_ORIGINS")
                .unwrap_or_else(|| "http://localhost:3000".to_string())
                .split(',')
                .map(|origin| origin.trim().to_string())
                .filter(|origin| !origin.is_empty())
                .collect(),
            client_url: optional("CLIENT_URL").unwrap_or_else(|| "http://localhost:3000".to_string()),
            jwt_secret,
            email_secret,
            session_ttl: chrono::Duration::hours(parsed("SESSION_TTL_HOURS", 24)?),
            invitation_ttl: chrono::Duration::days(parsed("INVITATION_TTL_DAYS", 7)?),
            bcrypt_cost: parsed("BCRYPT_COST", bcrypt::DEFAULT_COST)?,
            admin: AdminConfig {
                id: required("ADMIN_ID")?,
                email: required("ADMIN_EMAIL")?,
                password: required("ADMIN_PASSWORD")?,
            },
            storage,
            smtp,
        })
    }
}

fn optional(name: &'static str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.trim().is_empty())
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    optional(name).ok_or(ConfigError::Missing(name))
}

fn parsed<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match optional(name) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
        None => Ok(default),
    }
}
