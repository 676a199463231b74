// Shared by the library's unit tests and the integration tests.
use super::{AdminConfig, Config, SmtpConfig, StorageConfig};

pub const ADMIN_EMAIL: &str = "admin@example.com";
pub const ADMIN_PASSWORD: &str = "admin-password";

pub fn test_config() -> Config {
    Config {
        database_url: None,
        bind_addr: "127.0.0.1:0".to_string(),
        cors_allowed_origins: vec!["http://localhost:3000".to_string()],
        client_url: "http://localhost:3000".to_string(),
        jwt_secret: "session-secret-for-tests".to_string(),
        email_secret: "invitation-secret-for-tests".to_string(),
        session_ttl: chrono::Duration::hours(24),
        invitation_ttl: chrono::Duration::days(7),
        bcrypt_cost: 4,
        admin: AdminConfig {
            id: "admin".to_string(),
            email: ADMIN_EMAIL.to_string(),
            password: ADMIN_PASSWORD.to_string(),
        },
        storage: StorageConfig {
            endpoint: None,
            access_key: "minio".to_string(),
            secret_key: "minio123".to_string(),
            bucket: "videos".to_string(),
            public_url: "http://localhost:9000".to_string(),
        },
        smtp: SmtpConfig {
            host: String::new(),
            port: 465,
            username: None,
            password: None,
            from: "noreply@localhost".to_string(),
        },
    }
}
