use std::sync::Arc;

use aws_sdk_s3::config::Credentials;
use aws_sdk_s3::Client;
use aws_types::region::Region;
use log::{info, warn};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::config::{Config, SmtpConfig, StorageConfig};
use crate::error::{AppError, Result};
use crate::mail::{LogMailer, Mailer, SmtpMailer};
use crate::media::{MediaHost, S3MediaHost};
use crate::store::{MemoryStore, PgStore};
use crate::AppState;

pub async fn init_db_pool(database_url: &str) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await?;
    Ok(pool)
}

pub async fn init_s3_client(config: &StorageConfig) -> Client {
    let sdk_config = aws_config::from_env().load().await;
    let mut s3_config_builder = aws_sdk_s3::config::Builder::from(&sdk_config);

    if let Some(endpoint) = &config.endpoint {
        s3_config_builder = s3_config_builder.endpoint_url(endpoint).force_path_style(true);
    }

    let credentials = Credentials::new(
        config.access_key.clone(),
        config.secret_key.clone(),
        None,
        None,
        "env",
    );
    s3_config_builder = s3_config_builder.credentials_provider(credentials);

    s3_config_builder = match sdk_config.region() {
        Some(region) => s3_config_builder.region(region.clone()),
        None => s3_config_builder.region(Region::new("us-east-1")),
    };

    Client::from_conf(s3_config_builder.build())
}

/// Creates the bucket on first start against a fresh MinIO.
pub async fn ensure_bucket_exists(client: &Client, bucket: &str) -> Result<()> {
    if client.head_bucket().bucket(bucket).send().await.is_ok() {
        return Ok(());
    }
    client
        .create_bucket()
        .bucket(bucket)
        .send()
        .await
        .map_err(|e| AppError::MediaError(format!("failed to create bucket {}: {:?}", bucket, e)))?;
    info!("Created bucket {}", bucket);
    Ok(())
}

pub fn init_mailer(config: &SmtpConfig) -> Result<Arc<dyn Mailer>> {
    if config.host.trim().is_empty() {
        warn!("SMTP_HOST not set; invitation emails will only be logged");
        return Ok(Arc::new(LogMailer));
    }
    Ok(Arc::new(SmtpMailer::new(config)?))
}

/// Wires every collaborator from configuration.
pub async fn build_state(config: Config) -> Result<AppState> {
    let s3_client = init_s3_client(&config.storage).await;
    ensure_bucket_exists(&s3_client, &config.storage.bucket).await?;
    let media: Arc<dyn MediaHost> = Arc::new(S3MediaHost::new(s3_client, &config.storage));
    let mailer = init_mailer(&config.smtp)?;

    let state = match &config.database_url {
        Some(url) => {
            let store = PgStore::new(init_db_pool(url).await?);
            store.migrate().await?;
            info!("Connected to Postgres and applied migrations");
            AppState::new(config, Arc::new(store), media, mailer)
        }
        None => {
            warn!("DATABASE_URL not set; using the in-memory store, data will not survive a restart");
            AppState::new(config, Arc::new(MemoryStore::new()), media, mailer)
        }
    };
    Ok(state)
}
