use std::path::Path;

use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use log::info;
use uuid::Uuid;

use crate::config::StorageConfig;
use crate::error::{AppError, Result};

/// Where an uploaded binary ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostedAsset {
    pub url: String,
    pub public_id: String,
}

/// External host for video binaries.
#[async_trait]
pub trait MediaHost: Send + Sync {
    async fn upload(&self, path: &Path, content_type: &str) -> Result<HostedAsset>;
    async fn delete(&self, public_id: &str) -> Result<()>;
}

pub struct S3MediaHost {
    client: Client,
    bucket: String,
    public_url: String,
}

impl S3MediaHost {
    pub fn new(client: Client, config: &StorageConfig) -> Self {
        Self {
            client,
            bucket: config.bucket.clone(),
            public_url: config.public_url.trim_end_matches('/').to_string(),
        }
    }

    fn object_url(&self, key: &str) -> String {
        format!("{}/{}/{}", self.public_url, self.bucket, key)
    }
}

#[async_trait]
impl MediaHost for S3MediaHost {
    async fn upload(&self, path: &Path, content_type: &str) -> Result<HostedAsset> {
        let key = format!("videos/{}", Uuid::new_v4());
        let body = ByteStream::from_path(path)
            .await
            .map_err(|e| AppError::MediaError(format!("failed to read upload: {}", e)))?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .content_type(content_type)
            .body(body)
            .send()
            .await
            .map_err(|e| AppError::MediaError(format!("{:?}", e)))?;

        info!("Stored video object {}/{}", self.bucket, key);
        Ok(HostedAsset {
            url: self.object_url(&key),
            public_id: key,
        })
    }

    async fn delete(&self, public_id: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(public_id)
            .send()
            .await
            .map_err(|e| AppError::MediaError(format!("{:?}", e)))?;
        info!("Deleted video object {}/{}", self.bucket, public_id);
        Ok(())
    }
}
