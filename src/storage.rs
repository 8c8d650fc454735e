use std::path::Path;

use anyhow::Context;
use async_trait::async_trait;
use aws_config::{defaults, BehaviorVersion};
use aws_credential_types::Credentials;
use aws_sdk_s3::{
    config::{Builder as S3ConfigBuilder, Region},
    Client,
};
use aws_smithy_types::byte_stream::ByteStream;
use tracing::debug;

use crate::config::StorageConfig;

/// Where an uploaded asset can be fetched from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedAsset {
    pub url: String,
}

/// External object storage for profile assets.
#[async_trait]
pub trait AssetStore: Send + Sync {
    /// Uploads a staged local file. Does not remove the file.
    async fn upload(&self, local: &Path, key: &str, content_type: &str)
        -> anyhow::Result<UploadedAsset>;
}

#[derive(Clone)]
pub struct S3AssetStore {
    client: Client,
    bucket: String,
    public_base_url: String,
}

impl S3AssetStore {
    pub async fn new(cfg: &StorageConfig) -> anyhow::Result<Self> {
        let shared = defaults(BehaviorVersion::latest())
            .region(Region::new(cfg.region.clone()))
            .credentials_provider(Credentials::new(
                &cfg.access_key,
                &cfg.secret_key,
                None,
                None,
                "static",
            ))
            .endpoint_url(&cfg.endpoint)
            .load()
            .await;

        let conf = S3ConfigBuilder::from(&shared)
            .endpoint_url(&cfg.endpoint)
            .force_path_style(true)
            .build();

        Ok(Self {
            client: Client::from_conf(conf),
            bucket: cfg.bucket.clone(),
            public_base_url: cfg.public_base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl AssetStore for S3AssetStore {
    async fn upload(
        &self,
        local: &Path,
        key: &str,
        content_type: &str,
    ) -> anyhow::Result<UploadedAsset> {
        let body = tokio::fs::read(local)
            .await
            .with_context(|| format!("read staged file {}", local.display()))?;
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(body))
            .content_type(content_type)
            .send()
            .await
            .context("s3 put_object")?;
        debug!(%key, "asset uploaded");
        Ok(UploadedAsset {
            url: format!("{}/{}", self.public_base_url, key),
        })
    }
}
