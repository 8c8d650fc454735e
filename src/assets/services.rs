use std::path::Path;

use anyhow::Context;
use axum::extract::multipart::{Field, MultipartError};
use bytes::Bytes;
use tracing::{instrument, warn};
use uuid::Uuid;

use crate::storage::{AssetStore, UploadedAsset};

/// A file received in a multipart request, not yet uploaded.
#[derive(Debug, Clone)]
pub struct PendingUpload {
    pub body: Bytes,
    pub content_type: String,
}

impl PendingUpload {
    pub async fn from_field(field: Field<'_>) -> Result<Self, MultipartError> {
        let content_type = field
            .content_type()
            .map(|s| s.to_string())
            .unwrap_or_else(|| "application/octet-stream".into());
        let body = field.bytes().await?;
        Ok(Self { body, content_type })
    }
}

/// Stages the file under `upload_dir`, uploads it, and removes the staged copy
/// whether or not the upload succeeded.
#[instrument(skip(assets, file), fields(content_type = %file.content_type, size = file.body.len()))]
pub async fn upload_asset(
    assets: &dyn AssetStore,
    upload_dir: &Path,
    file: PendingUpload,
) -> anyhow::Result<UploadedAsset> {
    let id = Uuid::new_v4();
    let ext = ext_from_mime(&file.content_type).unwrap_or("bin");
    let name = format!("{}.{}", id, ext);

    tokio::fs::create_dir_all(upload_dir)
        .await
        .with_context(|| format!("create upload dir {}", upload_dir.display()))?;
    let local = upload_dir.join(&name);
    let key = format!("assets/{}", name);

    let uploaded = stage_and_upload(assets, &local, &key, &file).await;
    discard_staged(&local).await;
    uploaded
}

async fn stage_and_upload(
    assets: &dyn AssetStore,
    local: &Path,
    key: &str,
    file: &PendingUpload,
) -> anyhow::Result<UploadedAsset> {
    tokio::fs::write(local, &file.body)
        .await
        .with_context(|| format!("stage upload {}", local.display()))?;
    assets
        .upload(local, key, &file.content_type)
        .await
        .with_context(|| format!("upload {}", key))
}

/// Removes a staged file, including one left half-written by a failed write.
async fn discard_staged(local: &Path) {
    match tokio::fs::remove_file(local).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(error = %e, path = %local.display(), "failed to remove staged upload"),
    }
}

fn ext_from_mime(ct: &str) -> Option<&'static str> {
    match ct {
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/webp" => Some("webp"),
        "image/gif" => Some("gif"),
        "image/heic" => Some("heic"),
        _ => None,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::path::PathBuf;

    use async_trait::async_trait;

    use super::*;

    /// Records nothing, returns a deterministic URL per key.
    pub(crate) struct FakeAssets;

    #[async_trait]
    impl AssetStore for FakeAssets {
        async fn upload(
            &self,
            local: &Path,
            key: &str,
            _ct: &str,
        ) -> anyhow::Result<UploadedAsset> {
            anyhow::ensure!(local.exists(), "staged file missing");
            Ok(UploadedAsset {
                url: format!("https://assets.test/{}", key),
            })
        }
    }

    pub(crate) struct FailingAssets;

    #[async_trait]
    impl AssetStore for FailingAssets {
        async fn upload(&self, _l: &Path, _k: &str, _ct: &str) -> anyhow::Result<UploadedAsset> {
            anyhow::bail!("provider unavailable")
        }
    }

    pub(crate) fn scratch_dir() -> PathBuf {
        std::env::temp_dir().join(format!("vidstream-uploads-{}", Uuid::new_v4()))
    }

    fn png() -> PendingUpload {
        PendingUpload {
            body: Bytes::from_static(b"\x89PNG\r\n"),
            content_type: "image/png".into(),
        }
    }

    fn staged_files(dir: &Path) -> usize {
        std::fs::read_dir(dir).map(|d| d.count()).unwrap_or(0)
    }

    #[test]
    fn test_ext_from_mime() {
        assert_eq!(ext_from_mime("image/jpeg"), Some("jpg"));
        assert_eq!(ext_from_mime("image/jpg"), Some("jpg"));
        assert_eq!(ext_from_mime("image/png"), Some("png"));
        assert_eq!(ext_from_mime("image/webp"), Some("webp"));
        assert_eq!(ext_from_mime("application/octet-stream"), None);
    }

    #[tokio::test]
    async fn upload_success_removes_staged_file() {
        let dir = scratch_dir();
        let asset = upload_asset(&FakeAssets, &dir, png()).await.unwrap();
        assert!(asset.url.starts_with("https://assets.test/assets/"));
        assert!(asset.url.ends_with(".png"));
        assert_eq!(staged_files(&dir), 0);
    }

    #[tokio::test]
    async fn upload_failure_still_removes_staged_file() {
        let dir = scratch_dir();
        let err = upload_asset(&FailingAssets, &dir, png()).await.unwrap_err();
        assert!(format!("{err:#}").contains("provider unavailable"));
        assert_eq!(staged_files(&dir), 0);
    }

    #[tokio::test]
    async fn failed_staging_is_reported_and_discarded() {
        let dir = scratch_dir();
        std::fs::create_dir_all(&dir).unwrap();

        // bytes left behind by a write that died halfway
        let partial = dir.join("partial.png");
        std::fs::write(&partial, b"\x89P").unwrap();
        discard_staged(&partial).await;
        assert_eq!(staged_files(&dir), 0);
        // already gone is fine
        discard_staged(&partial).await;

        let unwritable = dir.join("missing").join("x.png");
        let err = stage_and_upload(&FakeAssets, &unwritable, "assets/x.png", &png())
            .await
            .unwrap_err();
        assert!(format!("{err:#}").contains("stage upload"));
        assert_eq!(staged_files(&dir), 0);
    }
}
