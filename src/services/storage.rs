use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use sha2::{Digest, Sha256};

use crate::core::config::Settings;

/// Receipt for a stored object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct StoredFile {
    pub(crate) key: String,
    pub(crate) size_bytes: i64,
    pub(crate) sha256: String,
}

#[async_trait]
pub(crate) trait FileStore: Send + Sync {
    async fn store(&self, bytes: &[u8], key: &str, content_type: &str)
        -> anyhow::Result<StoredFile>;

    async fn read(&self, key: &str) -> anyhow::Result<Vec<u8>>;
}

pub(crate) async fn from_settings(settings: &Settings) -> anyhow::Result<Arc<dyn FileStore>> {
    if settings.s3().is_configured() {
        let store = S3FileStore::from_settings(settings).await;
        tracing::info!(bucket = %settings.s3().bucket, "Using S3 file storage");
        return Ok(Arc::new(store));
    }

    let root = PathBuf::from(&settings.storage().local_root);
    tokio::fs::create_dir_all(&root)
        .await
        .with_context(|| format!("Failed to create storage directory {}", root.display()))?;
    tracing::info!(root = %root.display(), "S3 not configured; using local file storage");
    Ok(Arc::new(LocalFileStore::new(root)))
}

fn receipt(key: &str, bytes: &[u8]) -> StoredFile {
    StoredFile {
        key: key.to_string(),
        size_bytes: bytes.len() as i64,
        sha256: hex::encode(Sha256::digest(bytes)),
    }
}

#[derive(Debug, Clone)]
pub(crate) struct S3FileStore {
    client: Client,
    bucket: String,
}

impl S3FileStore {
    async fn from_settings(settings: &Settings) -> Self {
        let s3 = settings.s3();
        let creds = Credentials::new(
            s3.access_key.clone(),
            s3.secret_key.clone(),
            None,
            None,
            "gradeflow-static",
        );

        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(aws_config::Region::new(s3.region.clone()))
            .credentials_provider(creds);
        if !s3.endpoint.is_empty() {
            loader = loader.endpoint_url(s3.endpoint.clone());
        }
        let config = loader.load().await;

        let s3_config = aws_sdk_s3::config::Builder::from(&config).force_path_style(true).build();
        Self { client: Client::from_conf(s3_config), bucket: s3.bucket.clone() }
    }
}

#[async_trait]
impl FileStore for S3FileStore {
    async fn store(
        &self,
        bytes: &[u8],
        key: &str,
        content_type: &str,
    ) -> anyhow::Result<StoredFile> {
        let stored = receipt(key, bytes);

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(bytes.to_vec()))
            .send()
            .await
            .with_context(|| format!("Failed to upload {key}"))?;

        Ok(stored)
    }

    async fn read(&self, key: &str) -> anyhow::Result<Vec<u8>> {
        let object = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .with_context(|| format!("Failed to download {key}"))?;
        let data = object.body.collect().await.context("Failed to read object body")?;
        Ok(data.into_bytes().to_vec())
    }
}

/// Stores objects as files below `root`, mirroring the key hierarchy.
#[derive(Debug, Clone)]
pub(crate) struct LocalFileStore {
    root: PathBuf,
}

impl LocalFileStore {
    pub(crate) fn new(root: PathBuf) -> Self {
        Self { root }
    }

    fn path_for(&self, key: &str) -> anyhow::Result<PathBuf> {
        let relative = Path::new(key);
        let safe = relative.components().all(|part| matches!(part, Component::Normal(_)));
        if !safe || key.is_empty() {
            anyhow::bail!("Refusing storage key outside the storage root: {key}");
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl FileStore for LocalFileStore {
    async fn store(
        &self,
        bytes: &[u8],
        key: &str,
        _content_type: &str,
    ) -> anyhow::Result<StoredFile> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let stored = receipt(key, bytes);
        tokio::fs::write(&path, bytes)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(stored)
    }

    async fn read(&self, key: &str) -> anyhow::Result<Vec<u8>> {
        let path = self.path_for(key)?;
        tokio::fs::read(&path).await.with_context(|| format!("Failed to read {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_root() -> PathBuf {
        std::env::temp_dir().join(format!("gradeflow-store-{}", uuid::Uuid::new_v4()))
    }

    #[tokio::test]
    async fn local_store_round_trips_nested_keys() {
        let root = temp_root();
        let store = LocalFileStore::new(root.clone());

        let stored = store
            .store(b"hello", "submissions/a1/1700000000_work.txt", "text/plain")
            .await
            .expect("store");
        assert_eq!(stored.size_bytes, 5);
        assert_eq!(
            stored.sha256,
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );

        let bytes = store.read("submissions/a1/1700000000_work.txt").await.expect("read");
        assert_eq!(bytes, b"hello");

        let _ = tokio::fs::remove_dir_all(root).await;
    }

    #[tokio::test]
    async fn local_store_rejects_escaping_keys() {
        let store = LocalFileStore::new(temp_root());
        assert!(store.store(b"x", "../outside.txt", "text/plain").await.is_err());
        assert!(store.read("/etc/passwd").await.is_err());
    }
}
