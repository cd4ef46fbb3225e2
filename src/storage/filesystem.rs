//! Filesystem artifact store.

use async_trait::async_trait;
use bytes::Bytes;
use std::path::PathBuf;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use super::{md5_hex, ArtifactStore, ReleaseRef, StoredArtifact};
use crate::error::{AppError, Result};

/// Filesystem-backed artifact store.
pub struct FilesystemStore {
    base_path: PathBuf,
}

impl FilesystemStore {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    fn key_to_path(&self, key: &str) -> Result<PathBuf> {
        // Keys are built from package/version/filename; none of the
        // segments may escape the storage root.
        if key.split('/').any(|seg| seg.is_empty() || seg == "." || seg == "..") {
            return Err(AppError::Storage(format!("Invalid storage key: {}", key)));
        }
        Ok(self.base_path.join(key))
    }
}

#[async_trait]
impl ArtifactStore for FilesystemStore {
    async fn exists(&self, release: ReleaseRef<'_>, filename: &str) -> Result<bool> {
        let path = self.key_to_path(&release.key(filename))?;
        Ok(path.exists())
    }

    async fn write(
        &self,
        release: ReleaseRef<'_>,
        filename: &str,
        content: Bytes,
    ) -> Result<StoredArtifact> {
        let key = release.key(filename);
        let path = self.key_to_path(&key)?;

        if path.exists() {
            return Err(AppError::Conflict(format!(
                "An artifact named '{}' already exists for {} {}",
                filename, release.package, release.version
            )));
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let mut file = fs::File::create(&path).await?;
        file.write_all(&content).await?;
        file.sync_all().await?;

        Ok(StoredArtifact {
            md5_digest: md5_hex(&content),
            size: content.len(),
            key,
        })
    }

    async fn read(&self, key: &str) -> Result<Bytes> {
        let path = self.key_to_path(key)?;
        if !path.exists() {
            return Err(AppError::NotFound(format!(
                "artifact '{}' is recorded but missing from storage",
                key
            )));
        }
        let content = fs::read(&path)
            .await
            .map_err(|e| AppError::Storage(format!("Failed to read {}: {}", key, e)))?;
        Ok(Bytes::from(content))
    }

    async fn verify(&self, key: &str, expected_md5: &str) -> Result<bool> {
        let content = self.read(key).await?;
        Ok(md5_hex(&content) == expected_md5)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, FilesystemStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = FilesystemStore::new(dir.path());
        (dir, store)
    }

    const RELEASE: ReleaseRef<'static> = ReleaseRef {
        package: "demo-lib",
        version: "1.0",
    };

    #[tokio::test]
    async fn test_write_then_read_round_trip() {
        let (_dir, store) = store();
        let stored = store
            .write(RELEASE, "demo-lib-1.0.tar.gz", Bytes::from_static(b"tarball"))
            .await
            .unwrap();

        assert_eq!(stored.key, "demo-lib/1.0/demo-lib-1.0.tar.gz");
        assert_eq!(stored.md5_digest, md5_hex(b"tarball"));
        assert_eq!(stored.size, 7);

        let content = store.read(&stored.key).await.unwrap();
        assert_eq!(&content[..], b"tarball");
        assert!(store.exists(RELEASE, "demo-lib-1.0.tar.gz").await.unwrap());
    }

    #[tokio::test]
    async fn test_duplicate_write_is_rejected() {
        let (_dir, store) = store();
        store
            .write(RELEASE, "demo-lib-1.0.tar.gz", Bytes::from_static(b"a"))
            .await
            .unwrap();

        let err = store
            .write(RELEASE, "demo-lib-1.0.tar.gz", Bytes::from_static(b"b"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        // First write is untouched
        let content = store.read("demo-lib/1.0/demo-lib-1.0.tar.gz").await.unwrap();
        assert_eq!(&content[..], b"a");
    }

    #[tokio::test]
    async fn test_read_missing_reports_drift() {
        let (_dir, store) = store();
        let err = store.read("gone/1.0/gone-1.0.tar.gz").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_verify_detects_mismatch() {
        let (_dir, store) = store();
        let stored = store
            .write(RELEASE, "demo-lib-1.0.tar.gz", Bytes::from_static(b"payload"))
            .await
            .unwrap();

        assert!(store.verify(&stored.key, &stored.md5_digest).await.unwrap());
        assert!(!store
            .verify(&stored.key, "00000000000000000000000000000000")
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_traversal_keys_are_rejected() {
        let (_dir, store) = store();
        let err = store.read("../../etc/passwd").await.unwrap_err();
        assert!(matches!(err, AppError::Storage(_)));
    }
}
