//! Artifact storage backends.

pub mod filesystem;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::Result;

/// Identifies the release an artifact belongs to. Storage keys are derived
/// deterministically from this pair plus the filename, so re-imports are
/// idempotent at the filesystem layer regardless of the database outcome.
#[derive(Debug, Clone, Copy)]
pub struct ReleaseRef<'a> {
    pub package: &'a str,
    pub version: &'a str,
}

impl ReleaseRef<'_> {
    /// Storage key for a file under this release.
    pub fn key(&self, filename: &str) -> String {
        format!("{}/{}/{}", self.package, self.version, filename)
    }
}

/// Result of a successful artifact write.
#[derive(Debug, Clone)]
pub struct StoredArtifact {
    /// Storage key the content was written under
    pub key: String,
    /// MD5 hex digest of the written bytes
    pub md5_digest: String,
    /// Size of the written content
    pub size: usize,
}

/// Artifact store trait.
///
/// Writes never overwrite: a second write of the same filename under the
/// same release fails. Digest verification is a full recompute and belongs
/// to the offline consistency sweep, not the write path.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Check whether an artifact with this filename already exists for the release.
    async fn exists(&self, release: ReleaseRef<'_>, filename: &str) -> Result<bool>;

    /// Store content, failing if the key is already occupied. Returns the
    /// storage key and the MD5 digest of the written bytes.
    async fn write(
        &self,
        release: ReleaseRef<'_>,
        filename: &str,
        content: Bytes,
    ) -> Result<StoredArtifact>;

    /// Retrieve content by storage key. A missing entry is reported as
    /// `NotFound`: it means the database and the filesystem have drifted.
    async fn read(&self, key: &str) -> Result<Bytes>;

    /// Recompute the digest over the full content and compare.
    async fn verify(&self, key: &str, expected_md5: &str) -> Result<bool>;
}

/// MD5 hex digest of a byte slice.
pub fn md5_hex(content: &[u8]) -> String {
    use md5::{Digest, Md5};
    let mut hasher = Md5::new();
    hasher.update(content);
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_release_key_is_deterministic() {
        let release = ReleaseRef {
            package: "demo-lib",
            version: "1.0",
        };
        assert_eq!(
            release.key("demo-lib-1.0.tar.gz"),
            "demo-lib/1.0/demo-lib-1.0.tar.gz"
        );
    }

    #[test]
    fn test_md5_hex() {
        // Well-known digest of the empty string
        assert_eq!(md5_hex(b""), "d41d8cd98f00b204e9800998ecf8427e");
        assert_eq!(md5_hex(b"abc"), "900150983cd24fb0d6963f7d28e17f72");
    }
}
