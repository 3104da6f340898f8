//! Pluggable content hashing: content identity is a separate, swappable
//! concern from the node it identifies. `ContentHasher` is the seam;
//! Outlet ships an md5 implementation (the algorithm GDrive's API itself
//! reports, as hex lowercase) and a blake3 implementation for fast local
//! dedup where exact GDrive compatibility isn't needed.

use md5::{Digest, Md5};
use std::path::Path;

#[async_trait::async_trait]
pub trait ContentHasher: Send + Sync {
    async fn hash_file(&self, path: &Path) -> std::io::Result<String>;
}

/// MD5 hasher — what GDrive's API reports and what local-copy NO_OP
/// detection and download verification
/// compare against.
pub struct Md5Hasher;

#[async_trait::async_trait]
impl ContentHasher for Md5Hasher {
    async fn hash_file(&self, path: &Path) -> std::io::Result<String> {
        let bytes = tokio::fs::read(path).await?;
        let mut hasher = Md5::new();
        hasher.update(&bytes);
        Ok(hex::encode(hasher.finalize()))
    }
}

/// blake3 hasher for fast local content-addressing where exact GDrive
/// md5 compatibility isn't required.
pub struct Blake3Hasher;

#[async_trait::async_trait]
impl ContentHasher for Blake3Hasher {
    async fn hash_file(&self, path: &Path) -> std::io::Result<String> {
        let bytes = tokio::fs::read(path).await?;
        Ok(blake3::hash(&bytes).to_hex().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn md5_matches_known_vector() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f.txt");
        tokio::fs::write(&path, b"hello world").await.unwrap();
        let hash = Md5Hasher.hash_file(&path).await.unwrap();
        assert_eq!(hash, "5eb63bbbe01eeed093cb22bb8f5acdc3");
    }
}
