//! Durable storage queries for recorded audio.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::Path;

#[async_trait]
pub trait FileStore: Send + Sync {
    async fn ensure_dir(&self, dir: &Path) -> Result<()>;

    /// Size in bytes, or `None` if nothing exists at `path`.
    async fn size(&self, path: &Path) -> Result<Option<u64>>;

    async fn remove(&self, path: &Path) -> Result<()>;
}

/// Local filesystem via `tokio::fs`.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsFileStore;

#[async_trait]
impl FileStore for FsFileStore {
    async fn ensure_dir(&self, dir: &Path) -> Result<()> {
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("Failed to create directory {:?}", dir))
    }

    async fn size(&self, path: &Path) -> Result<Option<u64>> {
        match tokio::fs::metadata(path).await {
            Ok(meta) if meta.is_file() => Ok(Some(meta.len())),
            Ok(_) => Ok(None),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("Failed to stat {:?}", path)),
        }
    }

    async fn remove(&self, path: &Path) -> Result<()> {
        tokio::fs::remove_file(path)
            .await
            .with_context(|| format!("Failed to remove {:?}", path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_size_of_missing_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsFileStore;
        assert_eq!(store.size(&dir.path().join("nope.wav")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_size_reports_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.wav");
        std::fs::write(&path, [0u8; 12]).unwrap();

        let store = FsFileStore;
        assert_eq!(store.size(&path).await.unwrap(), Some(12));

        store.remove(&path).await.unwrap();
        assert_eq!(store.size(&path).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_directories_are_not_files() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        let store = FsFileStore;
        store.ensure_dir(&nested).await.unwrap();
        assert_eq!(store.size(&nested).await.unwrap(), None);
    }
}
