//! ImageStore - Alert capture storage
//!
//! Writes encoded alert images under a media directory. Paths handed to
//! and returned from the store are relative to that directory.

use crate::error::{Error, Result};
use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};

/// Filesystem-like write target
#[async_trait]
pub trait ImageStore: Send + Sync {
    /// Write `data` at `relative` and return the stored reference
    async fn save(&self, relative: &str, data: &[u8]) -> Result<String>;
}

/// Image store rooted at a local directory
pub struct FsImageStore {
    base_dir: PathBuf,
}

impl FsImageStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn resolve(&self, relative: &str) -> Result<PathBuf> {
        let path = Path::new(relative);
        let escapes = path
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if relative.is_empty() || escapes {
            return Err(Error::Validation(format!("invalid image path: {}", relative)));
        }
        Ok(self.base_dir.join(path))
    }
}

#[async_trait]
impl ImageStore for FsImageStore {
    async fn save(&self, relative: &str, data: &[u8]) -> Result<String> {
        let path = self.resolve(relative)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, data).await?;

        tracing::debug!(path = %path.display(), bytes = data.len(), "Image saved");
        Ok(relative.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_save_creates_directories() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsImageStore::new(dir.path());

        let stored = store
            .save("alertas/cam1/alerta_20240101_120000_casco.jpg", b"jpeg")
            .await
            .unwrap();
        assert_eq!(stored, "alertas/cam1/alerta_20240101_120000_casco.jpg");

        let written = std::fs::read(dir.path().join(&stored)).unwrap();
        assert_eq!(written, b"jpeg");
    }

    #[tokio::test]
    async fn test_rejects_escaping_paths() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsImageStore::new(dir.path());

        assert!(matches!(store.save("../x.jpg", b"x").await, Err(Error::Validation(_))));
        assert!(matches!(store.save("/etc/x.jpg", b"x").await, Err(Error::Validation(_))));
        assert!(matches!(store.save("", b"x").await, Err(Error::Validation(_))));
    }

    #[tokio::test]
    async fn test_write_failure_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("alertas");
        std::fs::write(&blocker, b"not a directory").unwrap();

        let store = FsImageStore::new(dir.path());
        assert!(matches!(store.save("alertas/cam/a.jpg", b"x").await, Err(Error::Io(_))));
    }
}
