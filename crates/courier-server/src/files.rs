//! On-disk storage for uploaded files.
//!
//! Files are written under a single upload directory with a generated
//! unique name that keeps the original extension; the stored name becomes
//! part of the public download URL served at `/uploads/`.

use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::ServerError;

#[derive(Debug, Clone)]
pub struct FileStore {
    base_path: PathBuf,
    max_size: usize,
}

impl FileStore {
    pub async fn new(base_path: PathBuf, max_size: usize) -> Result<Self, ServerError> {
        fs::create_dir_all(&base_path).await.map_err(|e| {
            ServerError::UploadStorage(format!(
                "Failed to create upload directory '{}': {}",
                base_path.display(),
                e
            ))
        })?;

        info!(path = %base_path.display(), "File store initialized");

        Ok(Self {
            base_path,
            max_size,
        })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Store an uploaded file and return the generated stored name.
    ///
    /// The name is a fresh UUID with the original file's extension, so
    /// concurrent uploads of identically named files never collide.
    pub async fn store(&self, original_name: &str, data: &[u8]) -> Result<String, ServerError> {
        if data.is_empty() {
            return Err(ServerError::BadRequest("No file uploaded".to_string()));
        }
        if data.len() > self.max_size {
            return Err(ServerError::UploadTooLarge {
                size: data.len(),
                max: self.max_size,
            });
        }

        let stored_name = match Path::new(original_name)
            .extension()
            .and_then(|ext| ext.to_str())
        {
            Some(ext) => format!("{}.{}", Uuid::new_v4(), ext),
            None => Uuid::new_v4().to_string(),
        };
        let path = self.safe_path(&stored_name)?;

        fs::write(&path, data).await.map_err(|e| {
            ServerError::UploadStorage(format!("Failed to write upload {stored_name}: {e}"))
        })?;

        debug!(name = %stored_name, size = data.len(), "Stored upload");
        Ok(stored_name)
    }

    /// Remove a stored file.  Used to clean up after rejected uploads.
    pub async fn delete(&self, stored_name: &str) -> Result<(), ServerError> {
        let path = self.safe_path(stored_name)?;

        if !path.exists() {
            return Err(ServerError::NotFound(format!(
                "No such upload: {stored_name}"
            )));
        }

        fs::remove_file(&path).await.map_err(|e| {
            ServerError::UploadStorage(format!("Failed to delete upload {stored_name}: {e}"))
        })?;

        debug!(name = %stored_name, "Deleted upload");
        Ok(())
    }

    /// Resolve a stored name inside the base directory, rejecting anything
    /// that could escape it.
    fn safe_path(&self, name: &str) -> Result<PathBuf, ServerError> {
        if name.contains('/') || name.contains('\\') || name.contains("..") {
            return Err(ServerError::BadRequest(
                "Path traversal detected".to_string(),
            ));
        }
        Ok(self.base_path.join(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn test_store() -> (FileStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(dir.path().to_path_buf(), 1024 * 1024)
            .await
            .unwrap();
        (store, dir)
    }

    #[tokio::test]
    async fn test_store_keeps_extension() {
        let (store, _dir) = test_store().await;

        let name = store.store("photo.png", b"not-really-a-png").await.unwrap();
        assert!(name.ends_with(".png"));

        let data = fs::read(store.base_path().join(&name)).await.unwrap();
        assert_eq!(data, b"not-really-a-png");
    }

    #[tokio::test]
    async fn test_delete() {
        let (store, _dir) = test_store().await;
        let name = store.store("doc.pdf", b"delete-me").await.unwrap();

        store.delete(&name).await.unwrap();
        assert!(store.delete(&name).await.is_err());
    }

    #[tokio::test]
    async fn test_empty_upload_rejected() {
        let (store, _dir) = test_store().await;
        assert!(store.store("empty.txt", b"").await.is_err());
    }

    #[tokio::test]
    async fn test_oversize_upload_rejected() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(dir.path().to_path_buf(), 4).await.unwrap();

        let err = store.store("big.bin", b"12345").await.unwrap_err();
        assert!(matches!(err, ServerError::UploadTooLarge { size: 5, max: 4 }));
    }

    #[tokio::test]
    async fn test_traversal_rejected() {
        let (store, _dir) = test_store().await;
        assert!(store.delete("../outside").await.is_err());
    }
}
