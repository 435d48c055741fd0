//! File storage abstraction

use archview_common::{Error, Result};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

/// File storage trait
#[async_trait]
pub trait FileStorage: Send + Sync {
    /// Store a file, replacing any previous content
    async fn store(&self, path: &str, data: &[u8]) -> Result<()>;

    /// Read a file, `None` if it does not exist
    async fn read(&self, path: &str) -> Result<Option<Vec<u8>>>;

    /// Create a directory (and its parents) if missing
    async fn ensure_dir(&self, path: &str) -> Result<()>;
}

/// Local filesystem storage
pub struct LocalStorage {
    base_path: PathBuf,
}

impl LocalStorage {
    /// Create a new local storage instance rooted at `path`
    pub fn from_path(path: &Path) -> Result<Self> {
        std::fs::create_dir_all(path)
            .map_err(|e| Error::Storage(format!("Failed to create storage directory: {}", e)))?;

        info!(path = %path.display(), "Initialized local file storage");

        Ok(Self {
            base_path: path.to_path_buf(),
        })
    }

    /// Get full path for a relative path, with path traversal protection
    fn full_path(&self, path: &str) -> Result<PathBuf> {
        let relative = Path::new(path);

        if path.is_empty() {
            return Err(Error::Storage("Empty storage path".to_string()));
        }

        // Only plain named components are allowed: no root, no prefix, no `.`/`..`
        if !relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)))
        {
            return Err(Error::Storage(format!(
                "Path traversal detected: {:?} is not allowed",
                path
            )));
        }

        Ok(self.base_path.join(relative))
    }

    async fn ensure_parent_exists(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::Storage(format!("Failed to create directory: {}", e)))?;
        }
        Ok(())
    }
}

#[async_trait]
impl FileStorage for LocalStorage {
    async fn store(&self, path: &str, data: &[u8]) -> Result<()> {
        let full_path = self.full_path(path)?;
        self.ensure_parent_exists(&full_path).await?;

        let mut file = fs::File::create(&full_path)
            .await
            .map_err(|e| Error::Storage(format!("Failed to create file: {}", e)))?;

        file.write_all(data)
            .await
            .map_err(|e| Error::Storage(format!("Failed to write file: {}", e)))?;
        file.flush()
            .await
            .map_err(|e| Error::Storage(format!("Failed to flush file: {}", e)))?;

        debug!(path = %path, size = data.len(), "Stored file");

        Ok(())
    }

    async fn read(&self, path: &str) -> Result<Option<Vec<u8>>> {
        let full_path = self.full_path(path)?;

        match fs::read(&full_path).await {
            Ok(data) => {
                debug!(path = %path, size = data.len(), "Read file");
                Ok(Some(data))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::Storage(format!("Failed to read file: {}", e))),
        }
    }

    async fn ensure_dir(&self, path: &str) -> Result<()> {
        let full_path = self.full_path(path)?;
        fs::create_dir_all(&full_path)
            .await
            .map_err(|e| Error::Storage(format!("Failed to create directory: {}", e)))
    }
}
