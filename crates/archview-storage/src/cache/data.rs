//! Attachment byte store

use super::CacheKey;
use crate::file::FileStorage;
use archview_common::Result;
use std::sync::Arc;

const NAMESPACE: &str = "attachments";

/// Raw attachment payloads keyed by [`CacheKey`]
#[derive(Clone)]
pub struct DataStore {
    storage: Arc<dyn FileStorage>,
}

impl DataStore {
    pub fn new(storage: Arc<dyn FileStorage>) -> Self {
        Self { storage }
    }

    fn path(key: &CacheKey) -> String {
        format!("{}/{}", NAMESPACE, key)
    }

    pub async fn get(&self, key: &CacheKey) -> Result<Option<Vec<u8>>> {
        self.storage.ensure_dir(NAMESPACE).await?;
        self.storage.read(&Self::path(key)).await
    }

    /// Store bytes under `key`; the last writer wins
    pub async fn put(&self, key: &CacheKey, data: &[u8]) -> Result<()> {
        self.storage.ensure_dir(NAMESPACE).await?;
        self.storage.store(&Self::path(key), data).await
    }
}
