//! Attachment metadata store
//!
//! Records live on disk as small JSON documents. A bounded LRU owned by the
//! store keeps recently used records in memory; disk remains the source of
//! truth and is never evicted.

use super::CacheKey;
use crate::file::FileStorage;
use crate::models::{Attachment, AttachmentRecord};
use archview_common::{Error, Result};
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

const NAMESPACE: &str = "attachments_metadata";

pub struct MetadataStore {
    storage: Arc<dyn FileStorage>,
    memory: Option<Mutex<LruCache<CacheKey, Attachment>>>,
}

impl MetadataStore {
    /// Create a store; a capacity of 0 disables the in-memory tier
    pub fn new(storage: Arc<dyn FileStorage>, capacity: usize) -> Self {
        Self {
            storage,
            memory: NonZeroUsize::new(capacity).map(|cap| Mutex::new(LruCache::new(cap))),
        }
    }

    fn path(key: &CacheKey) -> String {
        format!("{}/{}.json", NAMESPACE, key)
    }

    /// Look up the metadata for an attachment id
    pub async fn get(&self, id: &str) -> Result<Option<Attachment>> {
        let key = CacheKey::new(id)?;

        if let Some(memory) = &self.memory {
            if let Some(hit) = memory.lock().await.get(&key) {
                return Ok(Some(hit.clone()));
            }
        }

        self.storage.ensure_dir(NAMESPACE).await?;
        let path = Self::path(&key);
        let Some(raw) = self.storage.read(&path).await? else {
            return Ok(None);
        };

        let record: AttachmentRecord = serde_json::from_slice(&raw)
            .map_err(|e| Error::Parse(format!("cannot parse the json of {}: {}", path, e)))?;
        let attachment = Attachment::try_from(record)
            .map_err(|e| Error::Parse(format!("invalid record in {}: {}", path, e)))?;

        debug!(attachment_id = %id, "Loaded attachment metadata from disk");

        if let Some(memory) = &self.memory {
            memory.lock().await.put(key, attachment.clone());
        }

        Ok(Some(attachment))
    }

    /// Persist the metadata fields of an attachment, replacing any record
    pub async fn put(&self, id: &str, attachment: &Attachment) -> Result<()> {
        let key = CacheKey::new(id)?;

        let body = serde_json::to_vec(&attachment.to_record())
            .map_err(|e| Error::Internal(format!("Failed to encode metadata: {}", e)))?;

        self.storage.ensure_dir(NAMESPACE).await?;
        self.storage.store(&Self::path(&key), &body).await?;

        if let Some(memory) = &self.memory {
            let mut cached = attachment.clone();
            cached.data = None;
            memory.lock().await.put(key, cached);
        }

        Ok(())
    }
}
