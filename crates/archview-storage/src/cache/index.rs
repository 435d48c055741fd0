//! Per-channel message to attachment-id index
//!
//! An entry with an empty list is a negative cache: the message is known to
//! have no attachments. A missing entry means the message was never resolved.

use super::CacheKey;
use crate::file::FileStorage;
use archview_common::{Error, Result};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

const NAMESPACE: &str = "channels";

type ChannelIndex = BTreeMap<String, Vec<String>>;

pub struct AttachmentIndex {
    storage: Arc<dyn FileStorage>,
    // Serializes read-modify-write of index files within this process
    write_lock: Mutex<()>,
}

impl AttachmentIndex {
    pub fn new(storage: Arc<dyn FileStorage>) -> Self {
        Self {
            storage,
            write_lock: Mutex::new(()),
        }
    }

    fn path(key: &CacheKey) -> String {
        format!("{}/{}.json", NAMESPACE, key)
    }

    async fn load(&self, channel_id: &str) -> Result<ChannelIndex> {
        let key = CacheKey::new(channel_id)?;
        self.storage.ensure_dir(NAMESPACE).await?;

        let path = Self::path(&key);
        match self.storage.read(&path).await? {
            Some(raw) => serde_json::from_slice(&raw)
                .map_err(|e| Error::Parse(format!("cannot parse the json of {}: {}", path, e))),
            None => Ok(ChannelIndex::new()),
        }
    }

    /// Load the whole index of a channel
    pub async fn load_channel(&self, channel_id: &str) -> Result<BTreeMap<String, Vec<String>>> {
        self.load(channel_id).await
    }

    /// Attachment ids recorded for a message, `None` if never resolved
    pub async fn get_attachment_ids(
        &self,
        channel_id: &str,
        message_id: &str,
    ) -> Result<Option<Vec<String>>> {
        Ok(self.load(channel_id).await?.remove(message_id))
    }

    /// Record the attachment ids of one message
    pub async fn set_attachment_ids(
        &self,
        channel_id: &str,
        message_id: &str,
        attachment_ids: Vec<String>,
    ) -> Result<()> {
        self.set_many(channel_id, [(message_id.to_string(), attachment_ids)])
            .await
    }

    /// Record several messages of one channel with a single rewrite
    pub async fn set_many<I>(&self, channel_id: &str, entries: I) -> Result<()>
    where
        I: IntoIterator<Item = (String, Vec<String>)> + Send,
        I::IntoIter: Send,
    {
        let _guard = self.write_lock.lock().await;

        let key = CacheKey::new(channel_id)?;
        let mut index = self.load(channel_id).await?;
        let before = index.len();
        index.extend(entries);

        let body = serde_json::to_vec(&index)
            .map_err(|e| Error::Internal(format!("Failed to encode index: {}", e)))?;
        self.storage.store(&Self::path(&key), &body).await?;

        debug!(
            channel_id = %channel_id,
            added = index.len() - before,
            total = index.len(),
            "Updated message attachment index"
        );

        Ok(())
    }
}
