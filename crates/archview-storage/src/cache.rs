//! Attachment cache stores
//!
//! Three file-backed namespaces under one data directory:
//!
//! - `attachments_metadata/{key}.json`: attachment metadata records
//! - `attachments/{key}`: raw (or decompressed) attachment bytes
//! - `channels/{channel_id}.json`: message id to attachment ids, per channel
//!
//! Every key is built through [`CacheKey`], which runs the sanitizer first.

pub mod data;
pub mod index;
pub mod metadata;

pub use data::DataStore;
pub use index::AttachmentIndex;
pub use metadata::MetadataStore;

use crate::file::{FileStorage, LocalStorage};
use archview_common::config::CacheConfig;
use archview_common::{sanitize, Error, Result};
use std::fmt;
use std::sync::Arc;

/// Marker appended to a key to address the decompressed variant
pub const DECOMPRESSED_SUFFIX: &str = ".decompressed";

/// Sanitized storage key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Build a key from an external identifier
    pub fn new(raw: &str) -> Result<Self> {
        let key = sanitize(raw);
        if key.is_empty() || key == "." || key == ".." {
            return Err(Error::Validation(format!(
                "identifier {:?} does not produce a usable cache key",
                raw
            )));
        }
        Ok(Self(key))
    }

    /// Key of the decompressed variant of the same attachment
    pub fn decompressed(&self) -> Self {
        Self(format!("{}{}", self.0, DECOMPRESSED_SUFFIX))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The three cache stores sharing one storage root
pub struct CacheStores {
    pub metadata: MetadataStore,
    pub data: DataStore,
    pub index: AttachmentIndex,
}

impl CacheStores {
    /// Open the stores under the configured data directory
    pub fn open(config: &CacheConfig) -> Result<Self> {
        let storage: Arc<dyn FileStorage> = Arc::new(LocalStorage::from_path(&config.data_dir)?);
        Ok(Self::with_storage(storage, config.metadata_capacity))
    }

    /// Build the stores on an existing storage backend
    pub fn with_storage(storage: Arc<dyn FileStorage>, metadata_capacity: usize) -> Self {
        Self {
            metadata: MetadataStore::new(storage.clone(), metadata_capacity),
            data: DataStore::new(storage.clone()),
            index: AttachmentIndex::new(storage),
        }
    }
}
