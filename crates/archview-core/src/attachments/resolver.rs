//! Attachment resolver
//!
//! Read path for attachments: local caches first, the archive database on a
//! miss. Fetched metadata is written through before it is returned, fetched
//! bytes are cached in the background.

use super::codec::{decode_chain, default_codecs, strip_suffix_ignore_case, Codec};
use super::flight::SingleFlight;
use super::writer::CacheWriter;
use archview_common::{content_type_for, sanitize, Error, Result};
use archview_storage::{Attachment, AttachmentSource, CacheKey, CacheStores, Message};
use futures::future::join_all;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// An attachment ready to be served
#[derive(Debug, Clone)]
pub struct ResolvedAttachment {
    pub attachment: Attachment,
    /// Name the payload is served under; stripped of codec suffixes when
    /// decompressed
    pub filename: String,
    pub content_type: &'static str,
    pub data: Vec<u8>,
}

pub struct AttachmentResolver {
    stores: CacheStores,
    source: Arc<dyn AttachmentSource>,
    codecs: Vec<Arc<dyn Codec>>,
    writer: CacheWriter,
    metadata_flight: SingleFlight<Option<Attachment>>,
    bytes_flight: SingleFlight<Option<Vec<u8>>>,
}

impl AttachmentResolver {
    /// Create a resolver with the default codecs and writer
    pub fn new(stores: CacheStores, source: Arc<dyn AttachmentSource>) -> Self {
        Self {
            stores,
            source,
            codecs: default_codecs(),
            writer: CacheWriter::default(),
            metadata_flight: SingleFlight::new(),
            bytes_flight: SingleFlight::new(),
        }
    }

    /// Replace the codec chain
    pub fn with_codecs(mut self, codecs: Vec<Arc<dyn Codec>>) -> Self {
        self.codecs = codecs;
        self
    }

    /// Replace the background writer
    pub fn with_writer(mut self, writer: CacheWriter) -> Self {
        self.writer = writer;
        self
    }

    pub fn stores(&self) -> &CacheStores {
        &self.stores
    }

    /// Metadata for one attachment, written through to the cache on a miss
    pub async fn metadata(&self, attachment_id: &str) -> Result<Attachment> {
        if let Some(attachment) = self.stores.metadata.get(attachment_id).await? {
            return Ok(attachment);
        }

        let source = self.source.clone();
        let found = self
            .metadata_flight
            .run(attachment_id, || async move {
                source.query_attachment_metadata(attachment_id).await
            })
            .await?;

        let attachment = found
            .ok_or_else(|| Error::NotFound(format!("attachment {}", attachment_id)))?;
        self.stores.metadata.put(attachment_id, &attachment).await?;

        debug!(attachment_id = %attachment_id, "Cached attachment metadata");

        Ok(attachment)
    }

    /// Resolve the payload of one attachment
    ///
    /// The attachment is only served when `filename` matches the name derived
    /// from its URL after sanitizing both; otherwise this is a `NotFound`.
    pub async fn resolve(
        &self,
        attachment_id: &str,
        filename: Option<&str>,
        decompress: bool,
    ) -> Result<ResolvedAttachment> {
        let attachment = self.metadata(attachment_id).await?;

        let requested = filename.unwrap_or("");
        if sanitize(&attachment.filename) != sanitize(requested) {
            debug!(
                attachment_id = %attachment_id,
                requested = %requested,
                "Attachment filename mismatch"
            );
            return Err(Error::NotFound(format!(
                "attachment {} has no file named {:?}",
                attachment_id, requested
            )));
        }

        let key = CacheKey::new(attachment_id)?;

        if decompress {
            if let Some(stripped) = self.decoded_filename(&attachment.filename) {
                if let Some(data) = self.stores.data.get(&key.decompressed()).await? {
                    debug!(attachment_id = %attachment_id, "Serving cached decompressed attachment");
                    return Ok(Self::ready(attachment, stripped, data));
                }
            }
        }

        let raw = match self.stores.data.get(&key).await? {
            Some(data) => data,
            None => {
                let data = self.fetch_bytes(attachment_id).await?;
                self.store_in_background("raw", key.clone(), data.clone());
                data
            }
        };

        if !decompress {
            let filename = attachment.filename.clone();
            return Ok(Self::ready(attachment, filename, raw));
        }

        let codecs = self.codecs.clone();
        let name = attachment.filename.clone();
        let decoded = tokio::task::spawn_blocking(move || decode_chain(&codecs, &name, raw))
            .await
            .map_err(|e| Error::Internal(format!("decompression task failed: {}", e)))??;

        if decoded.changed {
            info!(
                attachment_id = %attachment_id,
                filename = %decoded.filename,
                size = decoded.data.len(),
                "Decompressed attachment"
            );
            self.store_in_background("decompressed", key.decompressed(), decoded.data.clone());
        }

        Ok(Self::ready(attachment, decoded.filename, decoded.data))
    }

    /// Fill in `attachments` of every message on a page
    ///
    /// Messages already in the index are served from the metadata cache. All
    /// others are resolved with one query and recorded in the index, with an
    /// empty entry for messages without attachments.
    pub async fn resolve_for_messages(&self, messages: &mut [Message]) -> Result<()> {
        let mut channels: HashMap<String, Option<BTreeMap<String, Vec<String>>>> = HashMap::new();
        let mut known: Vec<(usize, Vec<String>)> = Vec::new();
        let mut unresolved: Vec<usize> = Vec::new();

        for (i, message) in messages.iter_mut().enumerate() {
            message.attachments.clear();

            if !channels.contains_key(&message.channel_id) {
                let index = match self.stores.index.load_channel(&message.channel_id).await {
                    Ok(index) => Some(index),
                    Err(e) => {
                        warn!(
                            channel_id = %message.channel_id,
                            error = %e,
                            "Failed to read attachment index, resolving from the archive"
                        );
                        None
                    }
                };
                channels.insert(message.channel_id.clone(), index);
            }

            let entry = channels
                .get(&message.channel_id)
                .and_then(|index| index.as_ref())
                .and_then(|index| index.get(&message.message_id));
            match entry {
                Some(ids) => known.push((i, ids.clone())),
                None => unresolved.push(i),
            }
        }

        let lookups = known.into_iter().map(|(i, ids)| async move {
            let found = join_all(ids.iter().map(|id| self.cached_metadata(id))).await;
            (i, found.into_iter().flatten().collect::<Vec<_>>())
        });
        for (i, attachments) in join_all(lookups).await {
            messages[i].attachments = attachments;
        }

        if unresolved.is_empty() {
            return Ok(());
        }

        let message_ids: Vec<String> = unresolved
            .iter()
            .map(|&i| messages[i].message_id.clone())
            .collect();
        let rows = self
            .source
            .query_attachments_by_message_ids(&message_ids)
            .await?;

        debug!(
            messages = message_ids.len(),
            attachments = rows.len(),
            "Resolved attachments from the archive"
        );

        let mut by_message: HashMap<String, Vec<Attachment>> = HashMap::new();
        for attachment in rows {
            by_message
                .entry(attachment.message_id.clone())
                .or_default()
                .push(attachment);
        }

        for attachment in by_message.values().flatten() {
            let cached = matches!(
                self.stores.metadata.get(&attachment.attachment_id).await,
                Ok(Some(_))
            );
            if cached {
                continue;
            }
            if let Err(e) = self
                .stores
                .metadata
                .put(&attachment.attachment_id, attachment)
                .await
            {
                warn!(
                    attachment_id = %attachment.attachment_id,
                    error = %e,
                    "Failed to cache attachment metadata"
                );
            }
        }

        let mut entries: BTreeMap<String, Vec<(String, Vec<String>)>> = BTreeMap::new();
        for i in unresolved {
            let message = &mut messages[i];
            let attachments = by_message
                .get(&message.message_id)
                .cloned()
                .unwrap_or_default();
            let ids = attachments
                .iter()
                .map(|a| a.attachment_id.clone())
                .collect();

            entries
                .entry(message.channel_id.clone())
                .or_default()
                .push((message.message_id.clone(), ids));
            message.attachments = attachments;
        }

        for (channel_id, channel_entries) in entries {
            if let Err(e) = self.stores.index.set_many(&channel_id, channel_entries).await {
                warn!(
                    channel_id = %channel_id,
                    error = %e,
                    "Failed to record attachment index"
                );
            }
        }

        Ok(())
    }

    /// Wait for every background cache write to finish
    pub async fn flush(&self) {
        self.writer.flush().await;
    }

    async fn cached_metadata(&self, attachment_id: &str) -> Option<Attachment> {
        match self.stores.metadata.get(attachment_id).await {
            Ok(Some(attachment)) => Some(attachment),
            Ok(None) => {
                warn!(attachment_id = %attachment_id, "Indexed attachment has no cached metadata");
                None
            }
            Err(e) => {
                warn!(
                    attachment_id = %attachment_id,
                    error = %e,
                    "Failed to read cached attachment metadata"
                );
                None
            }
        }
    }

    async fn fetch_bytes(&self, attachment_id: &str) -> Result<Vec<u8>> {
        let source = self.source.clone();
        self.bytes_flight
            .run(attachment_id, || async move {
                source.fetch_attachment_bytes(attachment_id).await
            })
            .await?
            .ok_or_else(|| Error::NotFound(format!("attachment {} has no data", attachment_id)))
    }

    fn store_in_background(&self, kind: &'static str, key: CacheKey, data: Vec<u8>) {
        let store = self.stores.data.clone();
        let data: Arc<[u8]> = data.into();
        let label = key.to_string();

        self.writer.spawn(kind, label, move || {
            let store = store.clone();
            let key = key.clone();
            let data = data.clone();
            async move { store.put(&key, &data).await }
        });
    }

    /// Served name after every applicable codec suffix is stripped, `None`
    /// when no codec applies
    fn decoded_filename(&self, filename: &str) -> Option<String> {
        let mut name = filename;
        let mut changed = false;
        for codec in &self.codecs {
            if let Some(stem) = strip_suffix_ignore_case(name, codec.suffix()) {
                name = stem;
                changed = true;
            }
        }
        changed.then(|| name.to_string())
    }

    fn ready(attachment: Attachment, filename: String, data: Vec<u8>) -> ResolvedAttachment {
        ResolvedAttachment {
            content_type: content_type_for(&filename),
            attachment,
            filename,
            data,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use archview_storage::{FileStorage, LocalStorage};
    use async_trait::async_trait;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use pretty_assertions::assert_eq;
    use std::io::Write;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tempfile::TempDir;

    #[derive(Default)]
    struct FakeSource {
        attachments: Vec<Attachment>,
        bytes: HashMap<String, Vec<u8>>,
        batch_calls: AtomicUsize,
        metadata_calls: AtomicUsize,
        bytes_calls: AtomicUsize,
        fail_batch: bool,
    }

    #[async_trait]
    impl AttachmentSource for FakeSource {
        async fn query_attachments_by_message_ids(
            &self,
            message_ids: &[String],
        ) -> Result<Vec<Attachment>> {
            self.batch_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_batch {
                return Err(Error::Upstream("archive unavailable".into()));
            }
            Ok(self
                .attachments
                .iter()
                .filter(|a| message_ids.contains(&a.message_id))
                .cloned()
                .collect())
        }

        async fn query_attachment_metadata(&self, attachment_id: &str) -> Result<Option<Attachment>> {
            self.metadata_calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok(self
                .attachments
                .iter()
                .find(|a| a.attachment_id == attachment_id)
                .cloned())
        }

        async fn fetch_attachment_bytes(&self, attachment_id: &str) -> Result<Option<Vec<u8>>> {
            self.bytes_calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok(self.bytes.get(attachment_id).cloned())
        }
    }

    /// Gzip codec that counts its invocations
    struct CountingGzip(Arc<AtomicUsize>);

    impl Codec for CountingGzip {
        fn name(&self) -> &'static str {
            "counting-gzip"
        }

        fn suffix(&self) -> &'static str {
            ".gz"
        }

        fn decode(&self, input: &[u8]) -> Result<Vec<u8>> {
            self.0.fetch_add(1, Ordering::SeqCst);
            crate::attachments::codec::Gzip.decode(input)
        }
    }

    fn attachment(message_id: &str, attachment_id: &str, name: &str) -> Attachment {
        Attachment::new(
            message_id,
            attachment_id,
            format!("https://cdn.example.com/attachments/1/{}/{}", attachment_id, name),
            format!("https://media.example.com/attachments/1/{}/{}", attachment_id, name),
        )
        .unwrap()
    }

    fn message(channel_id: &str, message_id: &str) -> Message {
        Message {
            channel_id: channel_id.to_string(),
            message_id: message_id.to_string(),
            ..Default::default()
        }
    }

    fn gzip(data: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    fn resolver(dir: &TempDir, source: Arc<FakeSource>) -> AttachmentResolver {
        let storage: Arc<dyn FileStorage> = Arc::new(LocalStorage::from_path(dir.path()).unwrap());
        AttachmentResolver::new(CacheStores::with_storage(storage, 16), source)
            .with_writer(CacheWriter::new(3).with_base_delay(Duration::from_millis(1)))
    }

    #[tokio::test]
    async fn test_filename_gate() {
        let dir = TempDir::new().unwrap();
        let source = Arc::new(FakeSource {
            attachments: vec![attachment("1", "123", "right.png")],
            bytes: HashMap::from([("123".to_string(), b"png bytes".to_vec())]),
            ..Default::default()
        });
        let resolver = resolver(&dir, source.clone());

        let err = resolver.resolve("123", Some("wrong.png"), false).await.unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(source.bytes_calls.load(Ordering::SeqCst), 0);

        let err = resolver.resolve("123", None, false).await.unwrap_err();
        assert!(err.is_not_found());

        let resolved = resolver.resolve("123", Some("right.png"), false).await.unwrap();
        assert_eq!(resolved.filename, "right.png");
        assert_eq!(resolved.content_type, "image/png");
        assert_eq!(resolved.data, b"png bytes".to_vec());

        // Sanitized comparison
        assert!(resolver.resolve("123", Some("right.png<>"), false).await.is_ok());
    }

    #[tokio::test]
    async fn test_unknown_attachment_is_not_found() {
        let dir = TempDir::new().unwrap();
        let resolver = resolver(&dir, Arc::new(FakeSource::default()));

        let err = resolver.resolve("404", Some("x.png"), false).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_missing_bytes_are_not_found() {
        let dir = TempDir::new().unwrap();
        let source = Arc::new(FakeSource {
            attachments: vec![attachment("1", "123", "a.bin")],
            ..Default::default()
        });
        let resolver = resolver(&dir, source);

        let err = resolver.resolve("123", Some("a.bin"), false).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_metadata_and_bytes_are_cached() {
        let dir = TempDir::new().unwrap();
        let source = Arc::new(FakeSource {
            attachments: vec![attachment("1", "123", "notes.txt")],
            bytes: HashMap::from([("123".to_string(), b"hello".to_vec())]),
            ..Default::default()
        });
        let resolver = resolver(&dir, source.clone());

        resolver.resolve("123", Some("notes.txt"), false).await.unwrap();
        resolver.flush().await;
        assert!(dir.path().join("attachments/123").exists());
        assert!(dir.path().join("attachments_metadata/123.json").exists());

        let resolved = resolver.resolve("123", Some("notes.txt"), false).await.unwrap();
        assert_eq!(resolved.data, b"hello".to_vec());
        assert_eq!(resolved.content_type, "text/plain; charset=utf-8");
        assert_eq!(source.metadata_calls.load(Ordering::SeqCst), 1);
        assert_eq!(source.bytes_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_decompressed_variant_is_cached() {
        let dir = TempDir::new().unwrap();
        let decodes = Arc::new(AtomicUsize::new(0));
        let source = Arc::new(FakeSource {
            attachments: vec![attachment("1", "123", "a.txt.gz")],
            bytes: HashMap::from([("123".to_string(), gzip(b"plain text"))]),
            ..Default::default()
        });
        let resolver = resolver(&dir, source.clone())
            .with_codecs(vec![Arc::new(CountingGzip(decodes.clone()))]);

        let first = resolver.resolve("123", Some("a.txt.gz"), true).await.unwrap();
        assert_eq!(first.filename, "a.txt");
        assert_eq!(first.content_type, "text/plain; charset=utf-8");
        assert_eq!(first.data, b"plain text".to_vec());
        assert_eq!(decodes.load(Ordering::SeqCst), 1);

        resolver.flush().await;
        assert!(dir.path().join("attachments/123.decompressed").exists());

        let second = resolver.resolve("123", Some("a.txt.gz"), true).await.unwrap();
        assert_eq!(second.filename, "a.txt");
        assert_eq!(second.data, b"plain text".to_vec());
        assert_eq!(decodes.load(Ordering::SeqCst), 1);
        assert_eq!(source.bytes_calls.load(Ordering::SeqCst), 1);

        // Without the flag the raw payload is served under its own name
        let raw = resolver.resolve("123", Some("a.txt.gz"), false).await.unwrap();
        assert_eq!(raw.filename, "a.txt.gz");
        assert_eq!(raw.content_type, "application/octet-stream");
        assert_eq!(raw.data, gzip(b"plain text"));
    }

    #[tokio::test]
    async fn test_corrupt_payload_is_decompression_error() {
        let dir = TempDir::new().unwrap();
        let source = Arc::new(FakeSource {
            attachments: vec![attachment("1", "123", "a.txt.gz")],
            bytes: HashMap::from([("123".to_string(), b"not gzip".to_vec())]),
            ..Default::default()
        });
        let resolver = resolver(&dir, source);

        let err = resolver.resolve("123", Some("a.txt.gz"), true).await.unwrap_err();
        assert!(matches!(err, Error::Decompression(_)));
    }

    #[tokio::test]
    async fn test_concurrent_fetches_are_coalesced() {
        let dir = TempDir::new().unwrap();
        let source = Arc::new(FakeSource {
            attachments: vec![attachment("1", "123", "photo.png")],
            bytes: HashMap::from([("123".to_string(), b"png".to_vec())]),
            ..Default::default()
        });
        let resolver = resolver(&dir, source.clone());

        let results = join_all((0..6).map(|_| resolver.resolve("123", Some("photo.png"), false))).await;
        for result in results {
            assert_eq!(result.unwrap().data, b"png".to_vec());
        }
        assert_eq!(source.metadata_calls.load(Ordering::SeqCst), 1);
        assert_eq!(source.bytes_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_batch_resolution_and_negative_cache() {
        let dir = TempDir::new().unwrap();
        let source = Arc::new(FakeSource {
            attachments: vec![
                attachment("1", "10", "a.png"),
                attachment("1", "11", "b.txt"),
                attachment("3", "30", "c.pdf"),
            ],
            ..Default::default()
        });
        let resolver = resolver(&dir, source.clone());

        let mut page = vec![message("100", "1"), message("100", "2"), message("100", "3")];
        resolver.resolve_for_messages(&mut page).await.unwrap();

        let ids = |m: &Message| m.attachments.iter().map(|a| a.attachment_id.clone()).collect::<Vec<_>>();
        assert_eq!(ids(&page[0]), vec!["10", "11"]);
        assert!(page[1].attachments.is_empty());
        assert_eq!(ids(&page[2]), vec!["30"]);
        assert_eq!(source.batch_calls.load(Ordering::SeqCst), 1);

        assert_eq!(
            resolver.stores().index.get_attachment_ids("100", "2").await.unwrap(),
            Some(vec![])
        );

        // Second pass is served entirely from the caches
        let mut again = vec![message("100", "1"), message("100", "2"), message("100", "3")];
        resolver.resolve_for_messages(&mut again).await.unwrap();
        assert_eq!(ids(&again[0]), vec!["10", "11"]);
        assert!(again[1].attachments.is_empty());
        assert_eq!(ids(&again[2]), vec!["30"]);
        assert_eq!(source.batch_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_zero_rows_records_empty_entries() {
        let dir = TempDir::new().unwrap();
        let source = Arc::new(FakeSource::default());
        let resolver = resolver(&dir, source.clone());

        let mut page = vec![message("100", "1"), message("100", "2")];
        resolver.resolve_for_messages(&mut page).await.unwrap();
        resolver.resolve_for_messages(&mut page).await.unwrap();

        assert_eq!(source.batch_calls.load(Ordering::SeqCst), 1);
        let index = resolver.stores().index.load_channel("100").await.unwrap();
        assert_eq!(index.len(), 2);
        assert!(index.values().all(|ids| ids.is_empty()));
    }

    #[tokio::test]
    async fn test_missing_metadata_is_skipped() {
        let dir = TempDir::new().unwrap();
        let resolver = resolver(&dir, Arc::new(FakeSource::default()));

        resolver
            .stores()
            .index
            .set_attachment_ids("100", "1", vec!["10".to_string(), "11".to_string()])
            .await
            .unwrap();
        resolver
            .stores()
            .metadata
            .put("11", &attachment("1", "11", "b.txt"))
            .await
            .unwrap();

        let mut page = vec![message("100", "1")];
        resolver.resolve_for_messages(&mut page).await.unwrap();
        assert_eq!(page[0].attachments, vec![attachment("1", "11", "b.txt")]);
    }

    #[tokio::test]
    async fn test_batch_query_failure_propagates() {
        let dir = TempDir::new().unwrap();
        let source = Arc::new(FakeSource {
            fail_batch: true,
            ..Default::default()
        });
        let resolver = resolver(&dir, source);

        let mut page = vec![message("100", "1")];
        let err = resolver.resolve_for_messages(&mut page).await.unwrap_err();
        assert!(matches!(err, Error::Upstream(_)));
    }

    #[tokio::test]
    async fn test_unreadable_index_is_treated_as_unknown() {
        let dir = TempDir::new().unwrap();
        let source = Arc::new(FakeSource {
            attachments: vec![attachment("1", "10", "a.png")],
            ..Default::default()
        });
        let resolver = resolver(&dir, source.clone());

        std::fs::create_dir_all(dir.path().join("channels")).unwrap();
        std::fs::write(dir.path().join("channels/100.json"), b"{broken").unwrap();

        let mut page = vec![message("100", "1")];
        resolver.resolve_for_messages(&mut page).await.unwrap();
        assert_eq!(page[0].attachments.len(), 1);
        assert_eq!(source.batch_calls.load(Ordering::SeqCst), 1);
    }
}
