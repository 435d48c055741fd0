//! Attachment resolution
//!
//! Resolves attachment metadata and payloads through the local caches, the
//! archive database and the decompression codecs.

pub mod codec;
pub mod flight;
pub mod resolver;
pub mod writer;

pub use codec::{default_codecs, Codec, Gzip, Zstd};
pub use flight::SingleFlight;
pub use resolver::{AttachmentResolver, ResolvedAttachment};
pub use writer::{CacheWriter, DEFAULT_WRITE_ATTEMPTS};
