//! Decompression codecs
//!
//! A codec is selected by the filename suffix of the attachment. Each
//! applicable codec decodes once and strips its own suffix, so the next
//! codec in line sees the shortened name.

use archview_common::{Error, Result};
use flate2::read::GzDecoder;
use std::io::Read;
use std::sync::Arc;

/// A single decompression step
pub trait Codec: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Lowercase filename suffix this codec handles, dot included
    fn suffix(&self) -> &'static str;

    /// Decode a complete payload
    fn decode(&self, input: &[u8]) -> Result<Vec<u8>>;
}

/// gzip (`.gz`)
pub struct Gzip;

impl Codec for Gzip {
    fn name(&self) -> &'static str {
        "gzip"
    }

    fn suffix(&self) -> &'static str {
        ".gz"
    }

    fn decode(&self, input: &[u8]) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        GzDecoder::new(input)
            .read_to_end(&mut out)
            .map_err(|e| Error::Decompression(format!("gzip: {}", e)))?;
        Ok(out)
    }
}

/// Zstandard (`.zst`)
pub struct Zstd;

impl Codec for Zstd {
    fn name(&self) -> &'static str {
        "zstd"
    }

    fn suffix(&self) -> &'static str {
        ".zst"
    }

    fn decode(&self, input: &[u8]) -> Result<Vec<u8>> {
        zstd::stream::decode_all(input).map_err(|e| Error::Decompression(format!("zstd: {}", e)))
    }
}

/// Codecs in the order they are tried
pub fn default_codecs() -> Vec<Arc<dyn Codec>> {
    vec![Arc::new(Gzip), Arc::new(Zstd)]
}

/// Strip `suffix` from `filename` if it ends with it, ignoring ASCII case
pub(crate) fn strip_suffix_ignore_case<'a>(filename: &'a str, suffix: &str) -> Option<&'a str> {
    let split = filename.len().checked_sub(suffix.len())?;
    if !filename.is_char_boundary(split) {
        return None;
    }
    let (stem, tail) = filename.split_at(split);
    tail.eq_ignore_ascii_case(suffix).then_some(stem)
}

/// Result of running a codec chain
#[derive(Debug)]
pub struct Decoded {
    pub filename: String,
    pub data: Vec<u8>,
    /// Whether at least one codec was applied
    pub changed: bool,
}

/// Apply every codec whose suffix matches, in order
pub fn decode_chain(codecs: &[Arc<dyn Codec>], filename: &str, data: Vec<u8>) -> Result<Decoded> {
    let mut decoded = Decoded {
        filename: filename.to_string(),
        data,
        changed: false,
    };

    for codec in codecs {
        let Some(stem) = strip_suffix_ignore_case(&decoded.filename, codec.suffix()) else {
            continue;
        };
        let stem = stem.to_string();
        decoded.data = codec.decode(&decoded.data)?;
        decoded.filename = stem;
        decoded.changed = true;

        tracing::debug!(codec = codec.name(), filename = %decoded.filename, "Decoded attachment");
    }

    Ok(decoded)
}
