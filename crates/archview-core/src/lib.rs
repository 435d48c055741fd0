//! archview Core - Attachment resolution and message rendering
//!
//! This crate provides the attachment resolver (cache lookups, archive
//! fallback, decompression and background cache fills) and the renderer
//! that turns archived message content into HTML.

pub mod attachments;
pub mod render;

pub use attachments::{AttachmentResolver, CacheWriter, Codec, ResolvedAttachment};
pub use render::{escape_html, render_attachments, MessageRenderer};
