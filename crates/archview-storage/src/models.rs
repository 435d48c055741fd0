//! Database models

use archview_common::{Error, Result};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Attachment row as stored in the archive (metadata columns only)
#[derive(Debug, Clone, FromRow)]
pub struct AttachmentRow {
    pub message_id: Option<String>,
    pub attachment_id: Option<String>,
    pub url: Option<String>,
    pub proxy_url: Option<String>,
}

/// Persisted shape of an attachment metadata record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentRecord {
    pub message_id: Option<String>,
    pub attachment_id: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub proxy_url: Option<String>,
}

/// Attachment model
///
/// `filename` is always derived from `url` and `data` is only filled when the
/// bytes are already in hand; neither is ever persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Attachment {
    pub message_id: String,
    pub attachment_id: String,
    pub url: String,
    pub proxy_url: String,
    pub filename: String,
    #[serde(skip)]
    pub data: Option<Vec<u8>>,
}

impl Attachment {
    /// Build a validated attachment, deriving its filename
    pub fn new(
        message_id: impl Into<String>,
        attachment_id: impl Into<String>,
        url: impl Into<String>,
        proxy_url: impl Into<String>,
    ) -> Result<Self> {
        let message_id = message_id.into();
        let attachment_id = attachment_id.into();
        if message_id.is_empty() || attachment_id.is_empty() {
            return Err(Error::Validation(format!(
                "invalid attachment: message_id={:?} attachment_id={:?}",
                message_id, attachment_id
            )));
        }

        let url = url.into();
        let filename = filename_from_url(&url).to_string();

        Ok(Self {
            message_id,
            attachment_id,
            url,
            proxy_url: proxy_url.into(),
            filename,
            data: None,
        })
    }

    /// Metadata fields for persistence
    pub fn to_record(&self) -> AttachmentRecord {
        AttachmentRecord {
            message_id: Some(self.message_id.clone()),
            attachment_id: Some(self.attachment_id.clone()),
            url: Some(self.url.clone()),
            proxy_url: Some(self.proxy_url.clone()),
        }
    }
}

impl TryFrom<AttachmentRecord> for Attachment {
    type Error = Error;

    fn try_from(record: AttachmentRecord) -> Result<Self> {
        Attachment::new(
            record.message_id.unwrap_or_default(),
            record.attachment_id.unwrap_or_default(),
            record.url.unwrap_or_default(),
            record.proxy_url.unwrap_or_default(),
        )
    }
}

impl TryFrom<AttachmentRow> for Attachment {
    type Error = Error;

    fn try_from(row: AttachmentRow) -> Result<Self> {
        Attachment::new(
            row.message_id.unwrap_or_default(),
            row.attachment_id.unwrap_or_default(),
            row.url.unwrap_or_default(),
            row.proxy_url.unwrap_or_default(),
        )
    }
}

/// Final path segment of a URL
pub fn filename_from_url(url: &str) -> &str {
    url.rsplit('/').next().unwrap_or("")
}

/// Archived chat message
#[derive(Debug, Clone, Default, FromRow, Serialize)]
pub struct Message {
    pub guild_id: Option<String>,
    pub guild_name: Option<String>,
    pub channel_id: String,
    pub channel_name: Option<String>,
    pub author_is_bot: bool,
    pub author_id: String,
    pub author_name: String,
    pub author_discriminator: String,
    pub message_id: String,
    pub content: String,
    pub edited: bool,
    pub edited_timestamp: Option<i64>,
    pub created_timestamp: i64,
    pub is_reply: bool,
    pub reply_to: Option<String>,
    #[sqlx(skip)]
    pub attachments: Vec<Attachment>,
}

/// A channel found in an archive table
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Channel {
    pub id: String,
    pub name: String,
}

/// An archive table and the channels it contains
#[derive(Debug, Clone, Serialize)]
pub struct ArchiveTable {
    pub name: String,
    pub channels: Vec<Channel>,
}
