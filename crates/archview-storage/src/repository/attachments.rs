//! Attachment repository

use crate::db::{quote_ident, DatabasePool};
use crate::models::{Attachment, AttachmentRow};
use archview_common::{Error, Result};
use async_trait::async_trait;
use tracing::debug;

/// External source of attachment metadata and bytes
#[async_trait]
pub trait AttachmentSource: Send + Sync {
    /// Metadata of every attachment belonging to any of `message_ids`
    async fn query_attachments_by_message_ids(
        &self,
        message_ids: &[String],
    ) -> Result<Vec<Attachment>>;

    /// Metadata of a single attachment
    async fn query_attachment_metadata(&self, attachment_id: &str) -> Result<Option<Attachment>>;

    /// Raw bytes of a single attachment
    async fn fetch_attachment_bytes(&self, attachment_id: &str) -> Result<Option<Vec<u8>>>;
}

/// PostgreSQL attachment repository implementation
pub struct DbAttachmentRepository {
    pool: DatabasePool,
    table: String,
}

impl DbAttachmentRepository {
    /// Create a new repository reading from `table`
    pub fn new(pool: DatabasePool, table: &str) -> Self {
        Self {
            pool,
            table: quote_ident(table),
        }
    }
}

#[async_trait]
impl AttachmentSource for DbAttachmentRepository {
    async fn query_attachments_by_message_ids(
        &self,
        message_ids: &[String],
    ) -> Result<Vec<Attachment>> {
        if message_ids.is_empty() {
            return Ok(Vec::new());
        }

        let sql = format!(
            "SELECT message_id, attachment_id, url, proxy_url FROM {} WHERE message_id = ANY($1)",
            self.table
        );
        let rows = sqlx::query_as::<_, AttachmentRow>(&sql)
            .bind(message_ids)
            .fetch_all(self.pool.pool())
            .await
            .map_err(|e| Error::Upstream(e.to_string()))?;

        debug!(
            messages = message_ids.len(),
            attachments = rows.len(),
            "Queried attachments by message ids"
        );

        rows.into_iter().map(Attachment::try_from).collect()
    }

    async fn query_attachment_metadata(&self, attachment_id: &str) -> Result<Option<Attachment>> {
        let sql = format!(
            "SELECT message_id, attachment_id, url, proxy_url FROM {} WHERE attachment_id = $1 LIMIT 1",
            self.table
        );
        let row = sqlx::query_as::<_, AttachmentRow>(&sql)
            .bind(attachment_id)
            .fetch_optional(self.pool.pool())
            .await
            .map_err(|e| Error::Upstream(e.to_string()))?;

        row.map(Attachment::try_from).transpose()
    }

    async fn fetch_attachment_bytes(&self, attachment_id: &str) -> Result<Option<Vec<u8>>> {
        let sql = format!(
            "SELECT data FROM {} WHERE attachment_id = $1 LIMIT 1",
            self.table
        );
        let row: Option<(Option<Vec<u8>>,)> = sqlx::query_as(&sql)
            .bind(attachment_id)
            .fetch_optional(self.pool.pool())
            .await
            .map_err(|e| Error::Upstream(e.to_string()))?;

        Ok(row.and_then(|(data,)| data))
    }
}
