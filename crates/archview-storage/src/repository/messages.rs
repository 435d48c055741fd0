//! Message repository
//!
//! Every archive table holds the messages of one export; table names come
//! from the request path and must be validated by the caller before they
//! reach this module.

use crate::db::{quote_ident, DatabasePool};
use crate::models::{ArchiveTable, Channel, Message};
use archview_common::{Error, Result};
use async_trait::async_trait;
use std::collections::BTreeMap;
use tracing::{debug, warn};

const MESSAGE_COLUMNS: &str = r#"
    guild_id, guild_name, channel_id, channel_name,
    COALESCE(author_is_bot, false) AS author_is_bot,
    COALESCE(author_id, '') AS author_id,
    COALESCE(author_name, '') AS author_name,
    COALESCE(author_discriminator, '') AS author_discriminator,
    COALESCE(message_id, '') AS message_id,
    COALESCE(content, '') AS content,
    COALESCE(edited, false) AS edited,
    edited_timestamp,
    COALESCE(created_timestamp, 0) AS created_timestamp,
    COALESCE(is_reply, false) AS is_reply,
    reply_to
"#;

/// External source of archived messages
#[async_trait]
pub trait MessageSource: Send + Sync {
    /// Every archive table with its channels, sorted by table name
    async fn list_tables(&self) -> Result<Vec<ArchiveTable>>;

    /// Number of messages of a channel in a table
    async fn count_messages(&self, table: &str, channel_id: &str) -> Result<i64>;

    /// One page of messages, oldest first
    async fn list_messages(
        &self,
        table: &str,
        channel_id: &str,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<Message>>;
}

/// PostgreSQL message repository implementation
pub struct DbMessageRepository {
    pool: DatabasePool,
    schema: String,
    attachments_table: String,
}

impl DbMessageRepository {
    /// Create a new repository over the tables of `schema`
    pub fn new(pool: DatabasePool, schema: &str, attachments_table: &str) -> Self {
        Self {
            pool,
            schema: schema.to_string(),
            attachments_table: attachments_table.to_string(),
        }
    }

    async fn table_names(&self) -> Result<Vec<String>> {
        let names: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT table_name::text FROM information_schema.tables
            WHERE table_schema = $1
            ORDER BY table_name
            "#,
        )
        .bind(&self.schema)
        .fetch_all(self.pool.pool())
        .await
        .map_err(|e| Error::Upstream(e.to_string()))?;

        Ok(names
            .into_iter()
            .filter(|name| *name != self.attachments_table)
            .collect())
    }

    async fn channels(&self, table: &str) -> Result<Vec<Channel>> {
        let sql = format!(
            "SELECT DISTINCT channel_id, channel_name FROM {}",
            quote_ident(table)
        );
        let rows: Vec<(Option<String>, Option<String>)> = sqlx::query_as(&sql)
            .fetch_all(self.pool.pool())
            .await
            .map_err(|e| Error::Upstream(e.to_string()))?;

        // A renamed channel shows up once per name; keep one entry per id
        let mut channels = BTreeMap::new();
        for (id, name) in rows {
            if let Some(id) = id {
                channels.insert(id, name.unwrap_or_default());
            }
        }

        Ok(channels
            .into_iter()
            .map(|(id, name)| Channel { id, name })
            .collect())
    }
}

#[async_trait]
impl MessageSource for DbMessageRepository {
    async fn list_tables(&self) -> Result<Vec<ArchiveTable>> {
        let mut tables = Vec::new();

        for name in self.table_names().await? {
            // Tables without the message columns simply list no channels
            let channels = match self.channels(&name).await {
                Ok(channels) => channels,
                Err(e) => {
                    warn!(table = %name, error = %e, "Failed to list channels");
                    Vec::new()
                }
            };
            tables.push(ArchiveTable { name, channels });
        }

        tables.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(tables)
    }

    async fn count_messages(&self, table: &str, channel_id: &str) -> Result<i64> {
        let sql = format!(
            "SELECT COUNT(*) FROM {} WHERE channel_id = $1",
            quote_ident(table)
        );
        sqlx::query_scalar::<_, i64>(&sql)
            .bind(channel_id)
            .fetch_one(self.pool.pool())
            .await
            .map_err(|e| Error::Upstream(e.to_string()))
    }

    async fn list_messages(
        &self,
        table: &str,
        channel_id: &str,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<Message>> {
        let sql = format!(
            "SELECT {} FROM {} WHERE channel_id = $1 ORDER BY created_timestamp ASC LIMIT $2 OFFSET $3",
            MESSAGE_COLUMNS,
            quote_ident(table)
        );
        let messages = sqlx::query_as::<_, Message>(&sql)
            .bind(channel_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(self.pool.pool())
            .await
            .map_err(|e| Error::Upstream(e.to_string()))?;

        debug!(
            table = %table,
            channel_id = %channel_id,
            offset,
            count = messages.len(),
            "Loaded message page"
        );

        Ok(messages)
    }
}
