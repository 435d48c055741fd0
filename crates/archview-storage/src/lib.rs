//! archview Storage - Archive queries and attachment cache
//!
//! This crate provides the relational query layer over the message archive
//! (PostgreSQL via sqlx) and the local, file-backed caches for attachment
//! metadata, attachment bytes and per-channel message indexes.

pub mod cache;
pub mod db;
pub mod file;
pub mod models;
pub mod repository;

pub use cache::{AttachmentIndex, CacheKey, CacheStores, DataStore, MetadataStore};
pub use db::DatabasePool;
pub use file::{FileStorage, LocalStorage};
pub use models::*;
pub use repository::*;
