//! archview Common - Shared types and utilities
//!
//! This crate provides configuration, the error type, and the small pure
//! helpers (identifier sanitizing, content-type lookup) shared by every
//! archview component.

pub mod config;
pub mod content_type;
pub mod error;
pub mod sanitize;

pub use config::Config;
pub use content_type::{content_type_for, is_image};
pub use error::{Error, Result};
pub use sanitize::sanitize;
