//! archview Web
//!
//! HTTP interface for the archive: channel listing, paged message views and
//! attachment downloads.

mod handlers;
mod routes;
mod templates;

pub use handlers::{max_page, MESSAGES_PER_PAGE};
pub use templates::Templates;

use archview_common::Result;
use archview_core::{AttachmentResolver, MessageRenderer};
use archview_storage::{DatabasePool, MessageSource};
use axum::Router;
use std::sync::Arc;

/// Application state shared by all handlers
#[derive(Clone)]
pub struct AppState {
    pub resolver: Arc<AttachmentResolver>,
    pub messages: Arc<dyn MessageSource>,
    /// Probed by the readiness check when present
    pub db_pool: Option<DatabasePool>,
    pub renderer: Arc<MessageRenderer>,
    pub templates: Arc<Templates>,
}

impl AppState {
    /// Create a new app state
    pub fn new(
        resolver: Arc<AttachmentResolver>,
        messages: Arc<dyn MessageSource>,
        db_pool: Option<DatabasePool>,
    ) -> Result<Self> {
        Ok(Self {
            resolver,
            messages,
            db_pool,
            renderer: Arc::new(MessageRenderer::new()?),
            templates: Arc::new(Templates::new()?),
        })
    }
}

/// Create the application router
pub fn create_router(state: AppState) -> Router {
    routes::create_router(state)
}
