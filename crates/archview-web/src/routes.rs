//! Routes

use crate::handlers;
use crate::AppState;
use axum::{routing::get, Router};
use tower_http::{compression::CompressionLayer, trace::TraceLayer};

/// Create the application router
pub fn create_router(state: AppState) -> Router {
    // Only HTML pages are compressed; attachments go out as stored
    let pages = Router::new()
        .route("/messages/list", get(handlers::list_channels))
        .route("/messages/:table/:channel_id", get(handlers::message_page))
        .layer(CompressionLayer::new());

    Router::new()
        .merge(pages)
        // Attachments
        .route("/attachments/:attachment_id", get(handlers::attachment))
        .route(
            "/attachments/:attachment_id/:filename",
            get(handlers::named_attachment),
        )
        // Health check
        .route("/health", get(handlers::health))
        .route("/health/ready", get(handlers::readiness))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
