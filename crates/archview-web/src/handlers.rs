//! Request handlers

use crate::AppState;
use archview_common::{sanitize, Error};
use archview_core::ResolvedAttachment;
use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderValue, StatusCode},
    response::{Html, IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, error};

/// Messages shown on one page
pub const MESSAGES_PER_PAGE: i64 = 250;

/// Error body returned by every failing route
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, error: &str) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
        }),
    )
}

fn not_found() -> ApiError {
    api_error(StatusCode::NOT_FOUND, "not_found")
}

fn from_error(e: &Error) -> ApiError {
    let status =
        StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    api_error(status, e.code())
}

/// Highest zero-based page index for `count` messages
pub fn max_page(count: i64) -> i64 {
    count / MESSAGES_PER_PAGE
}

fn is_table_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

fn is_numeric(id: &str) -> bool {
    !id.is_empty() && id.chars().all(|c| c.is_ascii_digit())
}

/// Health response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}

/// Liveness check
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
    })
}

/// Readiness check (database reachable)
pub async fn readiness(State(state): State<AppState>) -> Result<StatusCode, StatusCode> {
    if let Some(pool) = &state.db_pool {
        pool.health_check().await.map_err(|e| {
            error!(error = %e, "Readiness check failed");
            StatusCode::SERVICE_UNAVAILABLE
        })?;
    }

    Ok(StatusCode::OK)
}

/// Channel listing page
pub async fn list_channels(State(state): State<AppState>) -> Result<Html<String>, ApiError> {
    let tables = state.messages.list_tables().await.map_err(|e| {
        error!(error = %e, "Failed to list archive tables");
        api_error(StatusCode::INTERNAL_SERVER_ERROR, "something_went_wrong")
    })?;

    let html = state
        .templates
        .render("list.html", json!({ "tables": tables }))
        .map_err(|e| {
            error!(error = %e, "Template error");
            from_error(&e)
        })?;

    Ok(Html(html))
}

/// Query parameters of the message page
#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<String>,
}

impl PageQuery {
    /// Requested page; negative or unparsable values mean the first page
    fn page(&self) -> i64 {
        self.page
            .as_deref()
            .and_then(|p| p.trim().parse::<i64>().ok())
            .unwrap_or(0)
            .max(0)
    }
}

/// Paged message view of one channel
pub async fn message_page(
    State(state): State<AppState>,
    Path((table, channel_id)): Path<(String, String)>,
    Query(query): Query<PageQuery>,
) -> Result<Html<String>, ApiError> {
    if !is_table_name(&table) {
        return Err(api_error(StatusCode::BAD_REQUEST, "invalid table name"));
    }
    if !is_numeric(&channel_id) {
        return Err(api_error(StatusCode::BAD_REQUEST, "invalid channel id"));
    }
    let page = query.page();

    let count = state
        .messages
        .count_messages(&table, &channel_id)
        .await
        .map_err(|e| {
            error!(table = %table, channel_id = %channel_id, error = %e, "Failed to count messages");
            not_found()
        })?;
    if count == 0 {
        return Err(not_found());
    }

    let mut messages = state
        .messages
        .list_messages(
            &table,
            &channel_id,
            page.saturating_mul(MESSAGES_PER_PAGE),
            MESSAGES_PER_PAGE,
        )
        .await
        .map_err(|e| {
            error!(table = %table, channel_id = %channel_id, page, error = %e, "Failed to load messages");
            not_found()
        })?;
    if messages.is_empty() {
        return Err(not_found());
    }

    state
        .resolver
        .resolve_for_messages(&mut messages)
        .await
        .map_err(|e| {
            error!(table = %table, channel_id = %channel_id, page, error = %e, "Failed to resolve attachments");
            not_found()
        })?;

    state.renderer.render_page(&mut messages);

    let channel_name = messages.first().and_then(|m| m.channel_name.clone());
    let html = state
        .templates
        .render(
            "index.html",
            json!({
                "table": table,
                "channel_id": channel_id,
                "channel_name": channel_name,
                "messages": messages,
                "page": page,
                "max_page": max_page(count),
            }),
        )
        .map_err(|e| {
            error!(error = %e, "Template error");
            from_error(&e)
        })?;

    Ok(Html(html))
}

/// Query parameters of the attachment routes
#[derive(Debug, Default, Deserialize)]
pub struct AttachmentQuery {
    pub decompress: Option<String>,
}

impl AttachmentQuery {
    fn decompress(&self) -> bool {
        matches!(
            self.decompress.as_deref().map(str::to_ascii_lowercase).as_deref(),
            Some("true") | Some("1")
        )
    }
}

/// Attachment addressed by id only
pub async fn attachment(
    State(state): State<AppState>,
    Path(attachment_id): Path<String>,
    Query(query): Query<AttachmentQuery>,
) -> Result<Response, ApiError> {
    serve_attachment(&state, &attachment_id, None, query.decompress()).await
}

/// Attachment addressed by id and filename
pub async fn named_attachment(
    State(state): State<AppState>,
    Path((attachment_id, filename)): Path<(String, String)>,
    Query(query): Query<AttachmentQuery>,
) -> Result<Response, ApiError> {
    serve_attachment(&state, &attachment_id, Some(&filename), query.decompress()).await
}

async fn serve_attachment(
    state: &AppState,
    attachment_id: &str,
    filename: Option<&str>,
    decompress: bool,
) -> Result<Response, ApiError> {
    if !is_numeric(attachment_id) {
        return Err(not_found());
    }

    match state.resolver.resolve(attachment_id, filename, decompress).await {
        Ok(resolved) => Ok(attachment_response(resolved)),
        Err(e) if e.is_not_found() => {
            debug!(attachment_id = %attachment_id, error = %e, "Attachment not found");
            Err(not_found())
        }
        Err(e) => {
            error!(attachment_id = %attachment_id, error = %e, "Failed to serve attachment");
            Err(from_error(&e))
        }
    }
}

fn attachment_response(resolved: ResolvedAttachment) -> Response {
    // Names that are not valid header text fall back to their sanitized form
    let disposition = HeaderValue::from_str(&format!("filename={}", resolved.filename))
        .or_else(|_| HeaderValue::from_str(&format!("filename={}", sanitize(&resolved.filename))))
        .unwrap_or_else(|_| HeaderValue::from_static("attachment"));

    (
        StatusCode::OK,
        [
            (
                header::CONTENT_TYPE,
                HeaderValue::from_static(resolved.content_type),
            ),
            (header::CONTENT_DISPOSITION, disposition),
            (header::CONTENT_LENGTH, HeaderValue::from(resolved.data.len())),
        ],
        resolved.data,
    )
        .into_response()
}
