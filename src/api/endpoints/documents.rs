//! Rendered document endpoints.
//!
//! - `GET    /api/histories/:id/pdf`: cached or freshly rendered PDF
//! - `GET    /api/histories/:id/preview`: sanitized HTML page
//! - `DELETE /api/histories/:id/pdf-cache`: drop the cached PDF

use axum::extract::{Path, State};
use axum::http::header::{CACHE_CONTROL, CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::http::HeaderValue;
use axum::response::{Html, IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::api::error::ApiError;
use crate::api::types::{parse_id, ApiContext};

const PDF_CACHE_CONTROL: &str = "private, max-age=3600";

#[derive(Serialize)]
pub struct EvictResponse {
    pub id: String,
    pub evicted: bool,
}

/// `GET /api/histories/:id/pdf`: download as an attachment.
pub async fn pdf(
    State(ctx): State<ApiContext>,
    Path(history_id): Path<String>,
) -> Result<Response, ApiError> {
    let id = parse_id(&history_id)?;
    let artifact = ctx.pdf_cache.get_or_generate(&id).await?;

    let disposition = content_disposition(&artifact.filename)?;
    Ok((
        [
            (CONTENT_TYPE, HeaderValue::from_static("application/pdf")),
            (CONTENT_DISPOSITION, disposition),
            (CACHE_CONTROL, HeaderValue::from_static(PDF_CACHE_CONTROL)),
        ],
        artifact.bytes,
    )
        .into_response())
}

/// `GET /api/histories/:id/preview`: full HTML document for the browser.
pub async fn preview(
    State(ctx): State<ApiContext>,
    Path(history_id): Path<String>,
) -> Result<Html<String>, ApiError> {
    let id = parse_id(&history_id)?;
    let view = ctx.orchestrator.get_view(&id)?;
    Ok(Html(ctx.renderer.preview_html(&view)))
}

/// `DELETE /api/histories/:id/pdf-cache`: idempotent. `evicted` reports
/// whether a cached PDF was actually removed.
pub async fn evict_pdf(
    State(ctx): State<ApiContext>,
    Path(history_id): Path<String>,
) -> Result<Json<EvictResponse>, ApiError> {
    let id = parse_id(&history_id)?;
    let evicted = ctx.pdf_cache.delete(&id)?;

    Ok(Json(EvictResponse {
        id: id.to_string(),
        evicted,
    }))
}

/// `attachment; filename="<ascii>"; filename*=UTF-8''<encoded>`.
///
/// Names may keep non-ASCII letters (e.g. CJK), which a plain quoted
/// `filename` cannot carry.
fn content_disposition(filename: &str) -> Result<HeaderValue, ApiError> {
    let ascii: String = filename
        .chars()
        .map(|c| if c.is_ascii_graphic() && c != '"' && c != '\\' { c } else { '_' })
        .collect();

    let value = if ascii == filename {
        format!("attachment; filename=\"{filename}\"")
    } else {
        format!(
            "attachment; filename=\"{ascii}\"; filename*=UTF-8''{}",
            percent_encode(filename)
        )
    };

    HeaderValue::from_str(&value)
        .map_err(|e| ApiError::Internal(format!("Content-Disposition header: {e}")))
}

/// RFC 5987 `attr-char` encoding.
fn percent_encode(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for byte in value.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}
