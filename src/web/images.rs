//! Serves panels that were stored on local disk, with conditional-request support.

use std::io::ErrorKind;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::header::{
    CACHE_CONTROL, CONTENT_TYPE, ETAG, IF_MODIFIED_SINCE, IF_NONE_MATCH, LAST_MODIFIED,
};
use axum::http::response::Builder;
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::Response;
use httpdate::{fmt_http_date, parse_http_date};

use super::AppState;
use crate::constants::PANEL_CACHE_CONTROL;
use crate::error::ComicError;

/// Cache headers derived from panel file metadata.
#[derive(Clone, Debug)]
pub(crate) struct PanelCacheHeaders {
    etag: Option<HeaderValue>,
    last_modified: Option<HeaderValue>,
    modified_at: Option<SystemTime>,
}

impl PanelCacheHeaders {
    /// Builds cache headers from filesystem metadata.
    pub(crate) fn from_metadata(metadata: &std::fs::Metadata) -> Self {
        let modified_at = metadata.modified().ok();
        let etag = build_etag(metadata.len(), modified_at);
        let last_modified =
            modified_at.and_then(|modified| HeaderValue::from_str(&fmt_http_date(modified)).ok());
        Self {
            etag,
            last_modified,
            modified_at,
        }
    }
}

fn apply_cache_headers(mut builder: Builder, cache: &PanelCacheHeaders) -> Builder {
    builder = builder.header(CACHE_CONTROL, PANEL_CACHE_CONTROL.as_str());
    if let Some(etag) = &cache.etag {
        builder = builder.header(ETAG, etag.clone());
    }
    if let Some(last_modified) = &cache.last_modified {
        builder = builder.header(LAST_MODIFIED, last_modified.clone());
    }
    builder
}

/// Returns true when the request matches a not-modified response.
fn is_not_modified(headers: &HeaderMap, cache: &PanelCacheHeaders) -> bool {
    if let Some(if_none_match) = headers.get(IF_NONE_MATCH) {
        if let Ok(value) = if_none_match.to_str() {
            let value = value.trim();
            if value == "*" {
                return true;
            }
            if let Some(etag) = cache.etag.as_ref().and_then(|value| value.to_str().ok())
                && value.split(',').any(|candidate| candidate.trim() == etag)
            {
                return true;
            }
        }
        return false;
    }

    if let (Some(if_modified_since), Some(modified_at)) =
        (headers.get(IF_MODIFIED_SINCE), cache.modified_at)
        && let Ok(value) = if_modified_since.to_str()
        && let Ok(since) = parse_http_date(value)
        && modified_at <= since
    {
        return true;
    }

    false
}

fn build_etag(size: u64, modified_at: Option<SystemTime>) -> Option<HeaderValue> {
    let secs = modified_at
        .and_then(|modified| modified.duration_since(UNIX_EPOCH).ok())
        .map(|duration| duration.as_secs())
        .unwrap_or(0);
    HeaderValue::from_str(&format!("W/\"{size}-{secs}\"")).ok()
}

/// Panel files are `<alphanumeric>.png`; anything else never touches the disk.
fn is_panel_file_name(file: &str) -> bool {
    file.strip_suffix(".png").is_some_and(|stem| {
        !stem.is_empty() && stem.chars().all(|c| c.is_ascii_alphanumeric())
    })
}

/// handles GET /panels/{file}
pub(crate) async fn panel_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(file): Path<String>,
) -> Result<Response, ComicError> {
    if !is_panel_file_name(&file) {
        return Err(ComicError::NotFound(format!("panel {file}")));
    }
    let path = state.panel_dir.join(&file);
    let metadata = match tokio::fs::metadata(&path).await {
        Ok(metadata) => metadata,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            return Err(ComicError::NotFound(format!("panel {file}")));
        }
        Err(err) => return Err(ComicError::from(err)),
    };
    let cache = PanelCacheHeaders::from_metadata(&metadata);
    if is_not_modified(&headers, &cache) {
        return apply_cache_headers(Response::builder().status(StatusCode::NOT_MODIFIED), &cache)
            .body(Body::empty())
            .map_err(ComicError::from);
    }

    let bytes = tokio::fs::read(&path).await?;
    apply_cache_headers(Response::builder().header(CONTENT_TYPE, "image/png"), &cache)
        .body(Body::from(bytes))
        .map_err(ComicError::from)
}
