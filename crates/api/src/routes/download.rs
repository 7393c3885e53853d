//! Attachment downloader.
//!
//! `GET /api/download/attachment?url=&filename=` returns a remote or local
//! file as an attachment. Local uploads are streamed from disk; remote URLs
//! are proxied only when their origin is allow-listed.

use axum::{
    Router,
    body::Body,
    extract::{Query, State},
    http::{
        HeaderValue,
        header::{CACHE_CONTROL, CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE},
    },
    response::{IntoResponse, Response},
    routing::get,
};
use kan_core::storage::StorageDriver;
use kan_shared::AppError;
use serde::Deserialize;
use tracing::{debug, warn};
use url::Url;

use super::uploads::file_response;
use crate::{AppState, error::ApiError};

/// Cache policy for proxied attachments.
const PRIVATE_NO_STORE: &str = "private, no-store";

/// Filename used when none can be derived.
const DEFAULT_FILENAME: &str = "download";

/// Creates attachment download routes.
pub fn routes() -> Router<AppState> {
    Router::new().route("/api/download/attachment", get(download_attachment))
}

/// Download query parameters.
#[derive(Debug, Deserialize)]
pub struct DownloadQuery {
    /// Absolute http(s) URL of the file.
    pub url: Option<String>,
    /// Filename offered to the client.
    pub filename: Option<String>,
}

/// GET `/api/download/attachment`
async fn download_attachment(
    State(state): State<AppState>,
    Query(query): Query<DownloadQuery>,
) -> Result<Response, ApiError> {
    let url = parse_download_url(query.url.as_deref())?;
    let filename = query
        .filename
        .filter(|f| !f.trim().is_empty())
        .unwrap_or_else(|| filename_from_url(&url));

    let env = state.storage.env();
    let local = if state.storage.driver() == StorageDriver::Fs {
        env.local_object_for(&url)?
    } else {
        None
    };
    let mut response = match local {
        Some((bucket, key)) => {
            debug!(%bucket, %key, "Serving attachment from local storage");
            file_response(state.storage.open(&bucket, &key).await?)
        }
        None => {
            if !env.is_allowed_download_url(&url) {
                warn!(host = url.host_str().unwrap_or_default(), "Download origin not allowed");
                return Err(AppError::Validation("URL origin is not allowed".to_string()).into());
            }
            proxy(&state.http, url).await?
        }
    };

    let headers = response.headers_mut();
    headers.insert(CONTENT_DISPOSITION, content_disposition(&filename)?);
    headers.insert(CACHE_CONTROL, HeaderValue::from_static(PRIVATE_NO_STORE));
    Ok(response)
}

fn parse_download_url(raw: Option<&str>) -> Result<Url, ApiError> {
    let raw = raw
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .ok_or_else(|| AppError::Validation("url is required".to_string()))?;

    let url = Url::parse(raw)
        .map_err(|_| AppError::Validation("url must be an absolute URL".to_string()))?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return Err(AppError::Validation("url must use http or https".to_string()).into());
    }
    Ok(url)
}

/// Last non-empty path segment, percent-decoded.
fn filename_from_url(url: &Url) -> String {
    url.path_segments()
        .and_then(|mut segments| segments.rfind(|s| !s.is_empty()))
        .map(|s| {
            urlencoding::decode(s).map_or_else(|_| s.to_string(), std::borrow::Cow::into_owned)
        })
        .unwrap_or_else(|| DEFAULT_FILENAME.to_string())
}

/// Fetches `url` and streams the upstream body back with its 2xx status.
async fn proxy(client: &reqwest::Client, url: Url) -> Result<Response, ApiError> {
    let upstream = client.get(url).send().await.map_err(|e| {
        warn!(error = %e, "Attachment fetch failed");
        AppError::BadGateway(e.to_string())
    })?;

    let status = upstream.status();
    if !status.is_success() {
        warn!(status = status.as_u16(), "Upstream rejected attachment fetch");
        return Err(AppError::Upstream {
            status: status.as_u16(),
        }
        .into());
    }

    let content_type = upstream
        .headers()
        .get(CONTENT_TYPE)
        .cloned()
        .unwrap_or_else(|| HeaderValue::from_static("application/octet-stream"));
    let content_length = upstream.headers().get(CONTENT_LENGTH).cloned();
    let content_range = upstream.headers().get(CONTENT_RANGE).cloned();

    let mut response = Body::from_stream(upstream.bytes_stream()).into_response();
    *response.status_mut() = status;
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, content_type);
    if let Some(len) = content_length {
        headers.insert(CONTENT_LENGTH, len);
    }
    if let Some(range) = content_range {
        headers.insert(CONTENT_RANGE, range);
    }
    Ok(response)
}

/// Builds `attachment; filename="..."; filename*=UTF-8''...`.
///
/// The plain `filename` keeps only safe ASCII; the extended form carries the
/// full UTF-8 name percent-encoded.
pub fn content_disposition(filename: &str) -> Result<HeaderValue, ApiError> {
    let name = filename
        .rsplit(['/', '\\'])
        .next()
        .map(str::trim)
        .filter(|n| !n.is_empty() && *n != "." && *n != "..")
        .unwrap_or(DEFAULT_FILENAME);

    let ascii: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || " .-_()[]+,".contains(c) {
                c
            } else {
                '_'
            }
        })
        .collect();

    let value = format!(
        "attachment; filename=\"{ascii}\"; filename*=UTF-8''{}",
        urlencoding::encode(name)
    );
    HeaderValue::from_str(&value)
        .map_err(|e| AppError::Internal(format!("invalid Content-Disposition: {e}")).into())
}

#[cfg(test)]
#[path = "download_tests.rs"]
mod tests;
