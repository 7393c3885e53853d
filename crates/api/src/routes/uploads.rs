//! Local upload file server.
//!
//! Serves files of the fs storage driver at `/{uploads}/{bucket}/{*key}`,
//! where `{uploads}` is `KAN_UPLOADS_PATH` (and always at `/api/uploads`),
//! and accepts signed `PUT` uploads there.

use axum::{
    Router,
    body::Body,
    extract::{Path, Query, State},
    http::{
        HeaderMap, HeaderValue, StatusCode,
        header::{CACHE_CONTROL, CONTENT_LENGTH, CONTENT_TYPE, X_CONTENT_TYPE_OPTIONS},
    },
    response::{IntoResponse, Response},
    routing::get,
};
use kan_core::storage::{StorageDriver, StorageError, StoredFile, validate_bucket, validate_key};
use serde::Deserialize;
use tokio_util::io::ReaderStream;
use tracing::{info, warn};

use crate::{AppState, error::ApiError};

/// Cache policy for immutable uploaded files.
const PUBLIC_IMMUTABLE: &str = "public, max-age=31536000, immutable";

/// Alias of the public uploads path under `/api`.
const API_UPLOADS_PREFIX: &str = "api/uploads";

/// Creates upload file server routes.
///
/// The public path follows the configured uploads prefix so that URLs built
/// by the storage facade resolve here.
pub fn routes(state: &AppState) -> Router<AppState> {
    let prefix = state.storage.env().uploads_prefix();
    let router = Router::new().route(
        &format!("/{API_UPLOADS_PREFIX}/{{bucket}}/{{*key}}"),
        get(serve_upload).put(receive_upload),
    );
    if prefix == API_UPLOADS_PREFIX {
        return router;
    }
    router.route(
        &format!("/{prefix}/{{bucket}}/{{*key}}"),
        get(serve_upload).put(receive_upload),
    )
}

/// Query parameters of a signed upload URL.
#[derive(Debug, Deserialize)]
pub struct SignedUploadQuery {
    /// Expiry as unix seconds.
    pub expires: Option<String>,
    /// Hex HMAC signature.
    pub signature: Option<String>,
}

/// Streams a stored file with its type, length and `nosniff`.
pub(crate) fn file_response(stored: StoredFile) -> Response {
    let mut response = Body::from_stream(ReaderStream::new(stored.file)).into_response();
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(stored.content_type));
    headers.insert(CONTENT_LENGTH, HeaderValue::from(stored.len));
    headers.insert(X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));
    response
}

/// GET/HEAD `/{uploads}/{bucket}/{*key}`
async fn serve_upload(
    State(state): State<AppState>,
    Path((bucket, key)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    let stored = state.storage.open(&bucket, &key).await?;

    let mut response = file_response(stored);
    response
        .headers_mut()
        .insert(CACHE_CONTROL, HeaderValue::from_static(PUBLIC_IMMUTABLE));
    Ok(response)
}

/// PUT `/{uploads}/{bucket}/{*key}?expires=&signature=`
async fn receive_upload(
    State(state): State<AppState>,
    Path((bucket, key)): Path<(String, String)>,
    Query(query): Query<SignedUploadQuery>,
    headers: HeaderMap,
    body: Body,
) -> Result<StatusCode, ApiError> {
    validate_bucket(&bucket)?;
    validate_key(&key)?;

    let storage = &state.storage;
    if storage.driver() != StorageDriver::Fs || storage.env().storage_dir.is_none() {
        return Err(StorageError::not_found(format!("{bucket}/{key}")).into());
    }

    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("application/octet-stream");
    let expires = query.expires.as_deref().and_then(|e| e.parse::<i64>().ok());
    let (Some(expires), Some(signature)) = (expires, query.signature.as_deref()) else {
        warn!(%bucket, %key, "Upload without signature");
        return Err(StorageError::InvalidSignature.into());
    };
    if let Err(e) = storage.verify_local_upload(&bucket, &key, content_type, expires, signature) {
        warn!(%bucket, %key, "Rejected upload signature");
        return Err(e.into());
    }

    let declared_len = headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok());
    if declared_len.is_some_and(|len| len > state.max_upload_bytes) {
        return Err(StorageError::FileTooLarge {
            max: state.max_upload_bytes,
        }
        .into());
    }

    let written = storage
        .write_local(&bucket, &key, body.into_data_stream(), state.max_upload_bytes)
        .await?;

    info!(%bucket, %key, bytes = written, "Stored local upload");
    Ok(StatusCode::CREATED)
}

#[cfg(test)]
#[path = "uploads_tests.rs"]
mod tests;
