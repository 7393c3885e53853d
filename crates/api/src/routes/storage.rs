//! Storage URL procedures for signed-in users.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get, post},
};
use kan_core::storage::PresignedUrl;
use kan_shared::AppError;
use serde::Deserialize;
use tracing::info;

use crate::{AppState, context::AuthenticatedContext, error::ApiError};

/// Creates storage routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/storage/upload-url", post(upload_url))
        .route("/api/storage/download-url", get(download_url))
        .route("/api/storage/{bucket}/{*key}", delete(delete_object))
}

/// Request body for an upload URL.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadUrlRequest {
    /// Target bucket.
    pub bucket: String,
    /// Object key inside the bucket.
    pub key: String,
    /// MIME type the client will send.
    pub content_type: String,
}

/// Query for a download URL.
#[derive(Debug, Deserialize)]
pub struct ObjectQuery {
    /// Bucket name.
    pub bucket: String,
    /// Object key.
    pub key: String,
}

fn ensure_known_bucket(state: &AppState, bucket: &str) -> Result<(), ApiError> {
    if state.storage.env().is_known_bucket(bucket) {
        Ok(())
    } else {
        Err(AppError::Validation(format!("Unknown bucket: {bucket}")).into())
    }
}

/// POST `/api/storage/upload-url`
async fn upload_url(
    State(state): State<AppState>,
    auth: AuthenticatedContext,
    Json(req): Json<UploadUrlRequest>,
) -> Result<Json<PresignedUrl>, ApiError> {
    ensure_known_bucket(&state, &req.bucket)?;

    let presigned = state
        .storage
        .upload(&req.bucket, &req.key, &req.content_type)
        .await?;

    info!(
        user_id = %auth.user.id,
        bucket = %req.bucket,
        key = %req.key,
        "Issued upload URL"
    );
    Ok(Json(presigned))
}

/// GET `/api/storage/download-url?bucket=&key=`
async fn download_url(
    State(state): State<AppState>,
    _auth: AuthenticatedContext,
    Query(query): Query<ObjectQuery>,
) -> Result<Json<PresignedUrl>, ApiError> {
    ensure_known_bucket(&state, &query.bucket)?;
    Ok(Json(state.storage.download(&query.bucket, &query.key).await?))
}

/// DELETE `/api/storage/{bucket}/{*key}`
async fn delete_object(
    State(state): State<AppState>,
    auth: AuthenticatedContext,
    Path((bucket, key)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    ensure_known_bucket(&state, &bucket)?;
    state.storage.delete(&bucket, &key).await?;

    info!(user_id = %auth.user.id, %bucket, %key, "Deleted stored object");
    Ok(StatusCode::NO_CONTENT)
}
