//! HTTP mapping of application errors.

use axum::{
    Json,
    http::{HeaderValue, StatusCode, header::RETRY_AFTER},
    response::{IntoResponse, Response},
};
use kan_core::storage::StorageError;
use kan_db::repositories::StatsError;
use kan_shared::AppError;
use sea_orm::DbErr;
use serde_json::json;
use tracing::error;

/// Error returned by handlers, rendered as `{ "error", "message" }`.
#[derive(Debug)]
pub struct ApiError(pub AppError);

impl ApiError {
    /// The wrapped application error.
    #[must_use]
    pub const fn inner(&self) -> &AppError {
        &self.0
    }
}

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        Self(err)
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        let app = match err {
            StorageError::InvalidKey(msg) => AppError::Validation(msg),
            StorageError::NotFound { .. } => AppError::NotFound("File not found".to_string()),
            StorageError::InvalidSignature => {
                AppError::Forbidden("Invalid or expired upload signature".to_string())
            }
            StorageError::FileTooLarge { max } => {
                AppError::PayloadTooLarge(format!("Body exceeds {max} bytes"))
            }
            StorageError::Configuration(msg) => AppError::Configuration(msg),
            e @ (StorageError::PresignNotSupported | StorageError::Operation(_)) => {
                AppError::Storage(e.to_string())
            }
        };
        Self(app)
    }
}

impl From<DbErr> for ApiError {
    fn from(err: DbErr) -> Self {
        Self(AppError::Database(err.to_string()))
    }
}

impl From<StatsError> for ApiError {
    fn from(err: StatsError) -> Self {
        Self(AppError::Database(err.to_string()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.0.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        let message = if self.0.is_client_error() {
            self.0.to_string()
        } else {
            error!(error = %self.0, status = status.as_u16(), "Request failed");
            match self.0 {
                AppError::BadGateway(_) | AppError::Upstream { .. } => {
                    "Upstream request failed".to_string()
                }
                AppError::Configuration(_) => "Server is not configured for this request".to_string(),
                _ => "An internal error occurred".to_string(),
            }
        };

        let mut response = (
            status,
            Json(json!({
                "error": self.0.error_code(),
                "message": message,
            })),
        )
            .into_response();

        if let AppError::RateLimited { retry_after_secs } = self.0 {
            response
                .headers_mut()
                .insert(RETRY_AFTER, HeaderValue::from(retry_after_secs));
        }
        response
    }
}
