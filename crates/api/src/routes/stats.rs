//! Admin statistics endpoint.

use axum::{Json, Router, extract::State, http::HeaderMap, routing::get};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use kan_db::{EntityCounts, StatsRepository};
use kan_shared::AppError;
use serde::Serialize;
use sha2::Sha256;
use tracing::{error, warn};

use crate::{AppState, error::ApiError};

/// Header carrying the admin API key.
pub const ADMIN_KEY_HEADER: &str = "x-admin-api-key";

/// Stats response.
#[derive(Debug, Serialize)]
pub struct StatsResponse {
    /// Live entity counts.
    #[serde(flatten)]
    pub counts: EntityCounts,
    /// When the counts were taken.
    pub generated_at: DateTime<Utc>,
}

/// Creates stats routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/stats", get(stats))
        .route("/api/stats", get(stats))
}

/// GET `/stats`
async fn stats(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<StatsResponse>, ApiError> {
    let Some(expected) = state.admin_api_key.as_deref() else {
        error!("Stats requested but KAN_ADMIN_API_KEY is not set");
        return Err(AppError::Configuration("KAN_ADMIN_API_KEY is not set".to_string()).into());
    };

    let provided = headers.get(ADMIN_KEY_HEADER).and_then(|v| v.to_str().ok());
    if !provided.is_some_and(|p| keys_match(expected, p)) {
        warn!("Rejected stats request with missing or invalid admin key");
        return Err(AppError::Unauthorized("Invalid admin API key".to_string()).into());
    }

    let counts = StatsRepository::new((*state.db).clone()).counts().await?;
    Ok(Json(StatsResponse {
        counts,
        generated_at: Utc::now(),
    }))
}

/// Compares two keys in constant time.
///
/// Both keys are MACed under a fixed key so inputs of different lengths are
/// compared as equal-length tags.
fn keys_match(expected: &str, provided: &str) -> bool {
    let tag = |input: &str| {
        let mut mac = Hmac::<Sha256>::new_from_slice(b"kan-admin-api-key")
            .unwrap_or_else(|_| unreachable!("HMAC accepts keys of any length"));
        mac.update(input.as_bytes());
        mac
    };

    tag(expected)
        .verify_slice(&tag(provided).finalize().into_bytes())
        .is_ok()
}
