//! Health check endpoints.

use std::time::Instant;

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use kan_core::health::{ComponentCheck, HealthReport};
use kan_core::storage::Storage;
use sea_orm::DatabaseConnection;
use tracing::warn;

use crate::AppState;

/// Creates health check routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/health", get(health_check))
}

/// Health check handler: 200 when healthy, 503 otherwise.
async fn health_check(State(state): State<AppState>) -> Response {
    let (database, storage) = tokio::join!(
        check_database(&state.db),
        check_storage(&state.storage)
    );

    let report = HealthReport::new(database, storage, env!("CARGO_PKG_VERSION"));
    let status = if report.is_ok() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status, Json(report)).into_response()
}

async fn check_database(db: &DatabaseConnection) -> ComponentCheck {
    let started = Instant::now();
    match db.ping().await {
        Ok(()) => ComponentCheck::ok(elapsed_ms(started)),
        Err(e) => {
            warn!(error = %e, "Database health check failed");
            ComponentCheck::error(elapsed_ms(started), "database unreachable")
        }
    }
}

async fn check_storage(storage: &Storage) -> ComponentCheck {
    let driver = storage.driver().as_str();
    if !storage.env().is_configured() {
        return ComponentCheck::not_configured().with_driver(driver);
    }

    let started = Instant::now();
    match storage.check().await {
        Ok(()) => ComponentCheck::ok(elapsed_ms(started)).with_driver(driver),
        Err(e) => {
            warn!(error = %e, driver, "Storage health check failed");
            ComponentCheck::error(elapsed_ms(started), "storage unreachable").with_driver(driver)
        }
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
