//! HTTP API layer with Axum routes and middleware.
//!
//! This crate provides:
//! - Health, stats and session routes
//! - The local upload file server and the attachment downloader
//! - The per-request context extractor
//! - Rate limiting middleware

pub mod context;
pub mod error;
pub mod middleware;
pub mod routes;

#[cfg(test)]
mod test_support;

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use kan_core::storage::Storage;
use kan_shared::{RateLimitConfig, UploadConfig};
use sea_orm::DatabaseConnection;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use context::{AuthFacade, AuthenticatedContext, NormalizedHeaders, RequestContext, SessionUser};
pub use error::ApiError;
pub use middleware::rate_limit::RateLimiter;

/// Timeout for establishing upstream connections in the attachment downloader.
const UPSTREAM_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub db: Arc<DatabaseConnection>,
    /// Storage facade over the environment snapshot taken at startup.
    pub storage: Arc<Storage>,
    /// Attachment download rate limiter.
    pub rate_limiter: Arc<RateLimiter>,
    /// HTTP client used to proxy attachment downloads.
    pub http: reqwest::Client,
    /// Expected value of the `x-admin-api-key` header.
    pub admin_api_key: Option<Arc<str>>,
    /// Largest body accepted by the local upload endpoint.
    pub max_upload_bytes: u64,
}

impl AppState {
    /// Creates the state with no admin key and default upload limits.
    ///
    /// The proxy client never follows redirects, so every fetched origin is
    /// one that passed the allow-list.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(
        db: DatabaseConnection,
        storage: Storage,
        rate_limit: RateLimitConfig,
    ) -> reqwest::Result<Self> {
        let http = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .connect_timeout(UPSTREAM_CONNECT_TIMEOUT)
            .user_agent(concat!("kan/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            db: Arc::new(db),
            storage: Arc::new(storage),
            rate_limiter: Arc::new(RateLimiter::new(rate_limit)),
            http,
            admin_api_key: None,
            max_upload_bytes: UploadConfig::default().max_upload_bytes,
        })
    }

    /// Sets the admin API key required by the stats endpoint.
    #[must_use]
    pub fn with_admin_api_key(mut self, key: Option<String>) -> Self {
        self.admin_api_key = key.filter(|k| !k.is_empty()).map(Arc::from);
        self
    }

    /// Sets the local upload size limit.
    #[must_use]
    pub fn with_upload_config(mut self, uploads: UploadConfig) -> Self {
        self.max_upload_bytes = uploads.max_upload_bytes;
        self
    }
}

/// Creates the main application router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .merge(routes::routes(&state))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
