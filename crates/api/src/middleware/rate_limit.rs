//! Fixed-window rate limiting keyed by client address.

use std::time::{Duration, Instant};

use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use dashmap::DashMap;
use kan_shared::{AppError, RateLimitConfig};
use tracing::warn;

use crate::{AppState, error::ApiError};

/// Windows are swept once the map grows past this many clients.
const SWEEP_THRESHOLD: usize = 10_000;

/// Outcome of one rate limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// The request may proceed.
    Allowed {
        /// Requests left in the current window.
        remaining: u32,
    },
    /// The client exhausted its window.
    Limited {
        /// Time until the window resets.
        retry_after: Duration,
    },
}

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    count: u32,
}

/// In-memory fixed-window limiter.
#[derive(Debug)]
pub struct RateLimiter {
    limit: u32,
    window: Duration,
    clients: DashMap<String, Window>,
}

impl RateLimiter {
    /// Creates a limiter allowing `requests` per `window_secs` per client.
    #[must_use]
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            limit: config.requests,
            window: Duration::from_secs(config.window_secs),
            clients: DashMap::new(),
        }
    }

    /// Records a request from `key` now.
    pub fn check(&self, key: &str) -> Decision {
        self.check_at(key, Instant::now())
    }

    /// Records a request from `key` at `now`.
    pub fn check_at(&self, key: &str, now: Instant) -> Decision {
        if self.clients.len() > SWEEP_THRESHOLD {
            self.sweep(now);
        }

        let mut entry = self.clients.entry(key.to_string()).or_insert(Window {
            started: now,
            count: 0,
        });
        let window = entry.value_mut();

        if now.saturating_duration_since(window.started) >= self.window {
            *window = Window {
                started: now,
                count: 0,
            };
        }

        if window.count >= self.limit {
            let elapsed = now.saturating_duration_since(window.started);
            return Decision::Limited {
                retry_after: self.window.saturating_sub(elapsed),
            };
        }

        window.count += 1;
        Decision::Allowed {
            remaining: self.limit - window.count,
        }
    }

    /// Drops windows that have expired at `now`.
    pub fn sweep(&self, now: Instant) {
        self.clients
            .retain(|_, w| now.saturating_duration_since(w.started) < self.window);
    }

    /// Number of tracked clients.
    #[must_use]
    pub fn tracked_clients(&self) -> usize {
        self.clients.len()
    }
}

/// Identifies the client: first `X-Forwarded-For` entry, then `X-Real-IP`,
/// then `unknown`.
#[must_use]
pub fn client_key(headers: &HeaderMap) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    let real_ip = || {
        headers
            .get("x-real-ip")
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };

    forwarded
        .or_else(real_ip)
        .unwrap_or("unknown")
        .to_string()
}

/// Rejects requests over the limit with 429 and `Retry-After`.
pub async fn rate_limit(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let key = client_key(request.headers());

    match state.rate_limiter.check(&key) {
        Decision::Allowed { .. } => Ok(next.run(request).await),
        Decision::Limited { retry_after } => {
            let retry_after_secs =
                (retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0)).max(1);
            warn!(client = %key, retry_after_secs, "Rate limit exceeded");
            Err(AppError::RateLimited { retry_after_secs }.into())
        }
    }
}
