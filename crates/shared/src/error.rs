//! Application-wide error types.

use thiserror::Error;

/// Application error types.
#[derive(Debug, Error)]
pub enum AppError {
    /// Required configuration is missing or invalid.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Authentication failed.
    #[error("Authentication failed: {0}")]
    Unauthorized(String),

    /// Access denied.
    #[error("Access denied: {0}")]
    Forbidden(String),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Validation error.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Request body exceeds the accepted size.
    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    /// Too many requests from one client.
    #[error("Rate limit exceeded, retry in {retry_after_secs}s")]
    RateLimited {
        /// Seconds until the client may retry.
        retry_after_secs: u64,
    },

    /// An upstream server answered with a non-success status.
    #[error("Upstream responded with status {status}")]
    Upstream {
        /// Status code returned by the upstream.
        status: u16,
    },

    /// An upstream server could not be reached.
    #[error("Bad gateway: {0}")]
    BadGateway(String),

    /// Database error.
    #[error("Database error: {0}")]
    Database(String),

    /// Storage backend error.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Returns the HTTP status code for this error.
    #[must_use]
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::Unauthorized(_) => 401,
            Self::Forbidden(_) => 403,
            Self::NotFound(_) => 404,
            Self::Validation(_) => 400,
            Self::PayloadTooLarge(_) => 413,
            Self::RateLimited { .. } => 429,
            Self::Upstream { status } => *status,
            Self::BadGateway(_) => 502,
            Self::Configuration(_) | Self::Database(_) | Self::Storage(_) | Self::Internal(_) => {
                500
            }
        }
    }

    /// Returns the error code for API responses.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "CONFIGURATION_ERROR",
            Self::Unauthorized(_) => "UNAUTHORIZED",
            Self::Forbidden(_) => "FORBIDDEN",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::PayloadTooLarge(_) => "PAYLOAD_TOO_LARGE",
            Self::RateLimited { .. } => "RATE_LIMITED",
            Self::Upstream { .. } => "UPSTREAM_ERROR",
            Self::BadGateway(_) => "BAD_GATEWAY",
            Self::Database(_) => "DATABASE_ERROR",
            Self::Storage(_) => "STORAGE_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Whether the message is safe to show to clients.
    ///
    /// Server-side failures carry driver or database details that only belong in logs.
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        self.status_code() < 500
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(AppError::Configuration(String::new()), 500, "CONFIGURATION_ERROR")]
    #[case(AppError::Unauthorized(String::new()), 401, "UNAUTHORIZED")]
    #[case(AppError::Forbidden(String::new()), 403, "FORBIDDEN")]
    #[case(AppError::NotFound(String::new()), 404, "NOT_FOUND")]
    #[case(AppError::Validation(String::new()), 400, "VALIDATION_ERROR")]
    #[case(AppError::PayloadTooLarge(String::new()), 413, "PAYLOAD_TOO_LARGE")]
    #[case(AppError::RateLimited { retry_after_secs: 3 }, 429, "RATE_LIMITED")]
    #[case(AppError::Upstream { status: 404 }, 404, "UPSTREAM_ERROR")]
    #[case(AppError::Upstream { status: 503 }, 503, "UPSTREAM_ERROR")]
    #[case(AppError::BadGateway(String::new()), 502, "BAD_GATEWAY")]
    #[case(AppError::Database(String::new()), 500, "DATABASE_ERROR")]
    #[case(AppError::Storage(String::new()), 500, "STORAGE_ERROR")]
    #[case(AppError::Internal(String::new()), 500, "INTERNAL_ERROR")]
    fn test_error_mapping(#[case] error: AppError, #[case] status: u16, #[case] code: &str) {
        assert_eq!(error.status_code(), status);
        assert_eq!(error.error_code(), code);
    }

    #[test]
    fn test_error_display() {
        assert_eq!(
            AppError::Validation("bad key".into()).to_string(),
            "Validation error: bad key"
        );
        assert_eq!(
            AppError::RateLimited {
                retry_after_secs: 12
            }
            .to_string(),
            "Rate limit exceeded, retry in 12s"
        );
        assert_eq!(
            AppError::Upstream { status: 410 }.to_string(),
            "Upstream responded with status 410"
        );
    }

    #[test]
    fn test_client_errors_are_exposed() {
        assert!(AppError::NotFound("x".into()).is_client_error());
        assert!(AppError::Upstream { status: 404 }.is_client_error());
        assert!(!AppError::Upstream { status: 500 }.is_client_error());
        assert!(!AppError::Database("connection refused".into()).is_client_error());
    }
}
