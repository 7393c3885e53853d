//! Health evaluation.
//!
//! The overall status is an AND gate: the database must be reachable, and the
//! storage backend must be reachable unless it is not configured at all.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Result of one subsystem check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    /// Subsystem answered.
    Ok,
    /// Subsystem failed or was unreachable.
    Error,
    /// Subsystem is not configured and was skipped.
    NotConfigured,
}

/// Overall service status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OverallStatus {
    /// Every configured subsystem is healthy.
    Ok,
    /// At least one configured subsystem failed.
    Error,
}

/// Outcome of checking one subsystem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComponentCheck {
    /// Check result.
    pub status: CheckStatus,
    /// Round trip in milliseconds, when the check ran.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    /// Driver or backend name, when relevant.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub driver: Option<&'static str>,
    /// Failure description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ComponentCheck {
    /// A successful check.
    #[must_use]
    pub fn ok(latency_ms: u64) -> Self {
        Self {
            status: CheckStatus::Ok,
            latency_ms: Some(latency_ms),
            driver: None,
            error: None,
        }
    }

    /// A failed check.
    #[must_use]
    pub fn error(latency_ms: u64, error: impl Into<String>) -> Self {
        Self {
            status: CheckStatus::Error,
            latency_ms: Some(latency_ms),
            driver: None,
            error: Some(error.into()),
        }
    }

    /// A skipped check.
    #[must_use]
    pub fn not_configured() -> Self {
        Self {
            status: CheckStatus::NotConfigured,
            latency_ms: None,
            driver: None,
            error: None,
        }
    }

    /// Attach the backend name.
    #[must_use]
    pub fn with_driver(mut self, driver: &'static str) -> Self {
        self.driver = Some(driver);
        self
    }
}

/// Subsystem checks reported by the health endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct HealthChecks {
    /// Database reachability.
    pub database: ComponentCheck,
    /// Storage backend reachability.
    pub storage: ComponentCheck,
}

/// Health endpoint body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    /// Overall status.
    pub status: OverallStatus,
    /// Service version.
    pub version: &'static str,
    /// When the report was produced.
    pub timestamp: DateTime<Utc>,
    /// Individual checks.
    pub checks: HealthChecks,
}

impl HealthReport {
    /// Build a report, deriving the overall status from the checks.
    #[must_use]
    pub fn new(database: ComponentCheck, storage: ComponentCheck, version: &'static str) -> Self {
        Self {
            status: overall_status(database.status, storage.status),
            version,
            timestamp: Utc::now(),
            checks: HealthChecks { database, storage },
        }
    }

    /// Whether the service should be reported healthy.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.status == OverallStatus::Ok
    }
}

/// `ok` iff the database is ok and storage is ok or not configured.
#[must_use]
pub fn overall_status(database: CheckStatus, storage: CheckStatus) -> OverallStatus {
    let database_ok = database == CheckStatus::Ok;
    let storage_ok = matches!(storage, CheckStatus::Ok | CheckStatus::NotConfigured);

    if database_ok && storage_ok {
        OverallStatus::Ok
    } else {
        OverallStatus::Error
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(CheckStatus::Ok, CheckStatus::Ok, OverallStatus::Ok)]
    #[case(CheckStatus::Ok, CheckStatus::NotConfigured, OverallStatus::Ok)]
    #[case(CheckStatus::Ok, CheckStatus::Error, OverallStatus::Error)]
    #[case(CheckStatus::Error, CheckStatus::Ok, OverallStatus::Error)]
    #[case(CheckStatus::Error, CheckStatus::NotConfigured, OverallStatus::Error)]
    #[case(CheckStatus::Error, CheckStatus::Error, OverallStatus::Error)]
    #[case(CheckStatus::NotConfigured, CheckStatus::Ok, OverallStatus::Error)]
    fn test_overall_status(
        #[case] database: CheckStatus,
        #[case] storage: CheckStatus,
        #[case] expected: OverallStatus,
    ) {
        assert_eq!(overall_status(database, storage), expected);
    }

    #[test]
    fn test_report_serialization() {
        let report = HealthReport::new(
            ComponentCheck::ok(3),
            ComponentCheck::not_configured().with_driver("s3"),
            "0.1.0",
        );
        assert!(report.is_ok());

        let json = serde_json::to_value(&report).expect("serializes");
        assert_eq!(json["status"], "ok");
        assert_eq!(json["checks"]["database"]["status"], "ok");
        assert_eq!(json["checks"]["database"]["latency_ms"], 3);
        assert_eq!(json["checks"]["storage"]["status"], "not_configured");
        assert_eq!(json["checks"]["storage"]["driver"], "s3");
        assert!(json["checks"]["storage"].get("error").is_none());
    }

    #[test]
    fn test_failed_storage_fails_report() {
        let report = HealthReport::new(
            ComponentCheck::ok(1),
            ComponentCheck::error(2, "bucket unreachable").with_driver("s3"),
            "0.1.0",
        );
        assert!(!report.is_ok());
        assert_eq!(report.checks.storage.error.as_deref(), Some("bucket unreachable"));
    }
}
