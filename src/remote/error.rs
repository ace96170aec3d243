//! Shared error handling for the data service.
//!
//! HTTP failures are captured as [`ApiError`] (status, `Retry-After`, the
//! PostgREST error code) so the retry loop can tell transient failures from
//! permanent ones, then mapped onto [`DocketError`] at the service boundary.

use std::fmt;
use std::time::Duration;

use serde::Deserialize;

use crate::error::DocketError;

/// PostgreSQL `unique_violation`
pub const UNIQUE_VIOLATION_CODE: &str = "23505";

/// Default wait when a rate-limited response carries no `Retry-After`
const DEFAULT_RETRY_AFTER_SECS: u64 = 60;

/// Common interface for errors that can carry HTTP status information
pub trait AsHttpError {
    fn as_http_error(&self) -> Option<(reqwest::StatusCode, Option<u64>)>;

    /// Server errors and dropped connections are worth retrying
    fn is_transient(&self) -> bool;

    fn is_rate_limited(&self) -> bool;

    fn get_retry_after(&self) -> Option<Duration> {
        if !self.is_rate_limited() {
            return None;
        }
        let seconds = self
            .as_http_error()
            .and_then(|(_, retry_after)| retry_after)
            .unwrap_or(DEFAULT_RETRY_AFTER_SECS);
        Some(Duration::from_secs(seconds))
    }
}

/// Error body returned by PostgREST.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PostgrestErrorBody {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub details: Option<String>,
    #[serde(default)]
    pub hint: Option<String>,
}

/// A failed request against one relation.
#[derive(Debug)]
pub struct ApiError {
    /// Relation the request targeted
    pub relation: String,
    /// HTTP status code, if a response was received
    pub status: Option<reqwest::StatusCode>,
    /// Retry-After header value in seconds, if available
    pub retry_after: Option<u64>,
    /// PostgREST / PostgreSQL error code, e.g. `23505`
    pub code: Option<String>,
    pub message: String,
}

impl ApiError {
    pub fn new(relation: &str, message: impl Into<String>) -> Self {
        Self {
            relation: relation.to_string(),
            status: None,
            retry_after: None,
            code: None,
            message: message.into(),
        }
    }

    pub fn with_status(
        relation: &str,
        status: reqwest::StatusCode,
        body: Option<PostgrestErrorBody>,
    ) -> Self {
        let body = body.unwrap_or_default();
        let message = match (body.message, body.details) {
            (Some(message), Some(details)) => format!("{message} ({details})"),
            (Some(message), None) => message,
            (None, _) => format!("HTTP {status}"),
        };
        Self {
            relation: relation.to_string(),
            status: Some(status),
            retry_after: None,
            code: body.code,
            message,
        }
    }

    pub fn with_retry_after(mut self, seconds: Option<u64>) -> Self {
        self.retry_after = seconds;
        self
    }

    pub fn is_unique_violation(&self) -> bool {
        self.code.as_deref() == Some(UNIQUE_VIOLATION_CODE)
            || self.status == Some(reqwest::StatusCode::CONFLICT)
    }

    /// Map onto the crate error taxonomy.
    pub fn to_docket_error(&self) -> DocketError {
        if self.is_unique_violation() {
            return DocketError::UniqueViolation {
                relation: self.relation.clone(),
            };
        }
        if let Some(duration) = self.get_retry_after() {
            return DocketError::RateLimited(duration.as_secs());
        }
        if let Some(status) = self.status
            && matches!(status.as_u16(), 401 | 403)
        {
            return DocketError::Auth(format!("{}: {}", self.relation, self.message));
        }
        DocketError::query_failed(&self.relation, self.message.clone())
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl AsHttpError for ApiError {
    fn as_http_error(&self) -> Option<(reqwest::StatusCode, Option<u64>)> {
        self.status.map(|s| (s, self.retry_after))
    }

    fn is_transient(&self) -> bool {
        match self.status {
            Some(status) => status.is_server_error(),
            // No response at all: connection refused, reset, or timed out
            None => true,
        }
    }

    fn is_rate_limited(&self) -> bool {
        self.status.is_some_and(|s| s.as_u16() == 429)
    }
}

impl From<ApiError> for DocketError {
    fn from(error: ApiError) -> Self {
        error.to_docket_error()
    }
}

#[cfg(test)]
mod tests {
    use reqwest::StatusCode;

    use super::*;

    fn body(code: &str, message: &str) -> Option<PostgrestErrorBody> {
        Some(PostgrestErrorBody {
            code: Some(code.to_string()),
            message: Some(message.to_string()),
            ..Default::default()
        })
    }

    #[test]
    fn test_unique_violation_maps_to_conflict() {
        let err = ApiError::with_status(
            "favorites",
            StatusCode::CONFLICT,
            body("23505", "duplicate key value violates unique constraint"),
        );
        assert!(err.to_docket_error().is_unique_violation());
    }

    #[test]
    fn test_rate_limit_uses_retry_after() {
        let err =
            ApiError::with_status("dockets", StatusCode::TOO_MANY_REQUESTS, None).with_retry_after(Some(7));
        assert!(err.is_rate_limited());
        assert!(matches!(err.to_docket_error(), DocketError::RateLimited(7)));

        let no_header = ApiError::with_status("dockets", StatusCode::TOO_MANY_REQUESTS, None);
        assert_eq!(no_header.get_retry_after(), Some(Duration::from_secs(60)));
    }

    #[test]
    fn test_bad_filter_is_query_failure_not_transient() {
        let err = ApiError::with_status(
            "dockets",
            StatusCode::BAD_REQUEST,
            body("PGRST100", "failed to parse filter"),
        );
        assert!(!err.is_transient());
        match err.to_docket_error() {
            DocketError::QueryFailed { relation, message } => {
                assert_eq!(relation, "dockets");
                assert!(message.contains("failed to parse filter"));
            }
            other => panic!("expected QueryFailed, got {other:?}"),
        }
    }

    #[test]
    fn test_server_and_network_errors_are_transient() {
        assert!(ApiError::with_status("dockets", StatusCode::BAD_GATEWAY, None).is_transient());
        assert!(ApiError::new("dockets", "connection reset").is_transient());
    }

    #[test]
    fn test_auth_failures() {
        let err = ApiError::with_status("dockets", StatusCode::UNAUTHORIZED, None);
        assert!(matches!(err.to_docket_error(), DocketError::Auth(_)));
    }
}
