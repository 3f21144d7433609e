//! Error types for supportroute
//!
//! `AppError` covers configuration failures and the routing/execution taxonomy.
//! Operation failures are wrapped in `OperationFailure`, which carries the
//! correlation id so a caller can trace the full decision record.

use crate::backends::BackendError;
use crate::operation::{CorrelationId, OperationClass, Priority, Route};
use axum::{
    Json,
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// Main error type for the application
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to read config file {path}: {source}")]
    ConfigFileRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    ConfigParseFailed {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid configuration in {path}: {reason}")]
    ConfigValidationFailed { path: String, reason: String },

    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("No routing rule matches operation class {class} with priority {priority}")]
    NoRoutingRule {
        class: OperationClass,
        priority: Priority,
    },

    #[error("Route {route} is unavailable (circuit open or unhealthy)")]
    RouteUnavailable { route: Route },

    #[error("Both routes are unavailable; no fallback possible")]
    BothRoutesUnavailable,

    #[error("Compliance check denied the operation: {reason}")]
    ComplianceDenied { reason: String },

    #[error("{class} operation exceeded its {budget_ms}ms budget during {stage}")]
    Timeout {
        class: OperationClass,
        budget_ms: u64,
        stage: &'static str,
    },

    #[error("Backend {route} failed: {source}")]
    Backend {
        route: Route,
        #[source]
        source: BackendError,
    },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Stable label used in audit records and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Config(_)
            | Self::ConfigFileRead { .. }
            | Self::ConfigParseFailed { .. }
            | Self::ConfigValidationFailed { .. } => "config",
            Self::Validation(_) => "validation",
            Self::NoRoutingRule { .. } => "no_routing_rule",
            Self::RouteUnavailable { .. } => "route_unavailable",
            Self::BothRoutesUnavailable => "both_routes_unavailable",
            Self::ComplianceDenied { .. } => "compliance_denied",
            Self::Timeout { .. } => "timeout",
            Self::Backend { .. } => "backend_error",
            Self::Internal(_) => "internal",
        }
    }

    /// Whether the single fallback attempt may recover from this error
    ///
    /// Compliance denials and missing rules are never retried: a second
    /// attempt would reach the same outcome.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RouteUnavailable { .. } | Self::Timeout { .. } | Self::Backend { .. }
        )
    }

    fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::ComplianceDenied { .. } => StatusCode::FORBIDDEN,
            Self::NoRoutingRule { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Self::RouteUnavailable { .. } | Self::BothRoutesUnavailable => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            Self::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            Self::Backend { .. } => StatusCode::BAD_GATEWAY,
            Self::Config(_)
            | Self::ConfigFileRead { .. }
            | Self::ConfigParseFailed { .. }
            | Self::ConfigValidationFailed { .. }
            | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(serde_json::json!({
            "error": self.to_string(),
            "kind": self.kind(),
        }));

        (self.status(), body).into_response()
    }
}

/// Failed operation, tagged with the correlation id of its request
#[derive(Error, Debug)]
#[error("operation {correlation_id} failed: {error}")]
pub struct OperationFailure {
    pub correlation_id: CorrelationId,
    #[source]
    pub error: AppError,
}

impl OperationFailure {
    pub fn new(correlation_id: CorrelationId, error: AppError) -> Self {
        Self {
            correlation_id,
            error,
        }
    }
}

impl IntoResponse for OperationFailure {
    fn into_response(self) -> Response {
        let status = self.error.status();
        let body = Json(serde_json::json!({
            "error": self.error.to_string(),
            "kind": self.error.kind(),
            "correlation_id": self.correlation_id,
        }));

        let mut response = (status, body).into_response();
        if let Ok(header_value) = HeaderValue::from_str(&self.correlation_id.to_string()) {
            response
                .headers_mut()
                .insert(crate::middleware::CORRELATION_ID_HEADER, header_value);
        }
        response
    }
}

/// Convenience type alias for Results
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_creates() {
        let err = AppError::Config("test error".to_string());
        assert_eq!(err.to_string(), "Configuration error: test error");
    }

    #[test]
    fn test_no_routing_rule_message() {
        let err = AppError::NoRoutingRule {
            class: OperationClass::Standard,
            priority: Priority::Low,
        };
        assert_eq!(
            err.to_string(),
            "No routing rule matches operation class standard with priority low"
        );
        assert_eq!(err.kind(), "no_routing_rule");
    }

    #[test]
    fn test_timeout_message() {
        let err = AppError::Timeout {
            class: OperationClass::Emergency,
            budget_ms: 5000,
            stage: "invocation",
        };
        assert_eq!(
            err.to_string(),
            "emergency operation exceeded its 5000ms budget during invocation"
        );
    }

    #[test]
    fn test_retryable_classification() {
        assert!(AppError::RouteUnavailable { route: Route::Direct }.is_retryable());
        assert!(
            AppError::Timeout {
                class: OperationClass::Standard,
                budget_ms: 1,
                stage: "invocation"
            }
            .is_retryable()
        );
        assert!(
            AppError::Backend {
                route: Route::Broker,
                source: BackendError::InvalidResponse("bad".to_string()),
            }
            .is_retryable()
        );
        assert!(
            !AppError::ComplianceDenied {
                reason: "region".to_string()
            }
            .is_retryable()
        );
        assert!(
            !AppError::NoRoutingRule {
                class: OperationClass::Critical,
                priority: Priority::High
            }
            .is_retryable()
        );
        assert!(!AppError::BothRoutesUnavailable.is_retryable());
    }

    #[test]
    fn test_response_statuses() {
        let cases = [
            (AppError::Validation("x".into()), StatusCode::BAD_REQUEST),
            (
                AppError::ComplianceDenied { reason: "x".into() },
                StatusCode::FORBIDDEN,
            ),
            (
                AppError::BothRoutesUnavailable,
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                AppError::Timeout {
                    class: OperationClass::Critical,
                    budget_ms: 10,
                    stage: "invocation",
                },
                StatusCode::GATEWAY_TIMEOUT,
            ),
            (AppError::Internal("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, expected) in cases {
            assert_eq!(err.into_response().status(), expected);
        }
    }

    #[test]
    fn test_operation_failure_response_carries_correlation_id() {
        let id = CorrelationId::new();
        let failure = OperationFailure::new(id, AppError::BothRoutesUnavailable);
        let response = failure.into_response();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let header = response
            .headers()
            .get(crate::middleware::CORRELATION_ID_HEADER)
            .expect("correlation header present");
        assert_eq!(header.to_str().unwrap(), id.to_string());
    }
}
