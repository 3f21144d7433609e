//! Metrics endpoints
//!
//! `/metrics` exposes Prometheus text format for scraping; the `/v1/metrics`
//! endpoints expose the rolling window kept by the metrics tracker.

use axum::{Json, extract::State, http::StatusCode};

use crate::handlers::AppState;
use crate::metrics::RoutingMetricsSnapshot;

/// Metrics handler for Prometheus scraping
///
/// ```bash
/// curl http://localhost:3000/metrics
/// # HELP supportroute_operations_total Completed operations by route, operation class and outcome
/// # TYPE supportroute_operations_total counter
/// supportroute_operations_total{class="critical",outcome="succeeded",route="broker"} 42
/// ```
pub async fn handler(State(state): State<AppState>) -> (StatusCode, String) {
    match state.metrics().gather() {
        Ok(output) => (StatusCode::OK, output),
        Err(e) => {
            tracing::error!(error = %e, "Failed to gather metrics for Prometheus scraping");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to gather metrics: {}", e),
            )
        }
    }
}

/// `GET /v1/metrics/snapshot`
pub async fn snapshot(State(state): State<AppState>) -> Json<RoutingMetricsSnapshot> {
    Json(state.executor().tracker().snapshot().await)
}

/// `GET /v1/metrics/recommendations`
pub async fn recommendations(State(state): State<AppState>) -> Json<Vec<String>> {
    Json(state.executor().tracker().recommendations().await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::tests::test_state;
    use crate::operation::{OperationClass, OperationRequest, Payload};

    #[tokio::test]
    async fn test_metrics_handler_returns_prometheus_format() {
        let state = test_state();
        state
            .executor()
            .execute(OperationRequest::new(
                OperationClass::Critical,
                Payload::new("where is my order?"),
            ))
            .await
            .unwrap();

        let (status, body) = handler(State(state)).await;

        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("# TYPE supportroute_operations_total counter"));
        assert!(body.contains(
            r#"supportroute_operations_total{class="critical",outcome="succeeded",route="broker"} 1"#
        ));

        for line in body.lines().filter(|l| !l.starts_with('#') && !l.trim().is_empty()) {
            assert!(line.starts_with("supportroute_"), "unexpected line: {}", line);
            let value = line.split_whitespace().last().unwrap();
            assert!(
                value.parse::<f64>().is_ok() || value == "+Inf",
                "non-numeric sample: {}",
                line
            );
        }
    }

    #[tokio::test]
    async fn test_concurrent_metrics_scraping_is_consistent() {
        let state = test_state();
        let mut handles = vec![];
        for _ in 0..10 {
            let state = state.clone();
            handles.push(tokio::spawn(async move { handler(State(state)).await }));
        }

        let results: Vec<_> = futures::future::join_all(handles).await;
        let first = &results[0].as_ref().unwrap().1;
        for result in &results {
            let (status, body) = result.as_ref().unwrap();
            assert_eq!(*status, StatusCode::OK);
            assert_eq!(body, first);
        }
    }

    #[tokio::test]
    async fn test_snapshot_and_recommendations_reflect_recorded_operations() {
        let state = test_state();
        state
            .executor()
            .execute(OperationRequest::new(
                OperationClass::Critical,
                Payload::new("refund status please"),
            ))
            .await
            .unwrap();

        let Json(snapshot) = snapshot(State(state.clone())).await;
        assert_eq!(snapshot.total_ops, 1);
        assert_eq!(snapshot.success_rate, 1.0);

        let Json(recommendations) = recommendations(State(state)).await;
        assert_eq!(recommendations.len(), 1);
        assert!(recommendations[0].starts_with("insufficient data"));
    }
}
