//! Operator endpoints: breaker state, manual reset, route health

use crate::error::AppError;
use crate::handlers::AppState;
use crate::operation::Route;
use crate::resilience::{CircuitStatus, RouteHealth};
use axum::{
    Json,
    extract::{Path, State},
};
use std::collections::BTreeMap;

/// `GET /v1/circuits`
pub async fn circuits(State(state): State<AppState>) -> Json<BTreeMap<Route, CircuitStatus>> {
    Json(state.executor().circuit_breaker_status())
}

/// `POST /v1/circuits/{route}/reset`
///
/// Forces the breaker closed and returns the new status of every route.
pub async fn reset_circuit(
    State(state): State<AppState>,
    Path(route): Path<String>,
) -> Result<Json<BTreeMap<Route, CircuitStatus>>, AppError> {
    let route: Route = route.parse().map_err(AppError::Validation)?;
    state.executor().reset_circuit_breaker(route);
    tracing::info!(route = %route, "Circuit breaker reset by operator");
    Ok(Json(state.executor().circuit_breaker_status()))
}

/// `GET /v1/routes/health`
pub async fn route_health(State(state): State<AppState>) -> Json<Vec<RouteHealth>> {
    Json(state.executor().route_health())
}

#[cfg(test)]
mod tests {
    use crate::handlers::{app, tests::test_state};
    use crate::operation::Route;
    use crate::resilience::CircuitState;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use tower::ServiceExt;

    async fn json_body(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_circuits_lists_both_routes_closed() {
        let response = app(test_state())
            .oneshot(Request::get("/v1/circuits").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["direct"]["state"], "closed");
        assert_eq!(body["broker"]["state"], "closed");
    }

    #[tokio::test]
    async fn test_reset_closes_an_open_breaker() {
        let state = test_state();
        let breakers = state.executor().breakers();
        // The test config opens after 3 consecutive failures
        for _ in 0..3 {
            breakers.record_outcome(Route::Broker, false);
        }
        assert_eq!(breakers.status()[&Route::Broker].state, CircuitState::Open);

        let response = app(state.clone())
            .oneshot(
                Request::post("/v1/circuits/broker/reset")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["broker"]["state"], "closed");
        assert_eq!(body["broker"]["consecutive_failures"], 0);
    }

    #[tokio::test]
    async fn test_reset_unknown_route_is_bad_request() {
        let response = app(test_state())
            .oneshot(
                Request::post("/v1/circuits/satellite/reset")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_route_health_lists_direct_then_broker() {
        let response = app(test_state())
            .oneshot(Request::get("/v1/routes/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body[0]["route"], "direct");
        assert_eq!(body[1]["route"], "broker");
        assert_eq!(body[0]["healthy"], true);
    }
}
