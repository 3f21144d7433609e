//! HTTP request handlers for supportroute

use crate::audit::AuditTrail;
use crate::backends::BackendSet;
use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::executor::SupportOperationExecutor;
use crate::flags::StaticFlagStore;
use crate::metrics::Metrics;
use crate::middleware::correlation_id_middleware;
use crate::resilience::HttpProbe;
use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

pub mod admin;
pub mod health;
pub mod metrics;
pub mod operations;

/// Application state shared across all handlers
///
/// All fields are Arc'd (or Arc-backed) for cheap cloning across Axum handlers.
#[derive(Clone)]
pub struct AppState {
    config: Arc<Config>,
    executor: Arc<SupportOperationExecutor>,
    metrics: Metrics,
}

impl AppState {
    pub fn new(config: Arc<Config>, executor: Arc<SupportOperationExecutor>, metrics: Metrics) -> Self {
        Self {
            config,
            executor,
            metrics,
        }
    }

    /// Wire the production collaborators from configuration
    ///
    /// Must be called inside a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if metrics registration, the audit sink, a backend
    /// client or the PII pattern catalog cannot be set up.
    pub async fn from_config(config: Arc<Config>) -> AppResult<Self> {
        let metrics = Metrics::new()
            .map_err(|e| AppError::Config(format!("Failed to initialize metrics: {}", e)))?;
        let audit = AuditTrail::from_config(&config.audit, Some(metrics.clone())).await?;
        let backends = BackendSet::from_config(&config)?;
        let probe = Arc::new(HttpProbe::new(&config.routes, config.health.probe_timeout())?);
        let flags = StaticFlagStore::new(config.features.clone());

        let executor = SupportOperationExecutor::from_config(
            &config,
            backends,
            probe,
            &flags,
            audit,
            Some(metrics.clone()),
        )?;

        Ok(Self::new(config, Arc::new(executor), metrics))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn executor(&self) -> &SupportOperationExecutor {
        &self.executor
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }
}

/// Build the HTTP router
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::handler))
        .route("/metrics", get(metrics::handler))
        .route("/v1/operations", post(operations::handler))
        .route("/v1/circuits", get(admin::circuits))
        .route("/v1/circuits/{route}/reset", post(admin::reset_circuit))
        .route("/v1/routes/health", get(admin::route_health))
        .route("/v1/metrics/snapshot", get(metrics::snapshot))
        .route("/v1/metrics/recommendations", get(metrics::recommendations))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(axum::middleware::from_fn(correlation_id_middleware)),
        )
        .with_state(state)
}
