//! Route health monitoring
//!
//! `check_health` answers from a cached verdict while it is fresh and probes
//! otherwise. Probes are single-flight per route: concurrent callers queue on
//! the route's probe gate and re-check the cache once they get it, so one
//! expired cache entry produces exactly one probe.
//!
//! Health state is also fed by execution outcomes:
//! - probe failure or timeout → unhealthy immediately, short negative cache
//! - N consecutive execution failures → unhealthy
//! - any success → healthy, failure count reset

use crate::backends::BackendError;
use crate::config::{HealthConfig, RoutesConfig};
use crate::error::{AppError, AppResult};
use crate::operation::Route;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

/// Weight of the newest sample in the latency moving average
const LATENCY_EWMA_ALPHA: f64 = 0.2;

/// Health status for a single route
///
/// Fields are private so the cache invariant `cached_until >= last_checked_at`
/// can only be established by the monitor.
#[derive(Clone, Debug, Serialize)]
pub struct RouteHealth {
    route: Route,
    healthy: bool,
    consecutive_failures: u32,
    last_checked_at: Option<DateTime<Utc>>,
    cached_until: Option<DateTime<Utc>>,
    average_latency_ms: Option<f64>,
    #[serde(skip)]
    expires_at: Option<Instant>,
}

impl RouteHealth {
    /// Create a new RouteHealth starting in healthy state with no cached verdict
    pub fn new(route: Route) -> Self {
        Self {
            route,
            healthy: true,
            consecutive_failures: 0,
            last_checked_at: None,
            cached_until: None,
            average_latency_ms: None,
            expires_at: None,
        }
    }

    pub fn route(&self) -> Route {
        self.route
    }

    pub fn is_healthy(&self) -> bool {
        self.healthy
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn last_checked_at(&self) -> Option<DateTime<Utc>> {
        self.last_checked_at
    }

    pub fn cached_until(&self) -> Option<DateTime<Utc>> {
        self.cached_until
    }

    pub fn average_latency_ms(&self) -> Option<f64> {
        self.average_latency_ms
    }

    fn is_fresh(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|expires| now < expires)
    }

    fn stamp(&mut self, ttl: Duration) {
        let now = Utc::now();
        self.last_checked_at = Some(now);
        self.cached_until = Some(now + chrono::TimeDelta::from_std(ttl).unwrap_or(chrono::TimeDelta::zero()));
        self.expires_at = Some(Instant::now() + ttl);
    }

    fn observe_latency(&mut self, latency: Duration) {
        let sample = latency.as_secs_f64() * 1000.0;
        self.average_latency_ms = Some(match self.average_latency_ms {
            Some(avg) => avg + LATENCY_EWMA_ALPHA * (sample - avg),
            None => sample,
        });
    }
}

/// Liveness probe for a route
#[async_trait]
pub trait HealthProbe: Send + Sync {
    async fn probe(&self, route: Route) -> Result<(), BackendError>;
}

/// HEAD request against each route's health URL; any 2xx is healthy
pub struct HttpProbe {
    client: reqwest::Client,
    urls: [String; 2],
}

impl HttpProbe {
    pub fn new(routes: &RoutesConfig, timeout: Duration) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Config(format!("Failed to build health probe client: {}", e)))?;
        Ok(Self {
            client,
            urls: [
                routes.health_url(Route::Direct),
                routes.health_url(Route::Broker),
            ],
        })
    }

    pub fn url(&self, route: Route) -> &str {
        &self.urls[route.index()]
    }
}

#[async_trait]
impl HealthProbe for HttpProbe {
    async fn probe(&self, route: Route) -> Result<(), BackendError> {
        let url = self.url(route);
        match self.client.head(url).send().await {
            Ok(response) if response.status().is_success() => {
                tracing::debug!(route = %route, url = %url, status = %response.status(), "Health probe succeeded");
                Ok(())
            }
            Ok(response) => {
                tracing::debug!(route = %route, url = %url, status = %response.status(), "Health probe returned non-success status");
                Err(BackendError::Status {
                    endpoint: url.to_string(),
                    status: response.status().as_u16(),
                    body: String::new(),
                })
            }
            Err(e) => {
                tracing::debug!(route = %route, url = %url, error = %e, "Health probe failed");
                Err(BackendError::Transport {
                    endpoint: url.to_string(),
                    message: e.to_string(),
                })
            }
        }
    }
}

struct RouteSlot {
    state: Mutex<RouteHealth>,
    probe_gate: tokio::sync::Mutex<()>,
}

impl RouteSlot {
    fn new(route: Route) -> Self {
        Self {
            state: Mutex::new(RouteHealth::new(route)),
            probe_gate: tokio::sync::Mutex::new(()),
        }
    }

    fn update<T>(&self, f: impl FnOnce(&mut RouteHealth) -> T) -> T {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut state)
    }

    fn fresh(&self) -> Option<RouteHealth> {
        let now = Instant::now();
        self.update(|health| health.is_fresh(now).then(|| health.clone()))
    }
}

/// Health monitor for both routes
pub struct HealthMonitor {
    probe: Arc<dyn HealthProbe>,
    config: HealthConfig,
    slots: [RouteSlot; 2],
}

impl HealthMonitor {
    /// Create a monitor with both routes starting healthy and uncached
    pub fn new(probe: Arc<dyn HealthProbe>, config: HealthConfig) -> Self {
        tracing::info!(
            cache_ttl_seconds = config.cache_ttl_seconds,
            probe_timeout_ms = config.probe_timeout_ms,
            "HealthMonitor initialized with all routes starting as healthy"
        );
        Self {
            probe,
            config,
            slots: [RouteSlot::new(Route::Direct), RouteSlot::new(Route::Broker)],
        }
    }

    fn slot(&self, route: Route) -> &RouteSlot {
        &self.slots[route.index()]
    }

    /// Cached verdict if fresh, otherwise a single-flight probe
    pub async fn check_health(&self, route: Route) -> RouteHealth {
        let slot = self.slot(route);
        if let Some(health) = slot.fresh() {
            return health;
        }

        let _gate = slot.probe_gate.lock().await;
        // Another caller may have probed while we waited for the gate
        if let Some(health) = slot.fresh() {
            return health;
        }
        self.probe_locked(route).await
    }

    /// Probe now, ignoring the cache (still single-flight)
    pub async fn refresh(&self, route: Route) -> RouteHealth {
        let _gate = self.slot(route).probe_gate.lock().await;
        self.probe_locked(route).await
    }

    async fn probe_locked(&self, route: Route) -> RouteHealth {
        let timeout = self.config.probe_timeout();
        let started = Instant::now();
        let outcome = match tokio::time::timeout(timeout, self.probe.probe(route)).await {
            Ok(result) => result,
            Err(_) => Err(BackendError::Timeout {
                timeout_ms: timeout.as_millis() as u64,
            }),
        };
        let latency = started.elapsed();

        self.slot(route).update(|health| {
            match outcome {
                Ok(()) => {
                    let was_unhealthy = !health.healthy;
                    health.healthy = true;
                    health.consecutive_failures = 0;
                    health.observe_latency(latency);
                    health.stamp(self.config.cache_ttl());
                    if was_unhealthy {
                        tracing::info!(route = %route, "Route recovered to healthy state");
                    }
                }
                Err(e) => {
                    let was_healthy = health.healthy;
                    health.healthy = false;
                    health.consecutive_failures = health.consecutive_failures.saturating_add(1);
                    health.stamp(self.config.failure_cache_ttl());
                    if was_healthy {
                        tracing::warn!(
                            route = %route,
                            error = %e,
                            consecutive_failures = health.consecutive_failures,
                            "Route marked as unhealthy after failed probe"
                        );
                    } else {
                        tracing::debug!(route = %route, error = %e, "Health probe failed again");
                    }
                }
            }
            health.clone()
        })
    }

    /// Feed an execution outcome back into the route's health
    pub fn record_outcome(&self, route: Route, success: bool, latency: Duration) {
        let threshold = self.config.unhealthy_after_failures;
        self.slot(route).update(|health| {
            health.observe_latency(latency);
            if success {
                if !health.healthy {
                    tracing::info!(route = %route, "Route recovered to healthy state after successful execution");
                }
                health.healthy = true;
                health.consecutive_failures = 0;
                return;
            }

            health.consecutive_failures = health.consecutive_failures.saturating_add(1);
            if health.consecutive_failures >= threshold {
                if health.healthy {
                    tracing::warn!(
                        route = %route,
                        consecutive_failures = health.consecutive_failures,
                        "Route marked as unhealthy after consecutive execution failures"
                    );
                }
                health.healthy = false;
            } else {
                tracing::debug!(
                    route = %route,
                    consecutive_failures = health.consecutive_failures,
                    "Route failure recorded (still healthy)"
                );
            }
        });
    }

    /// Current state of every route without probing
    pub fn snapshot(&self) -> Vec<RouteHealth> {
        Route::ALL
            .iter()
            .map(|&route| self.slot(route).update(|health| health.clone()))
            .collect()
    }

    /// Start the background refresh task
    ///
    /// Re-probes every route each `background_interval_seconds` so the cache
    /// stays warm. A monitoring task reports if the refresh loop dies.
    pub fn start_background_checks(self: Arc<Self>) {
        let interval_secs = self.config.background_interval_seconds;
        if interval_secs == 0 {
            tracing::info!("Background health checks disabled");
            return;
        }

        let handle = tokio::spawn(async move {
            tracing::info!(interval_secs, "Starting background health checks");
            let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs));
            loop {
                ticker.tick().await;
                tracing::debug!("Running scheduled health checks");
                for route in Route::ALL {
                    self.refresh(route).await;
                }
            }
        });

        tokio::spawn(async move {
            match handle.await {
                Ok(_) => tracing::error!(
                    "Background health check task terminated unexpectedly. \
                    Route health now only changes through execution outcomes \
                    and on-demand probes."
                ),
                Err(e) => tracing::error!(
                    error = %e,
                    "Background health check task panicked. \
                    Route health now only changes through execution outcomes \
                    and on-demand probes."
                ),
            }
        });
    }
}
