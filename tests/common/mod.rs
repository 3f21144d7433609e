//! Shared fixtures for integration tests
//!
//! Backends and probes here are in-process doubles: they count calls, can be
//! told to fail or sleep, and record the prompts they were sent.

#![allow(dead_code)]

use async_trait::async_trait;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use supportroute::{
    audit::{AuditEvent, AuditTrail, MemoryAuditSink},
    backends::{Backend, BackendError, BackendResponse, BackendSet, Invocation},
    config::Config,
    executor::SupportOperationExecutor,
    flags::{FlagStore, UnavailableFlagStore},
    metrics::Metrics,
    operation::{CorrelationId, Route},
    resilience::HealthProbe,
};

/// Both routes in eu-west, breakers open after 3 consecutive failures
pub const BASE_CONFIG: &str = r#"
[server]
host = "127.0.0.1"
port = 3000

[routes.direct]
base_url = "http://192.0.2.1:1234/v1"
model = "support-8b"
region = "eu-west"

[routes.broker]
base_url = "http://192.0.2.2:8090"
region = "eu-west"
tools = ["ticket_lookup"]

[[routing.rules]]
operation_class = "emergency"
route = "direct"

[[routing.rules]]
operation_class = "critical"
route = "broker"

[[routing.rules]]
operation_class = "standard"
route = "direct"

[[routing.rules]]
operation_class = "background"
route = "broker"

[circuit_breaker]
failure_threshold = 3
recovery_timeout_seconds = 30

[compliance]
residency_region = "eu-west"
residency_categories = ["financial"]
consent_required_categories = ["identifier"]

[observability]
log_level = "error"
"#;

pub fn base_config() -> Config {
    Config::from_str(BASE_CONFIG).expect("base test config is valid")
}

/// Backend double with a call counter, optional failure and optional delay
pub struct SpyBackend {
    route: Route,
    calls: AtomicUsize,
    failing: AtomicBool,
    delay_ms: AtomicU64,
    prompts: Mutex<Vec<String>>,
}

impl SpyBackend {
    pub fn new(route: Route) -> Arc<Self> {
        Arc::new(Self {
            route,
            calls: AtomicUsize::new(0),
            failing: AtomicBool::new(false),
            delay_ms: AtomicU64::new(0),
            prompts: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn set_delay(&self, delay: Duration) {
        self.delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl Backend for SpyBackend {
    fn route(&self) -> Route {
        self.route
    }

    async fn invoke(&self, invocation: &Invocation) -> Result<BackendResponse, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(invocation.prompt.clone());

        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }

        if self.failing.load(Ordering::SeqCst) {
            return Err(BackendError::Status {
                endpoint: format!("{}", self.route),
                status: 503,
                body: "unavailable".to_string(),
            });
        }

        Ok(BackendResponse {
            text: format!("[{}] {}", self.route, invocation.prompt),
            cost_estimate: 0.001,
            latency_ms: delay,
        })
    }
}

/// Probe double answering a fixed verdict per route
pub struct StaticProbe {
    direct_healthy: AtomicBool,
    broker_healthy: AtomicBool,
    calls: AtomicUsize,
}

impl StaticProbe {
    pub fn healthy() -> Arc<Self> {
        Arc::new(Self {
            direct_healthy: AtomicBool::new(true),
            broker_healthy: AtomicBool::new(true),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn set_healthy(&self, route: Route, healthy: bool) {
        match route {
            Route::Direct => self.direct_healthy.store(healthy, Ordering::SeqCst),
            Route::Broker => self.broker_healthy.store(healthy, Ordering::SeqCst),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HealthProbe for StaticProbe {
    async fn probe(&self, route: Route) -> Result<(), BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let healthy = match route {
            Route::Direct => self.direct_healthy.load(Ordering::SeqCst),
            Route::Broker => self.broker_healthy.load(Ordering::SeqCst),
        };
        if healthy {
            Ok(())
        } else {
            Err(BackendError::Transport {
                endpoint: format!("{}", route),
                message: "connection refused".to_string(),
            })
        }
    }
}

/// Executor wired to doubles, plus handles to inspect them
pub struct Harness {
    pub executor: SupportOperationExecutor,
    pub direct: Arc<SpyBackend>,
    pub broker: Arc<SpyBackend>,
    pub probe: Arc<StaticProbe>,
    pub audit: Arc<MemoryAuditSink>,
    pub metrics: Metrics,
}

impl Harness {
    /// Must be called inside a tokio runtime
    pub fn new(config: &Config) -> Self {
        Self::with_flags(config, &UnavailableFlagStore)
    }

    pub fn with_flags(config: &Config, flags: &dyn FlagStore) -> Self {
        let direct = SpyBackend::new(Route::Direct);
        let broker = SpyBackend::new(Route::Broker);
        let probe = StaticProbe::healthy();
        let audit = Arc::new(MemoryAuditSink::new());
        let metrics = Metrics::new().expect("metrics registry");

        let executor = SupportOperationExecutor::from_config(
            config,
            BackendSet::new(direct.clone(), broker.clone()),
            probe.clone(),
            flags,
            AuditTrail::new(audit.clone(), Some(metrics.clone())),
            Some(metrics.clone()),
        )
        .expect("executor builds from test config");

        Self {
            executor,
            direct,
            broker,
            probe,
            audit,
            metrics,
        }
    }

    /// Audit events for one operation, once the writer has caught up
    pub async fn audit_events(&self, id: CorrelationId) -> Vec<AuditEvent> {
        self.executor.audit().flush().await;
        self.audit.events_for(id)
    }

    pub fn spy(&self, route: Route) -> &SpyBackend {
        match route {
            Route::Direct => &self.direct,
            Route::Broker => &self.broker,
        }
    }
}
