//! Operational metrics
//!
//! Two layers:
//! - `Metrics`: Prometheus counters and histograms exposed at `/metrics`
//! - `tracker::MetricsTracker`: rolling-window aggregates and tuning
//!   recommendations, fed by a single-writer actor
//!
//! Every label is rendered from an enum so cardinality is fixed at compile time.

pub mod tracker;

pub use tracker::{MetricsTracker, OperationSample, RoutingMetricsSnapshot};

use crate::operation::{OperationClass, Outcome, Route};
use crate::privacy::PiiCategory;
use crate::resilience::CircuitState;
use crate::router::DecisionReason;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::sync::Arc;

/// Label value for operations that never reached a route
const NO_ROUTE: &str = "none";

/// Prometheus metrics for the router
#[derive(Clone)]
pub struct Metrics {
    pub registry: Arc<Registry>,
    operations_total: IntCounterVec,
    routing_decisions: IntCounterVec,
    operation_latency: HistogramVec,
    circuit_transitions: IntCounterVec,
    pii_findings: IntCounterVec,
    compliance_denials: IntCounter,
    audit_failures: IntCounter,
    metrics_recording_failures: IntCounterVec,
}

impl Metrics {
    /// Create a new Metrics instance with its own registry
    ///
    /// # Errors
    ///
    /// Returns an error if metric registration fails (e.g., duplicate names).
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        // Cardinality: 3 route labels × 4 classes × 5 outcomes = 60 series
        let operations_total = IntCounterVec::new(
            Opts::new(
                "supportroute_operations_total",
                "Completed operations by route, operation class and outcome",
            ),
            &["route", "class", "outcome"],
        )?;

        let routing_decisions = IntCounterVec::new(
            Opts::new(
                "supportroute_routing_decisions_total",
                "Routing decisions by reason (fallbacks produce a second decision)",
            ),
            &["reason"],
        )?;

        let operation_latency = HistogramVec::new(
            HistogramOpts::new(
                "supportroute_operation_latency_ms",
                "Backend invocation latency in milliseconds by route",
            )
            .buckets(vec![
                10.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0, 10000.0, 30000.0, 60000.0,
            ]),
            &["route"],
        )?;

        let circuit_transitions = IntCounterVec::new(
            Opts::new(
                "supportroute_circuit_transitions_total",
                "Circuit breaker state transitions by route and new state",
            ),
            &["route", "state"],
        )?;

        let pii_findings = IntCounterVec::new(
            Opts::new(
                "supportroute_pii_findings_total",
                "PII findings by category, including findings below the redaction threshold",
            ),
            &["category"],
        )?;

        let compliance_denials = IntCounter::with_opts(Opts::new(
            "supportroute_compliance_denials_total",
            "Operations rejected by the compliance validator",
        ))?;

        // Alert on any increment: audit records are being lost
        let audit_failures = IntCounter::with_opts(Opts::new(
            "supportroute_audit_failures_total",
            "Audit events the sink failed to record",
        ))?;

        let metrics_recording_failures = IntCounterVec::new(
            Opts::new(
                "supportroute_metrics_recording_failures_total",
                "Metrics recording operation failures by operation. \
                Indicates Prometheus internal errors.",
            ),
            &["operation"],
        )?;

        registry.register(Box::new(operations_total.clone()))?;
        registry.register(Box::new(routing_decisions.clone()))?;
        registry.register(Box::new(operation_latency.clone()))?;
        registry.register(Box::new(circuit_transitions.clone()))?;
        registry.register(Box::new(pii_findings.clone()))?;
        registry.register(Box::new(compliance_denials.clone()))?;
        registry.register(Box::new(audit_failures.clone()))?;
        registry.register(Box::new(metrics_recording_failures.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            operations_total,
            routing_decisions,
            operation_latency,
            circuit_transitions,
            pii_findings,
            compliance_denials,
            audit_failures,
            metrics_recording_failures,
        })
    }

    /// Record a completed operation
    ///
    /// # Errors
    ///
    /// Returns an error if the metric is not registered.
    pub fn record_operation(
        &self,
        route: Option<Route>,
        class: OperationClass,
        outcome: Outcome,
    ) -> Result<(), prometheus::Error> {
        let route_label = route.map(Route::as_str).unwrap_or(NO_ROUTE);
        self.operations_total
            .get_metric_with_label_values(&[route_label, class.as_str(), outcome.as_str()])?
            .inc();
        Ok(())
    }

    pub fn record_decision(&self, reason: DecisionReason) -> Result<(), prometheus::Error> {
        self.routing_decisions
            .get_metric_with_label_values(&[reason.as_str()])?
            .inc();
        Ok(())
    }

    /// Record backend latency
    ///
    /// # Errors
    ///
    /// Returns an error if `latency_ms` is NaN, infinite or negative: such
    /// values corrupt every histogram percentile.
    pub fn record_latency(&self, route: Route, latency_ms: f64) -> Result<(), prometheus::Error> {
        if !latency_ms.is_finite() || latency_ms < 0.0 {
            return Err(prometheus::Error::Msg(format!(
                "Latency must be finite and non-negative, got: {}",
                latency_ms
            )));
        }
        self.operation_latency
            .get_metric_with_label_values(&[route.as_str()])?
            .observe(latency_ms);
        Ok(())
    }

    pub fn circuit_transition(&self, route: Route, state: CircuitState) {
        self.circuit_transitions
            .with_label_values(&[route.as_str(), state.as_str()])
            .inc();
    }

    pub fn pii_findings(&self, category: PiiCategory, count: u64) {
        self.pii_findings
            .with_label_values(&[category.as_str()])
            .inc_by(count);
    }

    pub fn compliance_denial(&self) {
        self.compliance_denials.inc();
    }

    pub fn audit_failure(&self) {
        self.audit_failures.inc();
    }

    pub fn audit_failures_count(&self) -> u64 {
        self.audit_failures.get()
    }

    /// Record a failure of one of the `record_*` operations
    pub fn metrics_recording_failure(&self, operation: &str) {
        self.metrics_recording_failures
            .with_label_values(&[operation])
            .inc();
    }

    /// Sum of metrics recording failures across all operations
    pub fn metrics_recording_failures_count(&self) -> u64 {
        self.registry
            .gather()
            .iter()
            .find(|mf| mf.name() == "supportroute_metrics_recording_failures_total")
            .map(|mf| {
                mf.get_metric()
                    .iter()
                    .map(|m| m.counter.value.unwrap_or(0.0) as u64)
                    .sum()
            })
            .unwrap_or(0)
    }

    /// Gather all metrics in Prometheus text format
    ///
    /// # Errors
    ///
    /// Returns an error if encoding fails or produces invalid UTF-8.
    pub fn gather(&self) -> Result<String, prometheus::Error> {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&metric_families, &mut buffer)
            .map_err(|e| {
                tracing::error!(
                    error = %e,
                    metric_family_count = metric_families.len(),
                    "Prometheus text encoder failed"
                );
                e
            })?;

        String::from_utf8(buffer).map_err(|e| {
            prometheus::Error::Msg(format!(
                "Failed to convert metrics to UTF-8 at byte {}: {}",
                e.utf8_error().valid_up_to(),
                e
            ))
        })
    }
}
