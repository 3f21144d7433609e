//! Support operation executor
//!
//! Per-call state machine:
//!
//! ```text
//! Routed → Redacted → ComplianceChecked → Invoked → {Succeeded | Failed | TimedOut}
//! ```
//!
//! The class budget bounds the whole call. A deadline hit while a backend
//! call is in flight cancels the call and still counts as a route failure.
//! The first invocation may use the whole budget. Non-Emergency operations
//! get at most one fallback attempt, on the alternate route, after a
//! retryable failure that leaves budget to spend.
//!
//! Audit events are queued, never awaited, so a slow sink cannot delay an
//! operation.

use crate::audit::{AuditEvent, AuditEventType, AuditTrail, payload_digest};
use crate::backends::{BackendResponse, BackendSet, Invocation};
use crate::config::{Config, SlaConfig};
use crate::error::{AppError, AppResult, OperationFailure};
use crate::flags::{FeatureGates, FlagStore};
use crate::metrics::{Metrics, MetricsTracker, OperationSample};
use crate::operation::{CorrelationId, OperationClass, OperationRequest, Outcome, Route};
use crate::privacy::pii::category_counts;
use crate::privacy::{
    ComplianceValidator, ComplianceVerdict, PiiCategory, PiiDetector, PiiFinding, RedactionMap,
    restore,
};
use crate::resilience::{
    Admission, CircuitBreakers, CircuitStatus, HealthMonitor, HealthProbe, RouteHealth,
};
use crate::router::{DecisionReason, IntelligentRouter, RoutingDecision, RoutingTable};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Lifecycle stage of one operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Stage {
    #[default]
    Routed,
    Redacted,
    ComplianceChecked,
    Invoked,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Routed => "routing",
            Self::Redacted => "redaction",
            Self::ComplianceChecked => "compliance",
            Self::Invoked => "invocation",
        }
    }
}

/// Successful operation result
#[derive(Debug, Clone, Serialize)]
pub struct SupportOperationResponse {
    pub correlation_id: CorrelationId,
    /// Backend answer with redacted values restored
    pub text: String,
    pub route: Route,
    /// One decision per attempt
    pub decisions: Vec<RoutingDecision>,
    pub compliance: ComplianceVerdict,
    /// Findings in the payload text, including ones below the redaction threshold
    pub pii_findings: Vec<PiiFinding>,
    pub cost_estimate: f64,
    pub latency_ms: u64,
    pub fallback_used: bool,
}

/// Redacted payload ready for invocation
struct ScannedPayload {
    text: String,
    map: RedactionMap,
    context: serde_json::Map<String, serde_json::Value>,
    findings: Vec<PiiFinding>,
    /// Categories of findings at or above the confidence threshold, text and context
    classified: BTreeSet<PiiCategory>,
    /// Per-category counts of every finding, text and context
    counts: BTreeMap<PiiCategory, usize>,
    digest: String,
}

/// Backend call in progress
#[derive(Clone, Copy)]
struct InFlight {
    route: Route,
    since: Instant,
    /// Emergency override attempt that skipped breaker admission
    forced: bool,
}

/// What the executor knows about a call in progress
///
/// Survives cancellation of the call future so a deadline hit can still
/// attribute the failure to the in-flight route.
#[derive(Default)]
struct Trace {
    stage: Stage,
    in_flight: Option<InFlight>,
    last_route: Option<Route>,
    decisions: Vec<RoutingDecision>,
    fallback: bool,
    digest: Option<String>,
    cost: f64,
}

/// Executes support operations end to end
pub struct SupportOperationExecutor {
    router: IntelligentRouter,
    breakers: Arc<CircuitBreakers>,
    health: Arc<HealthMonitor>,
    backends: BackendSet,
    detector: PiiDetector,
    compliance: ComplianceValidator,
    audit: AuditTrail,
    tracker: MetricsTracker,
    metrics: Option<Metrics>,
    sla: SlaConfig,
    gates: FeatureGates,
}

impl SupportOperationExecutor {
    /// Wire every component from configuration
    ///
    /// Backends, the health probe, the flag store and the audit trail are
    /// injected so tests can supply deterministic collaborators. Must be
    /// called inside a tokio runtime (spawns the metrics tracker).
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the PII pattern catalog cannot be built.
    pub fn from_config(
        config: &Config,
        backends: BackendSet,
        probe: Arc<dyn HealthProbe>,
        flags: &dyn FlagStore,
        audit: AuditTrail,
        metrics: Option<Metrics>,
    ) -> AppResult<Self> {
        let gates = FeatureGates::resolve(flags);
        let breakers = Arc::new(CircuitBreakers::new(&config.circuit_breaker));
        let health = Arc::new(HealthMonitor::new(probe, config.health.clone()));
        let router = IntelligentRouter::new(
            RoutingTable::from_rules(&config.routing.rules),
            breakers.clone(),
            health.clone(),
            gates,
        );
        let detector = PiiDetector::new(config.privacy.confidence_threshold)?;
        let compliance = ComplianceValidator::new(
            config.compliance.clone(),
            &config.routes,
            gates.compliance_enforcement,
        );
        let tracker = MetricsTracker::spawn(config.metrics.window_size, config.sla.clone());

        Ok(Self {
            router,
            breakers,
            health,
            backends,
            detector,
            compliance,
            audit,
            tracker,
            metrics,
            sla: config.sla.clone(),
            gates,
        })
    }

    pub fn gates(&self) -> FeatureGates {
        self.gates
    }

    pub fn breakers(&self) -> &Arc<CircuitBreakers> {
        &self.breakers
    }

    pub fn health(&self) -> &Arc<HealthMonitor> {
        &self.health
    }

    pub fn tracker(&self) -> &MetricsTracker {
        &self.tracker
    }

    pub fn audit(&self) -> &AuditTrail {
        &self.audit
    }

    /// Operator override: close a route's breaker
    pub fn reset_circuit_breaker(&self, route: Route) {
        self.breakers.reset(route);
        if let Some(metrics) = &self.metrics {
            metrics.circuit_transition(route, crate::resilience::CircuitState::Closed);
        }
    }

    pub fn circuit_breaker_status(&self) -> BTreeMap<Route, CircuitStatus> {
        self.breakers.status()
    }

    pub fn route_health(&self) -> Vec<RouteHealth> {
        self.health.snapshot()
    }

    /// Run one operation under its class budget
    pub async fn execute(
        &self,
        request: OperationRequest,
    ) -> Result<SupportOperationResponse, OperationFailure> {
        let id = request.id();
        let class = request.operation_class();
        let budget = self.sla.budget_for(class);
        let started = Instant::now();
        let deadline = started + budget;
        let mut trace = Trace::default();

        tracing::debug!(
            correlation_id = %id,
            class = %class,
            budget_ms = budget.as_millis() as u64,
            "Executing operation"
        );

        let timed = tokio::time::timeout_at(deadline, self.run(&request, deadline, &mut trace)).await;
        let result = match timed {
            Ok(result) => result,
            Err(_) => {
                // Cancelled mid-call: the route still failed
                if let Some(call) = trace.in_flight.take() {
                    let elapsed = call.since.elapsed();
                    self.record_route_outcome(call.route, false, elapsed, call.forced);
                    trace.last_route = Some(call.route);
                }
                Err(AppError::Timeout {
                    class,
                    budget_ms: budget.as_millis() as u64,
                    stage: trace.stage.as_str(),
                })
            }
        };

        let elapsed = started.elapsed();
        let outcome = match &result {
            Ok(_) => Outcome::Succeeded,
            Err(e) => outcome_for(e),
        };
        self.finish(&request, &trace, outcome, result.as_ref().err(), elapsed);

        result
            .map(|mut response| {
                response.latency_ms = elapsed.as_millis() as u64;
                response
            })
            .map_err(|error| OperationFailure::new(id, error))
    }

    async fn run(
        &self,
        request: &OperationRequest,
        deadline: Instant,
        trace: &mut Trace,
    ) -> AppResult<SupportOperationResponse> {
        let class = request.operation_class();
        request.payload().validate()?;

        trace.stage = Stage::Routed;
        let decision = self.router.route(request).await;
        trace.fallback = decision.is_fallback();
        self.note_decision(&decision, trace);
        let route = self.require_route(&decision, request)?;

        trace.stage = Stage::Redacted;
        let scanned = self.scan(request)?;
        trace.digest = Some(scanned.digest.clone());
        self.audit.record(
            AuditEvent::new(request.id(), AuditEventType::Redaction)
                .with_digest(Some(scanned.digest.clone()))
                .with_categories(scanned.counts.clone()),
        );

        let can_fallback = class != OperationClass::Emergency && self.gates.hybrid_routing;
        let primary = self
            .attempt(request, &decision, route, &scanned, deadline, trace)
            .await;

        let (response, verdict, final_route) = match primary {
            Ok(success) => success,
            Err(error) if can_fallback && error.is_retryable() && Instant::now() < deadline => {
                tracing::info!(
                    correlation_id = %request.id(),
                    route = %route,
                    error = %error,
                    "Primary attempt failed, asking router for fallback"
                );
                let second = self.router.fallback(request, route).await;
                trace.fallback = true;
                self.note_decision(&second, trace);
                match second.chosen_route {
                    Some(alternate) => {
                        self.attempt(request, &second, alternate, &scanned, deadline, trace)
                            .await?
                    }
                    None => return Err(error),
                }
            }
            Err(error) => return Err(error),
        };

        Ok(SupportOperationResponse {
            correlation_id: request.id(),
            text: restore(&response.text, &scanned.map),
            route: final_route,
            decisions: trace.decisions.clone(),
            compliance: verdict,
            pii_findings: scanned.findings,
            cost_estimate: response.cost_estimate,
            latency_ms: response.latency_ms,
            fallback_used: trace.fallback,
        })
    }

    /// ComplianceChecked → Invoked for one route
    async fn attempt(
        &self,
        request: &OperationRequest,
        decision: &RoutingDecision,
        route: Route,
        scanned: &ScannedPayload,
        attempt_deadline: Instant,
        trace: &mut Trace,
    ) -> AppResult<(BackendResponse, ComplianceVerdict, Route)> {
        let id = request.id();

        trace.stage = Stage::ComplianceChecked;
        let verdict = self
            .compliance
            .validate(request, decision, &scanned.classified);
        self.audit.record(
            AuditEvent::new(id, AuditEventType::ComplianceVerdict)
                .with_digest(Some(scanned.digest.clone()))
                .with_verdict(verdict.clone()),
        );
        if !verdict.allowed {
            tracing::warn!(
                correlation_id = %id,
                route = %route,
                reason = %verdict.reason,
                "Compliance denied operation, backend not called"
            );
            if let Some(metrics) = &self.metrics {
                metrics.compliance_denial();
            }
            return Err(AppError::ComplianceDenied {
                reason: verdict.reason,
            });
        }

        // Forced attempts never touch admission, so they cannot claim the trial
        let forced = decision.reason == DecisionReason::ForcedEmergency;
        if !forced && self.breakers.try_acquire(route) == Admission::Rejected {
            return Err(AppError::RouteUnavailable { route });
        }

        trace.stage = Stage::Invoked;
        let invoked_at = Instant::now();
        let invocation = Invocation {
            prompt: scanned.text.clone(),
            context: scanned.context.clone(),
            toolset: None,
            deadline: attempt_deadline.saturating_duration_since(invoked_at),
        };
        trace.in_flight = Some(InFlight {
            route,
            since: invoked_at,
            forced,
        });
        let result = tokio::time::timeout_at(
            attempt_deadline,
            self.backends.get(route).invoke(&invocation),
        )
        .await;
        trace.in_flight = None;
        trace.last_route = Some(route);
        let elapsed = invoked_at.elapsed();

        match result {
            Ok(Ok(response)) => {
                self.record_route_outcome(route, true, elapsed, forced);
                trace.cost += response.cost_estimate;
                Ok((response, verdict, route))
            }
            Ok(Err(source)) => {
                self.record_route_outcome(route, false, elapsed, forced);
                Err(AppError::Backend { route, source })
            }
            Err(_) => {
                self.record_route_outcome(route, false, elapsed, forced);
                let class = request.operation_class();
                Err(AppError::Timeout {
                    class,
                    budget_ms: self.sla.budget_for(class).as_millis() as u64,
                    stage: Stage::Invoked.as_str(),
                })
            }
        }
    }

    fn require_route(
        &self,
        decision: &RoutingDecision,
        request: &OperationRequest,
    ) -> AppResult<Route> {
        match (decision.chosen_route, decision.reason) {
            (Some(route), _) => Ok(route),
            (None, DecisionReason::NoRule) => Err(AppError::NoRoutingRule {
                class: request.operation_class(),
                priority: request.priority(),
            }),
            (None, _) if !self.gates.hybrid_routing => Err(AppError::RouteUnavailable {
                route: Route::Direct,
            }),
            (None, _) => Err(AppError::BothRoutesUnavailable),
        }
    }

    /// PII detection and redaction within the class redaction budget
    ///
    /// Detection runs inline: text and context sizes are checked by
    /// `Payload::validate` before routing, so the scan is short. A scan that still overruns its budget fails the
    /// operation instead of forwarding a late payload.
    fn scan(&self, request: &OperationRequest) -> AppResult<ScannedPayload> {
        let class = request.operation_class();
        let budget = class.redaction_budget();
        let started = Instant::now();
        let payload = request.payload();
        let detector = &self.detector;

        let findings = detector.detect(payload.text());
        let original_context = serde_json::Value::Object(payload.context().clone());
        let (redacted_context, context_findings) = detector.redact_value(&original_context);
        let (redaction, context_value) = if self.gates.pii_redaction {
            (detector.redact(payload.text(), &findings), redacted_context)
        } else {
            let untouched = crate::privacy::Redaction {
                text: payload.text().to_string(),
                map: RedactionMap::default(),
            };
            (untouched, original_context)
        };

        let all: Vec<PiiFinding> = findings
            .iter()
            .chain(context_findings.iter())
            .cloned()
            .collect();
        let classified = all
            .iter()
            .filter(|f| detector.is_redactable(f))
            .map(|f| f.category)
            .collect();
        let counts = category_counts(&all);
        let context = match context_value {
            serde_json::Value::Object(map) => map,
            _ => serde_json::Map::new(),
        };
        let digest = payload_digest(&redaction.text);

        let elapsed = started.elapsed();
        if elapsed > budget {
            tracing::warn!(
                correlation_id = %request.id(),
                budget_ms = budget.as_millis() as u64,
                elapsed_ms = elapsed.as_millis() as u64,
                "PII detection exceeded its budget"
            );
            return Err(AppError::Timeout {
                class,
                budget_ms: budget.as_millis() as u64,
                stage: Stage::Redacted.as_str(),
            });
        }

        let scanned = ScannedPayload {
            text: redaction.text,
            map: redaction.map,
            context,
            findings,
            classified,
            counts,
            digest,
        };

        if let Some(metrics) = &self.metrics {
            for (category, count) in &scanned.counts {
                metrics.pii_findings(*category, *count as u64);
            }
        }
        tracing::debug!(
            correlation_id = %request.id(),
            findings = scanned.findings.len(),
            redacted = scanned.map.len(),
            "Payload scanned"
        );
        Ok(scanned)
    }

    fn note_decision(&self, decision: &RoutingDecision, trace: &mut Trace) {
        trace.decisions.push(decision.clone());
        if let Some(metrics) = &self.metrics
            && let Err(e) = metrics.record_decision(decision.reason)
        {
            tracing::warn!(error = %e, "Failed to record routing decision metric");
            metrics.metrics_recording_failure("record_decision");
        }
        self.audit
            .record(AuditEvent::decision(decision).with_digest(trace.digest.clone()));
    }

    /// Feed an execution outcome to the breaker, the health monitor and metrics
    fn record_route_outcome(
        &self,
        route: Route,
        success: bool,
        elapsed: Duration,
        forced: bool,
    ) {
        let transition = if forced {
            self.breakers.record_forced_outcome(route, success)
        } else {
            self.breakers.record_outcome(route, success)
        };
        self.health.record_outcome(route, success, elapsed);
        if let Some(metrics) = &self.metrics {
            if let Some(state) = transition {
                metrics.circuit_transition(route, state);
            }
            if let Err(e) = metrics.record_latency(route, elapsed.as_secs_f64() * 1000.0) {
                tracing::warn!(error = %e, route = %route, "Failed to record latency metric");
                metrics.metrics_recording_failure("record_latency");
            }
        }
    }

    fn finish(
        &self,
        request: &OperationRequest,
        trace: &Trace,
        outcome: Outcome,
        error: Option<&AppError>,
        elapsed: Duration,
    ) {
        let id = request.id();
        let class = request.operation_class();
        let route = trace
            .last_route
            .or_else(|| trace.decisions.last().and_then(|d| d.chosen_route));

        match error {
            None => tracing::info!(
                correlation_id = %id,
                class = %class,
                route = ?route,
                fallback = trace.fallback,
                latency_ms = elapsed.as_millis() as u64,
                "Operation succeeded"
            ),
            Some(e) => tracing::warn!(
                correlation_id = %id,
                class = %class,
                route = ?route,
                stage = trace.stage.as_str(),
                error = %e,
                kind = e.kind(),
                "Operation failed"
            ),
        }

        if let Some(metrics) = &self.metrics
            && let Err(e) = metrics.record_operation(route, class, outcome)
        {
            tracing::warn!(error = %e, "Failed to record operation metric");
            metrics.metrics_recording_failure("record_operation");
        }

        self.tracker.record(OperationSample {
            class,
            route,
            outcome,
            latency_ms: elapsed.as_millis() as u64,
            fallback: trace.fallback,
            cost: trace.cost,
        });

        self.audit.record(
            AuditEvent::new(id, AuditEventType::Outcome)
                .with_digest(trace.digest.clone())
                .with_outcome(outcome, error.map(AppError::kind)),
        );
    }
}

fn outcome_for(error: &AppError) -> Outcome {
    match error {
        AppError::Timeout { .. } => Outcome::TimedOut,
        AppError::ComplianceDenied { .. } => Outcome::Denied,
        AppError::NoRoutingRule { .. }
        | AppError::BothRoutesUnavailable
        | AppError::RouteUnavailable { .. } => Outcome::Unroutable,
        _ => Outcome::Failed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_mapping() {
        assert_eq!(
            outcome_for(&AppError::Timeout {
                class: OperationClass::Critical,
                budget_ms: 1,
                stage: "invocation"
            }),
            Outcome::TimedOut
        );
        assert_eq!(
            outcome_for(&AppError::ComplianceDenied { reason: "x".into() }),
            Outcome::Denied
        );
        assert_eq!(outcome_for(&AppError::BothRoutesUnavailable), Outcome::Unroutable);
        assert_eq!(outcome_for(&AppError::Internal("x".into())), Outcome::Failed);
    }

    #[test]
    fn test_stage_labels() {
        assert_eq!(Stage::Redacted.as_str(), "redaction");
        assert_eq!(Stage::Invoked.as_str(), "invocation");
        assert_eq!(Stage::default(), Stage::Routed);
    }
}
