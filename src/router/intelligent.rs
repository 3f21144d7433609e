//! Decision engine combining rules, circuit state and route health

use super::{DecisionReason, RoutingDecision, RoutingTable};
use crate::flags::FeatureGates;
use crate::operation::{OperationClass, OperationRequest, Route};
use crate::resilience::{CircuitBreakers, HealthMonitor};
use std::sync::Arc;

/// Chooses a route per operation, stateless apart from breaker state
///
/// Algorithm:
/// 1. Emergency (override enabled) → Direct, whatever its state
/// 2. Rule lookup; no match → `NoRule`
/// 3. Preferred route usable → `HealthyPrimary`
/// 4. Alternate usable → `FallbackAfterFailure`
/// 5. Otherwise `BothUnavailable`
///
/// With hybrid routing disabled only Direct is ever chosen.
pub struct IntelligentRouter {
    table: RoutingTable,
    breakers: Arc<CircuitBreakers>,
    health: Arc<HealthMonitor>,
    gates: FeatureGates,
}

impl IntelligentRouter {
    pub fn new(
        table: RoutingTable,
        breakers: Arc<CircuitBreakers>,
        health: Arc<HealthMonitor>,
        gates: FeatureGates,
    ) -> Self {
        tracing::info!(
            rules = table.len(),
            hybrid_routing = gates.hybrid_routing,
            emergency_override = gates.emergency_override,
            "IntelligentRouter initialized"
        );
        Self {
            table,
            breakers,
            health,
            gates,
        }
    }

    pub fn gates(&self) -> FeatureGates {
        self.gates
    }

    /// Route is usable when its breaker admits calls and it is healthy
    async fn is_usable(&self, route: Route) -> bool {
        !self.breakers.is_open(route) && self.health.check_health(route).await.is_healthy()
    }

    /// First decision for an operation
    pub async fn route(&self, request: &OperationRequest) -> RoutingDecision {
        let id = request.id();
        let class = request.operation_class();

        if class == OperationClass::Emergency && self.gates.emergency_override {
            tracing::debug!(correlation_id = %id, "Emergency override, forcing direct route");
            return RoutingDecision::new(id, Some(Route::Direct), DecisionReason::ForcedEmergency);
        }

        let Some(ruled) = self.table.lookup(class, request.priority()) else {
            tracing::warn!(
                correlation_id = %id,
                class = %class,
                priority = request.priority().as_str(),
                "No routing rule matches, refusing to guess"
            );
            return RoutingDecision::new(id, None, DecisionReason::NoRule);
        };
        let preferred = if self.gates.hybrid_routing {
            ruled
        } else {
            Route::Direct
        };

        if self.is_usable(preferred).await {
            tracing::debug!(correlation_id = %id, route = %preferred, "Preferred route usable");
            return RoutingDecision::new(id, Some(preferred), DecisionReason::HealthyPrimary);
        }

        self.alternate_or_unavailable(request, preferred).await
    }

    /// Second decision after the attempt on `failed` did not succeed
    pub async fn fallback(&self, request: &OperationRequest, failed: Route) -> RoutingDecision {
        self.alternate_or_unavailable(request, failed).await
    }

    async fn alternate_or_unavailable(
        &self,
        request: &OperationRequest,
        unusable: Route,
    ) -> RoutingDecision {
        let id = request.id();
        let alternate = unusable.alternate();
        if self.gates.hybrid_routing && self.is_usable(alternate).await {
            tracing::info!(
                correlation_id = %id,
                from = %unusable,
                to = %alternate,
                "Falling back to alternate route"
            );
            return RoutingDecision::new(id, Some(alternate), DecisionReason::FallbackAfterFailure);
        }

        tracing::warn!(
            correlation_id = %id,
            class = %request.operation_class(),
            "Both routes unavailable"
        );
        RoutingDecision::new(id, None, DecisionReason::BothUnavailable)
    }
}
