//! Route selection
//!
//! `IntelligentRouter` turns an operation request into a `RoutingDecision`
//! using the rule table, circuit breakers and route health. Each attempt
//! produces exactly one decision; a fallback produces a second decision for
//! the same operation id.

pub mod intelligent;
pub mod rule_based;

pub use intelligent::IntelligentRouter;
pub use rule_based::RoutingTable;

use crate::operation::{CorrelationId, Route};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

/// Why a route was (or was not) chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DecisionReason {
    /// Rule-preferred route is usable
    HealthyPrimary,
    /// Emergency override sent the call to Direct regardless of state
    ForcedEmergency,
    /// Preferred route unusable, alternate chosen
    FallbackAfterFailure,
    /// Neither route is usable
    BothUnavailable,
    /// No rule matches the operation class and priority
    NoRule,
}

impl DecisionReason {
    pub const ALL: [DecisionReason; 5] = [
        DecisionReason::HealthyPrimary,
        DecisionReason::ForcedEmergency,
        DecisionReason::FallbackAfterFailure,
        DecisionReason::BothUnavailable,
        DecisionReason::NoRule,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::HealthyPrimary => "healthy-primary",
            Self::ForcedEmergency => "forced-emergency",
            Self::FallbackAfterFailure => "fallback-after-failure",
            Self::BothUnavailable => "both-unavailable",
            Self::NoRule => "no-rule",
        }
    }
}

impl fmt::Display for DecisionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One routing decision for one attempt
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoutingDecision {
    pub operation_id: CorrelationId,
    /// `None` when no route may be attempted
    pub chosen_route: Option<Route>,
    pub reason: DecisionReason,
    pub timestamp: DateTime<Utc>,
}

impl RoutingDecision {
    pub fn new(
        operation_id: CorrelationId,
        chosen_route: Option<Route>,
        reason: DecisionReason,
    ) -> Self {
        Self {
            operation_id,
            chosen_route,
            reason,
            timestamp: Utc::now(),
        }
    }

    pub fn is_fallback(&self) -> bool {
        self.reason == DecisionReason::FallbackAfterFailure
    }
}
