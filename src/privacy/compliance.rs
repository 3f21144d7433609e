//! Data residency and consent validation
//!
//! Verdicts are computed fresh for every attempt. A denial is terminal for
//! that attempt: the executor never calls the backend and never downgrades
//! to a redacted-but-proceed path.

use crate::config::{ComplianceConfig, RoutesConfig};
use crate::operation::{OperationRequest, Route};
use crate::privacy::PiiCategory;
use crate::router::RoutingDecision;
use serde::Serialize;
use std::collections::BTreeSet;

/// Outcome of a compliance check
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComplianceVerdict {
    pub allowed: bool,
    pub reason: String,
    /// Execution region of the checked route
    pub region: Option<String>,
    pub audit_required: bool,
}

impl ComplianceVerdict {
    fn deny(reason: String, region: Option<String>) -> Self {
        Self {
            allowed: false,
            reason,
            region,
            audit_required: true,
        }
    }
}

/// Validates route region and consent against the request's data
#[derive(Debug, Clone)]
pub struct ComplianceValidator {
    config: ComplianceConfig,
    regions: [String; 2],
    enforcement: bool,
}

impl ComplianceValidator {
    /// Create a validator; with `enforcement` off every verdict is allowed
    pub fn new(config: ComplianceConfig, routes: &RoutesConfig, enforcement: bool) -> Self {
        Self {
            config,
            regions: [
                routes.region(Route::Direct).to_string(),
                routes.region(Route::Broker).to_string(),
            ],
            enforcement,
        }
    }

    pub fn region(&self, route: Route) -> &str {
        &self.regions[route.index()]
    }

    /// Validate the decision's route for this request
    ///
    /// `categories` are the PII categories classified in the payload.
    pub fn validate(
        &self,
        request: &OperationRequest,
        decision: &RoutingDecision,
        categories: &BTreeSet<PiiCategory>,
    ) -> ComplianceVerdict {
        let Some(route) = decision.chosen_route else {
            return ComplianceVerdict::deny("no route selected".to_string(), None);
        };
        let region = self.region(route).to_string();

        if !self.enforcement {
            return ComplianceVerdict {
                allowed: true,
                reason: "enforcement-disabled".to_string(),
                region: Some(region),
                audit_required: true,
            };
        }

        if let Some(required) = request.required_region()
            && !required.eq_ignore_ascii_case(&region)
        {
            return ComplianceVerdict::deny(
                format!(
                    "request requires region {} but route {} executes in {}",
                    required, route, region
                ),
                Some(region),
            );
        }

        let residency_bound: Vec<PiiCategory> = categories
            .iter()
            .copied()
            .filter(|c| self.config.residency_categories.contains(c))
            .collect();
        if let Some(residency_region) = &self.config.residency_region
            && !residency_bound.is_empty()
            && !residency_region.eq_ignore_ascii_case(&region)
        {
            return ComplianceVerdict::deny(
                format!(
                    "{} data must stay in {} but route {} executes in {}",
                    join(&residency_bound),
                    residency_region,
                    route,
                    region
                ),
                Some(region),
            );
        }

        let needs_consent: Vec<PiiCategory> = categories
            .iter()
            .copied()
            .filter(|c| self.config.consent_required_categories.contains(c))
            .collect();
        let has_consent = request
            .consent_ref()
            .is_some_and(|consent| !consent.trim().is_empty());
        if !needs_consent.is_empty() && !has_consent {
            return ComplianceVerdict::deny(
                format!(
                    "consent reference required for {} data",
                    join(&needs_consent)
                ),
                Some(region),
            );
        }

        let audit_required = !categories.is_empty()
            || request.required_region().is_some()
            || (self.config.residency_region.is_some() && !residency_bound.is_empty());

        ComplianceVerdict {
            allowed: true,
            reason: "compliant".to_string(),
            region: Some(region),
            audit_required,
        }
    }
}

fn join(categories: &[PiiCategory]) -> String {
    categories
        .iter()
        .map(|c| c.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}
