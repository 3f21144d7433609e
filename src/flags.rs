//! Feature-flag gates
//!
//! Flags come from an injected `FlagStore` and are resolved once into
//! `FeatureGates`, which are passed into constructors. Every gate has a safe
//! default used when the store has no answer: compliance and PII redaction
//! fail closed (enabled), routing availability fails open (enabled).

use crate::config::FeaturesConfig;

pub const HYBRID_ROUTING: &str = "hybrid_routing";
pub const EMERGENCY_OVERRIDE: &str = "emergency_override";
pub const PII_REDACTION: &str = "pii_redaction";
pub const COMPLIANCE_ENFORCEMENT: &str = "compliance_enforcement";

/// Feature-flag collaborator
pub trait FlagStore: Send + Sync {
    /// Return the flag value, or `default` if the store cannot answer
    fn is_enabled(&self, flag: &str, default: bool) -> bool;
}

/// Flag store backed by the `[features]` config section
#[derive(Debug, Clone, Default)]
pub struct StaticFlagStore {
    features: FeaturesConfig,
}

impl StaticFlagStore {
    pub fn new(features: FeaturesConfig) -> Self {
        Self { features }
    }
}

impl FlagStore for StaticFlagStore {
    fn is_enabled(&self, flag: &str, default: bool) -> bool {
        let value = match flag {
            HYBRID_ROUTING => self.features.hybrid_routing,
            EMERGENCY_OVERRIDE => self.features.emergency_override,
            PII_REDACTION => self.features.pii_redaction,
            COMPLIANCE_ENFORCEMENT => self.features.compliance_enforcement,
            _ => None,
        };
        value.unwrap_or(default)
    }
}

/// Store that is never reachable; every lookup returns the default
#[derive(Debug, Clone, Copy, Default)]
pub struct UnavailableFlagStore;

impl FlagStore for UnavailableFlagStore {
    fn is_enabled(&self, flag: &str, default: bool) -> bool {
        tracing::debug!(flag, default, "Flag store unavailable, using safe default");
        default
    }
}

/// Resolved feature gates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureGates {
    pub hybrid_routing: bool,
    pub emergency_override: bool,
    pub pii_redaction: bool,
    pub compliance_enforcement: bool,
}

impl FeatureGates {
    /// Resolve every gate against the store using its safe default
    pub fn resolve(store: &dyn FlagStore) -> Self {
        let gates = Self {
            hybrid_routing: store.is_enabled(HYBRID_ROUTING, true),
            emergency_override: store.is_enabled(EMERGENCY_OVERRIDE, true),
            pii_redaction: store.is_enabled(PII_REDACTION, true),
            compliance_enforcement: store.is_enabled(COMPLIANCE_ENFORCEMENT, true),
        };
        if !gates.pii_redaction || !gates.compliance_enforcement {
            tracing::warn!(
                pii_redaction = gates.pii_redaction,
                compliance_enforcement = gates.compliance_enforcement,
                "Privacy gate explicitly disabled by feature flag"
            );
        }
        gates
    }
}

impl Default for FeatureGates {
    fn default() -> Self {
        Self::resolve(&UnavailableFlagStore)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unavailable_store_resolves_safe_defaults() {
        let gates = FeatureGates::resolve(&UnavailableFlagStore);
        assert!(gates.hybrid_routing);
        assert!(gates.emergency_override);
        assert!(gates.pii_redaction);
        assert!(gates.compliance_enforcement);
    }

    #[test]
    fn test_static_store_overrides() {
        let store = StaticFlagStore::new(FeaturesConfig {
            hybrid_routing: Some(false),
            emergency_override: None,
            pii_redaction: Some(false),
            compliance_enforcement: None,
        });
        let gates = FeatureGates::resolve(&store);
        assert!(!gates.hybrid_routing);
        assert!(gates.emergency_override);
        assert!(!gates.pii_redaction);
        assert!(gates.compliance_enforcement);
    }

    #[test]
    fn test_unknown_flag_returns_default() {
        let store = StaticFlagStore::default();
        assert!(store.is_enabled("something_else", true));
        assert!(!store.is_enabled("something_else", false));
    }
}
