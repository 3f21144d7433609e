//! Configuration management for supportroute
//!
//! Parses TOML configuration files and provides typed access to settings.

use crate::error::{AppError, AppResult};
use crate::operation::{OperationClass, Priority, Route};
use crate::privacy::PiiCategory;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub server: ServerConfig,
    pub routes: RoutesConfig,
    pub routing: RoutingConfig,
    #[serde(default)]
    pub health: HealthConfig,
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerConfig,
    #[serde(default)]
    pub sla: SlaConfig,
    #[serde(default)]
    pub privacy: PrivacyConfig,
    #[serde(default)]
    pub compliance: ComplianceConfig,
    #[serde(default)]
    pub features: FeaturesConfig,
    #[serde(default)]
    pub audit: AuditConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Backend route configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RoutesConfig {
    pub direct: DirectRouteConfig,
    pub broker: BrokerRouteConfig,
}

impl RoutesConfig {
    /// Execution region of a route
    pub fn region(&self, route: Route) -> &str {
        match route {
            Route::Direct => &self.direct.region,
            Route::Broker => &self.broker.region,
        }
    }

    /// Probe URL of a route
    pub fn health_url(&self, route: Route) -> String {
        match route {
            Route::Direct => self.direct.health_url(),
            Route::Broker => self.broker.health_url(),
        }
    }
}

/// Direct route: an OpenAI-compatible model endpoint
///
/// All fields are private to enforce invariants. Configuration is loaded via
/// deserialization and validated via Config::validate().
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DirectRouteConfig {
    base_url: String,
    model: String,
    region: String,
    #[serde(default = "default_max_tokens")]
    max_tokens: usize,
    #[serde(default = "default_temperature")]
    temperature: f64,
    #[serde(default)]
    cost_per_1k_tokens: f64,
    #[serde(default)]
    health_url: Option<String>,
}

impl DirectRouteConfig {
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn max_tokens(&self) -> usize {
        self.max_tokens
    }

    pub fn temperature(&self) -> f64 {
        self.temperature
    }

    pub fn cost_per_1k_tokens(&self) -> f64 {
        self.cost_per_1k_tokens
    }

    /// Probe URL, defaulting to the model listing of the endpoint
    pub fn health_url(&self) -> String {
        self.health_url
            .clone()
            .unwrap_or_else(|| format!("{}/models", self.base_url.trim_end_matches('/')))
    }
}

/// Broker route: orchestration service adding tool-calling
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BrokerRouteConfig {
    base_url: String,
    region: String,
    #[serde(default)]
    tools: Vec<String>,
    #[serde(default)]
    cost_per_1k_tokens: f64,
    #[serde(default)]
    health_url: Option<String>,
}

impl BrokerRouteConfig {
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn tools(&self) -> &[String] {
        &self.tools
    }

    pub fn cost_per_1k_tokens(&self) -> f64 {
        self.cost_per_1k_tokens
    }

    pub fn health_url(&self) -> String {
        self.health_url
            .clone()
            .unwrap_or_else(|| format!("{}/health", self.base_url.trim_end_matches('/')))
    }
}

fn default_max_tokens() -> usize {
    2048
}

fn default_temperature() -> f64 {
    0.7
}

/// Routing rules keyed by (operation class, priority)
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RoutingConfig {
    #[serde(default)]
    pub rules: Vec<RoutingRule>,
}

/// A single routing rule
///
/// A rule without a priority applies to every priority of its class; an
/// exact (class, priority) rule takes precedence over it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct RoutingRule {
    pub operation_class: OperationClass,
    #[serde(default)]
    pub priority: Option<Priority>,
    /// Primary route for matching operations
    pub route: Route,
}

/// Health monitor settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HealthConfig {
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_seconds: u64,
    #[serde(default = "default_failure_cache_ttl")]
    pub failure_cache_ttl_seconds: u64,
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,
    #[serde(default = "default_unhealthy_after_failures")]
    pub unhealthy_after_failures: u32,
    #[serde(default = "default_background_interval")]
    pub background_interval_seconds: u64,
}

impl HealthConfig {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_seconds)
    }

    pub fn failure_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.failure_cache_ttl_seconds)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            cache_ttl_seconds: default_cache_ttl(),
            failure_cache_ttl_seconds: default_failure_cache_ttl(),
            probe_timeout_ms: default_probe_timeout_ms(),
            unhealthy_after_failures: default_unhealthy_after_failures(),
            background_interval_seconds: default_background_interval(),
        }
    }
}

fn default_cache_ttl() -> u64 {
    30
}

fn default_failure_cache_ttl() -> u64 {
    5
}

fn default_probe_timeout_ms() -> u64 {
    2000
}

fn default_unhealthy_after_failures() -> u32 {
    3
}

fn default_background_interval() -> u64 {
    30
}

/// Circuit breaker settings
///
/// The breaker opens after `failure_threshold` consecutive failures.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CircuitBreakerConfig {
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    #[serde(default = "default_recovery_timeout")]
    pub recovery_timeout_seconds: u64,
}

impl CircuitBreakerConfig {
    pub fn recovery_timeout(&self) -> Duration {
        Duration::from_secs(self.recovery_timeout_seconds)
    }
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            recovery_timeout_seconds: default_recovery_timeout(),
        }
    }
}

fn default_failure_threshold() -> u32 {
    5
}

fn default_recovery_timeout() -> u64 {
    30
}

/// Per-class SLA budget overrides
///
/// Each class may tighten its budget but never exceed the class maximum
/// (Emergency 5s, Critical 10s, Standard 30s, Background 60s). Absent values
/// use the maximum.
///
/// # Custom Deserialization
///
/// Values are validated at parse time through the `new()` constructor, so an
/// out-of-range `SlaConfig` can never exist.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SlaConfig {
    emergency: Option<u64>,
    critical: Option<u64>,
    standard: Option<u64>,
    background: Option<u64>,
}

impl SlaConfig {
    /// Create a new SlaConfig with validated budgets in seconds
    ///
    /// # Errors
    ///
    /// Returns an error if any budget is zero or exceeds its class maximum.
    pub fn new(
        emergency: Option<u64>,
        critical: Option<u64>,
        standard: Option<u64>,
        background: Option<u64>,
    ) -> AppResult<Self> {
        for (class, budget) in [
            (OperationClass::Emergency, emergency),
            (OperationClass::Critical, critical),
            (OperationClass::Standard, standard),
            (OperationClass::Background, background),
        ] {
            if let Some(seconds) = budget {
                let max = class.max_budget().as_secs();
                if seconds == 0 {
                    return Err(AppError::Config(format!(
                        "sla.{} must be greater than 0, got {}",
                        class, seconds
                    )));
                }
                if seconds > max {
                    return Err(AppError::Config(format!(
                        "sla.{} cannot exceed {} seconds, got {}",
                        class, max, seconds
                    )));
                }
            }
        }
        Ok(Self {
            emergency,
            critical,
            standard,
            background,
        })
    }

    /// Wall-clock budget for an operation class
    pub fn budget_for(&self, class: OperationClass) -> Duration {
        let configured = match class {
            OperationClass::Emergency => self.emergency,
            OperationClass::Critical => self.critical,
            OperationClass::Standard => self.standard,
            OperationClass::Background => self.background,
        };
        configured
            .map(Duration::from_secs)
            .unwrap_or_else(|| class.max_budget())
    }
}

impl<'de> Deserialize<'de> for SlaConfig {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        use serde::de::{self, MapAccess, Visitor};
        use std::fmt;

        #[derive(Deserialize)]
        #[serde(field_identifier, rename_all = "lowercase")]
        enum Field {
            Emergency,
            Critical,
            Standard,
            Background,
        }

        struct SlaConfigVisitor;

        impl<'de> Visitor<'de> for SlaConfigVisitor {
            type Value = SlaConfig;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str(
                    "a struct with optional budget fields (emergency, critical, standard, background)",
                )
            }

            fn visit_map<V>(self, mut map: V) -> Result<SlaConfig, V::Error>
            where
                V: MapAccess<'de>,
            {
                let mut emergency = None;
                let mut critical = None;
                let mut standard = None;
                let mut background = None;

                while let Some(key) = map.next_key()? {
                    let (slot, name) = match key {
                        Field::Emergency => (&mut emergency, "emergency"),
                        Field::Critical => (&mut critical, "critical"),
                        Field::Standard => (&mut standard, "standard"),
                        Field::Background => (&mut background, "background"),
                    };
                    if slot.is_some() {
                        return Err(de::Error::duplicate_field(name));
                    }
                    *slot = Some(map.next_value()?);
                }

                SlaConfig::new(emergency, critical, standard, background)
                    .map_err(|e| de::Error::custom(format!("Invalid SLA configuration: {}", e)))
            }
        }

        deserializer.deserialize_struct(
            "SlaConfig",
            &["emergency", "critical", "standard", "background"],
            SlaConfigVisitor,
        )
    }
}

/// PII detection settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PrivacyConfig {
    /// Findings below this confidence are reported but not redacted
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,
}

impl Default for PrivacyConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: default_confidence_threshold(),
        }
    }
}

fn default_confidence_threshold() -> f64 {
    0.5
}

/// Data residency and consent rules
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ComplianceConfig {
    /// Region that data of a residency category must stay in
    #[serde(default)]
    pub residency_region: Option<String>,
    #[serde(default)]
    pub residency_categories: Vec<PiiCategory>,
    #[serde(default)]
    pub consent_required_categories: Vec<PiiCategory>,
}

/// Static feature flag values
///
/// Absent flags are answered by the safe default of each gate.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct FeaturesConfig {
    #[serde(default)]
    pub hybrid_routing: Option<bool>,
    #[serde(default)]
    pub emergency_override: Option<bool>,
    #[serde(default)]
    pub pii_redaction: Option<bool>,
    #[serde(default)]
    pub compliance_enforcement: Option<bool>,
}

/// Audit sink selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditSinkKind {
    #[default]
    Memory,
    File,
}

/// Audit trail configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuditConfig {
    #[serde(default)]
    pub sink: AuditSinkKind,
    #[serde(default)]
    pub path: Option<String>,
    /// Events buffered for the writer task before new ones are dropped
    #[serde(default = "default_audit_queue_capacity")]
    pub queue_capacity: usize,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            sink: AuditSinkKind::default(),
            path: None,
            queue_capacity: default_audit_queue_capacity(),
        }
    }
}

fn default_audit_queue_capacity() -> usize {
    crate::audit::DEFAULT_QUEUE_CAPACITY
}

/// Rolling metrics settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MetricsConfig {
    /// Number of most recent operations in the rolling window
    #[serde(default = "default_window_size")]
    pub window_size: usize,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            window_size: default_window_size(),
        }
    }
}

fn default_window_size() -> usize {
    1000
}

/// Observability configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        let path_display = path.as_ref().display().to_string();

        // Phase 1: Read file (preserves io::Error context)
        let content =
            std::fs::read_to_string(path.as_ref()).map_err(|source| AppError::ConfigFileRead {
                path: path_display.clone(),
                source,
            })?;

        // Phase 2: Parse TOML (preserves toml::de::Error context)
        let config: Self =
            toml::from_str(&content).map_err(|source| AppError::ConfigParseFailed {
                path: path_display.clone(),
                source,
            })?;

        // Phase 3: Validate parsed config (provides contextual reason)
        config
            .validate()
            .map_err(|e| AppError::ConfigValidationFailed {
                path: path_display,
                reason: e.to_string(),
            })?;

        Ok(config)
    }

    /// Validate configuration after parsing
    ///
    /// Called automatically by `from_file()` and `from_str()`.
    pub fn validate(&self) -> AppResult<()> {
        // Phase 1: route endpoints
        for (route, base_url, cost) in [
            (
                Route::Direct,
                self.routes.direct.base_url.as_str(),
                self.routes.direct.cost_per_1k_tokens,
            ),
            (
                Route::Broker,
                self.routes.broker.base_url.as_str(),
                self.routes.broker.cost_per_1k_tokens,
            ),
        ] {
            if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
                return Err(AppError::Config(format!(
                    "routes.{}.base_url '{}' must start with 'http://' or 'https://'",
                    route, base_url
                )));
            }
            if !cost.is_finite() || cost < 0.0 {
                return Err(AppError::Config(format!(
                    "routes.{}.cost_per_1k_tokens must be a non-negative finite number, got {}",
                    route, cost
                )));
            }
            if self.routes.region(route).trim().is_empty() {
                return Err(AppError::Config(format!(
                    "routes.{}.region cannot be empty",
                    route
                )));
            }
        }

        let direct = &self.routes.direct;
        if direct.model.trim().is_empty() {
            return Err(AppError::Config(
                "routes.direct.model cannot be empty".to_string(),
            ));
        }
        if direct.max_tokens == 0 || direct.max_tokens > u32::MAX as usize {
            return Err(AppError::Config(format!(
                "routes.direct.max_tokens must be between 1 and {}, got {}",
                u32::MAX,
                direct.max_tokens
            )));
        }
        if !(0.0..=2.0).contains(&direct.temperature) || direct.temperature.is_nan() {
            return Err(AppError::Config(format!(
                "routes.direct.temperature must be a finite number between 0.0 and 2.0, got {}",
                direct.temperature
            )));
        }

        // Phase 2: routing rules
        let mut seen = HashSet::new();
        for rule in &self.routing.rules {
            if !seen.insert((rule.operation_class, rule.priority)) {
                return Err(AppError::Config(format!(
                    "duplicate routing rule for operation_class '{}' and priority '{}'",
                    rule.operation_class,
                    rule.priority.map(Priority::as_str).unwrap_or("any")
                )));
            }
        }

        // Phase 3: health and breaker tuning
        let health = &self.health;
        if health.cache_ttl_seconds == 0 {
            return Err(AppError::Config(
                "health.cache_ttl_seconds must be greater than 0".to_string(),
            ));
        }
        if health.failure_cache_ttl_seconds > health.cache_ttl_seconds {
            return Err(AppError::Config(format!(
                "health.failure_cache_ttl_seconds ({}) cannot exceed health.cache_ttl_seconds ({})",
                health.failure_cache_ttl_seconds, health.cache_ttl_seconds
            )));
        }
        if health.probe_timeout_ms == 0 || health.probe_timeout_ms > 2000 {
            return Err(AppError::Config(format!(
                "health.probe_timeout_ms must be between 1 and 2000, got {}",
                health.probe_timeout_ms
            )));
        }
        if health.unhealthy_after_failures == 0 {
            return Err(AppError::Config(
                "health.unhealthy_after_failures must be at least 1".to_string(),
            ));
        }
        if self.circuit_breaker.failure_threshold == 0 {
            return Err(AppError::Config(
                "circuit_breaker.failure_threshold must be at least 1".to_string(),
            ));
        }
        if self.circuit_breaker.recovery_timeout_seconds == 0 {
            return Err(AppError::Config(
                "circuit_breaker.recovery_timeout_seconds must be greater than 0".to_string(),
            ));
        }

        // Phase 4: privacy, compliance, audit, metrics
        let threshold = self.privacy.confidence_threshold;
        if !(0.0..=1.0).contains(&threshold) || threshold.is_nan() {
            return Err(AppError::Config(format!(
                "privacy.confidence_threshold must be between 0.0 and 1.0, got {}",
                threshold
            )));
        }
        if let Some(region) = &self.compliance.residency_region
            && region.trim().is_empty()
        {
            return Err(AppError::Config(
                "compliance.residency_region cannot be empty when provided".to_string(),
            ));
        }
        if !self.compliance.residency_categories.is_empty()
            && self.compliance.residency_region.is_none()
        {
            return Err(AppError::Config(
                "compliance.residency_categories requires compliance.residency_region".to_string(),
            ));
        }
        if self.audit.sink == AuditSinkKind::File && self.audit.path.is_none() {
            return Err(AppError::Config(
                "audit.path is required when audit.sink = \"file\"".to_string(),
            ));
        }
        if self.audit.queue_capacity == 0 {
            return Err(AppError::Config(
                "audit.queue_capacity must be at least 1".to_string(),
            ));
        }
        if self.metrics.window_size == 0 {
            return Err(AppError::Config(
                "metrics.window_size must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}

impl FromStr for Config {
    type Err = AppError;

    fn from_str(toml_str: &str) -> Result<Self, Self::Err> {
        let config: Config =
            toml::from_str(toml_str).map_err(|source| AppError::ConfigParseFailed {
                path: "<string>".to_string(),
                source,
            })?;

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) const TEST_CONFIG: &str = r#"
[server]
host = "0.0.0.0"
port = 3000

[routes.direct]
base_url = "http://localhost:1234/v1"
model = "support-8b"
region = "eu-west"
max_tokens = 4096
cost_per_1k_tokens = 0.0004

[routes.broker]
base_url = "http://localhost:8090"
region = "eu-west"
tools = ["ticket_lookup", "order_status"]
cost_per_1k_tokens = 0.002

[[routing.rules]]
operation_class = "critical"
route = "broker"

[[routing.rules]]
operation_class = "standard"
priority = "high"
route = "direct"

[circuit_breaker]
failure_threshold = 3
recovery_timeout_seconds = 20

[sla]
critical = 8

[compliance]
residency_region = "eu-west"
residency_categories = ["financial"]
consent_required_categories = ["identifier"]

[features]
pii_redaction = true

[observability]
log_level = "debug"
"#;

    #[test]
    fn test_config_from_str_parses_successfully() {
        let config = Config::from_str(TEST_CONFIG).expect("should parse config");
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.routes.direct.model(), "support-8b");
        assert_eq!(config.routes.direct.max_tokens(), 4096);
        assert_eq!(config.routes.broker.tools().len(), 2);
        assert_eq!(config.routing.rules.len(), 2);
        assert_eq!(config.circuit_breaker.failure_threshold, 3);
        assert_eq!(config.observability.log_level, "debug");
    }

    #[test]
    fn test_routing_rule_priority_optional() {
        let config = Config::from_str(TEST_CONFIG).unwrap();
        assert_eq!(config.routing.rules[0].priority, None);
        assert_eq!(config.routing.rules[0].route, Route::Broker);
        assert_eq!(config.routing.rules[1].priority, Some(Priority::High));
    }

    #[test]
    fn test_defaults_applied() {
        let config = Config::from_str(TEST_CONFIG).unwrap();
        assert_eq!(config.health.cache_ttl(), Duration::from_secs(30));
        assert_eq!(config.health.probe_timeout(), Duration::from_millis(2000));
        assert_eq!(config.health.unhealthy_after_failures, 3);
        assert_eq!(config.privacy.confidence_threshold, 0.5);
        assert_eq!(config.metrics.window_size, 1000);
        assert_eq!(config.audit.sink, AuditSinkKind::Memory);
        assert_eq!(config.routes.direct.temperature(), 0.7);
    }

    #[test]
    fn test_health_urls_default_from_base_url() {
        let config = Config::from_str(TEST_CONFIG).unwrap();
        assert_eq!(
            config.routes.health_url(Route::Direct),
            "http://localhost:1234/v1/models"
        );
        assert_eq!(
            config.routes.health_url(Route::Broker),
            "http://localhost:8090/health"
        );
    }

    #[test]
    fn test_sla_budget_override_and_defaults() {
        let config = Config::from_str(TEST_CONFIG).unwrap();
        assert_eq!(
            config.sla.budget_for(OperationClass::Critical),
            Duration::from_secs(8)
        );
        assert_eq!(
            config.sla.budget_for(OperationClass::Emergency),
            Duration::from_secs(5)
        );
        assert_eq!(
            config.sla.budget_for(OperationClass::Background),
            Duration::from_secs(60)
        );
    }

    #[test]
    fn test_sla_above_class_maximum_rejected_at_parse_time() {
        let config_str = TEST_CONFIG.replace("critical = 8", "critical = 11");
        let err = Config::from_str(&config_str).unwrap_err().to_string();
        assert!(err.contains("sla.critical"), "got: {}", err);
        assert!(err.contains("10"));
    }

    #[test]
    fn test_sla_zero_rejected() {
        assert!(SlaConfig::new(Some(0), None, None, None).is_err());
        assert!(SlaConfig::new(Some(5), Some(10), Some(30), Some(60)).is_ok());
    }

    #[test]
    fn test_duplicate_rule_rejected() {
        let config_str = TEST_CONFIG.replace(
            "[circuit_breaker]",
            "[[routing.rules]]\noperation_class = \"critical\"\nroute = \"direct\"\n\n[circuit_breaker]",
        );
        let err = Config::from_str(&config_str).unwrap_err().to_string();
        assert!(err.contains("duplicate routing rule"), "got: {}", err);
    }

    #[test]
    fn test_invalid_base_url_rejected() {
        let mut config = Config::from_str(TEST_CONFIG).unwrap();
        config.routes.broker.base_url = "ftp://broker".to_string();
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("base_url"));
        assert!(err.contains("http"));
    }

    #[test]
    fn test_negative_cost_rejected() {
        let mut config = Config::from_str(TEST_CONFIG).unwrap();
        config.routes.direct.cost_per_1k_tokens = -1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_probe_timeout_bounded() {
        let mut config = Config::from_str(TEST_CONFIG).unwrap();
        config.health.probe_timeout_ms = 2500;
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("probe_timeout_ms"));
    }

    #[test]
    fn test_failure_ttl_cannot_exceed_success_ttl() {
        let mut config = Config::from_str(TEST_CONFIG).unwrap();
        config.health.failure_cache_ttl_seconds = 60;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_confidence_threshold_bounded() {
        let mut config = Config::from_str(TEST_CONFIG).unwrap();
        config.privacy.confidence_threshold = 1.5;
        assert!(config.validate().is_err());
        config.privacy.confidence_threshold = f64::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_audit_queue_capacity_must_be_positive() {
        let mut config = Config::from_str(TEST_CONFIG).unwrap();
        assert_eq!(config.audit.queue_capacity, 4096);
        config.audit.queue_capacity = 0;
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("queue_capacity"));
    }

    #[test]
    fn test_residency_categories_require_region() {
        let mut config = Config::from_str(TEST_CONFIG).unwrap();
        config.compliance.residency_region = None;
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("residency_region"));
    }

    #[test]
    fn test_file_audit_sink_requires_path() {
        let mut config = Config::from_str(TEST_CONFIG).unwrap();
        config.audit.sink = AuditSinkKind::File;
        assert!(config.validate().is_err());
        config.audit.path = Some("/tmp/audit.jsonl".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_file_missing_reports_path() {
        let err = Config::from_file("/nonexistent/supportroute.toml").unwrap_err();
        assert!(matches!(err, AppError::ConfigFileRead { .. }));
        assert!(err.to_string().contains("/nonexistent/supportroute.toml"));
    }
}
