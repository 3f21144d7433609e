//! Command-line interface for supportroute

use clap::{Parser, Subcommand};

/// Hybrid AI operation router for customer-support workloads
#[derive(Parser)]
#[command(name = "supportroute")]
#[command(version)]
#[command(about = "Hybrid AI operation router for customer-support workloads")]
#[command(
    long_about = "supportroute sends each support operation to a direct model endpoint or a \
    tool-calling broker, with per-route circuit breakers, SLA deadlines, PII redaction \
    and compliance checks."
)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml", global = true)]
    pub config: String,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Generate a template configuration file
    Config {
        /// Output file path (prints to stdout if not specified)
        #[arg(short, long)]
        output: Option<String>,
    },
}

/// Generate template configuration content
pub fn generate_config_template() -> &'static str {
    r#"# supportroute configuration
# ==========================

# ─────────────────────────────────────────────────────────────────────────────
# SERVER
# ─────────────────────────────────────────────────────────────────────────────

[server]
# IP address to bind to (0.0.0.0 for all interfaces, 127.0.0.1 for localhost only)
host = "0.0.0.0"
port = 3000

# ─────────────────────────────────────────────────────────────────────────────
# ROUTES
# ─────────────────────────────────────────────────────────────────────────────
#
# direct: OpenAI-compatible model endpoint, lowest latency
# broker: orchestration service that adds tool-calling
#
# region is used by data-residency checks.

[routes.direct]
base_url = "http://your-model-server:1234/v1"
model = "your-support-model"
region = "eu-west"
max_tokens = 2048
temperature = 0.7
cost_per_1k_tokens = 0.0004
# health_url = "http://your-model-server:1234/v1/models"

[routes.broker]
base_url = "http://your-broker:8090"
region = "eu-west"
tools = ["ticket_lookup", "order_status"]
cost_per_1k_tokens = 0.002
# health_url = "http://your-broker:8090/health"

# ─────────────────────────────────────────────────────────────────────────────
# ROUTING RULES
# ─────────────────────────────────────────────────────────────────────────────
#
# Each rule maps an operation class (emergency, critical, standard,
# background) and optional priority (low, normal, high) to its primary route.
# A rule with a priority wins over the class-wide rule.

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
operation_class = "standard"
priority = "high"
route = "broker"

[[routing.rules]]
operation_class = "background"
route = "broker"

# ─────────────────────────────────────────────────────────────────────────────
# FAILURE PROTECTION
# ─────────────────────────────────────────────────────────────────────────────

[health]
cache_ttl_seconds = 30
failure_cache_ttl_seconds = 5
probe_timeout_ms = 2000
unhealthy_after_failures = 3
# 0 disables background probing
background_interval_seconds = 30

[circuit_breaker]
failure_threshold = 5
recovery_timeout_seconds = 30

# Per-class budgets in seconds; each may only tighten the class maximum
# (emergency 5, critical 10, standard 30, background 60)
[sla]
emergency = 5
critical = 10
standard = 30
background = 60

# ─────────────────────────────────────────────────────────────────────────────
# PRIVACY AND COMPLIANCE
# ─────────────────────────────────────────────────────────────────────────────

[privacy]
# Findings below this confidence are reported but not redacted
confidence_threshold = 0.5

[compliance]
residency_region = "eu-west"
residency_categories = ["financial"]
consent_required_categories = []

# Feature flags; absent flags use safe defaults (all enabled)
[features]
hybrid_routing = true
emergency_override = true
pii_redaction = true
compliance_enforcement = true

[audit]
# "memory" or "file"
sink = "file"
path = "audit/operations.jsonl"
# Events buffered for the background writer; overflow is dropped and counted
queue_capacity = 4096

[metrics]
# Number of recent operations kept for snapshots and recommendations
window_size = 1000

# ─────────────────────────────────────────────────────────────────────────────
# OBSERVABILITY
# ─────────────────────────────────────────────────────────────────────────────

[observability]
# Log level: "trace", "debug", "info", "warn", "error"
log_level = "info"

# Prometheus metrics are always available at /metrics on the server port
"#
}
