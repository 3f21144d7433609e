//! supportroute - hybrid AI operation router for customer-support workloads
//!
//! Each operation is sent to one of two backends (a direct model endpoint or
//! a tool-calling broker) under a per-class SLA budget, with per-route
//! circuit breaking, health caching, PII redaction and compliance checks.

pub mod audit;
pub mod backends;
pub mod cli;
pub mod config;
pub mod error;
pub mod executor;
pub mod flags;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod operation;
pub mod privacy;
pub mod resilience;
pub mod router;
pub mod telemetry;
