//! Failure protection for the two routes

pub mod circuit_breaker;
pub mod health;

pub use circuit_breaker::{Admission, CircuitBreakers, CircuitState, CircuitStatus};
pub use health::{HealthMonitor, HealthProbe, HttpProbe, RouteHealth};
