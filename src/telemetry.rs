//! Telemetry and observability setup
//!
//! Structured logging with tracing and tracing-subscriber. `RUST_LOG` wins
//! over the configured level when set.

use std::sync::Once;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

static INIT: Once = Once::new();

/// Default filter directive for a configured log level
pub fn default_directive(level: &str) -> String {
    format!("supportroute={},tower_http=debug", level)
}

/// Initialize the tracing subscriber
///
/// Only the first call per process installs a subscriber; later calls are
/// ignored.
///
/// ```no_run
/// supportroute::telemetry::init("info");
/// tracing::info!("Application started");
/// ```
pub fn init(default_level: &str) {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(default_directive(default_level)));

        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directive_scopes_crate_and_http_layer() {
        assert_eq!(
            default_directive("debug"),
            "supportroute=debug,tower_http=debug"
        );
    }

    #[test]
    fn test_init_is_idempotent() {
        init("info");
        init("debug");
    }
}
