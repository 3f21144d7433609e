//! Backend execution paths
//!
//! Both routes expose the same capability: `invoke(prompt, context, toolset?)`
//! under a caller-supplied deadline. Implementations hold no per-call state,
//! so one instance is shared by all concurrent operations.

pub mod broker;
pub mod direct;

pub use broker::BrokerBackend;
pub use direct::DirectBackend;

use crate::config::Config;
use crate::error::AppResult;
use crate::operation::Route;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Failure reported by a backend
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("transport error contacting {endpoint}: {message}")]
    Transport { endpoint: String, message: String },

    #[error("{endpoint} returned HTTP {status}: {body}")]
    Status {
        endpoint: String,
        status: u16,
        body: String,
    },

    #[error("invalid backend response: {0}")]
    InvalidResponse(String),

    #[error("backend did not answer within {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("backend misconfigured: {0}")]
    Configuration(String),
}

/// One backend call
#[derive(Debug, Clone)]
pub struct Invocation {
    pub prompt: String,
    pub context: serde_json::Map<String, serde_json::Value>,
    pub toolset: Option<Vec<String>>,
    /// Time the backend may spend on this call
    pub deadline: Duration,
}

/// Successful backend answer
#[derive(Debug, Clone, PartialEq)]
pub struct BackendResponse {
    pub text: String,
    pub cost_estimate: f64,
    pub latency_ms: u64,
}

/// A backend execution path
#[async_trait]
pub trait Backend: Send + Sync {
    /// Route this backend serves
    fn route(&self) -> Route;

    /// Execute the invocation, giving up once `invocation.deadline` elapses
    async fn invoke(&self, invocation: &Invocation) -> Result<BackendResponse, BackendError>;
}

/// The pair of backends the executor dispatches to
#[derive(Clone)]
pub struct BackendSet {
    direct: Arc<dyn Backend>,
    broker: Arc<dyn Backend>,
}

impl BackendSet {
    pub fn new(direct: Arc<dyn Backend>, broker: Arc<dyn Backend>) -> Self {
        Self { direct, broker }
    }

    /// Build the production backends from configuration
    pub fn from_config(config: &Config) -> AppResult<Self> {
        Ok(Self {
            direct: Arc::new(DirectBackend::new(config.routes.direct.clone())),
            broker: Arc::new(BrokerBackend::new(config.routes.broker.clone())?),
        })
    }

    pub fn get(&self, route: Route) -> &Arc<dyn Backend> {
        match route {
            Route::Direct => &self.direct,
            Route::Broker => &self.broker,
        }
    }
}

/// Estimate token count from text (simple heuristic: chars / 4)
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count() / 4
}

/// Cost of a call given its prompt and answer
pub(crate) fn estimate_cost(prompt: &str, answer: &str, cost_per_1k_tokens: f64) -> f64 {
    let tokens = estimate_tokens(prompt) + estimate_tokens(answer);
    tokens as f64 * cost_per_1k_tokens / 1000.0
}
