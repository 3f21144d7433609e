//! Broker route backend
//!
//! POSTs `{prompt, context, tools}` to `{base_url}/invoke` on the broker
//! service, which adds tool-calling and orchestration on top of the model.

use super::{Backend, BackendError, BackendResponse, Invocation, estimate_cost};
use crate::config::BrokerRouteConfig;
use crate::error::{AppError, AppResult};
use crate::operation::Route;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Longest error body kept in a `BackendError::Status`
const MAX_ERROR_BODY_CHARS: usize = 512;

#[derive(Debug, Serialize)]
struct BrokerRequest<'a> {
    prompt: &'a str,
    context: &'a serde_json::Map<String, serde_json::Value>,
    tools: &'a [String],
}

#[derive(Debug, Deserialize)]
struct BrokerReply {
    text: String,
    #[serde(default)]
    cost_estimate: Option<f64>,
}

/// Backend for the orchestration broker
pub struct BrokerBackend {
    config: BrokerRouteConfig,
    client: reqwest::Client,
    invoke_url: String,
}

impl BrokerBackend {
    pub fn new(config: BrokerRouteConfig) -> AppResult<Self> {
        let client = reqwest::Client::builder().build().map_err(|e| {
            AppError::Internal(format!("Failed to create HTTP client for broker: {}", e))
        })?;
        let invoke_url = format!("{}/invoke", config.base_url().trim_end_matches('/'));

        Ok(Self {
            config,
            client,
            invoke_url,
        })
    }

    fn classify(&self, error: reqwest::Error, invocation: &Invocation) -> BackendError {
        if error.is_timeout() {
            BackendError::Timeout {
                timeout_ms: invocation.deadline.as_millis() as u64,
            }
        } else if error.is_decode() {
            BackendError::InvalidResponse(format!("{}", error))
        } else {
            BackendError::Transport {
                endpoint: self.invoke_url.clone(),
                message: format!("{}", error),
            }
        }
    }
}

#[async_trait]
impl Backend for BrokerBackend {
    fn route(&self) -> Route {
        Route::Broker
    }

    async fn invoke(&self, invocation: &Invocation) -> Result<BackendResponse, BackendError> {
        let tools = invocation
            .toolset
            .as_deref()
            .unwrap_or_else(|| self.config.tools());
        let body = BrokerRequest {
            prompt: &invocation.prompt,
            context: &invocation.context,
            tools,
        };

        let started = tokio::time::Instant::now();
        let response = self
            .client
            .post(&self.invoke_url)
            .timeout(invocation.deadline)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.classify(e, invocation))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(BackendError::Status {
                endpoint: self.invoke_url.clone(),
                status: status.as_u16(),
                body: text.chars().take(MAX_ERROR_BODY_CHARS).collect(),
            });
        }

        let reply: BrokerReply = response
            .json()
            .await
            .map_err(|e| self.classify(e, invocation))?;
        let latency_ms = started.elapsed().as_millis() as u64;

        let cost_estimate = match reply.cost_estimate {
            Some(cost) if cost.is_finite() && cost >= 0.0 => cost,
            Some(cost) => {
                return Err(BackendError::InvalidResponse(format!(
                    "broker reported invalid cost_estimate {}",
                    cost
                )));
            }
            None => estimate_cost(
                &invocation.prompt,
                &reply.text,
                self.config.cost_per_1k_tokens(),
            ),
        };

        tracing::debug!(
            url = %self.invoke_url,
            tools = tools.len(),
            response_length = reply.text.len(),
            latency_ms,
            "Broker route answer received"
        );

        Ok(BackendResponse {
            text: reply.text,
            cost_estimate,
            latency_ms,
        })
    }
}
