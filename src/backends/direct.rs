//! Direct route backend
//!
//! Streams a completion from an OpenAI-compatible model endpoint via
//! `open-agent-sdk` and concatenates the text blocks. The direct path is a
//! bare model call: structured context and tools are not forwarded.

use super::{Backend, BackendError, BackendResponse, Invocation, estimate_cost};
use crate::config::DirectRouteConfig;
use crate::operation::Route;
use async_trait::async_trait;
use futures::StreamExt;

/// Backend for the low-level model endpoint
pub struct DirectBackend {
    config: DirectRouteConfig,
}

impl DirectBackend {
    pub fn new(config: DirectRouteConfig) -> Self {
        Self { config }
    }

    async fn collect_completion(
        &self,
        prompt: &str,
        options: &open_agent::AgentOptions,
    ) -> Result<String, BackendError> {
        let mut stream = open_agent::query(prompt, options).await.map_err(|e| {
            BackendError::Transport {
                endpoint: self.config.base_url().to_string(),
                message: format!("{}", e),
            }
        })?;

        let mut response_text = String::new();
        let mut block_count = 0;
        while let Some(result) = stream.next().await {
            match result {
                Ok(block) => {
                    block_count += 1;
                    use open_agent::ContentBlock;
                    match block {
                        ContentBlock::Text(text_block) => {
                            response_text.push_str(&text_block.text);
                        }
                        other_block => {
                            tracing::warn!(
                                endpoint = %self.config.base_url(),
                                block_type = ?other_block,
                                block_number = block_count,
                                "Received non-text content block on direct route, skipping"
                            );
                        }
                    }
                }
                Err(e) => {
                    // Partial output is discarded; the executor decides on fallback
                    tracing::error!(
                        endpoint = %self.config.base_url(),
                        error = %e,
                        block_count,
                        partial_response_length = response_text.len(),
                        "Direct route stream interrupted"
                    );
                    return Err(BackendError::Transport {
                        endpoint: self.config.base_url().to_string(),
                        message: format!(
                            "stream interrupted after {} blocks: {}",
                            block_count, e
                        ),
                    });
                }
            }
        }

        if response_text.trim().is_empty() {
            return Err(BackendError::InvalidResponse(
                "direct route returned an empty completion".to_string(),
            ));
        }

        Ok(response_text)
    }
}

#[async_trait]
impl Backend for DirectBackend {
    fn route(&self) -> Route {
        Route::Direct
    }

    async fn invoke(&self, invocation: &Invocation) -> Result<BackendResponse, BackendError> {
        let options = open_agent::AgentOptions::builder()
            .model(self.config.model())
            .base_url(self.config.base_url())
            .max_tokens(self.config.max_tokens() as u32)
            .temperature(self.config.temperature() as f32)
            .build()
            .map_err(|e| BackendError::Configuration(format!("{}", e)))?;

        if !invocation.context.is_empty() || invocation.toolset.is_some() {
            tracing::debug!(
                context_keys = invocation.context.len(),
                "Direct route ignores structured context and tools"
            );
        }

        let started = tokio::time::Instant::now();
        let text = tokio::time::timeout(
            invocation.deadline,
            self.collect_completion(&invocation.prompt, &options),
        )
        .await
        .map_err(|_elapsed| BackendError::Timeout {
            timeout_ms: invocation.deadline.as_millis() as u64,
        })??;

        let latency_ms = started.elapsed().as_millis() as u64;
        let cost_estimate = estimate_cost(
            &invocation.prompt,
            &text,
            self.config.cost_per_1k_tokens(),
        );

        tracing::debug!(
            model = %self.config.model(),
            response_length = text.len(),
            latency_ms,
            "Direct route completion received"
        );

        Ok(BackendResponse {
            text,
            cost_estimate,
            latency_ms,
        })
    }
}
