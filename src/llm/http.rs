//! HTTP inference provider for OpenAI-compatible chat endpoints.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use rand::Rng;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;

use crate::config::ModelRouting;
use crate::error::InferenceError;
use crate::llm::{InferenceProvider, InferenceReply, InferenceRequest, ModelTier};

const MAX_RETRIES: u32 = 3;
const RETRY_BASE_DELAY: Duration = Duration::from_secs(1);
const RETRY_MAX_DELAY: Duration = Duration::from_secs(30);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Aggregated call statistics.
#[derive(Debug, Clone, Copy, Default)]
pub struct InferenceStats {
    pub total_calls: u64,
    pub successful_calls: u64,
    pub failed_calls: u64,
    pub total_tokens: u64,
    pub total_latency_ms: u64,
}

impl InferenceStats {
    pub fn avg_latency_ms(&self) -> u64 {
        if self.successful_calls == 0 {
            0
        } else {
            self.total_latency_ms / self.successful_calls
        }
    }
}

/// Inference provider speaking the OpenAI-compatible `chat/completions` wire
/// format. Per-tier routing (endpoint, model, limits) comes from configuration.
pub struct HttpInference {
    client: reqwest::Client,
    api_key: SecretString,
    routing: HashMap<ModelTier, ModelRouting>,
    stats: Mutex<InferenceStats>,
}

#[derive(Deserialize)]
struct ChatCompletion {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: String,
}

#[derive(Deserialize, Default)]
struct ChatUsage {
    #[serde(default)]
    total_tokens: u64,
}

impl HttpInference {
    pub fn new(api_key: SecretString, routing: HashMap<ModelTier, ModelRouting>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()
                .unwrap_or_default(),
            api_key,
            routing,
            stats: Mutex::new(InferenceStats::default()),
        }
    }

    /// Point-in-time copy of the call statistics.
    pub fn stats(&self) -> InferenceStats {
        *self.stats.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn route(&self, tier: ModelTier) -> ModelRouting {
        self.routing.get(&tier).cloned().unwrap_or_else(|| match tier {
            ModelTier::Tier1Reasoning => ModelRouting {
                endpoint: "https://openrouter.ai/api/v1/".to_string(),
                model: "anthropic/claude-3.5-sonnet".to_string(),
                max_tokens: 4096,
                temperature: 0.3,
            },
            ModelTier::Tier2Action => ModelRouting {
                endpoint: "https://openrouter.ai/api/v1/".to_string(),
                model: "anthropic/claude-3.5-haiku".to_string(),
                max_tokens: 2048,
                temperature: 0.5,
            },
        })
    }

    async fn send_once(
        &self,
        route: &ModelRouting,
        request: &InferenceRequest,
    ) -> Result<ChatCompletion, InferenceError> {
        let url = format!("{}chat/completions", route.endpoint);

        let mut messages = Vec::new();
        if let Some(ref system) = request.system_prompt {
            messages.push(json!({"role": "system", "content": system}));
        }
        messages.push(json!({"role": "user", "content": request.prompt}));

        let payload = json!({
            "model": route.model,
            "messages": messages,
            "max_tokens": route.max_tokens,
            "temperature": route.temperature,
        });

        let response = self
            .client
            .post(&url)
            .bearer_auth(self.api_key.expose_secret())
            .json(&payload)
            .send()
            .await
            .map_err(|e| InferenceError::RequestFailed {
                endpoint: route.endpoint.clone(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(InferenceError::RequestFailed {
                endpoint: route.endpoint.clone(),
                reason: format!("HTTP {status}"),
            });
        }

        response
            .json::<ChatCompletion>()
            .await
            .map_err(|e| InferenceError::InvalidResponse {
                model: route.model.clone(),
                reason: e.to_string(),
            })
    }

    fn backoff_delay(attempt: u32) -> Duration {
        let base = RETRY_BASE_DELAY * 2u32.saturating_pow(attempt);
        let capped = base.min(RETRY_MAX_DELAY);
        // Jitter up to 25% to spread concurrent workers.
        let jitter = rand::thread_rng().gen_range(0..=capped.as_millis() as u64 / 4);
        capped + Duration::from_millis(jitter)
    }
}

#[async_trait]
impl InferenceProvider for HttpInference {
    async fn call(&self, request: InferenceRequest) -> Result<InferenceReply, InferenceError> {
        {
            let mut stats = self.stats.lock().unwrap_or_else(|e| e.into_inner());
            stats.total_calls += 1;
        }

        let route = self.route(request.tier);
        let start = Instant::now();
        let mut last_error = String::new();

        for attempt in 0..MAX_RETRIES {
            match self.send_once(&route, &request).await {
                Ok(completion) => {
                    let content = completion
                        .choices
                        .first()
                        .map(|c| c.message.content.clone())
                        .ok_or_else(|| InferenceError::InvalidResponse {
                            model: route.model.clone(),
                            reason: "empty choices".to_string(),
                        })?;

                    let total_tokens = completion.usage.unwrap_or_default().total_tokens;
                    let latency_ms = start.elapsed().as_millis() as u64;

                    let mut stats = self.stats.lock().unwrap_or_else(|e| e.into_inner());
                    stats.successful_calls += 1;
                    stats.total_tokens += total_tokens;
                    stats.total_latency_ms += latency_ms;

                    tracing::debug!(
                        model = %route.model,
                        tokens = total_tokens,
                        latency_ms,
                        "Inference call succeeded"
                    );

                    return Ok(InferenceReply {
                        content,
                        model: route.model,
                        total_tokens,
                        latency_ms,
                    });
                }
                Err(e) => {
                    last_error = e.to_string();
                    tracing::warn!(
                        attempt = attempt + 1,
                        error = %last_error,
                        "Inference call failed"
                    );
                }
            }

            if attempt + 1 < MAX_RETRIES {
                tokio::time::sleep(Self::backoff_delay(attempt)).await;
            }
        }

        let mut stats = self.stats.lock().unwrap_or_else(|e| e.into_inner());
        stats.failed_calls += 1;

        Err(InferenceError::RetriesExhausted {
            attempts: MAX_RETRIES,
            last_error,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_routes_per_tier() {
        let provider = HttpInference::new(SecretString::from("test-key"), HashMap::new());
        let reasoning = provider.route(ModelTier::Tier1Reasoning);
        let action = provider.route(ModelTier::Tier2Action);
        assert_ne!(reasoning.model, action.model);
        assert_eq!(reasoning.max_tokens, 4096);
    }

    #[test]
    fn configured_route_wins() {
        let mut routing = HashMap::new();
        routing.insert(
            ModelTier::Tier2Action,
            ModelRouting {
                endpoint: "http://localhost:8082/".to_string(),
                model: "local-flash".to_string(),
                max_tokens: 1024,
                temperature: 0.7,
            },
        );
        let provider = HttpInference::new(SecretString::from("test-key"), routing);
        assert_eq!(provider.route(ModelTier::Tier2Action).model, "local-flash");
    }

    #[test]
    fn backoff_grows_and_caps() {
        let first = HttpInference::backoff_delay(0);
        assert!(first >= RETRY_BASE_DELAY);
        let late = HttpInference::backoff_delay(10);
        assert!(late <= RETRY_MAX_DELAY + RETRY_MAX_DELAY / 4);
    }

    #[test]
    fn stats_avg_latency_handles_zero_calls() {
        assert_eq!(InferenceStats::default().avg_latency_ms(), 0);
    }
}
