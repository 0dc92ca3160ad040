//! Inference collaborator interface.
//!
//! The swarm core consumes a narrow surface: a prompt goes in, either content
//! or an error comes out. Retries, backoff, and timeouts are owned entirely by
//! the provider implementation behind the trait.

mod http;
mod offline;

pub use http::{HttpInference, InferenceStats};
pub use offline::OfflineInference;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::InferenceError;

/// Model tiers the swarm routes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelTier {
    /// High-capability model for decomposition and assessment.
    Tier1Reasoning,
    /// Fast model for code, test, and documentation generation.
    Tier2Action,
}

impl ModelTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tier1Reasoning => "tier_1_reasoning",
            Self::Tier2Action => "tier_2_action",
        }
    }
}

impl std::fmt::Display for ModelTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single inference request.
#[derive(Debug, Clone)]
pub struct InferenceRequest {
    pub prompt: String,
    pub tier: ModelTier,
    pub system_prompt: Option<String>,
}

impl InferenceRequest {
    pub fn new(prompt: impl Into<String>, tier: ModelTier) -> Self {
        Self {
            prompt: prompt.into(),
            tier,
            system_prompt: None,
        }
    }

    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(system_prompt.into());
        self
    }
}

/// A successful inference reply.
#[derive(Debug, Clone)]
pub struct InferenceReply {
    pub content: String,
    pub model: String,
    pub total_tokens: u64,
    pub latency_ms: u64,
}

/// The inference collaborator. `Err` is the provider's "success = false".
#[async_trait]
pub trait InferenceProvider: Send + Sync {
    async fn call(&self, request: InferenceRequest) -> Result<InferenceReply, InferenceError>;

    /// Reasoning-tier convenience call.
    async fn call_reasoning(
        &self,
        prompt: &str,
        system_prompt: Option<&str>,
    ) -> Result<InferenceReply, InferenceError> {
        let mut request = InferenceRequest::new(prompt, ModelTier::Tier1Reasoning);
        if let Some(sp) = system_prompt {
            request = request.with_system_prompt(sp);
        }
        self.call(request).await
    }

    /// Action-tier convenience call.
    async fn call_action(
        &self,
        prompt: &str,
        system_prompt: Option<&str>,
    ) -> Result<InferenceReply, InferenceError> {
        let mut request = InferenceRequest::new(prompt, ModelTier::Tier2Action);
        if let Some(sp) = system_prompt {
            request = request.with_system_prompt(sp);
        }
        self.call(request).await
    }
}
