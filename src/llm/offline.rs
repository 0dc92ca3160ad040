//! Offline inference fallback.
//!
//! Keyword-keyed canned replies so the swarm stays runnable end-to-end with no
//! API key and no network. Also the provider used by most tests.

use async_trait::async_trait;

use crate::error::InferenceError;
use crate::llm::{InferenceProvider, InferenceReply, InferenceRequest};

/// Canned-reply provider.
#[derive(Debug, Default)]
pub struct OfflineInference;

impl OfflineInference {
    pub fn new() -> Self {
        Self
    }

    fn canned_reply(prompt: &str) -> String {
        let lower = prompt.to_lowercase();
        if lower.contains("decompose") {
            serde_json::json!({
                "subtasks": [
                    {"id": "ST-1", "description": "First subtask", "priority": 1},
                    {"id": "ST-2", "description": "Second subtask", "priority": 2}
                ],
                "dependencies": [["ST-1", "ST-2"]],
                "complexity": "medium"
            })
            .to_string()
        } else if lower.contains("security") {
            serde_json::json!({
                "risks": [],
                "overall_risk": "low"
            })
            .to_string()
        } else if lower.contains("code") {
            "fn example() -> &'static str {\n    \"Hello, World!\"\n}\n".to_string()
        } else if lower.contains("test") {
            "#[test]\nfn example_passes() {\n    assert!(true);\n}\n".to_string()
        } else if lower.contains("doc") {
            "# Documentation\n\nExample documentation.\n".to_string()
        } else {
            "Offline response".to_string()
        }
    }
}

#[async_trait]
impl InferenceProvider for OfflineInference {
    async fn call(&self, request: InferenceRequest) -> Result<InferenceReply, InferenceError> {
        Ok(InferenceReply {
            content: Self::canned_reply(&request.prompt),
            model: "offline".to_string(),
            total_tokens: 0,
            latency_ms: 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ModelTier;

    #[tokio::test]
    async fn decompose_reply_is_parseable_json() {
        let provider = OfflineInference::new();
        let reply = provider
            .call(InferenceRequest::new(
                "Decompose this problem",
                ModelTier::Tier1Reasoning,
            ))
            .await
            .unwrap();
        let value: serde_json::Value = serde_json::from_str(&reply.content).unwrap();
        assert!(value["subtasks"].is_array());
    }

    #[tokio::test]
    async fn unknown_prompt_gets_generic_reply() {
        let provider = OfflineInference::new();
        let reply = provider
            .call(InferenceRequest::new("hello", ModelTier::Tier2Action))
            .await
            .unwrap();
        assert_eq!(reply.content, "Offline response");
    }
}
