//! Architect role — decomposition, security assessment, goal alignment.

use std::sync::Arc;

use serde::Deserialize;

use crate::error::InferenceError;
use crate::llm::InferenceProvider;
use crate::swarm::task::{Complexity, SecurityRisk, Subtask, Task, TaskResult};
use crate::swarm::worker::ThinkingLog;

/// Outcome of parsing a model reply: the real structure, or the documented
/// fallback. Callers can always read the data; `Fallback` marks it degraded.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseOutcome<T> {
    Parsed(T),
    Fallback(T),
}

impl<T> ParseOutcome<T> {
    pub fn is_fallback(&self) -> bool {
        matches!(self, Self::Fallback(_))
    }

    pub fn get(&self) -> &T {
        match self {
            Self::Parsed(value) | Self::Fallback(value) => value,
        }
    }

    pub fn into_inner(self) -> T {
        match self {
            Self::Parsed(value) | Self::Fallback(value) => value,
        }
    }
}

/// Result of problem decomposition.
#[derive(Debug, Clone, Deserialize)]
pub struct DecompositionResult {
    #[serde(default)]
    pub subtasks: Vec<Subtask>,
    #[serde(default)]
    pub dependencies: Vec<(String, String)>,
    #[serde(default = "default_complexity")]
    pub complexity: Complexity,
}

fn default_complexity() -> Complexity {
    Complexity::Medium
}

#[derive(Deserialize)]
struct AssessmentReply {
    #[serde(default)]
    risks: Vec<SecurityRisk>,
}

const DECOMPOSE_SYSTEM_PROMPT: &str = r#"You are an expert software architect. Your job is to decompose
complex tasks into smaller, manageable subtasks. Each subtask should be:
1. Independently executable
2. Clearly defined with acceptance criteria
3. Properly sequenced with dependencies identified

Respond in JSON format with:
{
    "subtasks": [{"id": "ST-1", "description": "...", "priority": 1}],
    "dependencies": [["ST-1", "ST-2"]],
    "complexity": "low|medium|high"
}"#;

const ASSESSMENT_SYSTEM_PROMPT: &str = r#"You are a security expert. Analyze the given code or task
for security risks. Consider:
- Input validation issues
- Authentication/authorization flaws
- Data exposure risks
- Injection vulnerabilities
- Resource management issues

Respond in JSON format with:
{
    "risks": [
        {
            "category": "category",
            "severity": "low|medium|high|critical",
            "description": "description",
            "recommendation": "how to fix"
        }
    ],
    "overall_risk": "low|medium|high|critical"
}"#;

/// High-level reasoning role: decomposition, security review, planning.
pub struct Architect {
    inference: Arc<dyn InferenceProvider>,
}

impl Architect {
    pub fn new(inference: Arc<dyn InferenceProvider>) -> Self {
        Self { inference }
    }

    /// Decompose a problem into subtasks.
    ///
    /// Never fails on a malformed reply: an unparseable reply degrades to a
    /// single subtask equal to the input with medium complexity.
    pub async fn decompose_problem(
        &self,
        description: &str,
        thinking: &mut ThinkingLog,
    ) -> Result<ParseOutcome<DecompositionResult>, InferenceError> {
        thinking.note(
            format!("Analyzing problem for decomposition: {description:.100}"),
            Some("Breaking down into manageable subtasks".to_string()),
        );

        let prompt = format!(
            "Decompose the following task into subtasks:\n\n{description}\n\n\
             Provide a structured breakdown with IDs, descriptions, priorities, and dependencies."
        );

        let reply = self
            .inference
            .call_reasoning(&prompt, Some(DECOMPOSE_SYSTEM_PROMPT))
            .await?;

        match serde_json::from_str::<DecompositionResult>(&reply.content) {
            Ok(result) => Ok(ParseOutcome::Parsed(result)),
            Err(e) => {
                tracing::warn!(error = %e, "Unparseable decomposition reply, using fallback");
                Ok(ParseOutcome::Fallback(DecompositionResult {
                    subtasks: vec![Subtask {
                        id: "main".to_string(),
                        description: description.to_string(),
                        priority: 1,
                    }],
                    dependencies: vec![],
                    complexity: Complexity::Medium,
                }))
            }
        }
    }

    /// Assess code or a task description for security risks.
    ///
    /// A reply that cannot be parsed degrades to an empty risk list. That
    /// fallback is permissive on purpose — `Fallback` lets callers treat a
    /// degraded assessment differently from a clean one.
    pub async fn security_assessment(
        &self,
        code_or_task: &str,
        thinking: &mut ThinkingLog,
    ) -> Result<ParseOutcome<Vec<SecurityRisk>>, InferenceError> {
        thinking.note(
            format!("Performing security assessment on: {code_or_task:.100}"),
            Some("Checking for potential vulnerabilities".to_string()),
        );

        let prompt = format!(
            "Perform a security assessment on:\n\n{code_or_task}\n\n\
             Identify potential security risks and provide recommendations."
        );

        let reply = self
            .inference
            .call_reasoning(&prompt, Some(ASSESSMENT_SYSTEM_PROMPT))
            .await?;

        match serde_json::from_str::<AssessmentReply>(&reply.content) {
            Ok(parsed) => Ok(ParseOutcome::Parsed(parsed.risks)),
            Err(e) => {
                tracing::warn!(error = %e, "Unparseable assessment reply, returning empty risk list");
                Ok(ParseOutcome::Fallback(vec![]))
            }
        }
    }

    /// Bag-of-words alignment between a task and a goal corpus, in [0, 1].
    pub fn align_with_goals(&self, task: &Task, goals: &[String]) -> f64 {
        let task_words: std::collections::HashSet<String> = task
            .description
            .to_lowercase()
            .split_whitespace()
            .map(str::to_string)
            .collect();
        if task_words.is_empty() {
            return 0.0;
        }

        let goal_words: std::collections::HashSet<String> = goals
            .join(" ")
            .to_lowercase()
            .split_whitespace()
            .map(str::to_string)
            .collect();

        let common = task_words.intersection(&goal_words).count();
        let denom = task_words.len().min(10);
        (common as f64 / denom as f64).min(1.0)
    }

    /// Keyword dispatch over the task description.
    pub async fn execute(
        &self,
        task: &Task,
        thinking: &mut ThinkingLog,
    ) -> Result<TaskResult, InferenceError> {
        let description = task.description.to_lowercase();

        if description.contains("decompose") {
            let outcome = self.decompose_problem(&task.description, thinking).await?;
            let degraded = outcome.is_fallback();
            let result = outcome.into_inner();
            Ok(TaskResult::Decomposition {
                subtasks: result.subtasks,
                dependencies: result.dependencies,
                complexity: result.complexity,
                degraded,
            })
        } else if description.contains("security") || description.contains("assess") {
            let outcome = self.security_assessment(&task.description, thinking).await?;
            let degraded = outcome.is_fallback();
            Ok(TaskResult::SecurityAssessment {
                risks: outcome.into_inner(),
                degraded,
            })
        } else {
            thinking.note(
                "Performing general architectural review",
                Some("Analyzing task requirements and structure".to_string()),
            );
            Ok(TaskResult::ArchitecturalReview {
                description: task.description.clone(),
                recommendations: vec![
                    "Review requirements".to_string(),
                    "Design solution".to_string(),
                    "Implement".to_string(),
                ],
            })
        }
    }
}
