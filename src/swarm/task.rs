//! Task descriptor and typed results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Complexity tier estimated during decomposition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    Low,
    Medium,
    High,
}

/// Severity of a security risk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

/// A subtask produced by decomposition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subtask {
    pub id: String,
    pub description: String,
    #[serde(default)]
    pub priority: i32,
}

/// A security risk found during assessment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityRisk {
    pub category: String,
    pub severity: Severity,
    pub description: String,
    pub recommendation: String,
}

/// Typed success payload of a task, keyed by the role operation that ran.
///
/// `degraded` marks results recovered by a parse fallback, so consumers can
/// tell a degraded reply from a normal one.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TaskResult {
    Decomposition {
        subtasks: Vec<Subtask>,
        dependencies: Vec<(String, String)>,
        complexity: Complexity,
        degraded: bool,
    },
    SecurityAssessment {
        risks: Vec<SecurityRisk>,
        degraded: bool,
    },
    ArchitecturalReview {
        description: String,
        recommendations: Vec<String>,
    },
    Code {
        code: String,
        language: String,
        success: bool,
    },
    Test {
        total_tests: u32,
        passed: u32,
        failed: u32,
        output: String,
    },
    Documentation {
        content: String,
    },
    General {
        content: String,
    },
}

/// A unit of work. Mutated only by the worker that owns it; never deleted,
/// only retained in bounded history lists.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub description: String,
    /// Carried in the data model; dispatch order is FIFO and does not
    /// consult it.
    pub priority: i32,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub result: Option<TaskResult>,
    pub error: Option<String>,
}

impl Task {
    pub fn new(id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            priority: 1,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            result: None,
            error: None,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// A task is failed once its error field is stamped.
    pub fn is_failed(&self) -> bool {
        self.error.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_task_is_unstarted() {
        let task = Task::new("t-1", "Write a function");
        assert!(task.started_at.is_none());
        assert!(task.completed_at.is_none());
        assert!(!task.is_failed());
        assert_eq!(task.priority, 1);
    }

    #[test]
    fn result_serde_roundtrip() {
        let result = TaskResult::SecurityAssessment {
            risks: vec![SecurityRisk {
                category: "injection".to_string(),
                severity: Severity::High,
                description: "unsanitized input".to_string(),
                recommendation: "parameterize".to_string(),
            }],
            degraded: false,
        };
        let json = serde_json::to_string(&result).unwrap();
        assert!(json.contains("\"type\":\"security_assessment\""));
        assert!(json.contains("\"severity\":\"high\""));
        let parsed: TaskResult = serde_json::from_str(&json).unwrap();
        match parsed {
            TaskResult::SecurityAssessment { risks, .. } => assert_eq!(risks.len(), 1),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn severity_orders_by_badness() {
        assert!(Severity::Critical > Severity::High);
        assert!(Severity::Medium > Severity::Low);
    }
}
