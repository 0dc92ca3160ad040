//! Worker lifecycle.
//!
//! A worker owns at most one task at a time and moves through
//! IDLE → WORKING → COMPLETED | FAILED, with STOPPED as the terminal
//! escape hatch from any state. Role behavior is a single capability —
//! `execute(task) -> result` — selected at construction time.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::audit::{entry, AuditLevel, AuditSink};
use crate::error::{InferenceError, WorkerError};
use crate::swarm::action_worker::ActionWorker;
use crate::swarm::architect::Architect;
use crate::swarm::task::{Task, TaskResult};

/// Completed tasks retained per worker.
const MAX_COMPLETED_TASKS: usize = 32;

/// Worker status states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerStatus {
    Idle,
    Working,
    Completed,
    Failed,
    Stopped,
}

impl std::fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Working => "working",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

/// Worker role tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerRole {
    Architect,
    Action,
}

impl std::fmt::Display for WorkerRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Architect => f.write_str("architect"),
            Self::Action => f.write_str("action"),
        }
    }
}

/// One step in a worker's reasoning trail.
#[derive(Debug, Clone, Serialize)]
pub struct ThinkingStep {
    pub timestamp: DateTime<Utc>,
    pub thought: String,
    pub decision: Option<String>,
}

/// Ordered reasoning trail, cleared at the start of each run.
#[derive(Debug, Default)]
pub struct ThinkingLog {
    steps: Vec<ThinkingStep>,
}

impl ThinkingLog {
    pub fn note(&mut self, thought: impl Into<String>, decision: Option<String>) {
        let step = ThinkingStep {
            timestamp: Utc::now(),
            thought: thought.into(),
            decision,
        };
        tracing::debug!(thought = %step.thought, decision = ?step.decision, "Thinking");
        self.steps.push(step);
    }

    pub fn steps(&self) -> &[ThinkingStep] {
        &self.steps
    }

    pub fn clear(&mut self) {
        self.steps.clear();
    }
}

/// Role behavior, selected at construction. Variants share no state — the
/// lifecycle fields all live on [`Worker`].
pub enum Role {
    Architect(Architect),
    Action(ActionWorker),
}

impl Role {
    pub fn kind(&self) -> WorkerRole {
        match self {
            Self::Architect(_) => WorkerRole::Architect,
            Self::Action(_) => WorkerRole::Action,
        }
    }

    /// The single role capability: interpret the task description and produce
    /// a typed result.
    pub async fn execute(
        &self,
        task: &Task,
        thinking: &mut ThinkingLog,
    ) -> Result<TaskResult, InferenceError> {
        match self {
            Self::Architect(architect) => architect.execute(task, thinking).await,
            Self::Action(action) => action.execute(task, thinking).await,
        }
    }
}

/// Point-in-time worker progress.
#[derive(Debug, Clone, Serialize)]
pub struct WorkerProgress {
    pub worker_id: String,
    pub role: WorkerRole,
    pub status: WorkerStatus,
    pub current_task: Option<String>,
    pub thinking_steps: usize,
    pub completed_tasks: usize,
}

/// A stateful executor bound to a role.
pub struct Worker {
    id: String,
    role: Role,
    status: WorkerStatus,
    current_task: Option<Task>,
    thinking: ThinkingLog,
    completed_tasks: VecDeque<Task>,
    audit: Arc<dyn AuditSink>,
}

impl Worker {
    pub fn new(role: Role, audit: Arc<dyn AuditSink>) -> Self {
        // Short ids keep logs and the worker map readable.
        let id = Uuid::new_v4().simple().to_string()[..8].to_string();
        Self {
            id,
            role,
            status: WorkerStatus::Idle,
            current_task: None,
            thinking: ThinkingLog::default(),
            completed_tasks: VecDeque::new(),
            audit,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn role(&self) -> WorkerRole {
        self.role.kind()
    }

    pub fn status(&self) -> WorkerStatus {
        self.status
    }

    pub fn current_task_id(&self) -> Option<&str> {
        self.current_task.as_ref().map(|t| t.id.as_str())
    }

    pub fn thinking_process(&self) -> &[ThinkingStep] {
        self.thinking.steps()
    }

    fn log_audit(&self, level: AuditLevel, action: &str, details: &str) {
        self.audit
            .log(entry(level, &format!("Worker-{}", self.id), action, details));
    }

    /// Assign a task. Rejected unless the worker is idle, which keeps the
    /// current-task slot and the WORKING status in lockstep.
    pub fn assign_task(&mut self, mut task: Task) -> Result<(), WorkerError> {
        if self.status != WorkerStatus::Idle {
            return Err(WorkerError::NotIdle {
                status: self.status,
            });
        }

        task.started_at = Some(Utc::now());
        tracing::info!(worker = %self.id, task = %task.id, "Task assigned");
        self.log_audit(
            AuditLevel::Info,
            "TASK_ASSIGNED",
            &format!("Task {}: {:.50}", task.id, task.description),
        );

        self.current_task = Some(task);
        self.status = WorkerStatus::Working;
        Ok(())
    }

    /// Run the assigned task to completion.
    ///
    /// On success the completed task is returned and a copy is retained in the
    /// worker's bounded history. On failure the task comes back inside
    /// [`WorkerError::TaskFailed`] with its error field stamped — the failure
    /// is captured on the task AND propagated; the orchestrator is the layer
    /// that converts it (never this one).
    pub async fn run(&mut self) -> Result<Task, WorkerError> {
        let mut task = self
            .current_task
            .take()
            .ok_or(WorkerError::NoTaskAssigned)?;

        self.status = WorkerStatus::Working;
        self.thinking.clear();
        self.thinking.note(
            format!("Starting task execution: {:.100}", task.description),
            Some(format!("Using role: {}", self.role.kind())),
        );

        match self.role.execute(&task, &mut self.thinking).await {
            Ok(result) => {
                task.result = Some(result);
                task.completed_at = Some(Utc::now());
                self.status = WorkerStatus::Completed;

                self.log_audit(
                    AuditLevel::Info,
                    "TASK_COMPLETED",
                    &format!("Task {} completed successfully", task.id),
                );

                self.push_completed(task.clone());
                Ok(task)
            }
            Err(e) => {
                let reason = e.to_string();
                task.error = Some(reason.clone());
                task.completed_at = Some(Utc::now());
                self.status = WorkerStatus::Failed;

                self.log_audit(
                    AuditLevel::Error,
                    "TASK_FAILED",
                    &format!("Task {} failed: {reason}", task.id),
                );
                tracing::error!(worker = %self.id, task = %task.id, error = %reason, "Task failed");

                Err(WorkerError::TaskFailed {
                    task: Box::new(task),
                    reason,
                })
            }
        }
    }

    fn push_completed(&mut self, task: Task) {
        self.completed_tasks.push_back(task);
        while self.completed_tasks.len() > MAX_COMPLETED_TASKS {
            self.completed_tasks.pop_front();
        }
    }

    /// Return a COMPLETED or FAILED worker to IDLE for reuse. STOPPED is
    /// terminal and WORKING workers cannot be reset.
    pub fn reset(&mut self) -> bool {
        match self.status {
            WorkerStatus::Completed | WorkerStatus::Failed => {
                self.status = WorkerStatus::Idle;
                true
            }
            _ => false,
        }
    }

    /// Request a graceful stop. Terminal: a stopped worker never runs again.
    pub fn stop(&mut self) {
        self.status = WorkerStatus::Stopped;
        self.log_audit(
            AuditLevel::Info,
            "WORKER_STOPPED",
            &format!("Worker {} stopped", self.id),
        );
        tracing::info!(worker = %self.id, "Worker stopped");
    }

    pub fn report_progress(&self) -> WorkerProgress {
        WorkerProgress {
            worker_id: self.id.clone(),
            role: self.role.kind(),
            status: self.status,
            current_task: self.current_task.as_ref().map(|t| t.id.clone()),
            thinking_steps: self.thinking.steps().len(),
            completed_tasks: self.completed_tasks.len(),
        }
    }

    pub fn completed_history(&self) -> impl Iterator<Item = &Task> {
        self.completed_tasks.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::TracingAudit;
    use crate::llm::OfflineInference;

    fn action_worker() -> Worker {
        let inference = Arc::new(OfflineInference::new());
        Worker::new(
            Role::Action(ActionWorker::new(inference)),
            Arc::new(TracingAudit),
        )
    }

    #[tokio::test]
    async fn run_without_task_is_a_usage_error() {
        let mut worker = action_worker();
        let err = worker.run().await.unwrap_err();
        assert!(matches!(err, WorkerError::NoTaskAssigned));
        assert_eq!(worker.status(), WorkerStatus::Idle);
    }

    #[tokio::test]
    async fn assign_then_run_completes() {
        let mut worker = action_worker();
        worker
            .assign_task(Task::new("t-1", "Implement the parser code"))
            .unwrap();
        assert_eq!(worker.status(), WorkerStatus::Working);
        assert_eq!(worker.current_task_id(), Some("t-1"));

        let task = worker.run().await.unwrap();
        assert_eq!(worker.status(), WorkerStatus::Completed);
        assert!(worker.current_task_id().is_none());
        assert!(task.completed_at.is_some());
        assert!(task.result.is_some());
        assert!(!worker.thinking_process().is_empty());
    }

    #[tokio::test]
    async fn assign_to_busy_worker_is_rejected() {
        let mut worker = action_worker();
        worker.assign_task(Task::new("t-1", "first")).unwrap();
        let err = worker.assign_task(Task::new("t-2", "second")).unwrap_err();
        assert!(matches!(
            err,
            WorkerError::NotIdle {
                status: WorkerStatus::Working
            }
        ));
    }

    #[tokio::test]
    async fn reset_returns_completed_worker_to_idle() {
        let mut worker = action_worker();
        worker.assign_task(Task::new("t-1", "write docs")).unwrap();
        worker.run().await.unwrap();
        assert!(worker.reset());
        assert_eq!(worker.status(), WorkerStatus::Idle);
    }

    #[tokio::test]
    async fn stopped_worker_cannot_reset() {
        let mut worker = action_worker();
        worker.stop();
        assert!(!worker.reset());
        assert_eq!(worker.status(), WorkerStatus::Stopped);
    }

    #[tokio::test]
    async fn completed_history_is_bounded() {
        let mut worker = action_worker();
        for i in 0..(MAX_COMPLETED_TASKS + 5) {
            worker
                .assign_task(Task::new(format!("t-{i}"), "write docs"))
                .unwrap();
            worker.run().await.unwrap();
            worker.reset();
        }
        assert_eq!(worker.completed_history().count(), MAX_COMPLETED_TASKS);
    }
}
