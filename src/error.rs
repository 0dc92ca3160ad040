//! Error types for swarmguard.

use crate::kill_switch::TriggerReason;
use crate::swarm::task::Task;
use crate::swarm::worker::WorkerStatus;

/// Top-level error type for the swarm.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Inference error: {0}")]
    Inference(#[from] InferenceError),

    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),

    #[error("Swarm error: {0}")]
    Swarm(#[from] SwarmError),

    #[error("Kill switch: {0}")]
    KillSwitch(#[from] KillSwitchError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {key}. {hint}")]
    MissingRequired { key: String, hint: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Inference collaborator errors.
///
/// These never escape the worker/orchestrator boundary uncaught — the
/// orchestrator converts them into the failing task's `error` field.
#[derive(Debug, thiserror::Error)]
pub enum InferenceError {
    #[error("Inference request to {endpoint} failed: {reason}")]
    RequestFailed { endpoint: String, reason: String },

    #[error("Invalid response from {model}: {reason}")]
    InvalidResponse { model: String, reason: String },

    #[error("Inference request exhausted {attempts} attempts: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },

    /// Opaque upstream failure, reported exactly as the collaborator phrased it.
    #[error("{0}")]
    Upstream(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Worker lifecycle errors.
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    /// Usage error: `run()` was invoked with no assigned task.
    #[error("no task assigned")]
    NoTaskAssigned,

    /// Usage error: a task was assigned to a worker that is not idle.
    #[error("worker is {status}, cannot accept a task")]
    NotIdle { status: WorkerStatus },

    /// The role logic raised while executing. The task comes back with its
    /// `error` field stamped so the orchestrator can route it to the failed
    /// list while the error itself still propagates to the caller of `run()`.
    #[error("task execution failed: {reason}")]
    TaskFailed { task: Box<Task>, reason: String },
}

/// Orchestrator errors.
#[derive(Debug, thiserror::Error)]
pub enum SwarmError {
    #[error("worker {id} not found")]
    WorkerNotFound { id: String },

    #[error("execution handle for task {task_id} lost: {reason}")]
    HandleLost { task_id: String, reason: String },
}

/// Kill switch errors — the one category designed to propagate and abort.
#[derive(Debug, thiserror::Error)]
pub enum KillSwitchError {
    #[error("kill switch already triggered: {reason}")]
    AlreadyTriggered { reason: TriggerReason },

    #[error("kill switch triggered: {reason}. {details}")]
    Triggered { reason: TriggerReason, details: String },
}

/// Result type alias for the swarm.
pub type Result<T> = std::result::Result<T, Error>;
