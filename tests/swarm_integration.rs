//! End-to-end swarm scenarios: pool orchestration, kill switch recovery, and
//! the permission gate.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use swarmguard::audit::TracingAudit;
use swarmguard::config::SwarmConfig;
use swarmguard::context::SwarmDeps;
use swarmguard::error::{InferenceError, WorkerError};
use swarmguard::kill_switch::{KillSwitch, TriggerReason};
use swarmguard::llm::{InferenceProvider, InferenceReply, InferenceRequest, OfflineInference};
use swarmguard::safety_gate::{ActionCategory, ConfirmationHandler, SafetyGate};
use swarmguard::swarm::worker::{Role, Worker, WorkerStatus};
use swarmguard::swarm::{ActionWorker, SwarmOrchestrator, Task};

/// Provider whose every call fails with a bare reason.
struct FailingInference {
    reason: &'static str,
}

#[async_trait]
impl InferenceProvider for FailingInference {
    async fn call(&self, _request: InferenceRequest) -> Result<InferenceReply, InferenceError> {
        Err(InferenceError::Upstream(self.reason.to_string()))
    }
}

fn offline_deps(max_workers: usize) -> SwarmDeps {
    let mut config = SwarmConfig::default();
    config.swarm.max_workers = max_workers;
    SwarmDeps::offline(config)
}

#[tokio::test]
async fn swarm_completes_all_tasks_with_bounded_pool() {
    let mut swarm = SwarmOrchestrator::new(offline_deps(3));
    swarm.spawn_architect();
    assert_eq!(swarm.spawn_workers(2).len(), 2);

    swarm.add_tasks(vec![
        Task::new("task-1", "Write a hello world function code"),
        Task::new("task-2", "Write tests for hello world"),
        Task::new("task-3", "Document the hello world function"),
    ]);

    let completed = swarm.run_until_complete().await;

    assert_eq!(completed.len() + swarm.failed().len(), 3);
    let status = swarm.monitor_progress();
    assert_eq!(status.pending_tasks, 0);
    assert_eq!(status.in_flight, 0);
    assert_eq!(status.completed_tasks + status.failed_tasks, 3);
}

#[tokio::test]
async fn failed_tasks_are_isolated_and_do_not_crash_the_pool() {
    let mut config = SwarmConfig::default();
    config.swarm.max_workers = 2;
    let mut deps = SwarmDeps::offline(config);
    deps.inference = Arc::new(FailingInference { reason: "upstream down" });

    // Both descriptions reach the inference collaborator on either role:
    // decomposition/assessment on the architect, generic round trips on the
    // action worker.
    let mut swarm = SwarmOrchestrator::new(deps);
    swarm.add_tasks(vec![
        Task::new("task-1", "Decompose the exporter rollout"),
        Task::new("task-2", "Assess security of the exporter"),
    ]);

    let completed = swarm.run_until_complete().await;

    // Inference failures become task errors; nothing escapes the loop.
    assert!(completed.is_empty());
    assert_eq!(swarm.failed().len(), 2);
    for task in swarm.failed() {
        assert_eq!(task.error.as_deref(), Some("upstream down"));
        assert!(task.completed_at.is_some());
    }
}

#[tokio::test]
async fn worker_failure_propagates_and_stamps_the_task() {
    let inference = Arc::new(FailingInference { reason: "boom" });
    let mut worker = Worker::new(
        Role::Action(ActionWorker::new(inference)),
        Arc::new(TracingAudit),
    );

    worker
        .assign_task(Task::new("t-1", "Implement code for the widget"))
        .unwrap();

    let err = worker.run().await.unwrap_err();
    match err {
        WorkerError::TaskFailed { task, reason } => {
            assert_eq!(reason, "boom");
            assert_eq!(task.error.as_deref(), Some("boom"));
            assert!(task.completed_at.is_some());
        }
        other => panic!("expected TaskFailed, got {other:?}"),
    }
    assert_eq!(worker.status(), WorkerStatus::Failed);
}

#[tokio::test]
async fn first_trigger_reason_survives_later_triggers() {
    let dir = tempfile::tempdir().unwrap();
    let switch = Arc::new(KillSwitch::new(
        dir.path().join(".kill_switch_flag"),
        Arc::new(TracingAudit),
    ));

    switch.arm();
    switch.trigger(TriggerReason::UserCommand, "stop");
    switch.trigger(TriggerReason::CpuThreshold, "");

    assert_eq!(switch.trigger_reason(), Some(TriggerReason::UserCommand));
    switch.disarm().await;
}

#[tokio::test]
async fn triggered_marker_is_visible_to_a_fresh_instance() {
    let dir = tempfile::tempdir().unwrap();
    let flag = dir.path().join(".kill_switch_flag");

    let instance_a = KillSwitch::new(&flag, Arc::new(TracingAudit));
    instance_a.trigger(TriggerReason::AnomalyDetected, "unexpected writes");

    // Instance B never triggered in-process but shares the marker path.
    let instance_b = KillSwitch::new(&flag, Arc::new(TracingAudit));
    assert!(instance_b.is_triggered());

    // Reset through B clears the marker for both.
    assert!(instance_b.reset());
    assert!(!flag.exists());
    assert!(!instance_b.is_triggered());
}

/// Handler that must not be reached.
struct PanickingHandler;

impl ConfirmationHandler for PanickingHandler {
    fn confirm(&self, prompt: &str) -> bool {
        panic!("confirmation handler invoked unexpectedly: {prompt}");
    }
}

#[test]
fn auto_approved_category_never_reaches_the_handler() {
    let mut config = SwarmConfig::default();
    config
        .safety_gate
        .auto_approve
        .insert("file_read".to_string(), true);

    let gate = SafetyGate::new(
        Arc::new(config),
        false,
        Box::new(PanickingHandler),
        Arc::new(TracingAudit),
    );

    assert!(gate.request_confirmation(ActionCategory::FileRead, "read manifest", None));
}

/// Handler that counts invocations and approves.
struct CountingHandler(Arc<AtomicUsize>);

impl ConfirmationHandler for CountingHandler {
    fn confirm(&self, _prompt: &str) -> bool {
        self.0.fetch_add(1, Ordering::SeqCst);
        true
    }
}

#[test]
fn unlisted_category_goes_through_confirmation() {
    let calls = Arc::new(AtomicUsize::new(0));
    let gate = SafetyGate::new(
        Arc::new(SwarmConfig::default()),
        false,
        Box::new(CountingHandler(Arc::clone(&calls))),
        Arc::new(TracingAudit),
    );

    assert!(gate.request_confirmation(ActionCategory::SystemCommand, "run linter", None));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(gate.stats().confirmations_granted, 1);
}

#[tokio::test]
async fn check_and_raise_aborts_a_worker_code_path() {
    let dir = tempfile::tempdir().unwrap();
    let switch = Arc::new(KillSwitch::new(
        dir.path().join(".kill_switch_flag"),
        Arc::new(TracingAudit),
    ));

    // A component that validates signatures before executing a skill.
    let run_unsigned_skill = || -> Result<(), swarmguard::error::Error> {
        switch.check_and_raise(TriggerReason::UnsignedSkill, "skill lacks signature")?;
        Ok(())
    };

    assert!(run_unsigned_skill().is_err());
    assert!(switch.is_triggered());

    // The swarm refuses further sensitive paths once halted.
    assert!(run_unsigned_skill().is_err());
    assert_eq!(switch.history().len(), 1);
}

#[tokio::test]
async fn offline_provider_keeps_the_swarm_runnable() {
    let provider = OfflineInference::new();
    let reply = provider
        .call(InferenceRequest::new(
            "Decompose the data migration",
            swarmguard::llm::ModelTier::Tier1Reasoning,
        ))
        .await
        .unwrap();
    assert!(!reply.content.is_empty());

    let mut swarm = SwarmOrchestrator::new(offline_deps(2));
    swarm.add_task(Task::new("task-1", "Assess security of the migration"));
    let completed = swarm.run_until_complete().await;
    assert_eq!(completed.len(), 1);
}
