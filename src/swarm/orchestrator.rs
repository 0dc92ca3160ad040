//! Swarm orchestration — worker pool, task queue, dispatch/collect loop.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::OwnedMutexGuard;
use tokio::task::JoinHandle;

use crate::audit::{entry, AuditLevel};
use crate::context::SwarmDeps;
use crate::error::WorkerError;
use crate::swarm::action_worker::ActionWorker;
use crate::swarm::architect::Architect;
use crate::swarm::task::Task;
use crate::swarm::worker::{Role, Worker, WorkerRole, WorkerStatus};

/// Control loop poll interval.
const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Point-in-time swarm status. Best-effort under concurrent mutation.
#[derive(Debug, Clone, Copy)]
pub struct SwarmStatus {
    pub total_workers: usize,
    pub active_workers: usize,
    pub pending_tasks: usize,
    pub in_flight: usize,
    pub completed_tasks: usize,
    pub failed_tasks: usize,
}

/// Information about one worker in the swarm.
#[derive(Debug, Clone)]
pub struct WorkerInfo {
    pub worker_id: String,
    pub role: WorkerRole,
    pub status: WorkerStatus,
    pub current_task: Option<String>,
}

/// Each worker lives in its own async mutex. The executing task holds the
/// guard for the whole run, which is what makes task ownership exclusive.
type WorkerCell = Arc<tokio::sync::Mutex<Worker>>;

struct InFlight {
    worker_id: String,
    handle: JoinHandle<Option<Task>>,
}

/// Owns the worker pool and the FIFO task queue; drives dispatch and result
/// collection from a single control task.
pub struct SwarmOrchestrator {
    deps: SwarmDeps,
    max_workers: usize,
    workers: HashMap<String, WorkerCell>,
    architect_id: Option<String>,
    // Shared so producers on other tasks can enqueue concurrently.
    queue: Arc<Mutex<VecDeque<Task>>>,
    handles: HashMap<String, InFlight>,
    completed: Vec<Task>,
    failed: Vec<Task>,
    running: bool,
}

impl SwarmOrchestrator {
    pub fn new(deps: SwarmDeps) -> Self {
        let max_workers = deps.config.swarm.max_workers.max(1);
        Self {
            deps,
            max_workers,
            workers: HashMap::new(),
            architect_id: None,
            queue: Arc::new(Mutex::new(VecDeque::new())),
            handles: HashMap::new(),
            completed: Vec::new(),
            failed: Vec::new(),
            running: false,
        }
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    fn log_audit(&self, level: AuditLevel, action: &str, details: &str) {
        self.deps
            .audit
            .log(entry(level, "SwarmOrchestrator", action, details));
    }

    /// Spawn the architect. Idempotent: at most one per orchestrator.
    pub fn spawn_architect(&mut self) -> String {
        if let Some(ref id) = self.architect_id {
            tracing::warn!("Architect already exists");
            return id.clone();
        }

        let worker = Worker::new(
            Role::Architect(Architect::new(Arc::clone(&self.deps.inference))),
            Arc::clone(&self.deps.audit),
        );
        let id = worker.id().to_string();
        self.workers
            .insert(id.clone(), Arc::new(tokio::sync::Mutex::new(worker)));
        self.architect_id = Some(id.clone());

        self.log_audit(
            AuditLevel::Info,
            "ARCHITECT_SPAWNED",
            &format!("Architect {id} created"),
        );
        tracing::info!(worker = %id, "Spawned architect");
        id
    }

    /// Spawn up to `count` action workers, bounded so the pool never exceeds
    /// `max_workers`. Returns the ids actually created.
    pub fn spawn_workers(&mut self, count: usize) -> Vec<String> {
        let mut spawned = Vec::new();

        for _ in 0..count {
            if self.workers.len() >= self.max_workers {
                tracing::warn!(max_workers = self.max_workers, "Max workers reached");
                break;
            }

            let worker = Worker::new(
                Role::Action(ActionWorker::new(Arc::clone(&self.deps.inference))),
                Arc::clone(&self.deps.audit),
            );
            let id = worker.id().to_string();
            self.workers
                .insert(id.clone(), Arc::new(tokio::sync::Mutex::new(worker)));

            self.log_audit(
                AuditLevel::Info,
                "WORKER_SPAWNED",
                &format!("Action worker {id} created"),
            );
            spawned.push(id);
        }

        tracing::info!(count = spawned.len(), "Spawned workers");
        spawned
    }

    /// Enqueue a task. Safe to call from any task or thread.
    pub fn add_task(&self, task: Task) {
        self.log_audit(
            AuditLevel::Info,
            "TASK_QUEUED",
            &format!("Task {}: {:.50}", task.id, task.description),
        );
        tracing::info!(task = %task.id, "Task added to queue");

        let mut queue = self.queue.lock().unwrap_or_else(|e| e.into_inner());
        queue.push_back(task);
    }

    /// Enqueue several tasks in order.
    pub fn add_tasks(&self, tasks: Vec<Task>) {
        for task in tasks {
            self.add_task(task);
        }
    }

    fn pop_task(&self) -> Option<Task> {
        self.queue
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
    }

    pub fn pending_tasks(&self) -> usize {
        self.queue.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn in_flight(&self) -> usize {
        self.handles.len()
    }

    /// Find an idle worker and take its guard. Executing workers hold their
    /// own guard, so `try_lock` skips them without blocking.
    fn acquire_idle_worker(&self) -> Option<(String, OwnedMutexGuard<Worker>)> {
        for (id, cell) in &self.workers {
            if let Ok(guard) = Arc::clone(cell).try_lock_owned() {
                if guard.status() == WorkerStatus::Idle {
                    return Some((id.clone(), guard));
                }
            }
        }
        None
    }

    /// Pair idle workers with queued tasks until either runs out. Dispatches
    /// exactly min(#idle, #queued) tasks; the rest stay queued for a later
    /// call. Returns the number dispatched.
    pub fn distribute_tasks(&mut self) -> usize {
        self.log_audit(
            AuditLevel::Info,
            "DISTRIBUTING_TASKS",
            &format!("Queue size: {}", self.pending_tasks()),
        );

        let mut dispatched = 0;

        loop {
            let Some((worker_id, mut guard)) = self.acquire_idle_worker() else {
                break;
            };
            let Some(task) = self.pop_task() else {
                break;
            };

            let task_id = task.id.clone();
            if let Err(e) = guard.assign_task(task) {
                // Unreachable for a guard just verified idle.
                tracing::error!(worker = %worker_id, error = %e, "Assignment rejected");
                continue;
            }

            let handle = tokio::spawn(async move {
                let mut worker = guard;
                match worker.run().await {
                    Ok(task) => Some(task),
                    Err(WorkerError::TaskFailed { task, reason }) => {
                        tracing::warn!(
                            worker = %worker.id(),
                            task = %task.id,
                            error = %reason,
                            "Worker failed on task"
                        );
                        Some(*task)
                    }
                    Err(e) => {
                        tracing::error!(worker = %worker.id(), error = %e, "Worker run failed");
                        None
                    }
                }
            });

            self.handles.insert(
                task_id,
                InFlight {
                    worker_id,
                    handle,
                },
            );
            dispatched += 1;
        }

        tracing::info!(dispatched, "Distributed tasks");
        dispatched
    }

    /// Collect finished executions, routing each task into the completed or
    /// failed list and returning the worker to idle. Only touches handles
    /// that have already finished, so it is safe to call repeatedly.
    pub async fn collect_results(&mut self) -> Vec<Task> {
        let finished: Vec<String> = self
            .handles
            .iter()
            .filter(|(_, inflight)| inflight.handle.is_finished())
            .map(|(task_id, _)| task_id.clone())
            .collect();

        let batch: Vec<(String, InFlight)> = finished
            .into_iter()
            .filter_map(|task_id| {
                self.handles
                    .remove(&task_id)
                    .map(|inflight| (task_id, inflight))
            })
            .collect();

        let joined = join_all(batch.into_iter().map(|(task_id, inflight)| async move {
            (task_id, inflight.worker_id, inflight.handle.await)
        }))
        .await;

        let mut newly_completed = Vec::new();

        for (task_id, worker_id, outcome) in joined {
            match outcome {
                Ok(Some(task)) => {
                    if task.is_failed() {
                        self.failed.push(task);
                    } else {
                        self.completed.push(task.clone());
                        newly_completed.push(task);
                    }
                }
                Ok(None) => {
                    tracing::error!(task = %task_id, "Execution finished without a task");
                }
                Err(e) => {
                    tracing::error!(task = %task_id, error = %e, "Execution handle failed");
                }
            }

            // Worker reuse: finished workers go back to idle for the next
            // dispatch round.
            if let Some(cell) = self.workers.get(&worker_id) {
                let mut worker = cell.lock().await;
                if worker.reset() {
                    tracing::debug!(worker = %worker_id, "Worker returned to idle");
                }
            }
        }

        newly_completed
    }

    /// Ensure the pool exists and mark the orchestrator running.
    pub fn start(&mut self) {
        if self.running {
            return;
        }
        self.running = true;

        if self.workers.is_empty() {
            self.spawn_architect();
            self.spawn_workers(self.max_workers.saturating_sub(1));
        }

        self.log_audit(
            AuditLevel::Info,
            "ORCHESTRATOR_STARTED",
            &format!("Max workers: {}", self.max_workers),
        );
        tracing::info!("Orchestrator started");
    }

    /// Stop the orchestrator. Cooperative and non-preemptive: in-flight
    /// executions are not interrupted. With `wait`, outstanding results are
    /// drained into the completed/failed lists first.
    pub async fn stop(&mut self, wait: bool) {
        self.running = false;

        if wait {
            while !self.handles.is_empty() {
                self.collect_results().await;
                if !self.handles.is_empty() {
                    tokio::time::sleep(POLL_INTERVAL).await;
                }
            }
        } else {
            // Detach: results of still-running executions are dropped.
            self.handles.clear();
        }

        for cell in self.workers.values() {
            if let Ok(mut worker) = cell.try_lock() {
                worker.stop();
            }
        }

        self.log_audit(
            AuditLevel::Info,
            "ORCHESTRATOR_STOPPED",
            &format!(
                "Completed: {}, Failed: {}",
                self.completed.len(),
                self.failed.len()
            ),
        );
        tracing::info!("Orchestrator stopped");
    }

    /// Run until the queue is drained and every execution has been collected,
    /// then stop. Returns the completed list.
    pub async fn run_until_complete(&mut self) -> Vec<Task> {
        self.start();

        while self.pending_tasks() > 0 || !self.handles.is_empty() {
            self.distribute_tasks();
            self.collect_results().await;
            tokio::time::sleep(POLL_INTERVAL).await;
        }

        self.stop(true).await;
        self.completed.clone()
    }

    /// Best-effort snapshot of swarm progress.
    pub fn monitor_progress(&self) -> SwarmStatus {
        let mut active = 0;
        for cell in self.workers.values() {
            match cell.try_lock() {
                // A locked cell is a worker mid-execution.
                Err(_) => active += 1,
                Ok(worker) => {
                    if worker.status() == WorkerStatus::Working {
                        active += 1;
                    }
                }
            }
        }

        SwarmStatus {
            total_workers: self.workers.len(),
            active_workers: active,
            pending_tasks: self.pending_tasks(),
            in_flight: self.handles.len(),
            completed_tasks: self.completed.len(),
            failed_tasks: self.failed.len(),
        }
    }

    /// Best-effort view of every worker. Workers mid-execution are reported
    /// as working on the task their handle tracks.
    pub fn worker_info(&self) -> Vec<WorkerInfo> {
        let task_by_worker: HashMap<&str, &str> = self
            .handles
            .iter()
            .map(|(task_id, inflight)| (inflight.worker_id.as_str(), task_id.as_str()))
            .collect();

        self.workers
            .iter()
            .map(|(id, cell)| match cell.try_lock() {
                Ok(worker) => WorkerInfo {
                    worker_id: id.clone(),
                    role: worker.role(),
                    status: worker.status(),
                    current_task: worker.current_task_id().map(str::to_string),
                },
                Err(_) => WorkerInfo {
                    worker_id: id.clone(),
                    role: if Some(id) == self.architect_id.as_ref() {
                        WorkerRole::Architect
                    } else {
                        WorkerRole::Action
                    },
                    status: WorkerStatus::Working,
                    current_task: task_by_worker.get(id.as_str()).map(|t| t.to_string()),
                },
            })
            .collect()
    }

    pub fn completed(&self) -> &[Task] {
        &self.completed
    }

    pub fn failed(&self) -> &[Task] {
        &self.failed
    }
}
