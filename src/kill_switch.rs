//! Global halt interlock.
//!
//! Two independent axes: **armed** (a background monitor is watching trigger
//! conditions) and **triggered** (all operations must halt). The triggered
//! state is durable — a marker file on disk — so a freshly started process
//! observes a halt signaled before it existed.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::audit::{entry, AuditLevel, AuditSink};
use crate::error::KillSwitchError;

const DISARM_JOIN_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_MONITOR_INTERVAL: Duration = Duration::from_secs(5);

/// Reasons for triggering the kill switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TriggerReason {
    #[serde(rename = "unsigned_skill_execution")]
    UnsignedSkill,
    #[serde(rename = "signature_verification_failure")]
    SignatureFailure,
    #[serde(rename = "unauthorized_file_access")]
    UnauthorizedAccess,
    #[serde(rename = "user_command_stop_swarm")]
    UserCommand,
    #[serde(rename = "cpu_threshold_exceeded")]
    CpuThreshold,
    #[serde(rename = "memory_threshold_exceeded")]
    MemoryThreshold,
    #[serde(rename = "anomaly_detected")]
    AnomalyDetected,
    #[serde(rename = "manual_trigger")]
    Manual,
}

impl TriggerReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UnsignedSkill => "unsigned_skill_execution",
            Self::SignatureFailure => "signature_verification_failure",
            Self::UnauthorizedAccess => "unauthorized_file_access",
            Self::UserCommand => "user_command_stop_swarm",
            Self::CpuThreshold => "cpu_threshold_exceeded",
            Self::MemoryThreshold => "memory_threshold_exceeded",
            Self::AnomalyDetected => "anomaly_detected",
            Self::Manual => "manual_trigger",
        }
    }
}

impl std::fmt::Display for TriggerReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One kill switch event. History is append-only.
#[derive(Debug, Clone, Serialize)]
pub struct KillSwitchEvent {
    pub timestamp: DateTime<Utc>,
    pub reason: TriggerReason,
    pub details: String,
    pub recovered: bool,
}

/// Callback invoked on the first trigger. Must not call back into the switch.
pub type TriggerCallback = dyn Fn(TriggerReason) + Send + Sync;

/// Probe evaluated by the monitor each interval. Returning `Some` trips the
/// switch with that reason.
pub type TriggerProbe = dyn Fn() -> Option<(TriggerReason, String)> + Send + Sync;

#[derive(Default)]
struct KillState {
    armed: bool,
    triggered: bool,
    reason: Option<TriggerReason>,
    trigger_time: Option<DateTime<Utc>>,
    history: Vec<KillSwitchEvent>,
}

/// Shared core: everything the monitor task needs a handle on.
struct Inner {
    flag_file: PathBuf,
    state: Mutex<KillState>,
    on_trigger: Option<Box<TriggerCallback>>,
    probe: Option<Box<TriggerProbe>>,
    thresholds: std::collections::HashMap<String, crate::config::TriggerThreshold>,
    audit: Arc<dyn AuditSink>,
}

impl Inner {
    fn lock_state(&self) -> MutexGuard<'_, KillState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn log_audit(&self, action: &str, details: &str) {
        self.audit
            .log(entry(AuditLevel::Security, "KillSwitch", action, details));
    }

    /// Side effects of a first trigger, under the caller's lock. Returns
    /// whether this call performed the trigger.
    fn trigger_locked(&self, state: &mut KillState, reason: TriggerReason, details: &str) -> bool {
        if state.triggered {
            tracing::warn!(existing = ?state.reason, "Kill switch already triggered");
            return false;
        }

        let now = Utc::now();
        state.triggered = true;
        state.reason = Some(reason);
        state.trigger_time = Some(now);
        state.history.push(KillSwitchEvent {
            timestamp: now,
            reason,
            details: details.to_string(),
            recovered: false,
        });

        self.write_flag_file(reason, details, now);

        self.log_audit(
            "KILL_SWITCH_TRIGGERED",
            &format!("Reason: {reason}. {details}"),
        );
        tracing::error!(%reason, details, "KILL SWITCH TRIGGERED");
        true
    }

    /// First trigger wins: state change, marker file, history entry, and
    /// callback all happen exactly once.
    fn trigger(&self, reason: TriggerReason, details: &str) -> bool {
        let performed = {
            let mut state = self.lock_state();
            self.trigger_locked(&mut state, reason, details)
        };

        // Callback runs outside the lock so it can inspect the switch.
        if performed {
            if let Some(ref callback) = self.on_trigger {
                callback(reason);
            }
        }
        performed
    }

    fn write_flag_file(&self, reason: TriggerReason, details: &str, time: DateTime<Utc>) {
        let content = format!(
            "# Swarmguard Kill Switch Flag\n\n\
             TRIGGERED: {}\n\
             REASON: {reason}\n\
             DETAILS: {details}\n\n\
             This file indicates that the kill switch was triggered.\n\
             To reset, run: swarmguard reset\n",
            time.to_rfc3339()
        );

        if let Err(e) = std::fs::write(&self.flag_file, content) {
            // The in-memory trigger still holds; only durability is degraded.
            tracing::error!(path = %self.flag_file.display(), error = %e, "Failed to write flag file");
        } else {
            tracing::info!(path = %self.flag_file.display(), "Kill switch flag file created");
        }
    }

    /// Adopt a marker file written by another process instance.
    fn observe_flag_file(&self, state: &mut KillState) {
        if !state.triggered && self.flag_file.exists() {
            state.triggered = true;
            state.reason = Some(TriggerReason::Manual);
        }
    }

    /// Evaluate trigger conditions once. Called by the monitor.
    fn check_triggers(&self) {
        {
            let state = self.lock_state();
            if !state.armed || state.triggered {
                return;
            }
        }

        if let Some(ref probe) = self.probe {
            if let Some((reason, details)) = probe() {
                self.trigger(reason, &details);
                return;
            }
        }

        // Without a probe the configured thresholds are only reported, not
        // sampled — resource measurement belongs to the probe.
        if let Some(cpu) = self.thresholds.get(TriggerReason::CpuThreshold.as_str()) {
            tracing::debug!(
                threshold = cpu.threshold.unwrap_or(80),
                duration_seconds = cpu.duration_seconds.unwrap_or(60),
                "Checking CPU threshold"
            );
        }
    }
}

struct MonitorHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// Crash-recoverable halt interlock. Every state change goes through the one
/// mutex inside; clones of the switch share the same state.
pub struct KillSwitch {
    inner: Arc<Inner>,
    monitor: Mutex<Option<MonitorHandle>>,
    monitor_interval: Duration,
}

impl KillSwitch {
    pub fn new(flag_file: impl Into<PathBuf>, audit: Arc<dyn AuditSink>) -> Self {
        Self {
            inner: Arc::new(Inner {
                flag_file: flag_file.into(),
                state: Mutex::new(KillState::default()),
                on_trigger: None,
                probe: None,
                thresholds: std::collections::HashMap::new(),
                audit,
            }),
            monitor: Mutex::new(None),
            monitor_interval: DEFAULT_MONITOR_INTERVAL,
        }
    }

    fn inner_mut(&mut self) -> Option<&mut Inner> {
        Arc::get_mut(&mut self.inner)
    }

    /// Register the trigger callback. Construction-time only.
    pub fn with_callback(mut self, callback: Box<TriggerCallback>) -> Self {
        if let Some(inner) = self.inner_mut() {
            inner.on_trigger = Some(callback);
        }
        self
    }

    /// Register the monitor probe. Construction-time only.
    pub fn with_probe(mut self, probe: Box<TriggerProbe>) -> Self {
        if let Some(inner) = self.inner_mut() {
            inner.probe = Some(probe);
        }
        self
    }

    pub fn with_monitor_interval(mut self, interval: Duration) -> Self {
        self.monitor_interval = interval;
        self
    }

    /// Provide the configured trigger thresholds for the monitor to consult.
    /// Construction-time only; values are not validated here.
    pub fn with_thresholds(
        mut self,
        thresholds: std::collections::HashMap<String, crate::config::TriggerThreshold>,
    ) -> Self {
        if let Some(inner) = self.inner_mut() {
            inner.thresholds = thresholds;
        }
        self
    }

    /// Arm the switch and start the monitor. Idempotent.
    pub fn arm(&self) {
        {
            let mut state = self.inner.lock_state();
            if state.armed {
                tracing::warn!("Kill switch already armed");
                return;
            }
            state.armed = true;
        }

        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let inner = Arc::clone(&self.inner);
        let interval = self.monitor_interval;

        let task = tokio::spawn(async move {
            tracing::info!("Kill switch monitoring started");
            loop {
                tokio::select! {
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                    _ = tokio::time::sleep(interval) => {
                        inner.check_triggers();
                    }
                }
            }
            tracing::info!("Kill switch monitoring stopped");
        });

        *self.monitor.lock().unwrap_or_else(|e| e.into_inner()) = Some(MonitorHandle {
            shutdown: shutdown_tx,
            task,
        });

        tracing::info!("Kill switch ARMED");
        self.inner
            .log_audit("KILL_SWITCH_ARMED", "Kill switch monitoring started");
    }

    /// Disarm the switch, stopping and joining the monitor with a bounded
    /// timeout.
    pub async fn disarm(&self) {
        self.inner.lock_state().armed = false;

        let handle = self
            .monitor
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();

        if let Some(MonitorHandle { shutdown, task }) = handle {
            let _ = shutdown.send(true);
            if tokio::time::timeout(DISARM_JOIN_TIMEOUT, task).await.is_err() {
                tracing::warn!("Kill switch monitor did not stop within timeout");
            }
        }

        tracing::info!("Kill switch DISARMED");
        self.inner
            .log_audit("KILL_SWITCH_DISARMED", "Kill switch monitoring stopped");
    }

    /// First trigger wins. Returns whether this call performed the trigger.
    pub fn trigger(&self, reason: TriggerReason, details: &str) -> bool {
        self.inner.trigger(reason, details)
    }

    pub fn is_armed(&self) -> bool {
        self.inner.lock_state().armed
    }

    /// True once triggered — including when the durable marker exists on disk
    /// and this process never called `trigger()`.
    pub fn is_triggered(&self) -> bool {
        let mut state = self.inner.lock_state();
        self.inner.observe_flag_file(&mut state);
        state.triggered
    }

    pub fn trigger_reason(&self) -> Option<TriggerReason> {
        self.inner.lock_state().reason
    }

    pub fn trigger_time(&self) -> Option<DateTime<Utc>> {
        self.inner.lock_state().trigger_time
    }

    /// Reset after manual review. Returns false when nothing was triggered.
    pub fn reset(&self) -> bool {
        let mut state = self.inner.lock_state();
        self.inner.observe_flag_file(&mut state);

        if !state.triggered {
            tracing::info!("Kill switch not triggered, nothing to reset");
            return false;
        }

        if self.inner.flag_file.exists() {
            if let Err(e) = std::fs::remove_file(&self.inner.flag_file) {
                tracing::error!(
                    path = %self.inner.flag_file.display(),
                    error = %e,
                    "Failed to remove flag file"
                );
            }
        }

        if let Some(last) = state.history.last_mut() {
            last.recovered = true;
        }

        state.triggered = false;
        state.reason = None;
        state.trigger_time = None;
        drop(state);

        tracing::info!("Kill switch RESET");
        self.inner
            .log_audit("KILL_SWITCH_RESET", "Kill switch reset by user");
        true
    }

    /// Atomically signal-and-abort. If already triggered, the existing reason
    /// is reported; otherwise this call triggers. Always returns an error so
    /// the calling operation aborts either way.
    pub fn check_and_raise(
        &self,
        reason: TriggerReason,
        details: &str,
    ) -> Result<(), KillSwitchError> {
        let performed = {
            let mut state = self.inner.lock_state();
            self.inner.observe_flag_file(&mut state);

            if state.triggered {
                return Err(KillSwitchError::AlreadyTriggered {
                    reason: state.reason.unwrap_or(TriggerReason::Manual),
                });
            }

            self.inner.trigger_locked(&mut state, reason, details)
        };

        if performed {
            if let Some(ref callback) = self.inner.on_trigger {
                callback(reason);
            }
        }

        Err(KillSwitchError::Triggered {
            reason,
            details: details.to_string(),
        })
    }

    /// Copy of the event history.
    pub fn history(&self) -> Vec<KillSwitchEvent> {
        self.inner.lock_state().history.clone()
    }
}
