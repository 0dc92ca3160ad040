//! Shared dependencies, built once and threaded through the swarm.
//!
//! There are no global accessors: everything that used to be reachable as a
//! process-wide singleton (kill switch, inference client, audit trail) is a
//! field here, injected at construction.

use std::sync::Arc;

use crate::audit::{AuditSink, TracingAudit};
use crate::config::SwarmConfig;
use crate::kill_switch::KillSwitch;
use crate::llm::{InferenceProvider, OfflineInference};
use crate::safety_gate::{SafetyGate, StdinConfirmation};

/// Shared dependencies for the orchestrator, its workers, and the gates.
#[derive(Clone)]
pub struct SwarmDeps {
    pub config: Arc<SwarmConfig>,
    pub inference: Arc<dyn InferenceProvider>,
    pub audit: Arc<dyn AuditSink>,
    pub kill_switch: Arc<KillSwitch>,
    pub safety: Arc<SafetyGate>,
}

impl SwarmDeps {
    pub fn new(
        config: Arc<SwarmConfig>,
        inference: Arc<dyn InferenceProvider>,
        audit: Arc<dyn AuditSink>,
        kill_switch: Arc<KillSwitch>,
        safety: Arc<SafetyGate>,
    ) -> Self {
        Self {
            config,
            inference,
            audit,
            kill_switch,
            safety,
        }
    }

    /// Fully offline wiring: canned inference, tracing audit, interactive
    /// confirmations. Used by the demo path and most tests.
    pub fn offline(config: SwarmConfig) -> Self {
        let config = Arc::new(config);
        let audit: Arc<dyn AuditSink> = Arc::new(TracingAudit);
        let kill_switch = Arc::new(KillSwitch::new(
            config.kill_switch_flag_file.clone(),
            Arc::clone(&audit),
        ));
        let safety = Arc::new(SafetyGate::new(
            Arc::clone(&config),
            false,
            Box::new(StdinConfirmation),
            Arc::clone(&audit),
        ));
        Self {
            config,
            inference: Arc::new(OfflineInference::new()),
            audit,
            kill_switch,
            safety,
        }
    }
}
