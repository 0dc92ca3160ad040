//! Permission and confirmation gate for sensitive actions.

use std::collections::HashSet;
use std::io::BufRead;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};

use crate::audit::{entry, AuditLevel, AuditSink};
use crate::config::SwarmConfig;

/// Categories of actions that may require permission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionCategory {
    FileRead,
    FileWrite,
    FileDelete,
    NetworkRequest,
    SystemCommand,
    SkillCreation,
    SkillLoading,
    GitOperations,
    PackageInstallation,
    DockerOperations,
    MemoryModification,
    ConfigChange,
}

impl ActionCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FileRead => "file_read",
            Self::FileWrite => "file_write",
            Self::FileDelete => "file_delete",
            Self::NetworkRequest => "network_request",
            Self::SystemCommand => "system_command",
            Self::SkillCreation => "skill_creation",
            Self::SkillLoading => "skill_loading",
            Self::GitOperations => "git_operations",
            Self::PackageInstallation => "package_installation",
            Self::DockerOperations => "docker_operations",
            Self::MemoryModification => "memory_modification",
            Self::ConfigChange => "config_change",
        }
    }
}

impl std::fmt::Display for ActionCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a permission check.
#[derive(Debug, Clone)]
pub struct PermissionResult {
    pub allowed: bool,
    pub reason: String,
    pub requires_confirmation: bool,
    pub confirmation_message: Option<String>,
}

/// Pluggable confirmation capability. May block on a human.
pub trait ConfirmationHandler: Send + Sync {
    fn confirm(&self, prompt: &str) -> bool;
}

/// Default handler: blocking interactive yes/no read on stdin.
pub struct StdinConfirmation;

impl ConfirmationHandler for StdinConfirmation {
    fn confirm(&self, prompt: &str) -> bool {
        eprint!("{prompt} [y/N]: ");
        let mut line = String::new();
        match std::io::stdin().lock().read_line(&mut line) {
            Ok(_) => matches!(line.trim().to_lowercase().as_str(), "y" | "yes"),
            Err(_) => false,
        }
    }
}

/// Permission check statistics.
#[derive(Debug, Clone, Copy, Default)]
pub struct GateStats {
    pub total_checks: u64,
    pub allowed: u64,
    pub denied: u64,
    pub confirmations_requested: u64,
    pub confirmations_granted: u64,
}

#[derive(Default)]
struct GateState {
    blocked: HashSet<ActionCategory>,
    allowed: HashSet<ActionCategory>,
    stats: GateStats,
}

/// Permission/confirmation gate. Override sets and statistics are in-process
/// only — nothing survives a restart.
pub struct SafetyGate {
    config: Arc<SwarmConfig>,
    bypass_mode: bool,
    handler: Box<dyn ConfirmationHandler>,
    audit: Arc<dyn AuditSink>,
    state: Mutex<GateState>,
}

impl SafetyGate {
    /// `bypass` short-circuits every check — for testing only. The
    /// `SWARMGUARD_BYPASS` environment variable forces it on.
    pub fn new(
        config: Arc<SwarmConfig>,
        bypass: bool,
        handler: Box<dyn ConfirmationHandler>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        let env_bypass = std::env::var("SWARMGUARD_BYPASS")
            .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);

        Self {
            config,
            bypass_mode: bypass || env_bypass,
            handler,
            audit,
            state: Mutex::new(GateState::default()),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, GateState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn log_audit(&self, level: AuditLevel, action: &str, details: &str) {
        self.audit.log(entry(level, "SafetyGate", action, details));
    }

    pub fn is_bypass_mode(&self) -> bool {
        self.bypass_mode
    }

    /// Check whether an action is allowed. First matching rule wins:
    /// bypass, blocked override, allowed override, configuration default.
    pub fn check_permission(
        &self,
        category: ActionCategory,
        details: &str,
        resource: Option<&str>,
    ) -> PermissionResult {
        let mut state = self.lock_state();
        state.stats.total_checks += 1;

        if self.bypass_mode {
            state.stats.allowed += 1;
            tracing::warn!(%category, "BYPASS MODE: allowing action");
            return PermissionResult {
                allowed: true,
                reason: "Bypass mode enabled".to_string(),
                requires_confirmation: false,
                confirmation_message: None,
            };
        }

        if state.blocked.contains(&category) {
            state.stats.denied += 1;
            drop(state);
            self.log_audit(
                AuditLevel::Security,
                "PERMISSION_DENIED",
                &format!("Action {category} is blocked: {details}"),
            );
            return PermissionResult {
                allowed: false,
                reason: format!("Action type {category} is blocked"),
                requires_confirmation: false,
                confirmation_message: None,
            };
        }

        if state.allowed.contains(&category) {
            state.stats.allowed += 1;
            return PermissionResult {
                allowed: true,
                reason: "Action explicitly allowed".to_string(),
                requires_confirmation: false,
                confirmation_message: None,
            };
        }

        if !self.config.requires_confirmation(category.as_str()) {
            state.stats.allowed += 1;
            drop(state);
            self.log_audit(
                AuditLevel::Info,
                "PERMISSION_GRANTED",
                &format!("{category}: {details}"),
            );
            return PermissionResult {
                allowed: true,
                reason: "Auto-approved by configuration".to_string(),
                requires_confirmation: false,
                confirmation_message: None,
            };
        }

        let mut message = format!("Action required: {category}\nDetails: {details}");
        if let Some(resource) = resource {
            message.push_str(&format!("\nResource: {resource}"));
        }

        state.stats.confirmations_requested += 1;
        PermissionResult {
            allowed: false,
            reason: "Requires user confirmation".to_string(),
            requires_confirmation: true,
            confirmation_message: Some(message),
        }
    }

    /// Check permission and, when confirmation is required, put the question
    /// to the confirmation handler. Denial is a `false`, never an error.
    pub fn request_confirmation(
        &self,
        category: ActionCategory,
        details: &str,
        resource: Option<&str>,
    ) -> bool {
        let result = self.check_permission(category, details, resource);

        if result.allowed {
            return true;
        }
        if !result.requires_confirmation {
            return false;
        }

        let Some(message) = result.confirmation_message else {
            return false;
        };

        if self.handler.confirm(&message) {
            let mut state = self.lock_state();
            state.stats.confirmations_granted += 1;
            state.stats.allowed += 1;
            drop(state);
            self.log_audit(
                AuditLevel::Audit,
                "CONFIRMATION_GRANTED",
                &format!("{category}: {details}"),
            );
            true
        } else {
            self.lock_state().stats.denied += 1;
            self.log_audit(
                AuditLevel::Warn,
                "CONFIRMATION_DENIED",
                &format!("{category}: {details}"),
            );
            false
        }
    }

    /// Block a category outright.
    pub fn block_action(&self, category: ActionCategory, reason: &str) {
        self.lock_state().blocked.insert(category);
        tracing::warn!(%category, reason, "Action blocked");
        self.log_audit(
            AuditLevel::Security,
            "ACTION_BLOCKED",
            &format!("{category}: {reason}"),
        );
    }

    pub fn unblock_action(&self, category: ActionCategory) {
        self.lock_state().blocked.remove(&category);
        tracing::info!(%category, "Action unblocked");
    }

    /// Explicitly allow a category, overriding configuration.
    pub fn allow_action(&self, category: ActionCategory) {
        self.lock_state().allowed.insert(category);
        tracing::info!(%category, "Action explicitly allowed");
    }

    pub fn disallow_action(&self, category: ActionCategory) {
        self.lock_state().allowed.remove(&category);
        tracing::info!(%category, "Action explicit allowance removed");
    }

    pub fn stats(&self) -> GateStats {
        self.lock_state().stats
    }

    pub fn reset_stats(&self) {
        self.lock_state().stats = GateStats::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::TracingAudit;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Handler that records invocations and answers a fixed way.
    struct ScriptedHandler {
        answer: bool,
        calls: Arc<AtomicUsize>,
    }

    impl ConfirmationHandler for ScriptedHandler {
        fn confirm(&self, _prompt: &str) -> bool {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.answer
        }
    }

    fn gate_with(
        config: SwarmConfig,
        bypass: bool,
        answer: bool,
    ) -> (SafetyGate, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let gate = SafetyGate::new(
            Arc::new(config),
            bypass,
            Box::new(ScriptedHandler {
                answer,
                calls: Arc::clone(&calls),
            }),
            Arc::new(TracingAudit),
        );
        (gate, calls)
    }

    #[test]
    fn bypass_allows_everything_without_confirmation() {
        let (gate, calls) = gate_with(SwarmConfig::default(), true, false);

        for category in [
            ActionCategory::FileDelete,
            ActionCategory::SystemCommand,
            ActionCategory::DockerOperations,
        ] {
            let result = gate.check_permission(category, "anything", None);
            assert!(result.allowed);
            assert!(!result.requires_confirmation);
        }
        assert!(gate.request_confirmation(ActionCategory::FileDelete, "rm -rf", None));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn blocked_category_is_denied_before_overrides() {
        let (gate, _) = gate_with(SwarmConfig::default(), false, true);
        gate.allow_action(ActionCategory::NetworkRequest);
        gate.block_action(ActionCategory::NetworkRequest, "maintenance window");

        let result = gate.check_permission(ActionCategory::NetworkRequest, "GET /", None);
        assert!(!result.allowed);
        assert!(!result.requires_confirmation);
        assert!(!gate.request_confirmation(ActionCategory::NetworkRequest, "GET /", None));
    }

    #[test]
    fn auto_approved_category_skips_the_handler() {
        let mut config = SwarmConfig::default();
        config
            .safety_gate
            .auto_approve
            .insert("file_read".to_string(), true);
        let (gate, calls) = gate_with(config, false, false);

        assert!(gate.request_confirmation(ActionCategory::FileRead, "read config", None));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn confirmation_flow_grants_and_denies() {
        let (gate, calls) = gate_with(SwarmConfig::default(), false, true);
        assert!(gate.request_confirmation(
            ActionCategory::SystemCommand,
            "run build",
            Some("cargo")
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let (denying, _) = gate_with(SwarmConfig::default(), false, false);
        assert!(!denying.request_confirmation(ActionCategory::SystemCommand, "run build", None));

        let stats = denying.stats();
        assert_eq!(stats.confirmations_requested, 1);
        assert_eq!(stats.confirmations_granted, 0);
        assert_eq!(stats.denied, 1);
    }

    #[test]
    fn unblock_and_disallow_restore_defaults() {
        let mut config = SwarmConfig::default();
        config
            .safety_gate
            .auto_approve
            .insert("git_operations".to_string(), true);
        let (gate, _) = gate_with(config, false, false);

        gate.block_action(ActionCategory::GitOperations, "freeze");
        assert!(!gate.check_permission(ActionCategory::GitOperations, "push", None).allowed);

        gate.unblock_action(ActionCategory::GitOperations);
        assert!(gate.check_permission(ActionCategory::GitOperations, "push", None).allowed);

        gate.allow_action(ActionCategory::ConfigChange);
        assert!(gate.check_permission(ActionCategory::ConfigChange, "edit", None).allowed);
        gate.disallow_action(ActionCategory::ConfigChange);
        let result = gate.check_permission(ActionCategory::ConfigChange, "edit", None);
        assert!(!result.allowed);
        assert!(result.requires_confirmation);
    }

    #[test]
    fn confirmation_prompt_includes_resource() {
        let (gate, _) = gate_with(SwarmConfig::default(), false, false);
        let result = gate.check_permission(
            ActionCategory::FileWrite,
            "write output",
            Some("/tmp/out.txt"),
        );
        let message = result.confirmation_message.unwrap();
        assert!(message.contains("file_write"));
        assert!(message.contains("/tmp/out.txt"));
    }

    #[test]
    fn stats_reset() {
        let (gate, _) = gate_with(SwarmConfig::default(), false, true);
        gate.check_permission(ActionCategory::FileRead, "read", None);
        assert_eq!(gate.stats().total_checks, 1);
        gate.reset_stats();
        assert_eq!(gate.stats().total_checks, 0);
    }
}
