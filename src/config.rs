//! Configuration types.
//!
//! Loaded once from `swarm_config.json` at startup and read-only afterwards.
//! A missing file is not an error — defaults apply.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Model routing for one inference tier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelRouting {
    pub endpoint: String,
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

fn default_max_tokens() -> u32 {
    2048
}

fn default_temperature() -> f32 {
    0.5
}

/// Safety gate section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SafetyGateConfig {
    pub enabled: bool,
    /// Categories that require explicit confirmation. Anything not listed
    /// falls back to `auto_approve`, and failing that, to confirmation.
    pub confirmation_required: HashMap<String, bool>,
    /// Categories approved without asking.
    pub auto_approve: HashMap<String, bool>,
    pub timeout_seconds: u64,
}

impl Default for SafetyGateConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            confirmation_required: HashMap::new(),
            auto_approve: HashMap::new(),
            timeout_seconds: 300,
        }
    }
}

/// A single kill switch trigger threshold. Consumed by the monitor only —
/// values are not validated here.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TriggerThreshold {
    pub threshold: Option<u64>,
    pub duration_seconds: Option<u64>,
    pub action: Option<String>,
}

/// Kill switch section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KillSwitchConfig {
    pub enabled: bool,
    pub triggers: HashMap<String, TriggerThreshold>,
    pub recovery_mode: String,
    /// Monitor poll interval in seconds.
    pub monitor_interval_seconds: u64,
}

impl Default for KillSwitchConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            triggers: HashMap::new(),
            recovery_mode: "manual".to_string(),
            monitor_interval_seconds: 5,
        }
    }
}

/// Swarm orchestration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SwarmSection {
    pub max_workers: usize,
}

impl Default for SwarmSection {
    fn default() -> Self {
        Self { max_workers: 3 }
    }
}

/// Main configuration container.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SwarmConfig {
    pub version: String,
    pub system_name: String,
    pub model_routing: HashMap<String, ModelRouting>,
    pub safety_gate: SafetyGateConfig,
    pub kill_switch: KillSwitchConfig,
    pub swarm: SwarmSection,
    /// Path of the durable kill switch marker file.
    pub kill_switch_flag_file: PathBuf,
    /// Path of the append-only audit log.
    pub audit_file: PathBuf,
    pub log_file: String,
}

impl Default for SwarmConfig {
    fn default() -> Self {
        Self {
            version: "1.0.0".to_string(),
            system_name: "swarmguard".to_string(),
            model_routing: HashMap::new(),
            safety_gate: SafetyGateConfig::default(),
            kill_switch: KillSwitchConfig::default(),
            swarm: SwarmSection::default(),
            kill_switch_flag_file: PathBuf::from(".kill_switch_flag"),
            audit_file: PathBuf::from("audit_log.md"),
            log_file: "swarmguard.log".to_string(),
        }
    }
}

impl SwarmConfig {
    /// Load configuration from a JSON file. A missing file yields defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::warn!(path = %path.display(), "Config file not found, using defaults");
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)?;
        tracing::info!(path = %path.display(), "Configuration loaded");
        Ok(config)
    }

    /// Whether an action category requires user confirmation.
    ///
    /// Auto-approved categories never require confirmation; categories with an
    /// explicit `confirmation_required` entry follow it; everything else
    /// defaults to requiring confirmation.
    pub fn requires_confirmation(&self, category: &str) -> bool {
        if self
            .safety_gate
            .auto_approve
            .get(category)
            .copied()
            .unwrap_or(false)
        {
            return false;
        }
        self.safety_gate
            .confirmation_required
            .get(category)
            .copied()
            .unwrap_or(true)
    }

    /// Trigger thresholds for the kill switch monitor.
    pub fn kill_switch_triggers(&self) -> &HashMap<String, TriggerThreshold> {
        &self.kill_switch.triggers
    }

    /// Kill switch monitor poll interval.
    pub fn monitor_interval(&self) -> Duration {
        Duration::from_secs(self.kill_switch.monitor_interval_seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_file_missing() {
        let config = SwarmConfig::load(Path::new("/nonexistent/swarm_config.json")).unwrap();
        assert_eq!(config.swarm.max_workers, 3);
        assert!(config.safety_gate.enabled);
    }

    #[test]
    fn load_from_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("swarm_config.json");
        std::fs::write(
            &path,
            r#"{
                "swarm": {"max_workers": 5},
                "safety_gate": {"auto_approve": {"file_read": true}},
                "kill_switch": {"triggers": {"cpu_threshold_exceeded": {"threshold": 80, "duration_seconds": 60}}}
            }"#,
        )
        .unwrap();

        let config = SwarmConfig::load(&path).unwrap();
        assert_eq!(config.swarm.max_workers, 5);
        assert!(!config.requires_confirmation("file_read"));
        assert_eq!(
            config.kill_switch_triggers()["cpu_threshold_exceeded"].threshold,
            Some(80)
        );
    }

    #[test]
    fn unlisted_category_requires_confirmation() {
        let config = SwarmConfig::default();
        assert!(config.requires_confirmation("system_command"));
    }

    #[test]
    fn explicit_confirmation_required_false_is_honored() {
        let mut config = SwarmConfig::default();
        config
            .safety_gate
            .confirmation_required
            .insert("file_read".to_string(), false);
        assert!(!config.requires_confirmation("file_read"));
    }
}
