//! Append-only audit trail for swarm actions.
//!
//! The sink is best-effort by contract: a failed or absent sink must never
//! affect core correctness, so every write error is swallowed after a
//! `tracing` warning.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

use chrono::Utc;

/// Audit log levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditLevel {
    Info,
    Warn,
    Error,
    Security,
    Audit,
}

impl AuditLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "INFO",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
            Self::Security => "SECURITY",
            Self::Audit => "AUDIT",
        }
    }
}

impl std::fmt::Display for AuditLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single audit entry.
#[derive(Debug, Clone)]
pub struct AuditEntry {
    pub timestamp: chrono::DateTime<Utc>,
    pub level: AuditLevel,
    pub agent: String,
    pub action: String,
    pub details: String,
    pub outcome: Option<String>,
}

/// Fire-and-forget audit sink.
pub trait AuditSink: Send + Sync {
    fn log(&self, entry: AuditEntry);
}

/// Convenience constructor used by every component.
pub fn entry(level: AuditLevel, agent: &str, action: &str, details: &str) -> AuditEntry {
    AuditEntry {
        timestamp: Utc::now(),
        level,
        agent: agent.to_string(),
        action: action.to_string(),
        details: details.to_string(),
        outcome: None,
    }
}

/// Audit sink that forwards entries to `tracing`. The in-process default.
pub struct TracingAudit;

impl AuditSink for TracingAudit {
    fn log(&self, entry: AuditEntry) {
        match entry.level {
            AuditLevel::Error | AuditLevel::Security => tracing::warn!(
                agent = %entry.agent,
                action = %entry.action,
                level = %entry.level,
                "{}",
                entry.details
            ),
            _ => tracing::info!(
                agent = %entry.agent,
                action = %entry.action,
                "{}",
                entry.details
            ),
        }
    }
}

/// Audit sink appending Markdown entries to a single file.
///
/// The header is written once, when the file is first created. Entries are
/// never rewritten.
pub struct FileAudit {
    path: PathBuf,
    // Serializes appends from concurrent components.
    file: Mutex<()>,
}

impl FileAudit {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let sink = Self {
            path: path.into(),
            file: Mutex::new(()),
        };
        sink.ensure_header();
        sink
    }

    fn ensure_header(&self) {
        if self.path.exists() {
            return;
        }
        if let Some(parent) = self.path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let header = format!(
            "# Swarmguard Audit Log\n\n\
             > Created: {}\n\
             > Do not modify existing entries.\n\n\
             Levels: INFO | WARN | ERROR | SECURITY | AUDIT\n\n\
             ---\n\n",
            Utc::now().format("%Y-%m-%d")
        );
        if let Err(e) = std::fs::write(&self.path, header) {
            tracing::warn!(path = %self.path.display(), error = %e, "Failed to create audit log");
        }
    }

    fn format_entry(entry: &AuditEntry) -> String {
        let mut lines = format!(
            "### {} | {} | {} | {}\n- {}\n",
            entry.timestamp.to_rfc3339(),
            entry.level,
            entry.agent,
            entry.action,
            entry.details
        );
        if let Some(ref outcome) = entry.outcome {
            lines.push_str(&format!("- Result: {outcome}\n"));
        }
        lines.push('\n');
        lines
    }
}

impl AuditSink for FileAudit {
    fn log(&self, entry: AuditEntry) {
        let _guard = self.file.lock().unwrap_or_else(|e| e.into_inner());
        let result = std::fs::OpenOptions::new()
            .append(true)
            .create(true)
            .open(&self.path)
            .and_then(|mut f| f.write_all(Self::format_entry(&entry).as_bytes()));

        if let Err(e) = result {
            tracing::warn!(path = %self.path.display(), error = %e, "Audit write failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_audit_creates_header_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit_log.md");

        let sink = FileAudit::new(&path);
        sink.log(entry(AuditLevel::Info, "Test", "FIRST", "first entry"));

        // A second sink over the same file must not rewrite the header.
        let sink2 = FileAudit::new(&path);
        sink2.log(entry(AuditLevel::Security, "Test", "SECOND", "second entry"));

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.matches("# Swarmguard Audit Log").count(), 1);
        assert!(contents.contains("FIRST"));
        assert!(contents.contains("SECOND"));
        assert!(contents.contains("SECURITY"));
    }

    #[test]
    fn entry_outcome_rendered() {
        let mut e = entry(AuditLevel::Audit, "Gate", "CHECK", "details");
        e.outcome = Some("granted".to_string());
        let text = FileAudit::format_entry(&e);
        assert!(text.contains("- Result: granted"));
    }

    #[test]
    fn unwritable_path_is_swallowed() {
        let sink = FileAudit::new("/nonexistent-root-dir/audit.md");
        // Must not panic.
        sink.log(entry(AuditLevel::Info, "Test", "WRITE", "ignored"));
    }
}
