//! Enrollment audit trail
//!
//! Enrolling and revoking biometric descriptors are privileged actions,
//! so each one is recorded with who did it, to whom, and when. Entries
//! go to a JSONL file in production; tests use the in-memory sink.

use crate::domain::types::EmployeeId;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Enroll,
    Revoke,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Enroll => "enroll",
            AuditAction::Revoke => "revoke",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Epoch milliseconds
    pub at: u64,
    /// Operator who performed the action
    pub actor: String,
    pub action: AuditAction,
    pub employee_id: EmployeeId,
    /// Action-specific context (replaced flag, descriptor dimension, ...)
    pub metadata: serde_json::Value,
}

pub trait AuditSink: Send + Sync {
    fn append(&self, entry: &AuditEntry) -> std::io::Result<()>;
}

/// Audit writer backed by a JSONL file
pub struct JsonlAuditSink {
    file_path: String,
}

impl JsonlAuditSink {
    pub fn new(file_path: &str) -> Self {
        info!(file_path = %file_path, "audit_sink_initialized");
        Self { file_path: file_path.to_string() }
    }

    fn append_line(&self, line: &str) -> std::io::Result<()> {
        let path = Path::new(&self.file_path);

        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut file = OpenOptions::new().create(true).append(true).open(path)?;

        writeln!(file, "{}", line)?;
        debug!(file = %self.file_path, bytes = %line.len(), "audit_written");

        Ok(())
    }
}

impl AuditSink for JsonlAuditSink {
    fn append(&self, entry: &AuditEntry) -> std::io::Result<()> {
        let json = serde_json::to_string(entry)?;
        self.append_line(&json)?;
        info!(
            action = %entry.action.as_str(),
            actor = %entry.actor,
            employee_id = %entry.employee_id,
            "audit_recorded"
        );
        Ok(())
    }
}

/// Collects entries in memory for assertions
pub struct MemoryAuditSink {
    entries: Mutex<Vec<AuditEntry>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self { entries: Mutex::new(Vec::new()) }
    }

    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries.lock().clone()
    }
}

impl Default for MemoryAuditSink {
    fn default() -> Self {
        Self::new()
    }
}

impl AuditSink for MemoryAuditSink {
    fn append(&self, entry: &AuditEntry) -> std::io::Result<()> {
        self.entries.lock().push(entry.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::event::epoch_ms;
    use std::fs;
    use tempfile::tempdir;

    fn entry(action: AuditAction) -> AuditEntry {
        AuditEntry {
            at: epoch_ms(),
            actor: "hr-operator".to_string(),
            action,
            employee_id: EmployeeId::new("emp-001"),
            metadata: serde_json::json!({"replaced": false}),
        }
    }

    #[test]
    fn test_jsonl_sink_writes_valid_lines() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        let sink = JsonlAuditSink::new(path.to_str().unwrap());

        sink.append(&entry(AuditAction::Enroll)).unwrap();
        sink.append(&entry(AuditAction::Revoke)).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["action"], "enroll");
        assert_eq!(first["actor"], "hr-operator");
        assert_eq!(first["employee_id"], "emp-001");
        let second: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second["action"], "revoke");
    }

    #[test]
    fn test_jsonl_sink_creates_parent_directories() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("logs").join("audit.jsonl");
        let sink = JsonlAuditSink::new(nested.to_str().unwrap());

        sink.append(&entry(AuditAction::Enroll)).unwrap();
        assert!(nested.exists());
    }

    #[test]
    fn test_memory_sink_records_in_order() {
        let sink = MemoryAuditSink::new();
        sink.append(&entry(AuditAction::Enroll)).unwrap();
        sink.append(&entry(AuditAction::Revoke)).unwrap();

        let entries = sink.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].action, AuditAction::Enroll);
        assert_eq!(entries[1].action, AuditAction::Revoke);
    }

    #[test]
    fn test_audit_action_as_str() {
        assert_eq!(AuditAction::Enroll.as_str(), "enroll");
        assert_eq!(AuditAction::Revoke.as_str(), "revoke");
    }
}
