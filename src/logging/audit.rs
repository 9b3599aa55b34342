//! Audit logging
//!
//! Appends audit events as JSONL for offline review. Degraded ownership
//! validations bypass verification entirely, so every one of them must leave
//! a trace regardless of log level.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, warn};

/// Audit event types
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditKind {
    /// Ownership oracle fully unreachable; stake proceeded unverified
    DegradedValidation,
    /// A staked speedboost was replaced by a new one
    SpeedboostDisplaced,
    /// A staking or job entry beyond the unlocked count was dropped from
    /// the live view
    SlotEntryDropped,
}

/// One audit trail entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub timestamp: DateTime<Utc>,
    pub kind: AuditKind,
    pub account: String,
    /// Event-specific payload (asset ids, slot numbers, boosts)
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub details: serde_json::Value,
}

impl AuditEvent {
    pub fn new(kind: AuditKind, account: &str, details: serde_json::Value) -> Self {
        Self {
            timestamp: Utc::now(),
            kind,
            account: account.to_string(),
            details,
        }
    }
}

/// JSONL audit appender
///
/// Without a configured path, events still land in the tracing output.
pub struct AuditLogger {
    writer: Option<Arc<Mutex<BufWriter<std::fs::File>>>>,
}

impl AuditLogger {
    /// Create a logger appending to `path`, or tracing-only when `None`
    pub fn new(path: Option<PathBuf>) -> Self {
        let writer = path.and_then(|p| {
            match OpenOptions::new().create(true).append(true).open(&p) {
                Ok(file) => Some(Arc::new(Mutex::new(BufWriter::new(file)))),
                Err(e) => {
                    error!("Failed to open audit log {:?}: {}", p, e);
                    None
                }
            }
        });
        Self { writer }
    }

    /// Record an event; never fails the calling operation
    pub async fn record(&self, event: AuditEvent) {
        warn!(
            kind = ?event.kind,
            account = %event.account,
            details = %event.details,
            "audit event"
        );

        if let Some(ref writer) = self.writer {
            let line = match serde_json::to_string(&event) {
                Ok(line) => line,
                Err(e) => {
                    error!("Failed to serialize audit event: {}", e);
                    return;
                }
            };

            let mut guard = writer.lock().await;
            if let Err(e) = writeln!(guard, "{}", line).and_then(|_| guard.flush()) {
                error!("Failed to write audit event: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn tracing_only_logger_accepts_events() {
        let logger = AuditLogger::new(None);
        logger
            .record(AuditEvent::new(
                AuditKind::DegradedValidation,
                "alice",
                serde_json::json!({ "asset_ids": ["a-1"] }),
            ))
            .await;
    }

    #[tokio::test]
    async fn events_append_as_jsonl() {
        let dir = std::env::temp_dir().join(format!("lapidary-audit-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("audit.jsonl");
        let _ = std::fs::remove_file(&path);

        let logger = AuditLogger::new(Some(path.clone()));
        logger
            .record(AuditEvent::new(
                AuditKind::SpeedboostDisplaced,
                "bob",
                serde_json::json!({ "displaced": "sb-1", "by": "sb-2" }),
            ))
            .await;
        logger
            .record(AuditEvent::new(
                AuditKind::SlotEntryDropped,
                "bob",
                serde_json::json!({ "slot_num": 7 }),
            ))
            .await;

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: AuditEvent = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first.kind, AuditKind::SpeedboostDisplaced);
        assert_eq!(first.account, "bob");

        let _ = std::fs::remove_file(&path);
    }
}
