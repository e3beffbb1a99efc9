//! Per-run audit transcript

use crate::core::status::TransactionStage;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One recorded transition: the stage entered, a label, and either the
/// inputs the stage ran with or the result it produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub stage: TransactionStage,
    pub label: String,
    pub data: Value,
    pub at: DateTime<Utc>,
}

/// Append-only, ordered list of entries for a single pipeline run
#[derive(Debug, Clone, Default, Serialize)]
pub struct AuditLog {
    entries: Vec<AuditLogEntry>,
}

impl AuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, stage: TransactionStage, label: impl Into<String>, data: Value) {
        self.entries.push(AuditLogEntry {
            stage,
            label: label.into(),
            data,
            at: Utc::now(),
        });
    }

    pub fn entries(&self) -> &[AuditLogEntry] {
        &self.entries
    }

    /// Stages in the order they were recorded
    pub fn stages(&self) -> Vec<TransactionStage> {
        self.entries.iter().map(|e| e.stage).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Full transcript as JSON, for the logging collaborator
    pub fn transcript(&self) -> Value {
        serde_json::to_value(&self.entries).unwrap_or(Value::Null)
    }
}
