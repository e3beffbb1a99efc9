//! Transaction logging collaborator
//!
//! Failed runs hand their full audit transcript to a [`TransactionLogger`].
//! User-correctable failures are warnings; everything else is an error.

use crate::core::AuditLog;
use serde_json::Value;
use std::sync::Mutex;

pub trait TransactionLogger: Send + Sync {
    fn log_warning(&self, label: &str, audit: &AuditLog);

    fn log_error(&self, label: &str, audit: &AuditLog);
}

/// Writes transcripts through the `log` facade
#[derive(Debug, Default, Clone, Copy)]
pub struct LogTransactionLogger;

impl TransactionLogger for LogTransactionLogger {
    fn log_warning(&self, label: &str, audit: &AuditLog) {
        log::warn!("{}: {}", label, audit.transcript());
    }

    fn log_error(&self, label: &str, audit: &AuditLog) {
        log::error!("{}: {}", label, audit.transcript());
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Warning,
    Error,
}

/// A transcript captured by [`MemoryLogger`]
#[derive(Debug, Clone)]
pub struct LoggedRun {
    pub level: LogLevel,
    pub label: String,
    pub audit: AuditLog,
}

impl LoggedRun {
    pub fn transcript(&self) -> Value {
        self.audit.transcript()
    }
}

/// Keeps transcripts in memory
#[derive(Debug, Default)]
pub struct MemoryLogger {
    runs: Mutex<Vec<LoggedRun>>,
}

impl MemoryLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn runs(&self) -> Vec<LoggedRun> {
        match self.runs.lock() {
            Ok(runs) => runs.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn push(&self, level: LogLevel, label: &str, audit: &AuditLog) {
        let run = LoggedRun {
            level,
            label: label.to_string(),
            audit: audit.clone(),
        };
        match self.runs.lock() {
            Ok(mut runs) => runs.push(run),
            Err(poisoned) => poisoned.into_inner().push(run),
        }
    }
}

impl TransactionLogger for MemoryLogger {
    fn log_warning(&self, label: &str, audit: &AuditLog) {
        self.push(LogLevel::Warning, label, audit);
    }

    fn log_error(&self, label: &str, audit: &AuditLog) {
        self.push(LogLevel::Error, label, audit);
    }
}
