//! Core pipeline types
//!
//! This module contains the building blocks shared by every layer:
//! - Transactions and instructions
//! - Fee schedule and balance preflight
//! - Operation types
//! - Stage graph and observable status
//! - Per-run audit log

pub mod audit;
pub mod fee;
pub mod operation;
pub mod status;
pub mod transaction;

pub use audit::{AuditLog, AuditLogEntry};
pub use fee::{
    check_balance, format_native, FeeSchedule, InsufficientBalance, BASE_UNITS_PER_NATIVE,
    BPS_DENOMINATOR, DEFAULT_NETWORK_FEE, NATIVE_DECIMALS, NATIVE_SYMBOL,
};
pub use operation::OperationType;
pub use status::{RunId, StageError, StatusCell, TransactionStage, TransactionStatus};
pub use transaction::{
    AccountMeta, Instruction, SignedTransaction, Transaction, TransactionBuilder,
    TransactionError,
};
