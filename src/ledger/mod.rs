//! Ledger access
//!
//! [`LedgerClient`] is the network collaborator: balance and blockhash
//! queries, transaction submission, and multisig account/proposal reads used
//! for reconciliation. [`MemoryLedger`] is an in-process implementation used
//! for simulation and tests.

pub mod memory;
pub mod remediation;

pub use memory::{LedgerSettings, MemoryLedger, MultisigProgramError};
pub use remediation::{RemediationCode, SubmitFailure, REMEDIATION_TABLE};

use crate::core::SignedTransaction;
use crate::multisig::{MultisigAccount, MultisigProposal};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Marker the ledger uses in front of program error codes
const CUSTOM_ERROR_MARKER: &str = "custom program error: 0x";

/// Errors from ledger queries
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("Account not found: {0}")]
    AccountNotFound(String),
    #[error("Proposal not found: {0}")]
    ProposalNotFound(String),
    #[error("Ledger unavailable: {0}")]
    Unavailable(String),
}

/// Rejection returned by the ledger on submission
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{message}")]
pub struct SubmitError {
    pub message: String,
    /// Program logs emitted while processing the transaction
    pub logs: Vec<String>,
}

impl SubmitError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            logs: Vec::new(),
        }
    }

    /// Program failure with a numeric error code
    pub fn custom(instruction: usize, code: u32, log: impl Into<String>) -> Self {
        Self {
            message: format!(
                "Transaction simulation failed: Error processing Instruction {}: {}{:x}",
                instruction, CUSTOM_ERROR_MARKER, code
            ),
            logs: vec![format!("Program log: {}", log.into())],
        }
    }

    /// Program error code from the message or, failing that, the logs
    pub fn custom_error_code(&self) -> Option<u32> {
        std::iter::once(&self.message)
            .chain(self.logs.iter())
            .find_map(|line| parse_custom_code(line))
    }
}

fn parse_custom_code(line: &str) -> Option<u32> {
    let start = line.find(CUSTOM_ERROR_MARKER)? + CUSTOM_ERROR_MARKER.len();
    let digits: String = line[start..]
        .chars()
        .take_while(|c| c.is_ascii_hexdigit())
        .collect();
    u32::from_str_radix(&digits, 16).ok()
}

/// Network collaborator used by the pipeline and the proposal controller
#[async_trait]
pub trait LedgerClient: Send + Sync {
    async fn get_balance(&self, account: &str) -> Result<u64, LedgerError>;

    /// Most recent block reference; transactions must carry a recent one
    async fn latest_blockhash(&self) -> Result<String, LedgerError>;

    /// Submit a signed transaction, returning its signature id
    async fn submit(&self, tx: &SignedTransaction) -> Result<String, SubmitError>;

    async fn get_multisig_account(&self, address: &str) -> Result<MultisigAccount, LedgerError>;

    async fn get_multisig_transaction(
        &self,
        multisig: &str,
        proposal_id: &str,
    ) -> Result<MultisigProposal, LedgerError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_custom_code_from_message() {
        let err = SubmitError::custom(0, 0x1786, "treasury too low");
        assert_eq!(err.custom_error_code(), Some(0x1786));
        assert!(err.to_string().contains("custom program error: 0x1786"));
    }

    #[test]
    fn test_custom_code_from_logs() {
        let err = SubmitError {
            message: "Transaction failed".to_string(),
            logs: vec![
                "Program invoke [1]".to_string(),
                "Program failed: custom program error: 0xbc4".to_string(),
            ],
        };
        assert_eq!(err.custom_error_code(), Some(0xbc4));
        assert_eq!(SubmitError::new("Blockhash not found").custom_error_code(), None);
    }
}
