//! Pluggable instruction builders
//!
//! Each operation supplies a builder that turns its parameters into a
//! transaction. The pipeline treats builders as black boxes; it only needs
//! the resulting transaction and a JSON view of the inputs for the audit log.

pub mod system;

pub use system::{SystemInstruction, TransferBuilder, SYSTEM_PROGRAM_ID};

use crate::core::{Transaction, TransactionError};
use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

/// Errors produced while building a transaction
#[derive(Error, Debug)]
pub enum BuildError {
    #[error("Invalid parameters: {0}")]
    InvalidParams(String),
    #[error("Account state changed, refresh and try again: {0}")]
    StaleState(String),
    #[error("Transaction error: {0}")]
    Transaction(#[from] TransactionError),
}

/// Produces the transaction for one operation
#[async_trait]
pub trait InstructionBuilder: Send + Sync {
    /// Build the transaction with `payer` as the acting account
    async fn build(&self, payer: &str) -> Result<Transaction, BuildError>;

    /// Inputs recorded in the audit log when the init stage starts
    fn audit_inputs(&self) -> Value {
        Value::Null
    }
}

/// Builder returning a transaction prepared elsewhere
#[derive(Debug, Clone)]
pub struct PreparedBuilder {
    transaction: Transaction,
    inputs: Value,
}

impl PreparedBuilder {
    pub fn new(transaction: Transaction) -> Self {
        Self {
            transaction,
            inputs: Value::Null,
        }
    }

    pub fn with_inputs(mut self, inputs: Value) -> Self {
        self.inputs = inputs;
        self
    }
}

#[async_trait]
impl InstructionBuilder for PreparedBuilder {
    async fn build(&self, _payer: &str) -> Result<Transaction, BuildError> {
        if self.transaction.instructions.is_empty() {
            return Err(TransactionError::Empty.into());
        }
        Ok(self.transaction.clone())
    }

    fn audit_inputs(&self) -> Value {
        self.inputs.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Instruction;
    use serde_json::json;

    #[tokio::test]
    async fn test_prepared_builder_returns_its_transaction() {
        let tx = Transaction::new(vec![Instruction::new("program", vec![], vec![9])]);
        let builder = PreparedBuilder::new(tx.clone()).with_inputs(json!({ "memo": "x" }));

        assert_eq!(builder.build("payer").await.unwrap(), tx);
        assert_eq!(builder.audit_inputs()["memo"], "x");
    }

    #[tokio::test]
    async fn test_prepared_builder_rejects_empty_transaction() {
        let builder = PreparedBuilder::new(Transaction::new(vec![]));
        assert!(matches!(
            builder.build("payer").await,
            Err(BuildError::Transaction(TransactionError::Empty))
        ));
    }
}
