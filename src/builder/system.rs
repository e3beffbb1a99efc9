//! Native token transfers

use crate::builder::{BuildError, InstructionBuilder};
use crate::core::{AccountMeta, Instruction, Transaction, TransactionBuilder};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Program id of the ledger's system program
pub const SYSTEM_PROGRAM_ID: &str = "system";

/// Instructions understood by the system program
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SystemInstruction {
    /// accounts: [from (signer), to]
    Transfer { amount: u64 },
}

impl SystemInstruction {
    pub fn transfer(from: &str, to: &str, amount: u64) -> Result<Instruction, BuildError> {
        Ok(Instruction::with_payload(
            SYSTEM_PROGRAM_ID,
            vec![AccountMeta::new(from, true), AccountMeta::new(to, false)],
            &SystemInstruction::Transfer { amount },
        )?)
    }
}

/// Builds a transfer of native tokens.
///
/// When `from` is unset the payer is the source.
#[derive(Debug, Clone)]
pub struct TransferBuilder {
    pub from: Option<String>,
    pub to: String,
    pub amount: u64,
}

impl TransferBuilder {
    pub fn new(to: impl Into<String>, amount: u64) -> Self {
        Self {
            from: None,
            to: to.into(),
            amount,
        }
    }

    /// Transfer out of an account other than the payer (e.g. a vault)
    pub fn from_account(mut self, from: impl Into<String>) -> Self {
        self.from = Some(from.into());
        self
    }
}

#[async_trait]
impl InstructionBuilder for TransferBuilder {
    async fn build(&self, payer: &str) -> Result<Transaction, BuildError> {
        if self.amount == 0 {
            return Err(BuildError::InvalidParams(
                "amount must be greater than zero".to_string(),
            ));
        }
        let from = self.from.as_deref().unwrap_or(payer);
        if from == self.to {
            return Err(BuildError::InvalidParams(
                "source and destination are the same account".to_string(),
            ));
        }

        Ok(TransactionBuilder::new()
            .add_instruction(SystemInstruction::transfer(from, &self.to, self.amount)?)
            .fee_payer(payer)
            .build())
    }

    fn audit_inputs(&self) -> Value {
        json!({ "from": self.from, "to": self.to, "amount": self.amount })
    }
}
