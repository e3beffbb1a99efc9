//! Transaction model
//!
//! A transaction is an ordered list of program instructions, a fee payer and
//! a recent block reference. The block reference is the ledger's replay
//! protection: a transaction is only accepted while its blockhash is recent.

use crate::crypto::sha256;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// =============================================================================
// Error Types
// =============================================================================

/// Transaction-related errors
#[derive(Error, Debug)]
pub enum TransactionError {
    #[error("Transaction has no instructions")]
    Empty,
    #[error("Fee payer not set")]
    MissingFeePayer,
    #[error("Recent blockhash not set")]
    MissingBlockhash,
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

// =============================================================================
// Instructions
// =============================================================================

/// An account referenced by an instruction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountMeta {
    pub pubkey: String,
    pub is_signer: bool,
    pub is_writable: bool,
}

impl AccountMeta {
    pub fn new(pubkey: impl Into<String>, is_signer: bool) -> Self {
        Self {
            pubkey: pubkey.into(),
            is_signer,
            is_writable: true,
        }
    }

    pub fn readonly(pubkey: impl Into<String>, is_signer: bool) -> Self {
        Self {
            pubkey: pubkey.into(),
            is_signer,
            is_writable: false,
        }
    }
}

/// A single program invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instruction {
    pub program_id: String,
    pub accounts: Vec<AccountMeta>,
    pub data: Vec<u8>,
}

impl Instruction {
    pub fn new(program_id: impl Into<String>, accounts: Vec<AccountMeta>, data: Vec<u8>) -> Self {
        Self {
            program_id: program_id.into(),
            accounts,
            data,
        }
    }

    /// Encode `payload` as JSON instruction data
    pub fn with_payload<T: Serialize>(
        program_id: impl Into<String>,
        accounts: Vec<AccountMeta>,
        payload: &T,
    ) -> Result<Self, TransactionError> {
        Ok(Self::new(program_id, accounts, serde_json::to_vec(payload)?))
    }

    /// Decode JSON instruction data
    pub fn payload<T: for<'de> Deserialize<'de>>(&self) -> Result<T, TransactionError> {
        Ok(serde_json::from_slice(&self.data)?)
    }
}

// =============================================================================
// Transaction
// =============================================================================

/// An unsigned transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub instructions: Vec<Instruction>,
    pub fee_payer: Option<String>,
    pub recent_blockhash: Option<String>,
}

impl Transaction {
    pub fn new(instructions: Vec<Instruction>) -> Self {
        Self {
            instructions,
            fee_payer: None,
            recent_blockhash: None,
        }
    }

    /// Accounts of the first instruction, in order
    pub fn primary_accounts(&self) -> &[AccountMeta] {
        self.instructions
            .first()
            .map(|ix| ix.accounts.as_slice())
            .unwrap_or(&[])
    }

    /// Unique account keys across all instructions, fee payer first
    pub fn account_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = Vec::new();
        if let Some(payer) = &self.fee_payer {
            keys.push(payer.clone());
        }
        for ix in &self.instructions {
            for meta in &ix.accounts {
                if !keys.contains(&meta.pubkey) {
                    keys.push(meta.pubkey.clone());
                }
            }
        }
        keys
    }

    /// Serialized message: everything a signature commits to
    pub fn message_bytes(&self) -> Result<Vec<u8>, TransactionError> {
        if self.instructions.is_empty() {
            return Err(TransactionError::Empty);
        }
        let payer = self
            .fee_payer
            .as_ref()
            .ok_or(TransactionError::MissingFeePayer)?;
        let blockhash = self
            .recent_blockhash
            .as_ref()
            .ok_or(TransactionError::MissingBlockhash)?;
        Ok(serde_json::to_vec(&(payer, blockhash, &self.instructions))?)
    }

    /// SHA-256 of the message
    pub fn message_hash(&self) -> Result<Vec<u8>, TransactionError> {
        Ok(sha256(&self.message_bytes()?))
    }
}

/// A transaction together with the fee payer's signature
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedTransaction {
    pub transaction: Transaction,
    /// Compact signature bytes
    pub signature: Vec<u8>,
}

impl SignedTransaction {
    /// Transaction id as reported by the ledger (Base58 signature)
    pub fn signature_id(&self) -> String {
        bs58::encode(&self.signature).into_string()
    }
}

// =============================================================================
// Transaction Builder
// =============================================================================

/// Builder for constructing transactions
pub struct TransactionBuilder {
    instructions: Vec<Instruction>,
    fee_payer: Option<String>,
}

impl TransactionBuilder {
    pub fn new() -> Self {
        Self {
            instructions: Vec::new(),
            fee_payer: None,
        }
    }

    pub fn add_instruction(mut self, instruction: Instruction) -> Self {
        self.instructions.push(instruction);
        self
    }

    pub fn fee_payer(mut self, payer: impl Into<String>) -> Self {
        self.fee_payer = Some(payer.into());
        self
    }

    pub fn build(self) -> Transaction {
        Transaction {
            instructions: self.instructions,
            fee_payer: self.fee_payer,
            recent_blockhash: None,
        }
    }
}

impl Default for TransactionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Transaction {
        TransactionBuilder::new()
            .add_instruction(Instruction::new(
                "program",
                vec![
                    AccountMeta::new("alice", true),
                    AccountMeta::new("treasury", false),
                ],
                vec![1, 2, 3],
            ))
            .add_instruction(Instruction::new(
                "program",
                vec![AccountMeta::readonly("alice", true)],
                vec![],
            ))
            .fee_payer("alice")
            .build()
    }

    #[test]
    fn test_message_requires_blockhash() {
        let tx = sample();
        assert!(matches!(
            tx.message_bytes(),
            Err(TransactionError::MissingBlockhash)
        ));

        let empty = Transaction::new(vec![]);
        assert!(matches!(empty.message_bytes(), Err(TransactionError::Empty)));
    }

    #[test]
    fn test_message_hash_changes_with_blockhash() {
        let mut tx = sample();
        tx.recent_blockhash = Some("hash-1".to_string());
        let first = tx.message_hash().unwrap();
        tx.recent_blockhash = Some("hash-2".to_string());
        let second = tx.message_hash().unwrap();

        assert_eq!(first.len(), 32);
        assert_ne!(first, second);
    }

    #[test]
    fn test_account_keys_are_unique() {
        let tx = sample();
        assert_eq!(tx.account_keys(), vec!["alice", "treasury"]);
        assert_eq!(tx.primary_accounts()[1].pubkey, "treasury");
    }
}
