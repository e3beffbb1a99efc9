//! Multisig program instructions and their builders

use crate::builder::{BuildError, InstructionBuilder};
use crate::core::{AccountMeta, Instruction, Transaction, TransactionBuilder};
use crate::multisig::account::MultisigConfig;
use crate::multisig::proposal::{generate_proposal_id, ProposalAction, ProposalRef};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Program id of the multisig program
pub const MULTISIG_PROGRAM_ID: &str = "multisig";

/// Instructions understood by the multisig program.
///
/// Accounts, in order:
/// - `CreateMultisig`: [payer (signer), multisig]
/// - `EditMultisig`: [multisig (signer)], only valid inside a proposal
/// - `CreateProposal`: [multisig, proposer (signer)]
/// - `Approve` / `Reject` / `Execute` / `Cancel`: [multisig, owner (signer)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MultisigInstruction {
    CreateMultisig {
        config: MultisigConfig,
    },
    EditMultisig {
        config: MultisigConfig,
    },
    CreateProposal {
        proposal_id: String,
        title: String,
        expiration_date: Option<DateTime<Utc>>,
        instructions: Vec<Instruction>,
    },
    Approve {
        proposal_id: String,
    },
    Reject {
        proposal_id: String,
    },
    Execute {
        proposal_id: String,
    },
    Cancel {
        proposal_id: String,
    },
}

impl MultisigInstruction {
    pub fn for_action(action: ProposalAction, proposal_id: String) -> Self {
        match action {
            ProposalAction::Approve => MultisigInstruction::Approve { proposal_id },
            ProposalAction::Reject => MultisigInstruction::Reject { proposal_id },
            ProposalAction::Execute => MultisigInstruction::Execute { proposal_id },
            ProposalAction::Cancel => MultisigInstruction::Cancel { proposal_id },
        }
    }
}

// =============================================================================
// Multisig routing
// =============================================================================

/// Sends an operation through a multisig: instead of executing directly, the
/// built instructions become the payload of a new proposal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultisigRoute {
    pub multisig: String,
    pub proposal_id: String,
    pub title: String,
    pub expiration_date: Option<DateTime<Utc>>,
}

impl MultisigRoute {
    pub fn new(multisig: impl Into<String>, proposer: &str, title: impl Into<String>) -> Self {
        let multisig = multisig.into();
        let title = title.into();
        Self {
            proposal_id: generate_proposal_id(&multisig, proposer, &title),
            multisig,
            title,
            expiration_date: None,
        }
    }

    pub fn expires_at(mut self, expiration_date: DateTime<Utc>) -> Self {
        self.expiration_date = Some(expiration_date);
        self
    }

    pub fn reference(&self) -> ProposalRef {
        ProposalRef::new(&self.multisig, &self.proposal_id)
    }

    /// Wrap `inner` in a create-proposal transaction paid for by `proposer`
    pub fn wrap(&self, inner: Transaction, proposer: &str) -> Result<Transaction, BuildError> {
        if inner.instructions.is_empty() {
            return Err(BuildError::InvalidParams(
                "nothing to propose: the operation built no instructions".to_string(),
            ));
        }
        let instruction = Instruction::with_payload(
            MULTISIG_PROGRAM_ID,
            vec![
                AccountMeta::new(&self.multisig, false),
                AccountMeta::new(proposer, true),
            ],
            &MultisigInstruction::CreateProposal {
                proposal_id: self.proposal_id.clone(),
                title: self.title.clone(),
                expiration_date: self.expiration_date,
                instructions: inner.instructions,
            },
        )?;

        Ok(TransactionBuilder::new()
            .add_instruction(instruction)
            .fee_payer(proposer)
            .build())
    }
}

// =============================================================================
// Builders
// =============================================================================

/// Creates a new multisig account owned by `config.owners`
#[derive(Debug, Clone)]
pub struct CreateMultisigBuilder {
    pub config: MultisigConfig,
}

#[async_trait]
impl InstructionBuilder for CreateMultisigBuilder {
    async fn build(&self, payer: &str) -> Result<Transaction, BuildError> {
        let instruction = Instruction::with_payload(
            MULTISIG_PROGRAM_ID,
            vec![
                AccountMeta::new(payer, true),
                AccountMeta::new(self.config.derive_address(), false),
            ],
            &MultisigInstruction::CreateMultisig {
                config: self.config.clone(),
            },
        )?;
        Ok(TransactionBuilder::new()
            .add_instruction(instruction)
            .fee_payer(payer)
            .build())
    }

    fn audit_inputs(&self) -> Value {
        json!({
            "owners": self.config.owners,
            "threshold": self.config.threshold,
            "label": self.config.label,
        })
    }
}

/// Replaces the owners and threshold of `multisig`.
///
/// The multisig must authorize this itself, so the transaction only lands
/// when routed through a proposal.
#[derive(Debug, Clone)]
pub struct EditMultisigBuilder {
    pub multisig: String,
    pub config: MultisigConfig,
}

#[async_trait]
impl InstructionBuilder for EditMultisigBuilder {
    async fn build(&self, payer: &str) -> Result<Transaction, BuildError> {
        let instruction = Instruction::with_payload(
            MULTISIG_PROGRAM_ID,
            vec![AccountMeta::new(&self.multisig, true)],
            &MultisigInstruction::EditMultisig {
                config: self.config.clone(),
            },
        )?;
        Ok(TransactionBuilder::new()
            .add_instruction(instruction)
            .fee_payer(payer)
            .build())
    }

    fn audit_inputs(&self) -> Value {
        json!({
            "multisig": self.multisig,
            "owners": self.config.owners,
            "threshold": self.config.threshold,
        })
    }
}

/// Approve, reject, execute or cancel an existing proposal
#[derive(Debug, Clone)]
pub struct ProposalActionBuilder {
    pub action: ProposalAction,
    pub proposal: ProposalRef,
}

impl ProposalActionBuilder {
    pub fn new(action: ProposalAction, proposal: ProposalRef) -> Self {
        Self { action, proposal }
    }
}

#[async_trait]
impl InstructionBuilder for ProposalActionBuilder {
    async fn build(&self, payer: &str) -> Result<Transaction, BuildError> {
        let instruction = Instruction::with_payload(
            MULTISIG_PROGRAM_ID,
            vec![
                AccountMeta::new(&self.proposal.multisig, false),
                AccountMeta::new(payer, true),
            ],
            &MultisigInstruction::for_action(self.action, self.proposal.proposal_id.clone()),
        )?;
        Ok(TransactionBuilder::new()
            .add_instruction(instruction)
            .fee_payer(payer)
            .build())
    }

    fn audit_inputs(&self) -> Value {
        json!({
            "action": self.action,
            "multisig": self.proposal.multisig,
            "proposal": self.proposal.proposal_id,
        })
    }
}
