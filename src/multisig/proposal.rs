//! Multisig proposals
//!
//! A proposal is a pending multisig action. Owners vote on it; once the
//! approvals reach the threshold it can be executed by any owner. The same
//! rules are used by the client to pre-check actions and by the ledger,
//! which has the final word.

use crate::core::{Instruction, OperationType};
use crate::crypto::sha256;
use crate::multisig::account::MultisigAccount;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Errors for actions on a proposal
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProposalError {
    #[error("{0} is not an owner of this multisig")]
    NotAnOwner(String),
    #[error("{0} has already voted on this proposal")]
    AlreadyVoted(String),
    #[error("Only the proposer can cancel this proposal")]
    NotProposer,
    #[error("Cannot {action} a proposal that is {status}")]
    InvalidStatus {
        action: ProposalAction,
        status: ProposalStatus,
    },
    #[error("Proposal not found: {0}")]
    NotFound(String),
}

/// Lifecycle status of a proposal
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ProposalStatus {
    /// Collecting votes
    Active,
    /// Enough approvals, ready to execute
    Passed,
    /// Executed on the ledger
    Executed,
    /// Cancelled by the proposer
    Voided,
    /// Execution was attempted and failed
    Failed,
    /// Expired, or too many rejections to ever pass
    Expired,
}

impl fmt::Display for ProposalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProposalStatus::Active => "active",
            ProposalStatus::Passed => "passed",
            ProposalStatus::Executed => "executed",
            ProposalStatus::Voided => "voided",
            ProposalStatus::Failed => "failed",
            ProposalStatus::Expired => "expired",
        };
        f.write_str(s)
    }
}

/// Actions an owner can take on an existing proposal
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ProposalAction {
    Approve,
    Reject,
    Execute,
    Cancel,
}

impl ProposalAction {
    pub const ALL: [ProposalAction; 4] = [
        ProposalAction::Approve,
        ProposalAction::Reject,
        ProposalAction::Execute,
        ProposalAction::Cancel,
    ];

    /// The pipeline operation that carries this action
    pub fn operation(&self) -> OperationType {
        match self {
            ProposalAction::Approve => OperationType::ApproveProposal,
            ProposalAction::Reject => OperationType::RejectProposal,
            ProposalAction::Execute => OperationType::ExecuteProposal,
            ProposalAction::Cancel => OperationType::CancelProposal,
        }
    }
}

impl fmt::Display for ProposalAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProposalAction::Approve => "approve",
            ProposalAction::Reject => "reject",
            ProposalAction::Execute => "execute",
            ProposalAction::Cancel => "cancel",
        };
        f.write_str(s)
    }
}

/// Identifies one proposal of one multisig
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ProposalRef {
    pub multisig: String,
    pub proposal_id: String,
}

impl ProposalRef {
    pub fn new(multisig: impl Into<String>, proposal_id: impl Into<String>) -> Self {
        Self {
            multisig: multisig.into(),
            proposal_id: proposal_id.into(),
        }
    }
}

/// Generate a proposal id from its origin
pub fn generate_proposal_id(multisig: &str, proposer: &str, title: &str) -> String {
    let now = Utc::now();
    let id_data = format!(
        "{}{}{}{}",
        multisig,
        proposer,
        title,
        now.timestamp_nanos_opt().unwrap_or(0)
    );
    hex::encode(&sha256(id_data.as_bytes())[..16])
}

/// A proposal and its vote tally
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct MultisigProposal {
    pub id: String,
    /// Address of the owning multisig
    pub multisig: String,
    pub title: String,
    pub proposer: String,
    /// Owners at proposal time
    pub owners: Vec<String>,
    pub threshold: u8,
    /// Vote per owner, same order as `owners`; `None` until the owner votes
    pub signers: Vec<Option<bool>>,
    pub status: ProposalStatus,
    pub expiration_date: Option<DateTime<Utc>>,
    pub executed_on: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    /// Instructions run on execution
    pub instructions: Vec<Instruction>,
}

impl MultisigProposal {
    pub fn new(
        id: String,
        account: &MultisigAccount,
        proposer: &str,
        title: &str,
        instructions: Vec<Instruction>,
        expiration_date: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            id,
            multisig: account.address.clone(),
            title: title.to_string(),
            proposer: proposer.to_string(),
            owners: account.owners().to_vec(),
            threshold: account.threshold(),
            signers: vec![None; account.owners().len()],
            status: ProposalStatus::Active,
            expiration_date,
            executed_on: None,
            created_at: Utc::now(),
            instructions,
        }
    }

    pub fn reference(&self) -> ProposalRef {
        ProposalRef::new(&self.multisig, &self.id)
    }

    pub fn owner_index(&self, owner: &str) -> Option<usize> {
        self.owners.iter().position(|o| o == owner)
    }

    pub fn is_owner(&self, address: &str) -> bool {
        self.owner_index(address).is_some()
    }

    /// The owner's vote, if any
    pub fn vote_of(&self, owner: &str) -> Option<bool> {
        self.owner_index(owner).and_then(|i| self.signers[i])
    }

    pub fn has_voted(&self, owner: &str) -> bool {
        self.vote_of(owner).is_some()
    }

    pub fn approvals(&self) -> usize {
        self.signers.iter().filter(|v| **v == Some(true)).count()
    }

    pub fn rejections(&self) -> usize {
        self.signers.iter().filter(|v| **v == Some(false)).count()
    }

    /// Once this many owners reject, the threshold can no longer be met
    fn max_rejections(&self) -> usize {
        self.owners.len().saturating_sub(self.threshold as usize)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expiration_date.is_some_and(|d| now >= d)
    }

    /// Status as of `now`, accounting for an elapsed expiration date
    pub fn effective_status(&self, now: DateTime<Utc>) -> ProposalStatus {
        if self.status == ProposalStatus::Active && self.is_expired(now) {
            ProposalStatus::Expired
        } else {
            self.status
        }
    }

    /// Persist an elapsed expiration into `status`
    pub fn refresh_expiry(&mut self, now: DateTime<Utc>) -> bool {
        if self.effective_status(now) != self.status {
            self.status = ProposalStatus::Expired;
            true
        } else {
            false
        }
    }

    /// Check whether `caller` may take `action` now, without changing state
    pub fn authorize(
        &self,
        action: ProposalAction,
        caller: &str,
        now: DateTime<Utc>,
    ) -> Result<(), ProposalError> {
        let status = self.effective_status(now);
        let invalid = || ProposalError::InvalidStatus { action, status };

        match action {
            ProposalAction::Cancel => {
                if caller != self.proposer {
                    return Err(ProposalError::NotProposer);
                }
                if !matches!(status, ProposalStatus::Active | ProposalStatus::Passed) {
                    return Err(invalid());
                }
            }
            ProposalAction::Approve | ProposalAction::Reject => {
                if !self.is_owner(caller) {
                    return Err(ProposalError::NotAnOwner(caller.to_string()));
                }
                if status != ProposalStatus::Active {
                    return Err(invalid());
                }
                if self.has_voted(caller) {
                    return Err(ProposalError::AlreadyVoted(caller.to_string()));
                }
            }
            ProposalAction::Execute => {
                if !self.is_owner(caller) {
                    return Err(ProposalError::NotAnOwner(caller.to_string()));
                }
                if status != ProposalStatus::Passed {
                    return Err(invalid());
                }
            }
        }
        Ok(())
    }

    /// Actions `caller` may take now
    pub fn permitted_actions(&self, caller: &str, now: DateTime<Utc>) -> Vec<ProposalAction> {
        ProposalAction::ALL
            .into_iter()
            .filter(|action| self.authorize(*action, caller, now).is_ok())
            .collect()
    }

    /// Record a vote and move to Passed or Expired when the tally decides it
    pub fn record_vote(
        &mut self,
        owner: &str,
        approve: bool,
        now: DateTime<Utc>,
    ) -> Result<ProposalStatus, ProposalError> {
        self.refresh_expiry(now);
        let action = if approve {
            ProposalAction::Approve
        } else {
            ProposalAction::Reject
        };
        self.authorize(action, owner, now)?;

        if let Some(index) = self.owner_index(owner) {
            self.signers[index] = Some(approve);
        }

        if self.approvals() >= self.threshold as usize {
            self.status = ProposalStatus::Passed;
        } else if self.rejections() > self.max_rejections() {
            self.status = ProposalStatus::Expired;
        }
        Ok(self.status)
    }

    pub fn mark_executed(&mut self, executor: &str, now: DateTime<Utc>) -> Result<(), ProposalError> {
        self.authorize(ProposalAction::Execute, executor, now)?;
        self.status = ProposalStatus::Executed;
        self.executed_on = Some(now);
        Ok(())
    }

    /// Execution was attempted by an owner but its instructions failed
    pub fn mark_failed(&mut self, executor: &str, now: DateTime<Utc>) -> Result<(), ProposalError> {
        self.authorize(ProposalAction::Execute, executor, now)?;
        self.status = ProposalStatus::Failed;
        Ok(())
    }

    pub fn cancel(&mut self, caller: &str, now: DateTime<Utc>) -> Result<(), ProposalError> {
        self.authorize(ProposalAction::Cancel, caller, now)?;
        self.status = ProposalStatus::Voided;
        Ok(())
    }
}
