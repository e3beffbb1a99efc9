//! Operation catalog
//!
//! Every transaction the pipeline drives is tagged with exactly one
//! [`OperationType`]. The tag selects post-confirmation side effects in the
//! dispatch table and labels the audit transcript.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Enumerated operation tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OperationType {
    Transfer,
    Wrap,
    Unwrap,
    CreateAsset,
    CloseAsset,
    SetAssetAuthority,
    CreateStream,
    WithdrawStream,
    PauseStream,
    ResumeStream,
    CloseStream,
    CreateMultisig,
    EditMultisig,
    CreateProposal,
    ApproveProposal,
    RejectProposal,
    ExecuteProposal,
    CancelProposal,
}

impl OperationType {
    /// The complete catalog, in declaration order
    pub const ALL: [OperationType; 18] = [
        OperationType::Transfer,
        OperationType::Wrap,
        OperationType::Unwrap,
        OperationType::CreateAsset,
        OperationType::CloseAsset,
        OperationType::SetAssetAuthority,
        OperationType::CreateStream,
        OperationType::WithdrawStream,
        OperationType::PauseStream,
        OperationType::ResumeStream,
        OperationType::CloseStream,
        OperationType::CreateMultisig,
        OperationType::EditMultisig,
        OperationType::CreateProposal,
        OperationType::ApproveProposal,
        OperationType::RejectProposal,
        OperationType::ExecuteProposal,
        OperationType::CancelProposal,
    ];

    /// Vote, execute and cancel operations on an existing proposal
    pub fn is_proposal_action(&self) -> bool {
        matches!(
            self,
            OperationType::ApproveProposal
                | OperationType::RejectProposal
                | OperationType::ExecuteProposal
                | OperationType::CancelProposal
        )
    }

    /// Operations that touch a multisig account or one of its proposals
    pub fn is_multisig(&self) -> bool {
        self.is_proposal_action()
            || matches!(
                self,
                OperationType::CreateMultisig
                    | OperationType::EditMultisig
                    | OperationType::CreateProposal
            )
    }

    /// Position of the treasury account in the operation's first instruction,
    /// for operations that move funds out of a stream treasury.
    pub fn treasury_account_index(&self) -> Option<usize> {
        match self {
            OperationType::CreateStream
            | OperationType::WithdrawStream
            | OperationType::CloseStream => Some(1),
            _ => None,
        }
    }

    /// Human readable label used in audit entries and notifications
    pub fn label(&self) -> &'static str {
        match self {
            OperationType::Transfer => "Transfer",
            OperationType::Wrap => "Wrap",
            OperationType::Unwrap => "Unwrap",
            OperationType::CreateAsset => "Create Asset",
            OperationType::CloseAsset => "Close Asset",
            OperationType::SetAssetAuthority => "Set Asset Authority",
            OperationType::CreateStream => "Create Stream",
            OperationType::WithdrawStream => "Withdraw Stream",
            OperationType::PauseStream => "Pause Stream",
            OperationType::ResumeStream => "Resume Stream",
            OperationType::CloseStream => "Close Stream",
            OperationType::CreateMultisig => "Create Multisig",
            OperationType::EditMultisig => "Edit Multisig",
            OperationType::CreateProposal => "Create Proposal",
            OperationType::ApproveProposal => "Approve Proposal",
            OperationType::RejectProposal => "Reject Proposal",
            OperationType::ExecuteProposal => "Execute Proposal",
            OperationType::CancelProposal => "Cancel Proposal",
        }
    }
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
