//! Multisig accounts and proposal lifecycle
//!
//! M-of-N accounts whose spending goes through proposals: an owner proposes
//! a transaction, owners vote, and once the threshold is met any owner can
//! execute it. The vote tally lives on the ledger; [`ProposalController`]
//! keeps a re-fetched copy and pre-checks actions before they are sent.
//!
//! # Example
//!
//! ```ignore
//! use txflow::multisig::{MultisigConfig, MultisigRoute, ProposalAction};
//!
//! // Create a 2-of-3 multisig
//! let config = MultisigConfig::new(2, vec![alice, bob, carol], None)?;
//!
//! // Propose a payment out of its vault
//! let route = MultisigRoute::new(config.derive_address(), &alice, "Pay vendor");
//! controller.create_proposal(OperationType::Transfer, transfer, route.clone(), fees, &cancel).await?;
//!
//! // Vote, then execute
//! controller.submit_action(ProposalAction::Approve, &route.reference(), fees, &cancel).await?;
//! ```

pub mod account;
pub mod controller;
pub mod instruction;
pub mod proposal;

pub use account::{MultisigAccount, MultisigConfig, MultisigError, MULTISIG_ADDRESS_VERSION};
pub use controller::{ActionFees, ControllerError, ProposalController};
pub use instruction::{
    CreateMultisigBuilder, EditMultisigBuilder, MultisigInstruction, MultisigRoute,
    ProposalActionBuilder, MULTISIG_PROGRAM_ID,
};
pub use proposal::{
    generate_proposal_id, MultisigProposal, ProposalAction, ProposalError, ProposalRef,
    ProposalStatus,
};
