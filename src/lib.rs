//! txflow: a transaction workflow engine for wallet-driven ledger operations
//!
//! This crate drives user-initiated operations from intent to confirmation:
//! - Fee & balance preflight before any cost-incurring call
//! - Pluggable instruction builders, one per operation
//! - A build, sign, send pipeline with a per-run audit log and cancellation
//! - Asynchronous confirmation tracking with at-most-once side effects
//! - A static post-confirmation dispatch table
//! - Multisig proposals: create, approve, reject, execute, cancel
//!
//! # Example
//!
//! ```rust,ignore
//! use txflow::builder::TransferBuilder;
//! use txflow::core::OperationType;
//! use txflow::ledger::{LedgerSettings, MemoryLedger};
//! use txflow::pipeline::PipelineRequest;
//! use txflow::session::Session;
//! use txflow::wallet::KeypairSigner;
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! let ledger = Arc::new(MemoryLedger::new(LedgerSettings::default()));
//! let mut session = Session::builder(ledger.clone(), ledger.clone()).build();
//! session.mount();
//!
//! let signer = Arc::new(KeypairSigner::new());
//! session.connect(signer).await;
//!
//! let request = PipelineRequest::new(OperationType::Transfer, TransferBuilder::new("bob", 10))
//!     .amount(10);
//! let outcome = session.run(request, &CancellationToken::new()).await?;
//! println!("Submitted {:?}", outcome.signature());
//! ```

pub mod builder;
pub mod cli;
pub mod config;
pub mod confirmation;
pub mod core;
pub mod crypto;
pub mod dispatch;
pub mod ledger;
pub mod lock;
pub mod logger;
pub mod multisig;
pub mod notify;
pub mod pipeline;
pub mod session;
pub mod wallet;

// Re-export commonly used types
pub use builder::{BuildError, InstructionBuilder, TransferBuilder};
pub use confirmation::{ConfirmationEvent, ConfirmationSource, ConfirmationTracker, Finality};
pub use core::{
    check_balance, AuditLog, FeeSchedule, OperationType, TransactionStage, TransactionStatus,
};
pub use crypto::KeyPair;
pub use dispatch::{dispatch, dispatch_entry, CachedViews, DispatchSink, Effect};
pub use ledger::{LedgerClient, MemoryLedger, SubmitFailure};
pub use lock::WorkflowLock;
pub use multisig::{MultisigProposal, ProposalAction, ProposalController, ProposalStatus};
pub use notify::Notification;
pub use pipeline::{PipelineError, PipelineOutcome, PipelineRequest, TransactionPipeline};
pub use session::Session;
pub use wallet::{KeypairSigner, Signer};
