//! Pipeline error taxonomy

use crate::builder::BuildError;
use crate::core::{InsufficientBalance, StageError};
use crate::ledger::{LedgerError, SubmitFailure};
use crate::wallet::SignerError;
use serde::Serialize;
use thiserror::Error;

/// Broad class of a failed run, for notifications and logging
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FailureKind {
    PreflightFailure,
    BuildFailure,
    SignerFailure,
    SubmitFailure,
    /// No terminal confirmation arrived; outcome on the ledger unknown
    ConfirmationTimeout,
    CancellationAbort,
    /// Internal: another run in progress or a rejected stage transition
    PipelineState,
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Another transaction is already in progress")]
    Busy,
    #[error("{0}")]
    Preflight(#[from] InsufficientBalance),
    #[error("Could not read the account balance: {0}")]
    Ledger(#[from] LedgerError),
    #[error("Could not build the transaction: {0}")]
    Build(#[from] BuildError),
    #[error("Signing failed: {0}")]
    Signer(#[from] SignerError),
    #[error("{0}")]
    Submit(#[from] SubmitFailure),
    #[error("Invalid status transition: {0}")]
    Stage(#[from] StageError),
}

impl PipelineError {
    pub fn kind(&self) -> FailureKind {
        match self {
            PipelineError::Preflight(_) | PipelineError::Ledger(_) => {
                FailureKind::PreflightFailure
            }
            PipelineError::Build(_) => FailureKind::BuildFailure,
            PipelineError::Signer(_) => FailureKind::SignerFailure,
            PipelineError::Submit(_) => FailureKind::SubmitFailure,
            PipelineError::Busy | PipelineError::Stage(_) => FailureKind::PipelineState,
        }
    }

    /// Failures the user can fix themselves are logged as warnings
    pub fn is_user_correctable(&self) -> bool {
        matches!(
            self,
            PipelineError::Preflight(_) | PipelineError::Signer(SignerError::UserRejected)
        )
    }
}
