//! Transaction status tracking
//!
//! A pipeline run walks a fixed stage graph. Transitions only move forward
//! along [`TransactionStage::successors`], and any failure stage ends the run.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;

// =============================================================================
// Stages
// =============================================================================

/// One stage of a pipeline run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionStage {
    Idle,
    TransactionStart,
    WalletNotFound,
    InitTransaction,
    TransactionStartFailure,
    InitTransactionSuccess,
    InitTransactionFailure,
    SignTransaction,
    SignTransactionSuccess,
    SignTransactionFailure,
    SendTransaction,
    SendTransactionSuccess,
    SendTransactionFailure,
    ConfirmTransaction,
    TransactionFinished,
}

impl TransactionStage {
    /// Stages reachable in one step from this one
    pub fn successors(&self) -> &'static [TransactionStage] {
        use TransactionStage::*;
        match self {
            Idle => &[TransactionStart],
            TransactionStart => &[InitTransaction, WalletNotFound],
            InitTransaction => &[
                InitTransactionSuccess,
                InitTransactionFailure,
                TransactionStartFailure,
            ],
            InitTransactionSuccess => &[SignTransaction],
            SignTransaction => &[SignTransactionSuccess, SignTransactionFailure],
            SignTransactionSuccess => &[SendTransaction],
            SendTransaction => &[SendTransactionSuccess, SendTransactionFailure],
            SendTransactionSuccess => &[ConfirmTransaction],
            ConfirmTransaction => &[TransactionFinished],
            WalletNotFound
            | TransactionStartFailure
            | InitTransactionFailure
            | SignTransactionFailure
            | SendTransactionFailure
            | TransactionFinished => &[],
        }
    }

    /// Position in the canonical run order. Success and failure siblings
    /// share a rank.
    pub fn rank(&self) -> u8 {
        use TransactionStage::*;
        match self {
            Idle => 0,
            TransactionStart => 1,
            WalletNotFound => 2,
            InitTransaction => 2,
            TransactionStartFailure => 3,
            InitTransactionSuccess => 3,
            InitTransactionFailure => 3,
            SignTransaction => 4,
            SignTransactionSuccess => 5,
            SignTransactionFailure => 5,
            SendTransaction => 6,
            SendTransactionSuccess => 7,
            SendTransactionFailure => 7,
            ConfirmTransaction => 8,
            TransactionFinished => 9,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            TransactionStage::WalletNotFound
                | TransactionStage::TransactionStartFailure
                | TransactionStage::InitTransactionFailure
                | TransactionStage::SignTransactionFailure
                | TransactionStage::SendTransactionFailure
        )
    }

    /// True when no further stage may follow within the same run
    pub fn is_terminal(&self) -> bool {
        self.successors().is_empty()
    }

    pub fn can_advance_to(&self, next: TransactionStage) -> bool {
        self.successors().contains(&next)
    }
}

impl fmt::Display for TransactionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Rejected stage transition
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid stage transition: {from} -> {to}")]
pub struct StageError {
    pub from: TransactionStage,
    pub to: TransactionStage,
}

// =============================================================================
// Status
// =============================================================================

/// Identifies one pipeline run within a session; 0 before the first run
pub type RunId = u64;

/// Last and current stage of the most recent run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionStatus {
    pub last_stage: TransactionStage,
    pub current_stage: TransactionStage,
    /// Run the stages belong to
    #[serde(default)]
    pub run: RunId,
}

impl TransactionStatus {
    pub fn idle() -> Self {
        Self {
            last_stage: TransactionStage::Idle,
            current_stage: TransactionStage::Idle,
            run: 0,
        }
    }

    /// Move to `next`, enforcing the stage graph
    pub fn advance(&mut self, next: TransactionStage) -> Result<(), StageError> {
        if !self.current_stage.can_advance_to(next) {
            return Err(StageError {
                from: self.current_stage,
                to: next,
            });
        }
        self.last_stage = self.current_stage;
        self.current_stage = next;
        Ok(())
    }

    /// Return to Idle from any stage
    pub fn reset(&mut self) {
        self.last_stage = self.current_stage;
        self.current_stage = TransactionStage::Idle;
    }
}

impl Default for TransactionStatus {
    fn default() -> Self {
        Self::idle()
    }
}

/// Shared, observable status owned by one session.
///
/// Only the pipeline and the confirmation tracker write to it; views hold a
/// [`watch::Receiver`] obtained from [`StatusCell::subscribe`].
#[derive(Debug, Clone)]
pub struct StatusCell {
    sender: Arc<watch::Sender<TransactionStatus>>,
}

impl StatusCell {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(TransactionStatus::idle());
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn current(&self) -> TransactionStatus {
        *self.sender.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<TransactionStatus> {
        self.sender.subscribe()
    }

    /// Start a new run: whatever the previous run left behind becomes
    /// `last_stage` and the current stage is TransactionStart.
    ///
    /// Returns the id later writes for this run must carry.
    pub fn begin_run(&self) -> RunId {
        let mut run = 0;
        self.sender.send_modify(|status| {
            status.last_stage = status.current_stage;
            status.current_stage = TransactionStage::TransactionStart;
            status.run += 1;
            run = status.run;
        });
        run
    }

    pub fn advance(&self, next: TransactionStage) -> Result<TransactionStatus, StageError> {
        let mut outcome = Ok(());
        self.sender.send_if_modified(|status| match status.advance(next) {
            Ok(()) => true,
            Err(e) => {
                outcome = Err(e);
                false
            }
        });
        outcome.map(|_| self.current())
    }

    /// Return `run` to Idle. Does nothing once a newer run has begun.
    pub fn reset_run(&self, run: RunId) -> bool {
        self.sender.send_if_modified(|status| {
            if status.run != run {
                return false;
            }
            status.reset();
            true
        })
    }

    /// Mark `run` finished if it is still the current run and waiting on
    /// confirmation
    pub fn finish(&self, run: RunId) -> bool {
        self.sender.send_if_modified(|status| {
            status.run == run
                && status.current_stage == TransactionStage::ConfirmTransaction
                && status.advance(TransactionStage::TransactionFinished).is_ok()
        })
    }
}

impl Default for StatusCell {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use TransactionStage::*;

    #[test]
    fn test_happy_path_is_accepted() {
        let mut status = TransactionStatus::idle();
        for stage in [
            TransactionStart,
            InitTransaction,
            InitTransactionSuccess,
            SignTransaction,
            SignTransactionSuccess,
            SendTransaction,
            SendTransactionSuccess,
            ConfirmTransaction,
            TransactionFinished,
        ] {
            status.advance(stage).unwrap();
        }
        assert_eq!(status.last_stage, ConfirmTransaction);
        assert!(status.current_stage.is_terminal());
    }

    #[test]
    fn test_skipping_a_stage_is_rejected() {
        let mut status = TransactionStatus::idle();
        status.advance(TransactionStart).unwrap();
        let err = status.advance(SignTransaction).unwrap_err();
        assert_eq!(err.from, TransactionStart);
        assert_eq!(status.current_stage, TransactionStart);
    }

    #[test]
    fn test_failure_is_terminal() {
        let mut status = TransactionStatus::idle();
        status.advance(TransactionStart).unwrap();
        status.advance(InitTransaction).unwrap();
        status.advance(InitTransactionFailure).unwrap();
        assert!(InitTransactionFailure.is_failure());
        assert!(status.advance(SignTransaction).is_err());
    }

    #[test]
    fn test_successors_always_increase_rank() {
        let all = [
            Idle,
            TransactionStart,
            WalletNotFound,
            InitTransaction,
            TransactionStartFailure,
            InitTransactionSuccess,
            InitTransactionFailure,
            SignTransaction,
            SignTransactionSuccess,
            SignTransactionFailure,
            SendTransaction,
            SendTransactionSuccess,
            SendTransactionFailure,
            ConfirmTransaction,
            TransactionFinished,
        ];
        for stage in all {
            for next in stage.successors() {
                assert!(next.rank() > stage.rank(), "{stage} -> {next}");
            }
            if stage.is_failure() {
                assert!(stage.is_terminal());
            }
        }
    }

    #[tokio::test]
    async fn test_status_cell_notifies_watchers() {
        let cell = StatusCell::new();
        let mut rx = cell.subscribe();
        let run = cell.begin_run();
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().current_stage, TransactionStart);
        assert_eq!(rx.borrow().run, run);

        assert!(cell.advance(SignTransaction).is_err());
        assert!(!cell.finish(run));

        assert!(cell.reset_run(run));
        assert_eq!(cell.current().current_stage, Idle);
        assert_eq!(cell.current().last_stage, TransactionStart);
    }

    #[test]
    fn test_stale_run_cannot_touch_newer_run() {
        let cell = StatusCell::new();
        let older = cell.begin_run();
        for stage in [
            InitTransaction,
            InitTransactionSuccess,
            SignTransaction,
            SignTransactionSuccess,
            SendTransaction,
            SendTransactionSuccess,
            ConfirmTransaction,
        ] {
            cell.advance(stage).unwrap();
        }
        let newer = cell.begin_run();
        assert_ne!(older, newer);
        cell.advance(InitTransaction).unwrap();

        assert!(!cell.reset_run(older));
        assert!(!cell.finish(older));
        assert_eq!(cell.current().current_stage, InitTransaction);
        assert_eq!(cell.current().run, newer);
    }
}
