//! User-facing notifications emitted by a session

use crate::core::OperationType;
use crate::lock::WorkflowLockGuard;
use crate::multisig::ProposalRef;
use crate::pipeline::FailureKind;
use tokio::sync::mpsc;

/// Prompt to review a proposal whose creation just confirmed.
///
/// Holds the session's workflow lock until dismissed or dropped.
#[derive(Debug)]
pub struct ReviewPrompt {
    pub proposal: ProposalRef,
    pub signature: String,
    guard: WorkflowLockGuard,
}

impl ReviewPrompt {
    pub fn new(proposal: ProposalRef, signature: String, guard: WorkflowLockGuard) -> Self {
        Self {
            proposal,
            signature,
            guard,
        }
    }

    pub fn dismiss(self) {
        self.guard.release();
    }
}

#[derive(Debug)]
pub enum Notification {
    Submitted {
        operation: OperationType,
        signature: String,
    },
    Confirmed {
        operation: OperationType,
        signature: String,
    },
    /// No confirmation arrived; the transaction may still land
    ConfirmationTimedOut {
        operation: OperationType,
        signature: String,
        kind: FailureKind,
    },
    Failed {
        operation: OperationType,
        kind: FailureKind,
        message: String,
    },
    ReviewProposal(ReviewPrompt),
}

impl Notification {
    pub fn operation(&self) -> Option<OperationType> {
        match self {
            Notification::Submitted { operation, .. }
            | Notification::Confirmed { operation, .. }
            | Notification::ConfirmationTimedOut { operation, .. }
            | Notification::Failed { operation, .. } => Some(*operation),
            Notification::ReviewProposal(_) => None,
        }
    }
}

/// Sending half of a session's notification channel
#[derive(Debug, Clone)]
pub struct Notifier {
    sender: mpsc::UnboundedSender<Notification>,
}

impl Notifier {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }

    pub fn notify(&self, notification: Notification) {
        if let Err(err) = self.sender.send(notification) {
            log::debug!("Notification dropped, no receiver: {:?}", err.0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lock::WorkflowLock;

    #[tokio::test]
    async fn test_dismissing_review_releases_lock() {
        let lock = WorkflowLock::new();
        let (notifier, mut rx) = Notifier::channel();
        let guard = lock.try_acquire().unwrap();
        notifier.notify(Notification::ReviewProposal(ReviewPrompt::new(
            ProposalRef::new("ms", "p1"),
            "sig".to_string(),
            guard,
        )));

        let Some(Notification::ReviewProposal(prompt)) = rx.recv().await else {
            panic!("expected a review prompt");
        };
        assert!(lock.is_held());
        prompt.dismiss();
        assert!(!lock.is_held());
    }

    #[test]
    fn test_closed_channel_is_ignored() {
        let (notifier, rx) = Notifier::channel();
        drop(rx);
        notifier.notify(Notification::Submitted {
            operation: OperationType::Transfer,
            signature: "sig".to_string(),
        });
    }
}
