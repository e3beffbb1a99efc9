//! Confirmation tracker
//!
//! Owns the registry of submitted-but-unconfirmed signatures and turns the
//! terminal event for each into dispatch effects, a status update and a
//! user notification. Events for signatures that are not pending (unknown,
//! or already handled) are ignored, so duplicate or late delivery is safe.

use crate::confirmation::{ConfirmationDetails, ConfirmationEvent, ConfirmationSource, Finality};
use crate::core::{OperationType, RunId, StatusCell};
use crate::dispatch::{dispatch, DispatchSink, Effect, Outcome};
use crate::lock::WorkflowLock;
use crate::multisig::ProposalRef;
use crate::notify::{Notification, Notifier, ReviewPrompt};
use crate::pipeline::FailureKind;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Progress of fetching a confirmation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FetchStatus {
    Fetching,
    Fetched,
    Error,
}

/// A submitted signature awaiting its terminal event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingConfirmation {
    pub signature: String,
    pub operation: OperationType,
    pub finality: Finality,
    pub fetch_status: FetchStatus,
    /// Proposal the transaction belongs to, if any
    pub extras: Option<ProposalRef>,
    /// Pipeline run that submitted the transaction; the status is only
    /// updated while that run is still the current one
    pub run: Option<RunId>,
}

impl PendingConfirmation {
    pub fn new(signature: impl Into<String>, operation: OperationType, finality: Finality) -> Self {
        Self {
            signature: signature.into(),
            operation,
            finality,
            fetch_status: FetchStatus::Fetching,
            extras: None,
            run: None,
        }
    }

    pub fn for_run(mut self, run: RunId) -> Self {
        self.run = Some(run);
        self
    }

    pub fn with_extras(mut self, extras: Option<ProposalRef>) -> Self {
        self.extras = extras;
        self
    }
}

/// How a tracked confirmation ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmationResult {
    Confirmed(ConfirmationDetails),
    TimedOut,
}

/// Result of handling a terminal event, for downstream reconciliation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmationOutcome {
    pub pending: PendingConfirmation,
    pub result: ConfirmationResult,
    pub effects: Vec<Effect>,
}

impl ConfirmationOutcome {
    pub fn is_confirmed(&self) -> bool {
        matches!(self.result, ConfirmationResult::Confirmed(_))
    }
}

struct TrackerInner {
    pending: Mutex<HashMap<String, PendingConfirmation>>,
    source: Arc<dyn ConfirmationSource>,
    status: StatusCell,
    lock: WorkflowLock,
    sink: Arc<dyn DispatchSink>,
    notifier: Notifier,
}

/// Tracks pending confirmations for one session
#[derive(Clone)]
pub struct ConfirmationTracker {
    inner: Arc<TrackerInner>,
}

impl ConfirmationTracker {
    pub fn new(
        source: Arc<dyn ConfirmationSource>,
        status: StatusCell,
        lock: WorkflowLock,
        sink: Arc<dyn DispatchSink>,
        notifier: Notifier,
    ) -> Self {
        Self {
            inner: Arc::new(TrackerInner {
                pending: Mutex::new(HashMap::new()),
                source,
                status,
                lock,
                sink,
                notifier,
            }),
        }
    }

    /// Register `pending` and ask the source to watch it.
    ///
    /// Returns false if the signature is already pending.
    pub async fn enqueue(&self, pending: PendingConfirmation) -> bool {
        let mut registry = self.inner.pending.lock().await;
        if registry.contains_key(&pending.signature) {
            log::debug!("{} is already being tracked", pending.signature);
            return false;
        }
        self.inner.source.watch(&pending.signature, pending.finality);
        log::info!(
            "Tracking {} confirmation for {}",
            pending.operation,
            pending.signature
        );
        registry.insert(pending.signature.clone(), pending);
        true
    }

    pub async fn is_pending(&self, signature: &str) -> bool {
        self.inner.pending.lock().await.contains_key(signature)
    }

    pub async fn pending_count(&self) -> usize {
        self.inner.pending.lock().await.len()
    }

    /// Apply a terminal event; `None` if its signature is not pending
    pub async fn handle(&self, event: ConfirmationEvent) -> Option<ConfirmationOutcome> {
        let removed = self.inner.pending.lock().await.remove(event.signature());
        let Some(mut pending) = removed else {
            log::debug!("Ignoring event for untracked {}", event.signature());
            return None;
        };

        let outcome = match event {
            ConfirmationEvent::Confirmed { details, .. } => self.confirmed(&mut pending, details),
            ConfirmationEvent::TimedOut { .. } => self.timed_out(&mut pending),
        };
        Some(outcome)
    }

    fn confirmed(
        &self,
        pending: &mut PendingConfirmation,
        details: ConfirmationDetails,
    ) -> ConfirmationOutcome {
        let inner = &self.inner;
        pending.fetch_status = FetchStatus::Fetched;
        let effects = dispatch(
            pending.operation,
            Outcome::Confirmed,
            &pending.signature,
            inner.sink.as_ref(),
        );
        if let Some(run) = pending.run {
            if !inner.status.finish(run) {
                log::debug!("Status moved on from run {}, leaving it as is", run);
            }
        }
        log::info!(
            "{} confirmed: {} (slot {})",
            pending.operation,
            pending.signature,
            details.slot
        );

        inner.notifier.notify(Notification::Confirmed {
            operation: pending.operation,
            signature: pending.signature.clone(),
        });

        if let Some(proposal) = &pending.extras {
            match inner.lock.try_acquire() {
                Some(guard) => inner
                    .notifier
                    .notify(Notification::ReviewProposal(ReviewPrompt::new(
                        proposal.clone(),
                        pending.signature.clone(),
                        guard,
                    ))),
                None => log::debug!("Review prompt already open, skipping"),
            }
        }

        ConfirmationOutcome {
            pending: pending.clone(),
            result: ConfirmationResult::Confirmed(details),
            effects,
        }
    }

    fn timed_out(&self, pending: &mut PendingConfirmation) -> ConfirmationOutcome {
        let inner = &self.inner;
        pending.fetch_status = FetchStatus::Error;
        let effects = dispatch(
            pending.operation,
            Outcome::TimedOut,
            &pending.signature,
            inner.sink.as_ref(),
        );
        if let Some(run) = pending.run {
            inner.status.reset_run(run);
        }
        log::warn!(
            "{} not confirmed in time: {}",
            pending.operation,
            pending.signature
        );

        inner.notifier.notify(Notification::ConfirmationTimedOut {
            operation: pending.operation,
            signature: pending.signature.clone(),
            kind: FailureKind::ConfirmationTimeout,
        });

        ConfirmationOutcome {
            pending: pending.clone(),
            result: ConfirmationResult::TimedOut,
            effects,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::confirmation::ConfirmationBus;
    use crate::core::TransactionStage;
    use crate::dispatch::{CachedViews, EffectRecorder};
    use tokio::sync::mpsc;

    struct Fixture {
        tracker: ConfirmationTracker,
        bus: Arc<ConfirmationBus>,
        status: StatusCell,
        lock: WorkflowLock,
        sink: Arc<EffectRecorder>,
        notifications: mpsc::UnboundedReceiver<Notification>,
    }

    fn fixture() -> Fixture {
        let bus = Arc::new(ConfirmationBus::new());
        let status = StatusCell::new();
        let lock = WorkflowLock::new();
        let sink = Arc::new(EffectRecorder::new());
        let (notifier, notifications) = Notifier::channel();
        let tracker = ConfirmationTracker::new(
            bus.clone(),
            status.clone(),
            lock.clone(),
            sink.clone(),
            notifier,
        );
        Fixture {
            tracker,
            bus,
            status,
            lock,
            sink,
            notifications,
        }
    }

    // Walk the status to ConfirmTransaction as a successful run would
    fn awaiting_confirmation(status: &StatusCell) -> RunId {
        use TransactionStage::*;
        let run = status.begin_run();
        for stage in [
            InitTransaction,
            InitTransactionSuccess,
            SignTransaction,
            SignTransactionSuccess,
            SendTransaction,
            SendTransactionSuccess,
            ConfirmTransaction,
        ] {
            status.advance(stage).unwrap();
        }
        run
    }

    fn confirmed(signature: &str) -> ConfirmationEvent {
        ConfirmationEvent::Confirmed {
            signature: signature.to_string(),
            details: ConfirmationDetails {
                slot: 1,
                finality: Finality::Confirmed,
            },
        }
    }

    #[tokio::test]
    async fn test_enqueue_is_idempotent() {
        let f = fixture();
        let pending = PendingConfirmation::new("sig", OperationType::Transfer, Finality::Confirmed);

        assert!(f.tracker.enqueue(pending.clone()).await);
        assert!(!f.tracker.enqueue(pending).await);
        assert_eq!(f.tracker.pending_count().await, 1);
        assert_eq!(f.bus.watched().len(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_confirmation_dispatches_once() {
        let mut f = fixture();
        let run = awaiting_confirmation(&f.status);
        f.tracker
            .enqueue(
                PendingConfirmation::new("sig", OperationType::Transfer, Finality::Confirmed)
                    .for_run(run),
            )
            .await;

        let outcome = f.tracker.handle(confirmed("sig")).await.unwrap();
        assert_eq!(outcome.pending.fetch_status, FetchStatus::Fetched);
        assert!(f.tracker.handle(confirmed("sig")).await.is_none());
        assert!(f
            .tracker
            .handle(ConfirmationEvent::TimedOut {
                signature: "sig".to_string()
            })
            .await
            .is_none());

        assert_eq!(f.sink.analytics_for("sig"), vec!["transfer_completed"]);
        assert_eq!(
            f.status.current().current_stage,
            TransactionStage::TransactionFinished
        );
        assert!(matches!(
            f.notifications.recv().await,
            Some(Notification::Confirmed { .. })
        ));
    }

    #[tokio::test]
    async fn test_unknown_signature_is_ignored() {
        let f = fixture();
        assert!(f.tracker.handle(confirmed("unknown")).await.is_none());
        assert!(f.sink.effects().is_empty());
    }

    #[tokio::test]
    async fn test_timeout_resets_status_and_refreshes_balances() {
        let mut f = fixture();
        let run = awaiting_confirmation(&f.status);
        f.tracker
            .enqueue(
                PendingConfirmation::new("sig", OperationType::WithdrawStream, Finality::Confirmed)
                    .for_run(run),
            )
            .await;

        let outcome = f
            .tracker
            .handle(ConfirmationEvent::TimedOut {
                signature: "sig".to_string(),
            })
            .await
            .unwrap();

        assert_eq!(outcome.result, ConfirmationResult::TimedOut);
        assert_eq!(outcome.pending.fetch_status, FetchStatus::Error);
        assert_eq!(f.status.current().current_stage, TransactionStage::Idle);
        assert!(outcome.effects.iter().any(
            |e| matches!(e, Effect::ForceRefresh(v) if v.contains(CachedViews::BALANCES))
        ));
        assert_eq!(f.sink.analytics_for("sig"), vec!["stream_withdraw_failed"]);
        assert!(matches!(
            f.notifications.recv().await,
            Some(Notification::ConfirmationTimedOut {
                kind: FailureKind::ConfirmationTimeout,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_events_for_an_older_run_leave_the_current_run_alone() {
        use TransactionStage::*;
        let f = fixture();
        let older = awaiting_confirmation(&f.status);
        for sig in ["first", "second"] {
            f.tracker
                .enqueue(
                    PendingConfirmation::new(sig, OperationType::Transfer, Finality::Confirmed)
                        .for_run(older),
                )
                .await;
        }

        // A newer run is mid-flight when the old events land
        let newer = f.status.begin_run();
        f.status.advance(InitTransaction).unwrap();
        f.tracker
            .handle(ConfirmationEvent::TimedOut {
                signature: "first".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(f.status.current().current_stage, InitTransaction);

        for stage in [
            InitTransactionSuccess,
            SignTransaction,
            SignTransactionSuccess,
            SendTransaction,
            SendTransactionSuccess,
            ConfirmTransaction,
        ] {
            f.status.advance(stage).unwrap();
        }
        f.tracker.handle(confirmed("second")).await.unwrap();
        assert_eq!(f.status.current().current_stage, ConfirmTransaction);
        assert_eq!(f.status.current().run, newer);
    }

    #[tokio::test]
    async fn test_correlated_confirmation_opens_single_review() {
        let mut f = fixture();
        let proposal = ProposalRef::new("ms", "p1");
        for sig in ["a", "b"] {
            f.tracker
                .enqueue(
                    PendingConfirmation::new(sig, OperationType::ApproveProposal, Finality::Confirmed)
                        .with_extras(Some(proposal.clone())),
                )
                .await;
        }

        f.tracker.handle(confirmed("a")).await.unwrap();
        f.tracker.handle(confirmed("b")).await.unwrap();

        let mut prompts = Vec::new();
        while let Ok(notification) = f.notifications.try_recv() {
            if let Notification::ReviewProposal(prompt) = notification {
                prompts.push(prompt);
            }
        }
        assert_eq!(prompts.len(), 1);
        assert_eq!(prompts[0].proposal, proposal);
        assert!(f.lock.is_held());

        prompts.pop().unwrap().dismiss();
        assert!(!f.lock.is_held());
    }
}
