//! Per-view session
//!
//! A session owns one status cell, one workflow lock, one confirmation
//! tracker, one pipeline and one proposal controller. Each consuming view
//! creates its own; nothing here is process-global. Mounting subscribes the
//! tracker to the confirmation source; unmounting, disconnecting the wallet
//! or dropping the session releases the workflow lock.

use crate::confirmation::{ConfirmationSource, ConfirmationTracker, Finality};
use crate::core::{StatusCell, TransactionStatus};
use crate::dispatch::{DispatchSink, EffectRecorder};
use crate::ledger::LedgerClient;
use crate::lock::WorkflowLock;
use crate::logger::{LogTransactionLogger, TransactionLogger};
use crate::multisig::ProposalController;
use crate::notify::{Notification, Notifier};
use crate::pipeline::{PipelineError, PipelineOutcome, PipelineRequest, TransactionPipeline};
use crate::wallet::Signer;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Listener task that stops when dropped
#[derive(Debug)]
pub struct Subscription {
    handle: JoinHandle<()>,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

pub struct SessionBuilder {
    ledger: Arc<dyn LedgerClient>,
    source: Arc<dyn ConfirmationSource>,
    sink: Arc<dyn DispatchSink>,
    logger: Arc<dyn TransactionLogger>,
    finality: Finality,
}

impl SessionBuilder {
    pub fn sink(mut self, sink: Arc<dyn DispatchSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn logger(mut self, logger: Arc<dyn TransactionLogger>) -> Self {
        self.logger = logger;
        self
    }

    pub fn finality(mut self, finality: Finality) -> Self {
        self.finality = finality;
        self
    }

    pub fn build(self) -> Session {
        let status = StatusCell::new();
        let lock = WorkflowLock::new();
        let (notifier, notifications) = Notifier::channel();
        let tracker = ConfirmationTracker::new(
            Arc::clone(&self.source),
            status.clone(),
            lock.clone(),
            self.sink,
            notifier.clone(),
        );
        let pipeline = Arc::new(
            TransactionPipeline::new(
                Arc::clone(&self.ledger),
                tracker,
                status.clone(),
                self.logger,
                notifier,
            )
            .with_finality(self.finality),
        );
        let proposals = ProposalController::new(self.ledger, Arc::clone(&pipeline));

        Session {
            status,
            lock,
            pipeline,
            proposals,
            source: self.source,
            notifications: Some(notifications),
            subscription: None,
        }
    }
}

pub struct Session {
    status: StatusCell,
    lock: WorkflowLock,
    pipeline: Arc<TransactionPipeline>,
    proposals: ProposalController,
    source: Arc<dyn ConfirmationSource>,
    notifications: Option<mpsc::UnboundedReceiver<Notification>>,
    subscription: Option<Subscription>,
}

impl Session {
    pub fn builder(
        ledger: Arc<dyn LedgerClient>,
        source: Arc<dyn ConfirmationSource>,
    ) -> SessionBuilder {
        SessionBuilder {
            ledger,
            source,
            sink: Arc::new(EffectRecorder::new()),
            logger: Arc::new(LogTransactionLogger),
            finality: Finality::default(),
        }
    }

    pub fn status(&self) -> TransactionStatus {
        self.status.current()
    }

    pub fn watch_status(&self) -> watch::Receiver<TransactionStatus> {
        self.status.subscribe()
    }

    pub fn lock(&self) -> &WorkflowLock {
        &self.lock
    }

    pub fn pipeline(&self) -> &Arc<TransactionPipeline> {
        &self.pipeline
    }

    pub fn proposals(&self) -> &ProposalController {
        &self.proposals
    }

    pub fn tracker(&self) -> &ConfirmationTracker {
        self.pipeline.tracker()
    }

    /// Receiver for this session's notifications; only handed out once
    pub fn take_notifications(&mut self) -> Option<mpsc::UnboundedReceiver<Notification>> {
        self.notifications.take()
    }

    pub fn is_mounted(&self) -> bool {
        self.subscription.is_some()
    }

    /// Start feeding confirmation events to the tracker.
    ///
    /// Subscribes once; mounting an already mounted session does nothing.
    pub fn mount(&mut self) {
        if self.subscription.is_some() {
            return;
        }
        let mut events = self.source.subscribe();
        let tracker = self.pipeline.tracker().clone();
        let proposals = self.proposals.clone();

        let handle = tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => {
                        if let Some(outcome) = tracker.handle(event).await {
                            proposals.reconcile(&outcome).await;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        log::warn!("Confirmation listener lagged, {} events skipped", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            log::debug!("Confirmation source closed");
        });
        self.subscription = Some(Subscription { handle });
    }

    pub fn unmount(&mut self) {
        self.subscription = None;
        self.lock.force_release();
    }

    pub async fn connect(&self, signer: Arc<dyn Signer>) {
        self.pipeline.connect(signer).await;
    }

    pub async fn disconnect(&self) {
        self.pipeline.disconnect().await;
        self.lock.force_release();
    }

    pub async fn run(
        &self,
        request: PipelineRequest,
        cancel: &CancellationToken,
    ) -> Result<PipelineOutcome, PipelineError> {
        self.pipeline.run(request, cancel).await
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.lock.force_release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::TransferBuilder;
    use crate::core::{OperationType, TransactionStage};
    use crate::dispatch::{Effect, Route};
    use crate::ledger::{LedgerSettings, MemoryLedger};
    use crate::multisig::{
        ActionFees, CreateMultisigBuilder, MultisigConfig, MultisigRoute, ProposalAction,
        ProposalStatus,
    };
    use crate::wallet::KeypairSigner;
    use std::time::Duration;
    use tokio::time::timeout;

    struct Fixture {
        session: Session,
        ledger: Arc<MemoryLedger>,
        sink: Arc<EffectRecorder>,
        signer: Arc<KeypairSigner>,
        notifications: mpsc::UnboundedReceiver<Notification>,
    }

    async fn fixture() -> Fixture {
        let ledger = Arc::new(MemoryLedger::new(LedgerSettings {
            confirmation_delay: Duration::from_millis(5),
            ..Default::default()
        }));
        fixture_on(ledger).await
    }

    async fn fixture_on(ledger: Arc<MemoryLedger>) -> Fixture {
        let sink = Arc::new(EffectRecorder::new());
        let mut session = Session::builder(ledger.clone(), ledger.clone())
            .sink(sink.clone())
            .build();
        let notifications = session.take_notifications().unwrap();
        session.mount();

        let signer = Arc::new(KeypairSigner::with_label("alice"));
        ledger.airdrop(&signer.public_key(), 1_000_000).await;
        session.connect(signer.clone()).await;
        Fixture {
            session,
            ledger,
            sink,
            signer,
            notifications,
        }
    }

    // Next notification that is not a submission receipt
    async fn next_terminal(rx: &mut mpsc::UnboundedReceiver<Notification>) -> Notification {
        loop {
            let notification = timeout(Duration::from_secs(5), rx.recv())
                .await
                .expect("no notification in time")
                .expect("channel closed");
            if !matches!(notification, Notification::Submitted { .. }) {
                return notification;
            }
        }
    }

    fn transfer(amount: u64) -> PipelineRequest {
        PipelineRequest::new(OperationType::Transfer, TransferBuilder::new("bob", amount))
            .amount(amount)
    }

    #[tokio::test]
    async fn test_transfer_confirms_and_dispatches_once() {
        let mut f = fixture().await;
        let outcome = f
            .session
            .run(transfer(25_000), &CancellationToken::new())
            .await
            .unwrap();
        let signature = outcome.signature().unwrap().to_string();

        assert!(matches!(
            next_terminal(&mut f.notifications).await,
            Notification::Confirmed { .. }
        ));
        assert_eq!(
            f.session.status().current_stage,
            TransactionStage::TransactionFinished
        );
        assert!(!f.session.tracker().is_pending(&signature).await);

        // A late duplicate changes nothing
        f.ledger.emit(crate::confirmation::ConfirmationEvent::TimedOut {
            signature: signature.clone(),
        });
        tokio::task::yield_now().await;
        assert_eq!(f.sink.analytics_for(&signature), vec!["transfer_completed"]);
    }

    #[tokio::test]
    async fn test_timeout_leaves_funds_moved_but_status_idle() {
        let mut f = fixture().await;
        f.ledger.set_drop_confirmations(true);

        f.session
            .run(transfer(25_000), &CancellationToken::new())
            .await
            .unwrap();

        assert!(matches!(
            next_terminal(&mut f.notifications).await,
            Notification::ConfirmationTimedOut { .. }
        ));
        assert_eq!(f.session.status().current_stage, TransactionStage::Idle);
        // No rollback: the transfer landed even though confirmation timed out
        assert_eq!(f.ledger.get_balance("bob").await.unwrap(), 25_000);
    }

    #[tokio::test]
    async fn test_proposal_confirmation_opens_review_and_drop_releases_lock() {
        let mut f = fixture().await;
        let bob = KeypairSigner::with_label("bob");
        let config =
            MultisigConfig::new(1, vec![f.signer.public_key(), bob.public_key()], None).unwrap();
        let vault = config.derive_address();
        f.session
            .run(
                PipelineRequest::new(OperationType::CreateMultisig, CreateMultisigBuilder { config }),
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        next_terminal(&mut f.notifications).await;
        assert!(f
            .sink
            .effects()
            .contains(&Effect::Navigate(Route::MultisigAccounts)));

        let route = MultisigRoute::new(&vault, &f.signer.public_key(), "Pay bob");
        let proposal = route.reference();
        f.session
            .proposals()
            .create_proposal(
                OperationType::Transfer,
                TransferBuilder::new("bob", 1).from_account(&vault),
                route,
                ActionFees::default(),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert!(matches!(
            next_terminal(&mut f.notifications).await,
            Notification::Confirmed { .. }
        ));
        let prompt = match next_terminal(&mut f.notifications).await {
            Notification::ReviewProposal(prompt) => prompt,
            other => panic!("unexpected notification {other:?}"),
        };
        assert_eq!(prompt.proposal, proposal);

        // Reconciliation runs after the prompt is raised
        tokio::time::sleep(Duration::from_millis(20)).await;
        let cached = f.session.proposals().cached(&proposal).await.unwrap();
        assert_eq!(cached.status, ProposalStatus::Active);
        assert_eq!(
            f.session
                .proposals()
                .permitted_actions(&proposal, &f.signer.public_key(), chrono::Utc::now())
                .await
                .unwrap(),
            vec![
                ProposalAction::Approve,
                ProposalAction::Reject,
                ProposalAction::Cancel
            ]
        );

        let lock = f.session.lock().clone();
        assert!(lock.is_held());
        drop(f.session);
        assert!(!lock.is_held());
        drop(prompt);
    }

    #[tokio::test]
    async fn test_disconnect_releases_lock_and_blocks_runs() {
        let f = fixture().await;
        let guard = f.session.lock().try_acquire().unwrap();
        f.session.disconnect().await;
        assert!(!f.session.lock().is_held());
        drop(guard);

        let err = f
            .session
            .run(transfer(1), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Signer(_)));
        assert_eq!(
            f.session.status().current_stage,
            TransactionStage::WalletNotFound
        );
    }

    #[tokio::test]
    async fn test_unmounted_session_ignores_events() {
        let ledger = Arc::new(MemoryLedger::new(LedgerSettings {
            confirmation_delay: Duration::from_millis(1),
            ..Default::default()
        }));
        let mut f = fixture_on(ledger).await;
        f.session.unmount();
        assert!(!f.session.is_mounted());

        let outcome = f
            .session
            .run(transfer(10), &CancellationToken::new())
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        let signature = outcome.signature().unwrap();
        assert!(f.session.tracker().is_pending(signature).await);
        assert!(f.sink.effects().is_empty());

        // Remounting picks up later events
        f.session.mount();
        f.ledger.watch(signature, Finality::Confirmed);
        assert!(matches!(
            next_terminal(&mut f.notifications).await,
            Notification::Confirmed { .. }
        ));
    }
}
