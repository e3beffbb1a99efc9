//! Proposal lifecycle controller
//!
//! Pre-checks proposal actions against a freshly fetched copy, routes them
//! through the transaction pipeline and re-fetches once they confirm. The
//! ledger's copy is authoritative; the cache here is advisory only and is
//! never updated from local deltas.

use crate::builder::InstructionBuilder;
use crate::confirmation::ConfirmationOutcome;
use crate::core::{FeeSchedule, OperationType};
use crate::ledger::{LedgerClient, LedgerError};
use crate::multisig::instruction::{MultisigRoute, ProposalActionBuilder};
use crate::multisig::proposal::{MultisigProposal, ProposalAction, ProposalError, ProposalRef};
use crate::pipeline::{PipelineError, PipelineOutcome, PipelineRequest, TransactionPipeline};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

#[derive(Error, Debug)]
pub enum ControllerError {
    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),
    #[error("Not permitted: {0}")]
    NotPermitted(#[from] ProposalError),
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

/// Fees and balance used for the preflight of a proposal transaction
#[derive(Debug, Clone, Copy, Default)]
pub struct ActionFees {
    pub fees: FeeSchedule,
    pub balance: Option<u64>,
}

struct ControllerInner {
    ledger: Arc<dyn LedgerClient>,
    pipeline: Arc<TransactionPipeline>,
    cache: RwLock<HashMap<ProposalRef, MultisigProposal>>,
}

#[derive(Clone)]
pub struct ProposalController {
    inner: Arc<ControllerInner>,
}

impl ProposalController {
    pub fn new(ledger: Arc<dyn LedgerClient>, pipeline: Arc<TransactionPipeline>) -> Self {
        Self {
            inner: Arc::new(ControllerInner {
                ledger,
                pipeline,
                cache: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Fetch the ledger copy and replace the cached one
    pub async fn refresh(&self, proposal: &ProposalRef) -> Result<MultisigProposal, ControllerError> {
        let fetched = self
            .inner
            .ledger
            .get_multisig_transaction(&proposal.multisig, &proposal.proposal_id)
            .await?;
        self.inner
            .cache
            .write()
            .await
            .insert(proposal.clone(), fetched.clone());
        Ok(fetched)
    }

    /// Last fetched copy, if any
    pub async fn cached(&self, proposal: &ProposalRef) -> Option<MultisigProposal> {
        self.inner.cache.read().await.get(proposal).cloned()
    }

    pub async fn invalidate(&self, proposal: &ProposalRef) {
        self.inner.cache.write().await.remove(proposal);
    }

    /// Actions `caller` may take on the current ledger copy
    pub async fn permitted_actions(
        &self,
        proposal: &ProposalRef,
        caller: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<ProposalAction>, ControllerError> {
        Ok(self.refresh(proposal).await?.permitted_actions(caller, now))
    }

    /// Approve, reject, execute or cancel `proposal` as the connected signer.
    ///
    /// The proposal is re-fetched and the action authorized before anything
    /// is built; refused actions never reach the pipeline.
    pub async fn submit_action(
        &self,
        action: ProposalAction,
        proposal: &ProposalRef,
        fees: ActionFees,
        cancel: &CancellationToken,
    ) -> Result<PipelineOutcome, ControllerError> {
        if let Some(caller) = self.inner.pipeline.signer_key().await {
            let current = self.refresh(proposal).await?;
            current.authorize(action, &caller, Utc::now())?;
        }

        let mut request = PipelineRequest::new(
            action.operation(),
            ProposalActionBuilder::new(action, proposal.clone()),
        )
        .fees(fees.fees)
        .correlation(proposal.clone());
        request.balance = fees.balance;

        Ok(self.inner.pipeline.run(request, cancel).await?)
    }

    /// Propose the `operation` built by `builder` on the route's multisig
    pub async fn create_proposal(
        &self,
        operation: OperationType,
        builder: impl InstructionBuilder + 'static,
        route: MultisigRoute,
        fees: ActionFees,
        cancel: &CancellationToken,
    ) -> Result<PipelineOutcome, ControllerError> {
        if let Some(caller) = self.inner.pipeline.signer_key().await {
            let account = self.inner.ledger.get_multisig_account(&route.multisig).await?;
            if !account.is_owner(&caller) {
                return Err(ProposalError::NotAnOwner(caller).into());
            }
        }

        let mut request = PipelineRequest::new(operation, builder)
            .fees(fees.fees)
            .routed(route);
        request.balance = fees.balance;

        Ok(self.inner.pipeline.run(request, cancel).await?)
    }

    /// Re-fetch the proposal a terminal confirmation belongs to
    pub async fn reconcile(&self, outcome: &ConfirmationOutcome) -> Option<MultisigProposal> {
        let proposal = outcome.pending.extras.as_ref()?;
        self.invalidate(proposal).await;
        match self.refresh(proposal).await {
            Ok(fetched) => {
                log::info!(
                    "Proposal {} is {} ({} approvals)",
                    fetched.id,
                    fetched.status,
                    fetched.approvals()
                );
                Some(fetched)
            }
            Err(e) => {
                log::warn!("Could not reconcile proposal {}: {}", proposal.proposal_id, e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::TransferBuilder;
    use crate::confirmation::{
        ConfirmationDetails, ConfirmationResult, ConfirmationTracker, FetchStatus, Finality,
        PendingConfirmation,
    };
    use crate::core::StatusCell;
    use crate::dispatch::EffectRecorder;
    use crate::ledger::{LedgerSettings, MemoryLedger};
    use crate::lock::WorkflowLock;
    use crate::logger::MemoryLogger;
    use crate::multisig::{CreateMultisigBuilder, MultisigConfig, ProposalStatus};
    use crate::notify::Notifier;
    use crate::wallet::{KeypairSigner, Signer};
    use std::time::Duration;

    struct Owners {
        ledger: Arc<MemoryLedger>,
        signers: Vec<Arc<KeypairSigner>>,
        pipelines: Vec<Arc<TransactionPipeline>>,
        vault: String,
    }

    // One pipeline per owner, all against the same ledger
    async fn owners(threshold: u8, n: usize) -> Owners {
        let ledger = Arc::new(MemoryLedger::new(LedgerSettings {
            confirmation_delay: Duration::from_secs(60),
            ..Default::default()
        }));
        let mut signers = Vec::new();
        let mut pipelines = Vec::new();
        for i in 0..n {
            let signer = Arc::new(KeypairSigner::with_label(&format!("owner-{i}")));
            ledger.airdrop(&signer.public_key(), 1_000_000).await;
            let status = StatusCell::new();
            let (notifier, _) = Notifier::channel();
            let tracker = ConfirmationTracker::new(
                ledger.clone(),
                status.clone(),
                WorkflowLock::new(),
                Arc::new(EffectRecorder::new()),
                notifier.clone(),
            );
            let pipeline = Arc::new(TransactionPipeline::new(
                ledger.clone(),
                tracker,
                status,
                Arc::new(MemoryLogger::new()),
                notifier,
            ));
            pipeline.connect(signer.clone()).await;
            signers.push(signer);
            pipelines.push(pipeline);
        }

        let config = MultisigConfig::new(
            threshold,
            signers.iter().map(|s| s.public_key()).collect(),
            None,
        )
        .unwrap();
        let vault = config.derive_address();
        let request = PipelineRequest::new(
            OperationType::CreateMultisig,
            CreateMultisigBuilder { config },
        );
        pipelines[0]
            .run(request, &CancellationToken::new())
            .await
            .unwrap();
        ledger.airdrop(&vault, 100_000).await;

        Owners {
            ledger,
            signers,
            pipelines,
            vault,
        }
    }

    impl Owners {
        fn controller(&self, i: usize) -> ProposalController {
            ProposalController::new(self.ledger.clone(), self.pipelines[i].clone())
        }

        async fn propose(&self) -> ProposalRef {
            let proposer = self.signers[0].public_key();
            let route = MultisigRoute::new(&self.vault, &proposer, "Pay vendor");
            let reference = route.reference();
            self.controller(0)
                .create_proposal(
                    OperationType::Transfer,
                    TransferBuilder::new("vendor", 40_000).from_account(&self.vault),
                    route,
                    ActionFees::default(),
                    &CancellationToken::new(),
                )
                .await
                .unwrap();
            reference
        }
    }

    #[tokio::test]
    async fn test_two_of_three_end_to_end() {
        let o = owners(2, 3).await;
        let proposal = o.propose().await;
        let token = CancellationToken::new();

        for i in [1, 2] {
            o.controller(i)
                .submit_action(ProposalAction::Approve, &proposal, ActionFees::default(), &token)
                .await
                .unwrap();
            if i == 1 {
                let p = o.controller(0).refresh(&proposal).await.unwrap();
                assert_eq!(p.status, ProposalStatus::Active);
            }
        }
        let passed = o.controller(0).refresh(&proposal).await.unwrap();
        assert_eq!(passed.status, ProposalStatus::Passed);

        o.controller(0)
            .submit_action(ProposalAction::Execute, &proposal, ActionFees::default(), &token)
            .await
            .unwrap();
        let executed = o.controller(0).refresh(&proposal).await.unwrap();
        assert_eq!(executed.status, ProposalStatus::Executed);
        assert_eq!(o.ledger.get_balance("vendor").await.unwrap(), 40_000);
    }

    #[tokio::test]
    async fn test_refused_actions_never_build() {
        let o = owners(2, 3).await;
        let proposal = o.propose().await;
        let token = CancellationToken::new();
        let slot = o.ledger.slot().await;

        // Non-proposer cancel
        let err = o
            .controller(1)
            .submit_action(ProposalAction::Cancel, &proposal, ActionFees::default(), &token)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ControllerError::NotPermitted(ProposalError::NotProposer)
        ));

        // Execute before passing
        let err = o
            .controller(2)
            .submit_action(ProposalAction::Execute, &proposal, ActionFees::default(), &token)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ControllerError::NotPermitted(ProposalError::InvalidStatus { .. })
        ));

        // Double vote
        o.controller(1)
            .submit_action(ProposalAction::Approve, &proposal, ActionFees::default(), &token)
            .await
            .unwrap();
        let slot_after_vote = o.ledger.slot().await;
        let err = o
            .controller(1)
            .submit_action(ProposalAction::Reject, &proposal, ActionFees::default(), &token)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ControllerError::NotPermitted(ProposalError::AlreadyVoted(_))
        ));

        // Only the one allowed vote fetched a blockhash
        assert_eq!(slot_after_vote, slot + 1);
        assert_eq!(o.ledger.slot().await, slot_after_vote);
    }

    #[tokio::test]
    async fn test_outsider_cannot_propose() {
        let o = owners(2, 2).await;
        let outsider = Arc::new(KeypairSigner::with_label("mallory"));
        o.pipelines[1].connect(outsider.clone()).await;
        let route = MultisigRoute::new(&o.vault, &outsider.public_key(), "Drain");

        let err = o
            .controller(1)
            .create_proposal(
                OperationType::Transfer,
                TransferBuilder::new("mallory", 1).from_account(&o.vault),
                route,
                ActionFees::default(),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ControllerError::NotPermitted(ProposalError::NotAnOwner(_))
        ));
    }

    #[tokio::test]
    async fn test_permitted_actions_follow_ledger_copy() {
        let o = owners(2, 3).await;
        let proposal = o.propose().await;
        let now = Utc::now();

        let proposer = o.signers[0].public_key();
        let actions = o
            .controller(0)
            .permitted_actions(&proposal, &proposer, now)
            .await
            .unwrap();
        assert_eq!(
            actions,
            vec![
                ProposalAction::Approve,
                ProposalAction::Reject,
                ProposalAction::Cancel
            ]
        );
        assert!(o.controller(0).cached(&proposal).await.is_some());
    }

    #[tokio::test]
    async fn test_reconcile_refetches_correlated_proposal() {
        let o = owners(2, 3).await;
        let proposal = o.propose().await;
        let controller = o.controller(1);
        controller.refresh(&proposal).await.unwrap();
        controller
            .submit_action(
                ProposalAction::Approve,
                &proposal,
                ActionFees::default(),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        let mut pending =
            PendingConfirmation::new("sig", OperationType::ApproveProposal, Finality::Confirmed)
                .with_extras(Some(proposal.clone()));
        pending.fetch_status = FetchStatus::Fetched;
        let outcome = ConfirmationOutcome {
            pending,
            result: ConfirmationResult::Confirmed(ConfirmationDetails {
                slot: 1,
                finality: Finality::Confirmed,
            }),
            effects: Vec::new(),
        };

        let fetched = controller.reconcile(&outcome).await.unwrap();
        assert_eq!(fetched.approvals(), 1);
        assert_eq!(controller.cached(&proposal).await.unwrap().approvals(), 1);
    }
}
