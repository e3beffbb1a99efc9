//! Transaction pipeline
//!
//! One parametrized pipeline drives every operation through
//! init -> sign -> send:
//! - init: fee preflight, then the operation's builder (optionally wrapped
//!   in a multisig proposal)
//! - sign: refresh the blockhash and fee payer, delegate to the signer
//! - send: submit and hand the signature to the confirmation tracker
//!
//! Every transition updates the shared status and appends to the run's
//! audit log. The run returns once the transaction is submitted; finality
//! is handled by the tracker.

pub mod error;

pub use error::{FailureKind, PipelineError};

use crate::builder::InstructionBuilder;
use crate::confirmation::{ConfirmationTracker, Finality, PendingConfirmation};
use crate::core::{
    check_balance, AuditLog, FeeSchedule, OperationType, RunId, StatusCell, Transaction,
    TransactionStage,
};
use crate::ledger::{LedgerClient, SubmitError, SubmitFailure};
use crate::logger::TransactionLogger;
use crate::multisig::{MultisigRoute, ProposalRef};
use crate::notify::{Notification, Notifier};
use crate::wallet::{Signer, SignerError};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

// =============================================================================
// Request / Outcome
// =============================================================================

/// Everything one run needs
#[derive(Clone)]
pub struct PipelineRequest {
    pub operation: OperationType,
    pub builder: Arc<dyn InstructionBuilder>,
    pub fees: FeeSchedule,
    /// Payer balance for the preflight; fetched from the ledger when unset
    pub balance: Option<u64>,
    /// Amount the operation moves, for percentage fees
    pub amount: u64,
    /// Propose through a multisig instead of executing directly
    pub route: Option<MultisigRoute>,
    /// Operation carried inside the proposal when `route` is set
    pub payload_operation: Option<OperationType>,
    /// Proposal the operation acts on
    pub correlation: Option<ProposalRef>,
}

impl PipelineRequest {
    pub fn new(operation: OperationType, builder: impl InstructionBuilder + 'static) -> Self {
        Self {
            operation,
            builder: Arc::new(builder),
            fees: FeeSchedule::default(),
            balance: None,
            amount: 0,
            route: None,
            payload_operation: None,
            correlation: None,
        }
    }

    pub fn fees(mut self, fees: FeeSchedule) -> Self {
        self.fees = fees;
        self
    }

    pub fn balance(mut self, balance: u64) -> Self {
        self.balance = Some(balance);
        self
    }

    pub fn amount(mut self, amount: u64) -> Self {
        self.amount = amount;
        self
    }

    /// Propose the operation through `route`. The run itself becomes a
    /// `CreateProposal`; the wrapped operation is kept for failure reports.
    pub fn routed(mut self, route: MultisigRoute) -> Self {
        self.route = Some(route);
        if self.operation != OperationType::CreateProposal {
            self.payload_operation = Some(self.operation);
            self.operation = OperationType::CreateProposal;
        }
        self
    }

    pub fn correlation(mut self, proposal: ProposalRef) -> Self {
        self.correlation = Some(proposal);
        self
    }

    /// Operation whose accounts a submit failure refers to
    pub fn payload(&self) -> OperationType {
        self.payload_operation.unwrap_or(self.operation)
    }

    /// Proposal to reconcile once the transaction confirms
    fn extras(&self) -> Option<ProposalRef> {
        self.correlation
            .clone()
            .or_else(|| self.route.as_ref().map(MultisigRoute::reference))
    }
}

/// Non-error end of a run
#[derive(Debug, Clone)]
pub enum PipelineOutcome {
    /// Submitted; confirmation is tracked separately
    Submitted { signature: String, audit: AuditLog },
    /// Cancelled between stages; nothing was submitted
    Cancelled {
        before: TransactionStage,
        audit: AuditLog,
    },
}

impl PipelineOutcome {
    pub fn signature(&self) -> Option<&str> {
        match self {
            PipelineOutcome::Submitted { signature, .. } => Some(signature),
            PipelineOutcome::Cancelled { .. } => None,
        }
    }

    pub fn audit(&self) -> &AuditLog {
        match self {
            PipelineOutcome::Submitted { audit, .. } | PipelineOutcome::Cancelled { audit, .. } => {
                audit
            }
        }
    }
}

// =============================================================================
// Pipeline
// =============================================================================

/// Clears the busy flag when a run ends
struct BusyGuard<'a>(&'a AtomicBool);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct TransactionPipeline {
    ledger: Arc<dyn LedgerClient>,
    signer: RwLock<Option<Arc<dyn Signer>>>,
    tracker: ConfirmationTracker,
    status: StatusCell,
    logger: Arc<dyn TransactionLogger>,
    notifier: Notifier,
    finality: Finality,
    busy: AtomicBool,
}

impl TransactionPipeline {
    pub fn new(
        ledger: Arc<dyn LedgerClient>,
        tracker: ConfirmationTracker,
        status: StatusCell,
        logger: Arc<dyn TransactionLogger>,
        notifier: Notifier,
    ) -> Self {
        Self {
            ledger,
            signer: RwLock::new(None),
            tracker,
            status,
            logger,
            notifier,
            finality: Finality::default(),
            busy: AtomicBool::new(false),
        }
    }

    pub fn with_finality(mut self, finality: Finality) -> Self {
        self.finality = finality;
        self
    }

    pub async fn connect(&self, signer: Arc<dyn Signer>) {
        log::info!("Wallet connected: {}", signer.public_key());
        *self.signer.write().await = Some(signer);
    }

    pub async fn disconnect(&self) {
        if self.signer.write().await.take().is_some() {
            log::info!("Wallet disconnected");
        }
    }

    /// Address of the connected signer
    pub async fn signer_key(&self) -> Option<String> {
        self.signer.read().await.as_ref().map(|s| s.public_key())
    }

    pub fn status(&self) -> &StatusCell {
        &self.status
    }

    pub fn tracker(&self) -> &ConfirmationTracker {
        &self.tracker
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    fn try_begin(&self) -> Option<BusyGuard<'_>> {
        self.busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| BusyGuard(&self.busy))
    }

    /// Drive one operation from Idle to submission.
    ///
    /// `cancel` is checked before the init, sign and send stages; a stage
    /// that has started always completes.
    pub async fn run(
        &self,
        request: PipelineRequest,
        cancel: &CancellationToken,
    ) -> Result<PipelineOutcome, PipelineError> {
        let _busy = self.try_begin().ok_or(PipelineError::Busy)?;
        let mut run = Run::new(self, request.operation, self.status.begin_run());
        run.record(
            TransactionStage::TransactionStart,
            json!({
                "operation": request.operation,
                "payload": request.payload_operation,
                "correlation": request.extras(),
            }),
        );

        let signer = self.signer.read().await.clone();
        let Some(signer) = signer else {
            let err = SignerError::Unavailable("no wallet connected".to_string());
            return Err(run.fail(TransactionStage::WalletNotFound, err.into()));
        };
        let payer = signer.public_key();

        // ---- init ----
        if cancel.is_cancelled() {
            return Ok(run.cancelled(TransactionStage::InitTransaction));
        }
        run.enter(
            TransactionStage::InitTransaction,
            json!({
                "payer": payer,
                "inputs": request.builder.audit_inputs(),
                "fees": request.fees,
                "amount": request.amount,
                "route": request.route,
            }),
        )?;

        let balance = match request.balance {
            Some(balance) => balance,
            None => match self.ledger.get_balance(&payer).await {
                Ok(balance) => balance,
                Err(e) => return Err(run.fail(TransactionStage::TransactionStartFailure, e.into())),
            },
        };
        if let Err(e) = check_balance(balance, &request.fees, request.amount) {
            return Err(run.fail(TransactionStage::TransactionStartFailure, e.into()));
        }

        let inner = match request.builder.build(&payer).await {
            Ok(tx) => tx,
            Err(e) => return Err(run.fail(TransactionStage::InitTransactionFailure, e.into())),
        };
        let mut tx = match &request.route {
            Some(route) => match route.wrap(inner.clone(), &payer) {
                Ok(tx) => tx,
                Err(e) => {
                    return Err(run.fail(TransactionStage::InitTransactionFailure, e.into()))
                }
            },
            None => inner.clone(),
        };
        run.enter(
            TransactionStage::InitTransactionSuccess,
            json!({
                "instructions": tx.instructions.len(),
                "accounts": tx.account_keys(),
            }),
        )?;

        // ---- sign ----
        if cancel.is_cancelled() {
            return Ok(run.cancelled(TransactionStage::SignTransaction));
        }
        run.enter(
            TransactionStage::SignTransaction,
            json!({ "fee_payer": payer }),
        )?;

        let blockhash = match self.ledger.latest_blockhash().await {
            Ok(hash) => hash,
            Err(e) => {
                let err = SignerError::BlockhashUnavailable(e.to_string());
                return Err(run.fail(TransactionStage::SignTransactionFailure, err.into()));
            }
        };
        tx.recent_blockhash = Some(blockhash.clone());
        tx.fee_payer = Some(payer.clone());

        let signed = match signer.sign_transaction(tx).await {
            Ok(signed) => signed,
            Err(e) => return Err(run.fail(TransactionStage::SignTransactionFailure, e.into())),
        };
        run.enter(
            TransactionStage::SignTransactionSuccess,
            json!({ "signature": signed.signature_id(), "blockhash": blockhash }),
        )?;

        // ---- send ----
        if cancel.is_cancelled() {
            return Ok(run.cancelled(TransactionStage::SendTransaction));
        }
        run.enter(
            TransactionStage::SendTransaction,
            json!({ "signature": signed.signature_id() }),
        )?;

        let signature = match self.ledger.submit(&signed).await {
            Ok(signature) => signature,
            Err(e) => {
                let failure = classify(e, request.payload(), &inner);
                return Err(run.fail(TransactionStage::SendTransactionFailure, failure.into()));
            }
        };

        // The ledger accepted it: whatever the status says, it must be tracked
        run.settle(
            TransactionStage::SendTransactionSuccess,
            json!({ "signature": signature }),
        );
        run.settle(
            TransactionStage::ConfirmTransaction,
            json!({ "finality": self.finality }),
        );

        self.tracker
            .enqueue(
                PendingConfirmation::new(&signature, request.operation, self.finality)
                    .with_extras(request.extras())
                    .for_run(run.id),
            )
            .await;
        self.notifier.notify(Notification::Submitted {
            operation: request.operation,
            signature: signature.clone(),
        });
        log::info!("{} submitted: {}", request.operation, signature);

        Ok(PipelineOutcome::Submitted {
            signature,
            audit: run.audit,
        })
    }
}

fn classify(
    error: SubmitError,
    operation: OperationType,
    inner: &Transaction,
) -> SubmitFailure {
    log::debug!("Submit rejected: {} {:?}", error.message, error.logs);
    SubmitFailure::classify(error, operation, inner)
}

// =============================================================================
// Run bookkeeping
// =============================================================================

struct Run<'a> {
    pipeline: &'a TransactionPipeline,
    operation: OperationType,
    id: RunId,
    audit: AuditLog,
}

/// Failure stage that ends a run which could not enter `stage`
fn failure_stage(stage: TransactionStage) -> TransactionStage {
    use TransactionStage::*;
    match stage {
        InitTransaction | InitTransactionSuccess => InitTransactionFailure,
        SignTransaction | SignTransactionSuccess => SignTransactionFailure,
        _ => SendTransactionFailure,
    }
}

impl<'a> Run<'a> {
    fn new(pipeline: &'a TransactionPipeline, operation: OperationType, id: RunId) -> Self {
        Self {
            pipeline,
            operation,
            id,
            audit: AuditLog::new(),
        }
    }

    fn record(&mut self, stage: TransactionStage, data: Value) {
        let label = format!("{} {}", self.operation.label(), stage);
        self.audit.record(stage, label, data);
    }

    fn enter(&mut self, stage: TransactionStage, data: Value) -> Result<(), PipelineError> {
        if let Err(e) = self.pipeline.status.advance(stage) {
            return Err(self.fail(failure_stage(stage), e.into()));
        }
        log::debug!("{}: {}", self.operation, stage);
        self.record(stage, data);
        Ok(())
    }

    /// Record a stage reached after submission. A rejected status
    /// transition is logged but never aborts the run.
    fn settle(&mut self, stage: TransactionStage, data: Value) {
        if let Err(e) = self.pipeline.status.advance(stage) {
            log::warn!("{} (run {}): {}", self.operation, self.id, e);
        }
        log::debug!("{}: {}", self.operation, stage);
        self.record(stage, data);
    }

    /// Move to the failure `stage` and hand the transcript to the logger
    fn fail(&mut self, stage: TransactionStage, error: PipelineError) -> PipelineError {
        if let Err(e) = self.pipeline.status.advance(stage) {
            log::error!("{}", e);
        }
        self.record(
            stage,
            json!({ "error": error.to_string(), "kind": error.kind() }),
        );

        let label = self.operation.label();
        if error.is_user_correctable() {
            self.pipeline.logger.log_warning(label, &self.audit);
        } else {
            self.pipeline.logger.log_error(label, &self.audit);
        }
        self.pipeline.notifier.notify(Notification::Failed {
            operation: self.operation,
            kind: error.kind(),
            message: error.to_string(),
        });
        error
    }

    fn cancelled(mut self, before: TransactionStage) -> PipelineOutcome {
        let stage = self.pipeline.status.current().current_stage;
        self.pipeline.status.reset_run(self.id);
        self.audit.record(
            stage,
            format!("{} cancelled", self.operation.label()),
            json!({ "before": before, "kind": FailureKind::CancellationAbort }),
        );
        log::info!("{} cancelled before {}", self.operation, before);
        PipelineOutcome::Cancelled {
            before,
            audit: self.audit,
        }
    }
}
