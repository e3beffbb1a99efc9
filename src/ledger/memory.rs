//! In-memory ledger
//!
//! Processes transactions against an in-process account set: native
//! balances, multisig accounts and their proposals. Submission is atomic:
//! instructions run against a copy of the state which only replaces the
//! live state when every instruction succeeds.

use crate::builder::{SystemInstruction, SYSTEM_PROGRAM_ID};
use crate::confirmation::{
    ConfirmationBus, ConfirmationDetails, ConfirmationEvent, ConfirmationSource, Finality,
};
use crate::core::{Instruction, SignedTransaction, DEFAULT_NETWORK_FEE};
use crate::crypto::{sha256, verify_signature};
use crate::ledger::{LedgerClient, LedgerError, SubmitError};
use crate::multisig::{
    MultisigAccount, MultisigConfig, MultisigInstruction, MultisigProposal, ProposalAction,
    ProposalError, ProposalRef, MULTISIG_PROGRAM_ID,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex, RwLock};

/// Number of blockhashes a transaction may reference
pub const RECENT_BLOCKHASHES: usize = 150;

/// System program: source account cannot cover the transfer
const INSUFFICIENT_FUNDS: u32 = 0x1;

/// Referenced account does not exist
const ACCOUNT_NOT_INITIALIZED: u32 = 0xbc4;

/// Error codes raised by the multisig program
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MultisigProgramError {
    NotAnOwner = 0x1770,
    AlreadyVoted = 0x1771,
    InvalidStatus = 0x1772,
    NotProposer = 0x1773,
    InvalidConfig = 0x1774,
    AccountInUse = 0x1775,
}

impl MultisigProgramError {
    pub fn code(self) -> u32 {
        self as u32
    }
}

impl From<&ProposalError> for MultisigProgramError {
    fn from(err: &ProposalError) -> Self {
        match err {
            ProposalError::NotAnOwner(_) => MultisigProgramError::NotAnOwner,
            ProposalError::AlreadyVoted(_) => MultisigProgramError::AlreadyVoted,
            ProposalError::NotProposer => MultisigProgramError::NotProposer,
            ProposalError::InvalidStatus { .. } | ProposalError::NotFound(_) => {
                MultisigProgramError::InvalidStatus
            }
        }
    }
}

/// Tunables for the in-memory ledger
#[derive(Debug, Clone)]
pub struct LedgerSettings {
    /// Fee charged to the fee payer per transaction
    pub fee_per_signature: u64,
    /// Delay before a watched signature is reported
    pub confirmation_delay: Duration,
}

impl Default for LedgerSettings {
    fn default() -> Self {
        Self {
            fee_per_signature: DEFAULT_NETWORK_FEE,
            confirmation_delay: Duration::from_millis(50),
        }
    }
}

#[derive(Debug, Clone, Default)]
struct LedgerState {
    slot: u64,
    balances: HashMap<String, u64>,
    multisigs: HashMap<String, MultisigAccount>,
    proposals: HashMap<ProposalRef, MultisigProposal>,
    recent_blockhashes: VecDeque<String>,
    /// Landed signatures and their slot
    processed: HashMap<String, u64>,
}

/// Ledger held entirely in memory
pub struct MemoryLedger {
    state: Arc<RwLock<LedgerState>>,
    bus: Arc<ConfirmationBus>,
    settings: LedgerSettings,
    injected_failures: Mutex<VecDeque<SubmitError>>,
    drop_confirmations: AtomicBool,
}

impl MemoryLedger {
    pub fn new(settings: LedgerSettings) -> Self {
        let mut state = LedgerState::default();
        state.next_blockhash();
        Self {
            state: Arc::new(RwLock::new(state)),
            bus: Arc::new(ConfirmationBus::new()),
            settings,
            injected_failures: Mutex::new(VecDeque::new()),
            drop_confirmations: AtomicBool::new(false),
        }
    }

    pub fn settings(&self) -> &LedgerSettings {
        &self.settings
    }

    /// Credit `amount` to `account` out of thin air
    pub async fn airdrop(&self, account: &str, amount: u64) {
        let mut state = self.state.write().await;
        state.credit(account, amount);
        log::debug!("Airdropped {} to {}", amount, account);
    }

    pub async fn slot(&self) -> u64 {
        self.state.read().await.slot
    }

    /// Reject the next submission with `error`
    pub async fn fail_next_submit(&self, error: SubmitError) {
        self.injected_failures.lock().await.push_back(error);
    }

    /// When set, watched signatures time out instead of confirming
    pub fn set_drop_confirmations(&self, drop: bool) {
        self.drop_confirmations.store(drop, Ordering::SeqCst);
    }

    /// Push an event to subscribers directly
    pub fn emit(&self, event: ConfirmationEvent) {
        self.bus.emit(event);
    }

    pub fn bus(&self) -> &ConfirmationBus {
        &self.bus
    }
}

impl Default for MemoryLedger {
    fn default() -> Self {
        Self::new(LedgerSettings::default())
    }
}

// =============================================================================
// Instruction processing
// =============================================================================

fn account(ix: &Instruction, position: usize, index: usize) -> Result<&str, SubmitError> {
    ix.accounts
        .get(position)
        .map(|meta| meta.pubkey.as_str())
        .ok_or_else(|| {
            SubmitError::new(format!(
                "Error processing Instruction {}: not enough account keys",
                index
            ))
        })
}

fn signer<'a>(
    ix: &'a Instruction,
    position: usize,
    index: usize,
    signers: &[String],
) -> Result<&'a str, SubmitError> {
    let key = account(ix, position, index)?;
    let signed = ix.accounts[position].is_signer && signers.iter().any(|s| s == key);
    if !signed {
        return Err(SubmitError::new(format!(
            "Error processing Instruction {}: missing required signature for {}",
            index, key
        )));
    }
    Ok(key)
}

fn program_error(index: usize, err: &ProposalError) -> SubmitError {
    SubmitError::custom(index, MultisigProgramError::from(err).code(), err.to_string())
}

fn not_initialized(index: usize, what: &str) -> SubmitError {
    SubmitError::custom(
        index,
        ACCOUNT_NOT_INITIALIZED,
        format!("AccountNotInitialized: {}", what),
    )
}

fn malformed(index: usize, err: impl std::fmt::Display) -> SubmitError {
    SubmitError::new(format!(
        "Error processing Instruction {}: invalid instruction data: {}",
        index, err
    ))
}

impl LedgerState {
    fn next_blockhash(&mut self) -> String {
        self.slot += 1;
        let hash = bs58::encode(sha256(format!("slot-{}", self.slot).as_bytes())).into_string();
        self.recent_blockhashes.push_back(hash.clone());
        while self.recent_blockhashes.len() > RECENT_BLOCKHASHES {
            self.recent_blockhashes.pop_front();
        }
        hash
    }

    fn balance(&self, account: &str) -> u64 {
        self.balances.get(account).copied().unwrap_or(0)
    }

    fn credit(&mut self, account: &str, amount: u64) {
        let balance = self.balances.entry(account.to_string()).or_insert(0);
        *balance = balance.saturating_add(amount);
    }

    fn debit(&mut self, account: &str, amount: u64) -> Result<(), u64> {
        let available = self.balance(account);
        if available < amount {
            return Err(available);
        }
        self.balances
            .insert(account.to_string(), available - amount);
        Ok(())
    }

    fn execute(
        &mut self,
        index: usize,
        ix: &Instruction,
        signers: &[String],
        now: DateTime<Utc>,
    ) -> Result<(), SubmitError> {
        match ix.program_id.as_str() {
            SYSTEM_PROGRAM_ID => {
                let instruction: SystemInstruction =
                    ix.payload().map_err(|e| malformed(index, e))?;
                self.execute_system(index, ix, instruction, signers)
            }
            MULTISIG_PROGRAM_ID => {
                let instruction: MultisigInstruction =
                    ix.payload().map_err(|e| malformed(index, e))?;
                self.execute_multisig(index, ix, instruction, signers, now)
            }
            other => {
                // Programs outside this ledger accept their instructions as-is
                log::debug!("Instruction {} for program {} accepted", index, other);
                Ok(())
            }
        }
    }

    fn execute_system(
        &mut self,
        index: usize,
        ix: &Instruction,
        instruction: SystemInstruction,
        signers: &[String],
    ) -> Result<(), SubmitError> {
        match instruction {
            SystemInstruction::Transfer { amount } => {
                let from = signer(ix, 0, index, signers)?;
                let to = account(ix, 1, index)?;
                self.debit(from, amount).map_err(|available| {
                    SubmitError::custom(
                        index,
                        INSUFFICIENT_FUNDS,
                        format!(
                            "Transfer: insufficient lamports {}, need {}",
                            available, amount
                        ),
                    )
                })?;
                self.credit(to, amount);
                Ok(())
            }
        }
    }

    fn vote(
        &mut self,
        index: usize,
        ix: &Instruction,
        proposal_id: &str,
        approve: bool,
        signers: &[String],
        now: DateTime<Utc>,
    ) -> Result<(), SubmitError> {
        let multisig = account(ix, 0, index)?;
        let owner = signer(ix, 1, index, signers)?;
        let proposal = self
            .proposals
            .get_mut(&ProposalRef::new(multisig, proposal_id))
            .ok_or_else(|| not_initialized(index, proposal_id))?;
        let status = proposal
            .record_vote(owner, approve, now)
            .map_err(|e| program_error(index, &e))?;
        log::debug!("Proposal {} is now {}", proposal_id, status);
        Ok(())
    }

    fn execute_multisig(
        &mut self,
        index: usize,
        ix: &Instruction,
        instruction: MultisigInstruction,
        signers: &[String],
        now: DateTime<Utc>,
    ) -> Result<(), SubmitError> {
        let invalid_config = |msg: String| {
            SubmitError::custom(index, MultisigProgramError::InvalidConfig.code(), msg)
        };

        match instruction {
            MultisigInstruction::CreateMultisig { config } => {
                signer(ix, 0, index, signers)?;
                let address = account(ix, 1, index)?;
                let config = MultisigConfig::new(config.threshold, config.owners, config.label)
                    .map_err(|e| invalid_config(e.to_string()))?;
                if config.derive_address() != address {
                    return Err(invalid_config(
                        "address does not match the configuration".to_string(),
                    ));
                }
                if self.multisigs.contains_key(address) {
                    return Err(SubmitError::custom(
                        index,
                        MultisigProgramError::AccountInUse.code(),
                        format!("account {} already in use", address),
                    ));
                }
                let created = MultisigAccount::new(config);
                self.multisigs.insert(created.address.clone(), created);
                Ok(())
            }
            MultisigInstruction::EditMultisig { config } => {
                let multisig = signer(ix, 0, index, signers)?;
                let config = MultisigConfig::new(config.threshold, config.owners, config.label)
                    .map_err(|e| invalid_config(e.to_string()))?;
                let existing = self
                    .multisigs
                    .get_mut(multisig)
                    .ok_or_else(|| not_initialized(index, multisig))?;
                existing.config = config;
                Ok(())
            }
            MultisigInstruction::CreateProposal {
                proposal_id,
                title,
                expiration_date,
                instructions,
            } => {
                let multisig = account(ix, 0, index)?;
                let proposer = signer(ix, 1, index, signers)?;
                let target = self
                    .multisigs
                    .get(multisig)
                    .ok_or_else(|| not_initialized(index, multisig))?;
                if !target.is_owner(proposer) {
                    return Err(program_error(
                        index,
                        &ProposalError::NotAnOwner(proposer.to_string()),
                    ));
                }
                let key = ProposalRef::new(multisig, &proposal_id);
                if self.proposals.contains_key(&key) {
                    return Err(SubmitError::custom(
                        index,
                        MultisigProgramError::AccountInUse.code(),
                        format!("proposal {} already exists", proposal_id),
                    ));
                }
                let proposal = MultisigProposal::new(
                    proposal_id,
                    target,
                    proposer,
                    &title,
                    instructions,
                    expiration_date,
                );
                self.proposals.insert(key, proposal);
                Ok(())
            }
            MultisigInstruction::Approve { proposal_id } => {
                self.vote(index, ix, &proposal_id, true, signers, now)
            }
            MultisigInstruction::Reject { proposal_id } => {
                self.vote(index, ix, &proposal_id, false, signers, now)
            }
            MultisigInstruction::Execute { proposal_id } => {
                let multisig = account(ix, 0, index)?;
                let owner = signer(ix, 1, index, signers)?;
                let key = ProposalRef::new(multisig, &proposal_id);
                let mut proposal = self
                    .proposals
                    .get(&key)
                    .cloned()
                    .ok_or_else(|| not_initialized(index, &proposal_id))?;
                proposal.refresh_expiry(now);
                proposal
                    .authorize(ProposalAction::Execute, owner, now)
                    .map_err(|e| program_error(index, &e))?;

                // The payload runs with the multisig itself as signer
                let mut draft = self.clone();
                let vault = [multisig.to_string()];
                let result = proposal
                    .instructions
                    .iter()
                    .try_for_each(|inner| draft.execute(index, inner, &vault, now));

                let marked = match result {
                    Ok(()) => {
                        *self = draft;
                        proposal.mark_executed(owner, now)
                    }
                    Err(err) => {
                        log::warn!("Proposal {} failed to execute: {}", proposal_id, err);
                        proposal.mark_failed(owner, now)
                    }
                };
                marked.map_err(|e| program_error(index, &e))?;
                self.proposals.insert(key, proposal);
                Ok(())
            }
            MultisigInstruction::Cancel { proposal_id } => {
                let multisig = account(ix, 0, index)?;
                let caller = signer(ix, 1, index, signers)?;
                let proposal = self
                    .proposals
                    .get_mut(&ProposalRef::new(multisig, &proposal_id))
                    .ok_or_else(|| not_initialized(index, &proposal_id))?;
                proposal.refresh_expiry(now);
                proposal
                    .cancel(caller, now)
                    .map_err(|e| program_error(index, &e))
            }
        }
    }
}

// =============================================================================
// Collaborator implementations
// =============================================================================

#[async_trait]
impl LedgerClient for MemoryLedger {
    async fn get_balance(&self, account: &str) -> Result<u64, LedgerError> {
        Ok(self.state.read().await.balance(account))
    }

    async fn latest_blockhash(&self) -> Result<String, LedgerError> {
        Ok(self.state.write().await.next_blockhash())
    }

    async fn submit(&self, signed: &SignedTransaction) -> Result<String, SubmitError> {
        if let Some(err) = self.injected_failures.lock().await.pop_front() {
            log::warn!("Rejecting submission: {}", err);
            return Err(err);
        }

        let tx = &signed.transaction;
        let hash = tx
            .message_hash()
            .map_err(|e| SubmitError::new(format!("Invalid transaction: {}", e)))?;
        let payer = tx.fee_payer.clone().unwrap_or_default();
        if !matches!(verify_signature(&payer, &hash, &signed.signature), Ok(true)) {
            return Err(SubmitError::new("Transaction signature verification failure"));
        }

        let signature = signed.signature_id();
        let mut state = self.state.write().await;

        let blockhash = tx.recent_blockhash.as_deref().unwrap_or_default();
        if !state.recent_blockhashes.iter().any(|h| h == blockhash) {
            return Err(SubmitError::new("Blockhash not found"));
        }
        if state.processed.contains_key(&signature) {
            return Err(SubmitError::new(
                "This transaction has already been processed",
            ));
        }

        let mut draft = state.clone();
        draft
            .debit(&payer, self.settings.fee_per_signature)
            .map_err(|_| SubmitError::new("Insufficient funds for fee"))?;

        let signers = [payer];
        let now = Utc::now();
        for (index, ix) in tx.instructions.iter().enumerate() {
            draft.execute(index, ix, &signers, now)?;
        }

        let slot = draft.slot;
        draft.processed.insert(signature.clone(), slot);
        *state = draft;
        log::info!("Processed transaction {} at slot {}", signature, slot);
        Ok(signature)
    }

    async fn get_multisig_account(&self, address: &str) -> Result<MultisigAccount, LedgerError> {
        self.state
            .read()
            .await
            .multisigs
            .get(address)
            .cloned()
            .ok_or_else(|| LedgerError::AccountNotFound(address.to_string()))
    }

    async fn get_multisig_transaction(
        &self,
        multisig: &str,
        proposal_id: &str,
    ) -> Result<MultisigProposal, LedgerError> {
        let state = self.state.read().await;
        let mut proposal = state
            .proposals
            .get(&ProposalRef::new(multisig, proposal_id))
            .cloned()
            .ok_or_else(|| LedgerError::ProposalNotFound(proposal_id.to_string()))?;
        proposal.refresh_expiry(Utc::now());
        Ok(proposal)
    }
}

impl ConfirmationSource for MemoryLedger {
    fn watch(&self, signature: &str, finality: Finality) {
        self.bus.watch(signature, finality);

        let state = Arc::clone(&self.state);
        let bus = Arc::clone(&self.bus);
        let delay = self.settings.confirmation_delay;
        let dropped = self.drop_confirmations.load(Ordering::SeqCst);
        let signature = signature.to_string();

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let slot = state.read().await.processed.get(&signature).copied();
            let event = match slot {
                Some(slot) if !dropped => ConfirmationEvent::Confirmed {
                    signature,
                    details: ConfirmationDetails { slot, finality },
                },
                _ => ConfirmationEvent::TimedOut { signature },
            };
            bus.emit(event);
        });
    }

    fn subscribe(&self) -> broadcast::Receiver<ConfirmationEvent> {
        self.bus.subscribe()
    }
}
