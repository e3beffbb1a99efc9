//! CLI commands
//!
//! Preflight checks, the operation table, and end-to-end simulations that
//! drive a session against the in-memory ledger.

use crate::builder::TransferBuilder;
use crate::config::Config;
use crate::core::{check_balance, format_native, AuditLog, FeeSchedule, OperationType, NATIVE_SYMBOL};
use crate::dispatch::{dispatch_entry, Effect, EffectRecorder};
use crate::ledger::{LedgerClient, MemoryLedger};
use crate::multisig::{
    ActionFees, CreateMultisigBuilder, MultisigConfig, MultisigRoute, ProposalAction, ProposalRef,
};
use crate::notify::Notification;
use crate::pipeline::{PipelineOutcome, PipelineRequest};
use crate::session::Session;
use crate::wallet::{KeypairSigner, Signer};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Result type for CLI operations
pub type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

/// Grace period on top of the simulated confirmation delay
const NOTIFICATION_GRACE: Duration = Duration::from_secs(5);

/// Simulation state: one session on a fresh in-memory ledger
pub struct SimulationState {
    pub ledger: Arc<MemoryLedger>,
    pub session: Session,
    pub sink: Arc<EffectRecorder>,
    pub fees: FeeSchedule,
    notifications: mpsc::UnboundedReceiver<Notification>,
    wait: Duration,
}

impl SimulationState {
    pub fn new(config: &Config) -> CliResult<Self> {
        let settings = config.simulation.ledger_settings();
        let wait = settings.confirmation_delay + NOTIFICATION_GRACE;
        let ledger = Arc::new(MemoryLedger::new(settings));
        let sink = Arc::new(EffectRecorder::new());

        let mut session = Session::builder(ledger.clone(), ledger.clone())
            .sink(sink.clone())
            .finality(config.finality)
            .build();
        let notifications = session
            .take_notifications()
            .ok_or("notification channel already taken")?;
        session.mount();

        Ok(Self {
            ledger,
            session,
            sink,
            fees: config.fees,
            notifications,
            wait,
        })
    }

    /// Fund a new wallet and connect it
    pub async fn wallet(&self, label: &str, balance: u64) -> Arc<KeypairSigner> {
        let signer = Arc::new(KeypairSigner::with_label(label));
        self.ledger.airdrop(&signer.public_key(), balance).await;
        println!(
            "🔑 {} = {}... ({} {})",
            label,
            &signer.public_key()[..16],
            format_native(balance),
            NATIVE_SYMBOL
        );
        signer
    }

    /// Print notifications until the next confirmation or timeout.
    ///
    /// Review prompts are shown and dismissed along the way.
    pub async fn await_confirmation(&mut self) -> CliResult<bool> {
        loop {
            let notification = tokio::time::timeout(self.wait, self.notifications.recv())
                .await
                .map_err(|_| "no confirmation received")?
                .ok_or("notification channel closed")?;

            match notification {
                Notification::Submitted { operation, signature } => {
                    println!("📤 {} submitted: {}...", operation, &signature[..16]);
                }
                Notification::Confirmed { operation, signature } => {
                    println!("✅ {} confirmed: {}...", operation, &signature[..16]);
                    return Ok(true);
                }
                Notification::ConfirmationTimedOut {
                    operation,
                    signature,
                    kind,
                } => {
                    println!(
                        "⏱️  {} not confirmed in time ({:?}): {}...",
                        operation,
                        kind,
                        &signature[..16]
                    );
                    println!("   The transaction may still land; check the ledger before retrying.");
                    return Ok(false);
                }
                Notification::Failed {
                    operation,
                    kind,
                    message,
                } => {
                    println!("❌ {} failed ({:?}): {}", operation, kind, message);
                    return Ok(false);
                }
                Notification::ReviewProposal(prompt) => {
                    println!("📝 Review proposal {}", prompt.proposal.proposal_id);
                    prompt.dismiss();
                }
            }
        }
    }

    /// Show prompts still queued, releasing their locks
    pub fn drain(&mut self) {
        while let Ok(notification) = self.notifications.try_recv() {
            if let Notification::ReviewProposal(prompt) = notification {
                println!("📝 Review proposal {}", prompt.proposal.proposal_id);
                prompt.dismiss();
            }
        }
    }

    pub fn print_effects(&self) {
        let effects = self.sink.effects();
        if effects.is_empty() {
            return;
        }
        println!("   Effects:");
        for effect in effects {
            match effect {
                Effect::MarkStale(views) => println!("   ├─ stale: {}", view_names(views)),
                Effect::ForceRefresh(views) => println!("   ├─ refresh: {}", view_names(views)),
                Effect::Navigate(route) => println!("   ├─ navigate: {}", route),
                Effect::Analytics { event, .. } => println!("   ├─ analytics: {}", event),
            }
        }
    }
}

fn view_names(views: crate::dispatch::CachedViews) -> String {
    views
        .iter_names()
        .map(|(name, _)| name.to_lowercase())
        .collect::<Vec<_>>()
        .join(", ")
}

fn print_audit(audit: &AuditLog) {
    println!("   Audit log:");
    let count = audit.len();
    for (i, entry) in audit.entries().iter().enumerate() {
        let branch = if i + 1 == count { "└─" } else { "├─" };
        println!("   {} [{}] {}", branch, entry.stage, entry.label);
    }
}

fn print_outcome(outcome: &PipelineOutcome) {
    match outcome {
        PipelineOutcome::Submitted { signature, .. } => {
            println!("   Signature: {}", signature);
        }
        PipelineOutcome::Cancelled { before, .. } => {
            println!("🚫 Cancelled before {}", before);
        }
    }
    print_audit(outcome.audit());
}

// =============================================================================
// Commands
// =============================================================================

/// Check whether `balance` covers the fees for moving `amount`
pub fn cmd_preflight(balance: u64, fees: &FeeSchedule, amount: u64) -> CliResult<()> {
    println!("🧮 Fee preflight");
    println!("   ├─ Balance: {} {}", format_native(balance), NATIVE_SYMBOL);
    println!("   ├─ Amount: {} {}", format_native(amount), NATIVE_SYMBOL);
    println!("   ├─ Network fee: {}", format_native(fees.network_fee));
    println!("   ├─ Flat fee: {}", format_native(fees.flat_fee));
    println!(
        "   ├─ Percent fee: {} ({} bps)",
        format_native(fees.percent_fee_for(amount)),
        fees.percent_fee_bps
    );
    println!(
        "   └─ Required: {} {}",
        format_native(fees.required_balance(amount)),
        NATIVE_SYMBOL
    );

    match check_balance(balance, fees, amount) {
        Ok(()) => println!("\n✅ Balance covers the fees"),
        Err(denied) => {
            println!("\n❌ {}", denied);
            println!("   Short by {} {}", format_native(denied.shortfall()), NATIVE_SYMBOL);
        }
    }
    Ok(())
}

/// List what each operation does once it confirms
pub fn cmd_operations() -> CliResult<()> {
    println!("📋 Operations ({})", OperationType::ALL.len());
    for operation in OperationType::ALL {
        let entry = dispatch_entry(operation);
        if entry.is_noop() {
            println!("\n   {} (no side effects)", operation);
            continue;
        }
        println!("\n   {}", operation);
        if !entry.stale.is_empty() {
            println!("   ├─ Stale: {}", view_names(entry.stale));
        }
        if let Some(route) = entry.navigate {
            println!("   ├─ Navigate: {}", route);
        }
        if let Some(analytics) = entry.analytics {
            println!("   └─ Analytics: {} / {}", analytics.success, analytics.failure);
        }
    }
    Ok(())
}

/// Write the default configuration to `path`
pub fn cmd_write_config(path: &std::path::Path) -> CliResult<()> {
    Config::default().save(path)?;
    println!("💾 Default configuration written to {:?}", path);
    Ok(())
}

/// Send a transfer through the pipeline and wait for it to confirm
pub async fn cmd_simulate_transfer(config: &Config, to: &str, amount: u64) -> CliResult<()> {
    let mut state = SimulationState::new(config)?;
    let alice = state
        .wallet("alice", config.simulation.starting_balance)
        .await;
    state.session.connect(alice.clone()).await;

    println!("\n💸 Transferring {} {} to {}", format_native(amount), NATIVE_SYMBOL, to);
    let request = PipelineRequest::new(OperationType::Transfer, TransferBuilder::new(to, amount))
        .fees(state.fees)
        .amount(amount);
    let outcome = state.session.run(request, &CancellationToken::new()).await?;
    print_outcome(&outcome);

    state.await_confirmation().await?;
    state.print_effects();

    println!("\n💰 Balances");
    println!(
        "   ├─ alice: {} {}",
        format_native(state.ledger.get_balance(&alice.public_key()).await?),
        NATIVE_SYMBOL
    );
    println!(
        "   └─ {}: {} {}",
        to,
        format_native(state.ledger.get_balance(to).await?),
        NATIVE_SYMBOL
    );
    Ok(())
}

/// Send a transfer whose confirmation never arrives
pub async fn cmd_simulate_timeout(config: &Config, amount: u64) -> CliResult<()> {
    let mut state = SimulationState::new(config)?;
    let alice = state
        .wallet("alice", config.simulation.starting_balance)
        .await;
    state.session.connect(alice).await;
    state.ledger.set_drop_confirmations(true);

    println!("\n💸 Transferring {} {} to bob", format_native(amount), NATIVE_SYMBOL);
    let request = PipelineRequest::new(OperationType::Transfer, TransferBuilder::new("bob", amount))
        .fees(state.fees)
        .amount(amount);
    let outcome = state.session.run(request, &CancellationToken::new()).await?;
    print_outcome(&outcome);

    state.await_confirmation().await?;
    state.print_effects();
    println!("\n📊 Status: {}", state.session.status().current_stage);
    println!(
        "   bob holds {} {} on the ledger",
        format_native(state.ledger.get_balance("bob").await.unwrap_or(0)),
        NATIVE_SYMBOL
    );
    Ok(())
}

/// Create an M-of-3 multisig, propose a vault transfer, vote, and execute
pub async fn cmd_simulate_proposal(config: &Config, threshold: u8, amount: u64) -> CliResult<()> {
    let mut state = SimulationState::new(config)?;
    let starting = config.simulation.starting_balance;
    let owners = vec![
        state.wallet("alice", starting).await,
        state.wallet("bob", starting).await,
        state.wallet("carol", starting).await,
    ];
    let owner_keys: Vec<String> = owners.iter().map(|o| o.public_key()).collect();
    let multisig = MultisigConfig::new(threshold, owner_keys, Some("Treasury".to_string()))?;
    let vault = multisig.derive_address();
    let proposer = &owners[0];
    state.session.connect(proposer.clone()).await;

    println!("\n🔐 Creating {} multisig {}", multisig.description(), vault);
    let outcome = state
        .session
        .run(
            PipelineRequest::new(OperationType::CreateMultisig, CreateMultisigBuilder { config: multisig })
                .fees(state.fees),
            &CancellationToken::new(),
        )
        .await?;
    print_outcome(&outcome);
    if !state.await_confirmation().await? {
        return Ok(());
    }
    state.ledger.airdrop(&vault, amount * 2).await;

    let route = MultisigRoute::new(&vault, &proposer.public_key(), "Pay dave");
    let proposal = route.reference();
    println!("\n📝 Proposing transfer of {} {} to dave", format_native(amount), NATIVE_SYMBOL);
    let outcome = state
        .session
        .proposals()
        .create_proposal(
            OperationType::Transfer,
            TransferBuilder::new("dave", amount).from_account(&vault),
            route,
            ActionFees {
                fees: state.fees,
                balance: None,
            },
            &CancellationToken::new(),
        )
        .await?;
    print_outcome(&outcome);
    if !state.await_confirmation().await? {
        return Ok(());
    }

    for (name, owner) in ["alice", "bob", "carol"].iter().zip(&owners) {
        if vote_and_report(&mut state, owner.clone(), name, ProposalAction::Approve, &proposal)
            .await?
            .is_none()
        {
            break;
        }
    }

    let executor = owners[owners.len() - 1].clone();
    vote_and_report(&mut state, executor, "carol", ProposalAction::Execute, &proposal).await?;
    state.drain();

    let fetched = state.session.proposals().refresh(&proposal).await?;
    println!("\n📊 Proposal {} is {}", fetched.id, fetched.status);
    println!(
        "   ├─ Approvals: {}/{}",
        fetched.approvals(),
        fetched.threshold
    );
    println!(
        "   └─ dave: {} {}",
        format_native(state.ledger.get_balance("dave").await.unwrap_or(0)),
        NATIVE_SYMBOL
    );
    Ok(())
}

/// Take `action` as `owner` if it is permitted; `None` when it is not
async fn vote_and_report(
    state: &mut SimulationState,
    owner: Arc<KeypairSigner>,
    name: &str,
    action: ProposalAction,
    proposal: &ProposalRef,
) -> CliResult<Option<bool>> {
    state.session.connect(owner.clone()).await;
    let permitted = state
        .session
        .proposals()
        .permitted_actions(proposal, &owner.public_key(), chrono::Utc::now())
        .await?;
    if !permitted.contains(&action) {
        println!("\n⏭️  {} cannot {} now", name, action);
        return Ok(None);
    }

    println!("\n🗳️  {} will {}", name, action);
    let outcome = state
        .session
        .proposals()
        .submit_action(
            action,
            proposal,
            ActionFees {
                fees: state.fees,
                balance: None,
            },
            &CancellationToken::new(),
        )
        .await?;
    print_outcome(&outcome);
    let confirmed = state.await_confirmation().await?;
    Ok(Some(confirmed))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_config() -> Config {
        let mut config = Config::default();
        config.simulation.confirmation_delay_ms = 1;
        config
    }

    #[test]
    fn test_preflight_and_operations_print() {
        let fees = FeeSchedule::new(5_000, 1_000, 50);
        assert!(cmd_preflight(10, &fees, 1_000).is_ok());
        assert!(cmd_preflight(1_000_000, &fees, 1_000).is_ok());
        assert!(cmd_operations().is_ok());
    }

    #[test]
    fn test_write_config_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("txflow.json");
        cmd_write_config(&path).unwrap();
        assert_eq!(Config::load(&path).unwrap(), Config::default());
    }

    #[tokio::test]
    async fn test_simulated_transfer_moves_funds() {
        let config = fast_config();
        cmd_simulate_transfer(&config, "bob", 1_000).await.unwrap();
    }

    #[tokio::test]
    async fn test_simulated_timeout_completes() {
        cmd_simulate_timeout(&fast_config(), 1_000).await.unwrap();
    }

    #[tokio::test]
    async fn test_simulated_proposal_executes() {
        cmd_simulate_proposal(&fast_config(), 2, 500_000).await.unwrap();
    }
}
