//! Post-confirmation side effects
//!
//! Each operation type maps to a [`DispatchEntry`]: which cached views to
//! mark stale, where to navigate, and which analytics events to record.
//! The entry is applied through a [`DispatchSink`] once a confirmation
//! outcome is known.

pub mod table;

pub use table::dispatch_entry;

use crate::core::OperationType;
use std::fmt;
use std::sync::Mutex;

bitflags::bitflags! {
    /// Cached views that can be marked stale
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct CachedViews: u32 {
        const BALANCES = 1 << 0;
        const TOKEN_ACCOUNTS = 1 << 1;
        const ASSETS = 1 << 2;
        const STREAMS = 1 << 3;
        const TREASURIES = 1 << 4;
        const MULTISIG_ACCOUNTS = 1 << 5;
        const PROPOSALS = 1 << 6;
        const ACTIVITY = 1 << 7;
    }
}

/// Navigation targets after a confirmed operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    Accounts,
    Assets,
    Streams,
    MultisigAccounts,
    ProposalDetails,
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Route::Accounts => "/accounts",
            Route::Assets => "/assets",
            Route::Streams => "/streams",
            Route::MultisigAccounts => "/multisig",
            Route::ProposalDetails => "/multisig/proposal",
        };
        f.write_str(s)
    }
}

/// Analytics event names for a confirmed and a timed-out operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnalyticsPair {
    pub success: &'static str,
    pub failure: &'static str,
}

/// Side effects for one operation type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchEntry {
    pub stale: CachedViews,
    pub navigate: Option<Route>,
    pub analytics: Option<AnalyticsPair>,
}

impl DispatchEntry {
    pub const NOOP: DispatchEntry = DispatchEntry {
        stale: CachedViews::empty(),
        navigate: None,
        analytics: None,
    };

    pub fn is_noop(&self) -> bool {
        *self == Self::NOOP
    }
}

/// Terminal outcome of a tracked confirmation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Confirmed,
    TimedOut,
}

/// One side effect requested from the host
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    MarkStale(CachedViews),
    /// Refetch now rather than on next view
    ForceRefresh(CachedViews),
    Navigate(Route),
    Analytics {
        event: &'static str,
        signature: String,
    },
}

/// Host-side receiver of effects (cache layer, router, analytics)
pub trait DispatchSink: Send + Sync {
    fn apply(&self, effect: Effect);
}

/// Apply the entry for `operation` after `outcome`.
///
/// Timed-out operations refresh balances on top of the entry's own views,
/// since the transaction may still have landed.
pub fn dispatch(
    operation: OperationType,
    outcome: Outcome,
    signature: &str,
    sink: &dyn DispatchSink,
) -> Vec<Effect> {
    let entry = dispatch_entry(operation);
    let mut effects = Vec::new();

    match outcome {
        Outcome::Confirmed => {
            if !entry.stale.is_empty() {
                effects.push(Effect::MarkStale(entry.stale));
            }
            if let Some(route) = entry.navigate {
                effects.push(Effect::Navigate(route));
            }
            if let Some(pair) = entry.analytics {
                effects.push(Effect::Analytics {
                    event: pair.success,
                    signature: signature.to_string(),
                });
            }
        }
        Outcome::TimedOut => {
            let views = entry.stale | CachedViews::BALANCES;
            effects.push(Effect::MarkStale(views));
            effects.push(Effect::ForceRefresh(views));
            if let Some(pair) = entry.analytics {
                effects.push(Effect::Analytics {
                    event: pair.failure,
                    signature: signature.to_string(),
                });
            }
        }
    }

    for effect in &effects {
        sink.apply(effect.clone());
    }
    effects
}

/// Sink that logs and keeps every effect it receives
#[derive(Debug, Default)]
pub struct EffectRecorder {
    effects: Mutex<Vec<Effect>>,
}

impl EffectRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn effects(&self) -> Vec<Effect> {
        match self.effects.lock() {
            Ok(effects) => effects.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Analytics events recorded for `signature`
    pub fn analytics_for(&self, signature: &str) -> Vec<&'static str> {
        self.effects()
            .into_iter()
            .filter_map(|effect| match effect {
                Effect::Analytics { event, signature: s } if s == signature => Some(event),
                _ => None,
            })
            .collect()
    }
}

impl DispatchSink for EffectRecorder {
    fn apply(&self, effect: Effect) {
        log::info!("Dispatch: {:?}", effect);
        match self.effects.lock() {
            Ok(mut effects) => effects.push(effect),
            Err(poisoned) => poisoned.into_inner().push(effect),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confirmed_stream_creation() {
        let sink = EffectRecorder::new();
        let effects = dispatch(OperationType::CreateStream, Outcome::Confirmed, "sig", &sink);

        assert_eq!(effects, sink.effects());
        assert!(effects.contains(&Effect::Navigate(Route::Streams)));
        assert_eq!(sink.analytics_for("sig"), vec!["stream_created"]);
        assert!(matches!(effects[0], Effect::MarkStale(v) if v.contains(CachedViews::STREAMS)));
    }

    #[test]
    fn test_timeout_forces_balance_refresh() {
        let sink = EffectRecorder::new();
        let effects = dispatch(OperationType::PauseStream, Outcome::TimedOut, "sig", &sink);

        let views = CachedViews::STREAMS | CachedViews::BALANCES;
        assert_eq!(effects[0], Effect::MarkStale(views));
        assert_eq!(effects[1], Effect::ForceRefresh(views));
        assert_eq!(sink.analytics_for("sig"), vec!["stream_pause_failed"]);
        assert!(!effects.iter().any(|e| matches!(e, Effect::Navigate(_))));
    }

    #[test]
    fn test_noop_entry_dispatches_nothing_on_confirm() {
        let sink = EffectRecorder::new();
        let effects = dispatch(
            OperationType::SetAssetAuthority,
            Outcome::Confirmed,
            "sig",
            &sink,
        );
        assert!(effects.is_empty());
        assert!(sink.effects().is_empty());
    }
}
