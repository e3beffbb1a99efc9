//! Dispatch entries per operation type

use crate::core::OperationType;
use crate::dispatch::{AnalyticsPair, CachedViews, DispatchEntry, Route};

const fn entry(
    stale: CachedViews,
    navigate: Option<Route>,
    success: &'static str,
    failure: &'static str,
) -> DispatchEntry {
    DispatchEntry {
        stale,
        navigate,
        analytics: Some(AnalyticsPair { success, failure }),
    }
}

const BALANCES: CachedViews = CachedViews::BALANCES;
const TOKENS: CachedViews = CachedViews::TOKEN_ACCOUNTS;
const ASSETS: CachedViews = CachedViews::ASSETS;
const STREAMS: CachedViews = CachedViews::STREAMS;
const TREASURIES: CachedViews = CachedViews::TREASURIES;
const MULTISIGS: CachedViews = CachedViews::MULTISIG_ACCOUNTS;
const PROPOSALS: CachedViews = CachedViews::PROPOSALS;
const ACTIVITY: CachedViews = CachedViews::ACTIVITY;

/// Side effects for `operation`; operations without any use [`DispatchEntry::NOOP`]
pub fn dispatch_entry(operation: OperationType) -> DispatchEntry {
    use OperationType::*;
    match operation {
        Transfer => entry(
            BALANCES.union(TOKENS).union(ACTIVITY),
            None,
            "transfer_completed",
            "transfer_failed",
        ),
        Wrap => entry(BALANCES.union(TOKENS), None, "wrap_completed", "wrap_failed"),
        Unwrap => entry(
            BALANCES.union(TOKENS),
            None,
            "unwrap_completed",
            "unwrap_failed",
        ),
        CreateAsset => entry(
            BALANCES.union(ASSETS).union(TOKENS),
            Some(Route::Assets),
            "asset_created",
            "asset_create_failed",
        ),
        CloseAsset => entry(
            BALANCES.union(ASSETS).union(TOKENS),
            Some(Route::Assets),
            "asset_closed",
            "asset_close_failed",
        ),
        SetAssetAuthority => DispatchEntry::NOOP,
        CreateStream => entry(
            BALANCES.union(STREAMS).union(TREASURIES),
            Some(Route::Streams),
            "stream_created",
            "stream_create_failed",
        ),
        WithdrawStream => entry(
            BALANCES.union(STREAMS).union(TREASURIES),
            None,
            "stream_withdrawn",
            "stream_withdraw_failed",
        ),
        PauseStream => entry(STREAMS, None, "stream_paused", "stream_pause_failed"),
        ResumeStream => entry(STREAMS, None, "stream_resumed", "stream_resume_failed"),
        CloseStream => entry(
            BALANCES.union(STREAMS).union(TREASURIES),
            Some(Route::Streams),
            "stream_closed",
            "stream_close_failed",
        ),
        CreateMultisig => entry(
            BALANCES.union(MULTISIGS),
            Some(Route::MultisigAccounts),
            "multisig_created",
            "multisig_create_failed",
        ),
        EditMultisig => entry(
            MULTISIGS.union(PROPOSALS),
            None,
            "multisig_edited",
            "multisig_edit_failed",
        ),
        CreateProposal => entry(
            PROPOSALS,
            Some(Route::ProposalDetails),
            "proposal_created",
            "proposal_create_failed",
        ),
        ApproveProposal => entry(
            PROPOSALS,
            None,
            "proposal_approved",
            "proposal_approve_failed",
        ),
        RejectProposal => entry(
            PROPOSALS,
            None,
            "proposal_rejected",
            "proposal_reject_failed",
        ),
        ExecuteProposal => entry(
            BALANCES.union(PROPOSALS).union(MULTISIGS),
            None,
            "proposal_executed",
            "proposal_execute_failed",
        ),
        CancelProposal => entry(
            PROPOSALS,
            None,
            "proposal_cancelled",
            "proposal_cancel_failed",
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_every_operation_has_an_entry() {
        for op in OperationType::ALL {
            let entry = dispatch_entry(op);
            if op != OperationType::SetAssetAuthority {
                assert!(!entry.is_noop(), "{op} dispatches nothing");
            }
        }
    }

    #[test]
    fn test_analytics_events_are_unique() {
        let mut seen = HashSet::new();
        for op in OperationType::ALL {
            if let Some(pair) = dispatch_entry(op).analytics {
                assert!(seen.insert(pair.success), "{} reused", pair.success);
                assert!(seen.insert(pair.failure), "{} reused", pair.failure);
            }
        }
    }

    #[test]
    fn test_proposal_actions_mark_proposals_stale() {
        for op in OperationType::ALL.into_iter().filter(|op| op.is_proposal_action()) {
            assert!(dispatch_entry(op).stale.contains(CachedViews::PROPOSALS));
        }
    }
}
