//! Known submission failures and the guidance shown for each

use crate::core::{OperationType, Transaction};
use crate::ledger::SubmitError;
use thiserror::Error;

/// Submission failures with a known remedy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemediationCode {
    InsufficientTreasuryBalance,
    InvalidGatewayToken,
    UninitializedAccount,
    InsufficientAssetBalance,
}

/// Program error codes and the remediation each maps to
pub const REMEDIATION_TABLE: &[(u32, RemediationCode)] = &[
    (0x1, RemediationCode::InsufficientAssetBalance),
    (0xbc4, RemediationCode::UninitializedAccount),
    (0x1786, RemediationCode::InsufficientTreasuryBalance),
    (0x1790, RemediationCode::InvalidGatewayToken),
];

impl RemediationCode {
    pub fn from_code(code: u32) -> Option<Self> {
        REMEDIATION_TABLE
            .iter()
            .find(|(c, _)| *c == code)
            .map(|(_, remediation)| *remediation)
    }
}

/// A classified submission failure
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SubmitFailure {
    #[error("The treasury {treasury} does not have enough balance for this operation. Add funds to the treasury and try again.")]
    InsufficientTreasuryBalance { treasury: String },
    #[error("Your gateway token is invalid or expired. Refresh your verification and try again.")]
    InvalidGatewayToken,
    #[error("An account used by this operation has not been initialized yet.")]
    UninitializedAccount,
    #[error("You do not have enough tokens to complete this operation.")]
    InsufficientAssetBalance,
    #[error("{0}")]
    Unrecognized(SubmitError),
}

impl SubmitFailure {
    /// Match `error` against the remediation table.
    ///
    /// `transaction` is the operation's own transaction (before any multisig
    /// wrapping); the treasury id is read from its account list.
    pub fn classify(error: SubmitError, operation: OperationType, transaction: &Transaction) -> Self {
        let Some(code) = error.custom_error_code().and_then(RemediationCode::from_code) else {
            return SubmitFailure::Unrecognized(error);
        };

        match code {
            RemediationCode::InsufficientTreasuryBalance => {
                let treasury = operation
                    .treasury_account_index()
                    .and_then(|i| transaction.primary_accounts().get(i))
                    .map(|meta| meta.pubkey.clone())
                    .unwrap_or_else(|| "account".to_string());
                SubmitFailure::InsufficientTreasuryBalance { treasury }
            }
            RemediationCode::InvalidGatewayToken => SubmitFailure::InvalidGatewayToken,
            RemediationCode::UninitializedAccount => SubmitFailure::UninitializedAccount,
            RemediationCode::InsufficientAssetBalance => SubmitFailure::InsufficientAssetBalance,
        }
    }

    pub fn remediation(&self) -> Option<RemediationCode> {
        match self {
            SubmitFailure::InsufficientTreasuryBalance { .. } => {
                Some(RemediationCode::InsufficientTreasuryBalance)
            }
            SubmitFailure::InvalidGatewayToken => Some(RemediationCode::InvalidGatewayToken),
            SubmitFailure::UninitializedAccount => Some(RemediationCode::UninitializedAccount),
            SubmitFailure::InsufficientAssetBalance => {
                Some(RemediationCode::InsufficientAssetBalance)
            }
            SubmitFailure::Unrecognized(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{AccountMeta, Instruction};

    fn stream_tx() -> Transaction {
        Transaction::new(vec![Instruction::new(
            "streams",
            vec![
                AccountMeta::new("owner", true),
                AccountMeta::new("treasury-7", false),
                AccountMeta::new("beneficiary", false),
            ],
            vec![],
        )])
    }

    #[test]
    fn test_treasury_id_comes_from_account_list() {
        let err = SubmitError::custom(0, 0x1786, "insufficient treasury balance");
        let failure = SubmitFailure::classify(err, OperationType::CreateStream, &stream_tx());

        assert_eq!(
            failure,
            SubmitFailure::InsufficientTreasuryBalance {
                treasury: "treasury-7".to_string()
            }
        );
        assert!(failure.to_string().contains("treasury-7"));
    }

    #[test]
    fn test_known_codes_map_to_remediations() {
        for (code, remediation) in REMEDIATION_TABLE {
            let failure = SubmitFailure::classify(
                SubmitError::custom(0, *code, "x"),
                OperationType::WithdrawStream,
                &stream_tx(),
            );
            assert_eq!(failure.remediation(), Some(*remediation));
        }
    }

    #[test]
    fn test_unknown_errors_surface_verbatim() {
        let err = SubmitError::new("Node is behind by 42 slots");
        let failure = SubmitFailure::classify(err, OperationType::Transfer, &stream_tx());
        assert_eq!(failure.to_string(), "Node is behind by 42 slots");
        assert_eq!(failure.remediation(), None);

        let unknown_code = SubmitError::custom(0, 0x42, "other");
        assert!(matches!(
            SubmitFailure::classify(unknown_code, OperationType::Transfer, &stream_tx()),
            SubmitFailure::Unrecognized(_)
        ));
    }
}
