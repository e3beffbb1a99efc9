//! Multisig account configuration
//!
//! An M-of-N account: M approvals from N owners are required before one of
//! its proposals can execute.

use crate::crypto::{base58check, hash160};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Version byte for derived multisig addresses (yields a leading '3')
pub const MULTISIG_ADDRESS_VERSION: u8 = 0x05;

/// Errors related to multisig account configuration
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MultisigError {
    #[error("Invalid threshold: {0}")]
    InvalidThreshold(String),
    #[error("Invalid owner count: need at least 2 owners")]
    InsufficientOwners,
    #[error("Duplicate owner: {0}")]
    DuplicateOwner(String),
    #[error("Multisig not found: {0}")]
    MultisigNotFound(String),
}

/// Owners and threshold of a multisig account
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct MultisigConfig {
    /// Minimum approvals required (M in M-of-N)
    pub threshold: u8,
    /// Addresses of all owners
    pub owners: Vec<String>,
    /// Optional human-readable label
    pub label: Option<String>,
}

impl MultisigConfig {
    /// Create a new multisig configuration
    ///
    /// # Errors
    /// Returns error if threshold is zero or above the owner count, if there
    /// are fewer than two owners, or if an owner is listed twice.
    pub fn new(
        threshold: u8,
        owners: Vec<String>,
        label: Option<String>,
    ) -> Result<Self, MultisigError> {
        if threshold == 0 {
            return Err(MultisigError::InvalidThreshold(
                "threshold must be at least 1".to_string(),
            ));
        }

        if owners.len() < 2 {
            return Err(MultisigError::InsufficientOwners);
        }

        if threshold as usize > owners.len() {
            return Err(MultisigError::InvalidThreshold(format!(
                "threshold {} exceeds owner count {}",
                threshold,
                owners.len()
            )));
        }

        let mut sorted = owners.clone();
        sorted.sort();
        if let Some(pair) = sorted.windows(2).find(|pair| pair[0] == pair[1]) {
            return Err(MultisigError::DuplicateOwner(pair[0].clone()));
        }

        Ok(Self {
            threshold,
            owners,
            label,
        })
    }

    pub fn owner_count(&self) -> usize {
        self.owners.len()
    }

    pub fn is_owner(&self, address: &str) -> bool {
        self.owners.iter().any(|o| o == address)
    }

    /// Get description like "2-of-3"
    pub fn description(&self) -> String {
        format!("{}-of-{}", self.threshold, self.owners.len())
    }

    /// Deterministic account address for this configuration.
    ///
    /// Address = Base58Check(version || RIPEMD160(SHA256(threshold || sorted owners)))
    pub fn derive_address(&self) -> String {
        let mut sorted = self.owners.clone();
        sorted.sort();

        let mut script_data = vec![self.threshold];
        for owner in &sorted {
            script_data.extend_from_slice(owner.as_bytes());
        }

        base58check(MULTISIG_ADDRESS_VERSION, &hash160(&script_data))
    }
}

/// A multisig account as stored on the ledger
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct MultisigAccount {
    /// Account address; also the vault holding the account's funds
    pub address: String,
    pub config: MultisigConfig,
    pub created_at: DateTime<Utc>,
}

impl MultisigAccount {
    pub fn new(config: MultisigConfig) -> Self {
        Self {
            address: config.derive_address(),
            config,
            created_at: Utc::now(),
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn threshold(&self) -> u8 {
        self.config.threshold
    }

    pub fn owners(&self) -> &[String] {
        &self.config.owners
    }

    pub fn is_owner(&self, address: &str) -> bool {
        self.config.is_owner(address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_owners() -> Vec<String> {
        vec!["alice".to_string(), "bob".to_string(), "carol".to_string()]
    }

    #[test]
    fn test_config_creation() {
        let config = MultisigConfig::new(2, sample_owners(), Some("Ops".to_string())).unwrap();

        assert_eq!(config.threshold, 2);
        assert_eq!(config.owner_count(), 3);
        assert_eq!(config.description(), "2-of-3");
        assert!(config.is_owner("bob"));
        assert!(!config.is_owner("mallory"));
    }

    #[test]
    fn test_config_validation() {
        assert!(MultisigConfig::new(0, sample_owners(), None).is_err());
        assert!(MultisigConfig::new(4, sample_owners(), None).is_err());
        assert_eq!(
            MultisigConfig::new(1, vec!["alice".to_string()], None),
            Err(MultisigError::InsufficientOwners)
        );
        assert_eq!(
            MultisigConfig::new(2, vec!["same".to_string(), "same".to_string()], None),
            Err(MultisigError::DuplicateOwner("same".to_string()))
        );
    }

    #[test]
    fn test_address_ignores_owner_order() {
        let mut reversed = sample_owners();
        reversed.reverse();

        let a = MultisigAccount::new(MultisigConfig::new(2, sample_owners(), None).unwrap());
        let b = MultisigAccount::new(MultisigConfig::new(2, reversed, None).unwrap());
        let c = MultisigAccount::new(MultisigConfig::new(3, sample_owners(), None).unwrap());

        assert!(a.address().starts_with('3'));
        assert_eq!(a.address(), b.address());
        assert_ne!(a.address(), c.address());
    }
}
