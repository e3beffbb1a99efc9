//! Signer trait and the local key-pair signer

use crate::core::{SignedTransaction, Transaction, TransactionError};
use crate::crypto::{KeyError, KeyPair};
use async_trait::async_trait;
use thiserror::Error;

/// Signer-related errors
#[derive(Error, Debug)]
pub enum SignerError {
    #[error("Transaction rejected by the user")]
    UserRejected,
    #[error("Wallet unavailable: {0}")]
    Unavailable(String),
    #[error("Could not refresh the recent blockhash: {0}")]
    BlockhashUnavailable(String),
    #[error("Transaction could not be serialized: {0}")]
    Serialize(#[from] TransactionError),
    #[error("Crypto error: {0}")]
    Crypto(#[from] KeyError),
}

/// External capability that authorizes transactions.
///
/// `sign_transaction` may wait indefinitely on user interaction.
#[async_trait]
pub trait Signer: Send + Sync {
    /// Account address of the signing key; used as fee payer
    fn public_key(&self) -> String;

    async fn sign_transaction(&self, tx: Transaction) -> Result<SignedTransaction, SignerError>;
}

/// Signs with an in-process key pair, without user interaction
#[derive(Debug, Clone)]
pub struct KeypairSigner {
    key_pair: KeyPair,
    /// Optional label for the signer
    pub label: Option<String>,
}

impl KeypairSigner {
    /// Create a signer with a fresh key pair
    pub fn new() -> Self {
        Self {
            key_pair: KeyPair::generate(),
            label: None,
        }
    }

    /// Create a signer with a label
    pub fn with_label(label: &str) -> Self {
        Self {
            key_pair: KeyPair::generate(),
            label: Some(label.to_string()),
        }
    }

    /// Import a signer from a private key
    pub fn from_private_key(private_key_hex: &str) -> Result<Self, SignerError> {
        Ok(Self {
            key_pair: KeyPair::from_private_key_hex(private_key_hex)?,
            label: None,
        })
    }
}

impl Default for KeypairSigner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Signer for KeypairSigner {
    fn public_key(&self) -> String {
        self.key_pair.public_key_hex()
    }

    async fn sign_transaction(&self, tx: Transaction) -> Result<SignedTransaction, SignerError> {
        let hash = tx.message_hash()?;
        let signature = self.key_pair.sign(&hash)?;
        Ok(SignedTransaction {
            transaction: tx,
            signature,
        })
    }
}
