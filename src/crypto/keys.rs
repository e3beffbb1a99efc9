//! Key management for the local signer
//!
//! secp256k1 key pairs. Account addresses on the ledger are the hex-encoded
//! compressed public key.

use rand::rngs::OsRng;
use secp256k1::{Message, PublicKey, Secp256k1, SecretKey};
use thiserror::Error;

use super::hash::sha256;

/// Errors that can occur during key operations
#[derive(Error, Debug)]
pub enum KeyError {
    #[error("Invalid private key")]
    InvalidPrivateKey,
    #[error("Invalid public key")]
    InvalidPublicKey,
    #[error("Invalid signature")]
    InvalidSignature,
    #[error("Secp256k1 error: {0}")]
    Secp256k1Error(#[from] secp256k1::Error),
}

/// A key pair consisting of a private key and its corresponding public key
#[derive(Clone)]
pub struct KeyPair {
    secret_key: SecretKey,
    public_key: PublicKey,
}

impl KeyPair {
    /// Generate a new random key pair
    pub fn generate() -> Self {
        let secp = Secp256k1::new();
        let (secret_key, public_key) = secp.generate_keypair(&mut OsRng);
        Self {
            secret_key,
            public_key,
        }
    }

    /// Create a key pair from a hex-encoded private key
    pub fn from_private_key_hex(hex_key: &str) -> Result<Self, KeyError> {
        let bytes = hex::decode(hex_key).map_err(|_| KeyError::InvalidPrivateKey)?;
        let secret_key =
            SecretKey::from_slice(&bytes).map_err(|_| KeyError::InvalidPrivateKey)?;
        let public_key = PublicKey::from_secret_key(&Secp256k1::new(), &secret_key);
        Ok(Self {
            secret_key,
            public_key,
        })
    }

    /// Get the public key as a hex string (compressed format)
    pub fn public_key_hex(&self) -> String {
        hex::encode(self.public_key.serialize())
    }

    /// Sign a message hash with the private key
    pub fn sign(&self, message_hash: &[u8]) -> Result<Vec<u8>, KeyError> {
        let message = Message::from_digest_slice(&digest(message_hash))?;
        let signature = Secp256k1::new().sign_ecdsa(&message, &self.secret_key);
        Ok(signature.serialize_compact().to_vec())
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("public_key", &self.public_key_hex())
            .finish_non_exhaustive()
    }
}

/// Verify a compact signature against a hex-encoded public key
pub fn verify_signature(
    public_key_hex: &str,
    message_hash: &[u8],
    signature: &[u8],
) -> Result<bool, KeyError> {
    let bytes = hex::decode(public_key_hex).map_err(|_| KeyError::InvalidPublicKey)?;
    let public_key = PublicKey::from_slice(&bytes).map_err(|_| KeyError::InvalidPublicKey)?;
    let message = Message::from_digest_slice(&digest(message_hash))?;
    let sig = secp256k1::ecdsa::Signature::from_compact(signature)
        .map_err(|_| KeyError::InvalidSignature)?;

    Ok(Secp256k1::new()
        .verify_ecdsa(&message, &sig, &public_key)
        .is_ok())
}

// Messages that are not already 32-byte digests are hashed first
fn digest(message_hash: &[u8]) -> Vec<u8> {
    if message_hash.len() == 32 {
        message_hash.to_vec()
    } else {
        sha256(message_hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_and_verify() {
        let kp = KeyPair::generate();
        let message_hash = sha256(b"transfer 5");

        let signature = kp.sign(&message_hash).unwrap();
        assert!(verify_signature(&kp.public_key_hex(), &message_hash, &signature).unwrap());

        let other = KeyPair::generate();
        assert!(!verify_signature(&other.public_key_hex(), &message_hash, &signature).unwrap());
    }

    #[test]
    fn test_key_pair_from_hex() {
        let kp1 = KeyPair::generate();
        let private_hex = hex::encode(kp1.secret_key.secret_bytes());

        let kp2 = KeyPair::from_private_key_hex(&private_hex).unwrap();
        assert_eq!(kp1.public_key_hex(), kp2.public_key_hex());
        assert!(KeyPair::from_private_key_hex("zz").is_err());
    }

    #[test]
    fn test_invalid_public_key_is_an_error() {
        assert!(matches!(
            verify_signature("abcd", &[0u8; 32], &[0u8; 64]),
            Err(KeyError::InvalidPublicKey)
        ));
    }
}
