//! Cryptographic utilities
//!
//! - SHA-256 message digests
//! - secp256k1 key pairs for the local signer
//! - Base58Check for derived multisig addresses

pub mod hash;
pub mod keys;

pub use hash::{base58check, double_sha256, hash160, sha256, sha256_hex};
pub use keys::{verify_signature, KeyError, KeyPair};
