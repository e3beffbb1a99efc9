//! Signer capability
//!
//! The wallet holding keys is an external collaborator; the pipeline only
//! sees the [`Signer`] trait. [`KeypairSigner`] is a local implementation
//! backed by an in-process key pair.

pub mod wallet;

pub use wallet::{KeypairSigner, Signer, SignerError};
