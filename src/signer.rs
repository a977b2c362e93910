//! Sender recovery.
//!
//! The engine never inspects signatures itself; it calls an injected
//! recoverer. The shipped implementation verifies an ed25519 signature over
//! the transaction's sign payload and derives the sender address from the
//! public key.

use crate::types::{Address, SignedTx};
use ed25519_dalek::{Signature, Verifier, VerifyingKey};

pub trait SenderRecovery: Send + Sync {
    fn recover_sender(&self, tx: &SignedTx) -> Result<Address, RecoveryError>;
}

/// ed25519 signature check + SHA-256 address derivation.
#[derive(Clone, Copy, Debug, Default)]
pub struct Ed25519Recovery;

impl SenderRecovery for Ed25519Recovery {
    fn recover_sender(&self, tx: &SignedTx) -> Result<Address, RecoveryError> {
        let key =
            VerifyingKey::from_bytes(&tx.pubkey).map_err(|_| RecoveryError::InvalidPublicKey)?;
        let signature = Signature::from_bytes(&tx.signature);
        key.verify(&tx.sign_payload(), &signature)
            .map_err(|_| RecoveryError::InvalidSignature)?;
        Ok(Address::from_pubkey(&tx.pubkey))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RecoveryError {
    #[error("Invalid public key")]
    InvalidPublicKey,
    #[error("Invalid signature")]
    InvalidSignature,
}
