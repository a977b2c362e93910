use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// 32-byte content hash (transactions, blocks).
pub type Hash32 = [u8; 32];

/// 20-byte account address.
#[derive(
    Clone,
    Copy,
    Default,
    Eq,
    PartialEq,
    Ord,
    PartialOrd,
    Hash,
    BorshSerialize,
    BorshDeserialize,
    Serialize,
    Deserialize,
)]
#[repr(transparent)]
pub struct Address(pub [u8; 20]);

impl Address {
    pub const LEN: usize = 20;

    pub const fn new(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    pub const fn zero() -> Self {
        Self([0u8; 20])
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 20]
    }

    pub fn from_slice(slice: &[u8]) -> Result<Self, AddressError> {
        if slice.len() != Self::LEN {
            return Err(AddressError::InvalidLength);
        }
        let mut bytes = [0u8; 20];
        bytes.copy_from_slice(slice);
        Ok(Self(bytes))
    }

    /// Derive the address of an ed25519 public key: the trailing 20 bytes
    /// of its SHA-256 digest.
    pub fn from_pubkey(pubkey: &[u8; 32]) -> Self {
        let digest = Sha256::digest(pubkey);
        let mut bytes = [0u8; 20];
        bytes.copy_from_slice(&digest[12..32]);
        Self(bytes)
    }

    pub fn to_bytes(&self) -> [u8; 20] {
        self.0
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl From<[u8; 20]> for Address {
    fn from(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for Address {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AddressError {
    #[error("Invalid address length")]
    InvalidLength,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_display() {
        let addr = Address::new([0xab; 20]);
        assert_eq!(
            addr.to_string(),
            "0xabababababababababababababababababababab"
        );
    }

    #[test]
    fn test_address_from_slice() {
        let bytes = [7u8; 20];
        let addr = Address::from_slice(&bytes).unwrap();
        assert_eq!(addr.to_bytes(), bytes);
        assert!(Address::from_slice(&[0u8; 19]).is_err());
    }

    #[test]
    fn test_address_from_pubkey_is_stable() {
        let a = Address::from_pubkey(&[1u8; 32]);
        let b = Address::from_pubkey(&[1u8; 32]);
        let c = Address::from_pubkey(&[2u8; 32]);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(!a.is_zero());
    }
}
