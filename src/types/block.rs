use super::{Address, Hash32};
use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

/// Read-only descriptor of the block being executed.
#[derive(
    Clone, Debug, Default, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize,
)]
pub struct BlockInfo {
    pub hash: Hash32,
    pub number: i64,
    pub timestamp: i64,
    pub coinbase: Address,
}

impl BlockInfo {
    pub fn new(hash: Hash32, number: i64, timestamp: i64, coinbase: Address) -> Self {
        Self {
            hash,
            number,
            timestamp,
            coinbase,
        }
    }
}
