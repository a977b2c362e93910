use borsh::{BorshDeserialize, BorshSerialize};
use primitive_types::U256;
use serde::{Deserialize, Serialize};

/// On-chain account state: a nonce and a 256-bit coin balance.
///
/// The balance is persisted as big-endian bytes so the borsh encoding of an
/// account is a fixed, field-order-deterministic layout.
#[derive(
    Clone, Debug, Default, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize,
)]
pub struct Account {
    /// Next expected transaction nonce
    pub nonce: u64,
    balance: [u8; 32],
}

impl Account {
    /// Fresh account with zero nonce and zero balance, used for lazy init.
    pub fn zero() -> Self {
        Self::default()
    }

    pub fn with_balance(balance: U256) -> Self {
        let mut acc = Self::default();
        acc.set_balance(balance);
        acc
    }

    pub fn balance(&self) -> U256 {
        U256::from_big_endian(&self.balance)
    }

    pub fn set_balance(&mut self, balance: U256) {
        balance.to_big_endian(&mut self.balance);
    }

    pub fn checked_add_balance(&mut self, amount: U256) -> Result<(), AccountError> {
        let sum = self
            .balance()
            .checked_add(amount)
            .ok_or(AccountError::Overflow)?;
        self.set_balance(sum);
        Ok(())
    }

    pub fn checked_sub_balance(&mut self, amount: U256) -> Result<(), AccountError> {
        let rest = self
            .balance()
            .checked_sub(amount)
            .ok_or(AccountError::InsufficientBalance)?;
        self.set_balance(rest);
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AccountError {
    #[error("Account balance overflow")]
    Overflow,
    #[error("Insufficient balance")]
    InsufficientBalance,
}
