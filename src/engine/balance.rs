//! Balance movement helpers and the two well-known accounts.
//!
//! The system account accumulates gas fees taken upfront; the blackhole
//! account is the sink for burned value. Both addresses are consensus
//! constants and must never change.

use crate::store::StateSnapshot;
use crate::types::{Account, AccountError, Address};
use primitive_types::U256;

/// Accumulator for pending gas fees and refunds.
pub const SYSTEM_ADDRESS: Address = Address([
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, b's', b'y', b's', b't', b'e', b'm',
]);

/// Sink for burned value.
pub const BLACKHOLE_ADDRESS: Address = Address([
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, b'b', b'l', b'a', b'c', b'k', b'h', b'o', b'l', b'e',
]);

/// Deduct `amount` from a sender. The account is expected to exist, but a
/// missing one is lazily treated as zero and fails the balance check.
pub fn sub_sender_balance(
    ctx: &mut StateSnapshot,
    sender: &Address,
    amount: U256,
) -> Result<(), AccountError> {
    update_balance(ctx, sender, amount, false)
}

pub fn add_system_balance(ctx: &mut StateSnapshot, amount: U256) -> Result<(), AccountError> {
    update_balance(ctx, &SYSTEM_ADDRESS, amount, true)
}

pub fn sub_system_balance(ctx: &mut StateSnapshot, amount: U256) -> Result<(), AccountError> {
    update_balance(ctx, &SYSTEM_ADDRESS, amount, false)
}

/// Burn `amount` out of a sender's balance.
pub fn transfer_to_blackhole(
    ctx: &mut StateSnapshot,
    sender: &Address,
    amount: U256,
) -> Result<(), AccountError> {
    update_balance(ctx, sender, amount, false)?;
    update_balance(ctx, &BLACKHOLE_ADDRESS, amount, true)
}

pub fn system_balance(ctx: &mut StateSnapshot) -> U256 {
    balance_of(ctx, &SYSTEM_ADDRESS)
}

pub fn blackhole_balance(ctx: &mut StateSnapshot) -> U256 {
    balance_of(ctx, &BLACKHOLE_ADDRESS)
}

fn balance_of(ctx: &mut StateSnapshot, addr: &Address) -> U256 {
    ctx.get_account(addr).unwrap_or_default().balance()
}

fn update_balance(
    ctx: &mut StateSnapshot,
    addr: &Address,
    amount: U256,
    is_add: bool,
) -> Result<(), AccountError> {
    let mut acc = ctx.get_account(addr).unwrap_or_else(Account::zero);
    if is_add {
        acc.checked_add_balance(amount)?;
    } else {
        acc.checked_sub_balance(amount)?;
    }
    ctx.set_account(addr, &acc);
    Ok(())
}
