//! Native coin VM.
//!
//! The minimal built-in VM: plain value transfers and code-storing contract
//! creation, with the nonce/existence checks the engine's requeue protocol
//! relies on. Chains with a richer contract VM plug it in through the same
//! `TxVm` trait.

use super::{ExecStatus, TxRunner, TxVm};
use crate::types::{Address, BlockInfo};
use primitive_types::U256;
use sha2::{Digest, Sha256};

/// Base gas charged for any included transfer.
pub const TX_BASE_GAS: u64 = 21_000;

const CODE_KEY_PREFIX: &[u8] = b"code";

fn code_key(addr: &Address) -> Vec<u8> {
    let mut key = Vec::with_capacity(CODE_KEY_PREFIX.len() + Address::LEN);
    key.extend_from_slice(CODE_KEY_PREFIX);
    key.extend_from_slice(addr.as_ref());
    key
}

/// Address of a contract created by `sender` at `nonce`: the trailing
/// 20 bytes of SHA-256 over the sender followed by the big-endian nonce.
fn create_address(sender: &Address, nonce: u64) -> Address {
    let mut hasher = Sha256::new();
    hasher.update(sender.as_ref());
    hasher.update(nonce.to_be_bytes());
    let digest = hasher.finalize();
    let mut bytes = [0u8; 20];
    bytes.copy_from_slice(&digest[12..32]);
    Address::new(bytes)
}

#[derive(Clone, Copy, Debug, Default)]
pub struct NativeVm;

impl TxVm for NativeVm {
    fn run_tx(&self, runner: &mut TxRunner, _block: &BlockInfo) {
        let tx = runner.tx.clone();

        let Some(mut sender) = runner.ctx.get_account(&tx.from) else {
            runner.status = ExecStatus::AccountNotExist;
            return;
        };
        if tx.nonce > sender.nonce {
            runner.status = ExecStatus::NonceTooLarge;
            return;
        }
        if tx.nonce < sender.nonce {
            runner.status = ExecStatus::NonceTooSmall;
            return;
        }
        if tx.gas_limit < TX_BASE_GAS {
            runner.gas_used = tx.gas_limit;
            runner.status = ExecStatus::OutOfGas;
            return;
        }

        runner.gas_used = TX_BASE_GAS;
        sender.nonce += 1;

        let value = U256::from_big_endian(&tx.value);
        if sender.checked_sub_balance(value).is_err() {
            // included but failed: the nonce still advances
            runner.ctx.set_account(&tx.from, &sender);
            runner.status = ExecStatus::Revert;
            return;
        }
        runner.ctx.set_account(&tx.from, &sender);

        let recipient_addr = if tx.to.is_zero() {
            let created = create_address(&tx.from, tx.nonce);
            runner.ctx.set(&code_key(&created), tx.input.clone());
            runner.created_contract = created;
            created
        } else {
            tx.to
        };

        let mut recipient = runner
            .ctx
            .get_account(&recipient_addr)
            .unwrap_or_default();
        if recipient.checked_add_balance(value).is_err() {
            runner.status = ExecStatus::InternalError;
            return;
        }
        runner.ctx.set_account(&recipient_addr, &recipient);
        runner.status = ExecStatus::Success;
    }
}
