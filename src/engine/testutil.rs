//! Shared fixtures for engine tests.

use super::{queue, EngineConfig, TxEngine};
use crate::signer::Ed25519Recovery;
use crate::store::TrunkStore;
use crate::types::{Account, Address, SignedTx, TxToRun};
use crate::vm::{ExecStatus, NativeVm, TxRunner, TxVm, VmLog};
use primitive_types::U256;
use std::sync::Arc;

pub(crate) fn test_key(seed: u8) -> ed25519_dalek::SigningKey {
    ed25519_dalek::SigningKey::from_bytes(&[seed; 32])
}

pub(crate) fn addr_of(seed: u8) -> Address {
    Address::from_pubkey(&test_key(seed).verifying_key().to_bytes())
}

pub(crate) fn u256_bytes(v: u64) -> [u8; 32] {
    let mut bytes = [0u8; 32];
    U256::from(v).to_big_endian(&mut bytes);
    bytes
}

pub(crate) fn seed_account(trunk: &TrunkStore, addr: &Address, nonce: u64, balance: u64) {
    let mut snap = trunk.snapshot_at(1);
    let mut acc = Account::with_balance(U256::from(balance));
    acc.nonce = nonce;
    snap.set_account(addr, &acc);
    snap.close(true);
}

pub(crate) fn signed_transfer(
    key_seed: u8,
    to: Address,
    nonce: u64,
    value: u64,
    gas_limit: u64,
    gas_price: u64,
) -> SignedTx {
    SignedTx::sign(
        &test_key(key_seed),
        to,
        nonce,
        u256_bytes(value),
        gas_limit,
        u256_bytes(gas_price),
        vec![],
    )
}

pub(crate) fn queue_len(trunk: &TrunkStore) -> u64 {
    let mut ctx = trunk.snapshot_at(0);
    let (start, end) = queue::get_range(&mut ctx);
    end - start
}

pub(crate) fn enqueue_ttrs(trunk: &TrunkStore, ttrs: &[TxToRun]) {
    let mut ctx = trunk.snapshot_at(1);
    let (start, mut end) = queue::get_range(&mut ctx);
    for ttr in ttrs {
        queue::put(&mut ctx, end, ttr.to_bytes());
        end += 1;
    }
    queue::set_range(&mut ctx, start, end);
    ctx.close(true);
}

pub(crate) fn engine_with_native_vm(parallelism: usize) -> (TxEngine, TrunkStore) {
    engine_with_vm(parallelism, Arc::new(NativeVm))
}

pub(crate) fn engine_with_vm(
    parallelism: usize,
    vm: Arc<dyn TxVm>,
) -> (TxEngine, TrunkStore) {
    let config = EngineConfig {
        parallelism,
        ..EngineConfig::default()
    };
    let engine = TxEngine::new(config, Arc::new(Ed25519Recovery), vm);
    (engine, TrunkStore::new())
}

/// Test VM driven by the first input byte.
///
/// `1` writes each 8-byte slot id in the rest of the input; `2` additionally
/// emits one log. `3..=6` return the matching terminal status without
/// touching state. Anything else is a plain success.
pub(crate) struct ScriptedVm;

pub(crate) const SCRIPT_GAS: u64 = 1_000;

pub(crate) fn write_slots_input(slots: &[u64]) -> Vec<u8> {
    let mut input = vec![1u8];
    for slot in slots {
        input.extend_from_slice(&slot.to_be_bytes());
    }
    input
}

impl TxVm for ScriptedVm {
    fn run_tx(&self, runner: &mut TxRunner, _block: &crate::types::BlockInfo) {
        let input = runner.tx.input.clone();
        match input.first().copied().unwrap_or(0) {
            op @ (1 | 2) => {
                for chunk in input[1..].chunks_exact(8) {
                    let mut key = b"slot".to_vec();
                    key.extend_from_slice(chunk);
                    runner.ctx.set(&key, runner.tx.hash.to_vec());
                }
                if op == 2 {
                    runner.logs.push(VmLog {
                        address: runner.tx.from,
                        topics: vec![runner.tx.hash],
                        data: vec![1],
                    });
                }
                runner.gas_used = SCRIPT_GAS;
                runner.gas_refund = U256::from(10);
                runner.out_data = vec![0xaa];
                runner.status = ExecStatus::Success;
            }
            3 => runner.status = ExecStatus::NonceTooSmall,
            4 => runner.status = ExecStatus::NonceTooLarge,
            5 => runner.status = ExecStatus::AccountNotExist,
            6 => {
                runner.gas_used = SCRIPT_GAS;
                runner.status = ExecStatus::Revert;
            }
            _ => {
                runner.gas_used = SCRIPT_GAS;
                runner.status = ExecStatus::Success;
            }
        }
    }
}
