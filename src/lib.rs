//! Parallel transaction execution engine for a blockchain state machine.
//!
//! A block's collected transactions go through two phases. **Prepare**
//! verifies signatures, validates nonces and gas parameters and deducts
//! upfront fees in parallel, then enqueues the survivors into a persistent
//! standby queue in a seeded-deterministic order. **Execute** drains the
//! queue in bounded rounds: every transaction of a round runs optimistically
//! against its own copy-on-write snapshot, then a serial pass commits the
//! non-conflicting ones and requeues the rest. Identical inputs and
//! parameters produce bit-identical results on every node regardless of
//! worker count.

pub mod engine;
pub mod signer;
pub mod store;
pub mod types;
pub mod vm;

pub use engine::balance::{
    add_system_balance, blackhole_balance, sub_sender_balance, sub_system_balance,
    system_balance, transfer_to_blackhole, BLACKHOLE_ADDRESS, SYSTEM_ADDRESS,
};
pub use engine::{EngineConfig, TxEngine, MAX_TX_GAS_LIMIT};
pub use signer::{Ed25519Recovery, RecoveryError, SenderRecovery};
pub use store::{StateSnapshot, TrunkStore};
pub use types::{
    Account, AccountError, Address, BlockInfo, Log, SignedTx, Transaction, TxToRun,
};
pub use vm::{ExecStatus, NativeVm, TxRunner, TxVm, VmLog};
