//! Two-phase parallel transaction execution engine.
//!
//! `prepare` validates collected transactions in parallel, pre-deducts gas
//! fees and enqueues the survivors into the persistent standby queue in a
//! seeded-deterministic order. `execute` drains the queue in bounded rounds:
//! each round runs its transactions optimistically on private state
//! snapshots, then commits them serially under short-key conflict
//! detection, requeueing the losers. For identical inputs and parameters
//! the committed output is bit-identical on every node, whatever the worker
//! count or scheduling.

pub mod balance;
pub mod queue;

mod execute;
mod pool;
mod prepare;

#[cfg(test)]
pub(crate) mod testutil;

use crate::signer::SenderRecovery;
use crate::store::StateSnapshot;
use crate::types::{BlockInfo, SignedTx, Transaction};
use crate::vm::TxVm;
use primitive_types::U256;
use std::sync::Arc;

/// Consensus cap on a single transaction's gas limit.
pub const MAX_TX_GAS_LIMIT: u64 = 10_000_000;

/// Engine tuning knobs.
///
/// `round_count` and `runner_cap` are consensus parameters; `parallelism`
/// is per-node and must not influence observable output.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Maximum execution rounds per block
    pub round_count: usize,
    /// Maximum transactions loaded per round
    pub runner_cap: usize,
    /// Worker threads driving each phase
    pub parallelism: usize,
    /// Initial capacity of the collected-input list
    pub tx_list_cap: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            round_count: 10,
            runner_cap: 256,
            parallelism: num_cpus::get(),
            tx_list_cap: 4096,
        }
    }
}

/// The engine facade: collected inputs, cumulative counters and the
/// currently attached clean context.
pub struct TxEngine {
    round_count: usize,
    runner_cap: usize,
    parallelism: usize,
    pool: rayon::ThreadPool,
    /// Fresh snapshot with no cache; attached before each phase. `prepare`
    /// closes it, `execute` expects a new one.
    clean_ctx: Option<StateSnapshot>,
    tx_list: Vec<SignedTx>,
    committed_txs: Vec<Transaction>,
    signer: Arc<dyn SenderRecovery>,
    vm: Arc<dyn TxVm>,
    current_block: Option<BlockInfo>,
    cumulative_gas_used: u64,
    cumulative_gas_refund: U256,
    cumulative_gas_fee: U256,
}

impl TxEngine {
    pub fn new(config: EngineConfig, signer: Arc<dyn SenderRecovery>, vm: Arc<dyn TxVm>) -> Self {
        let parallelism = config.parallelism.max(1);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(parallelism)
            .build()
            .expect("failed to build engine thread pool");
        Self {
            round_count: config.round_count,
            runner_cap: config.runner_cap,
            parallelism,
            pool,
            clean_ctx: None,
            tx_list: Vec::with_capacity(config.tx_list_cap),
            committed_txs: Vec::with_capacity(config.tx_list_cap),
            signer,
            vm,
            current_block: None,
            cumulative_gas_used: 0,
            cumulative_gas_refund: U256::zero(),
            cumulative_gas_fee: U256::zero(),
        }
    }

    /// Append a raw signed transaction to the input list.
    pub fn collect_tx(&mut self, tx: SignedTx) {
        self.tx_list.push(tx);
    }

    pub fn collect_tx_count(&self) -> usize {
        self.tx_list.len()
    }

    /// Attach a clean KV snapshot. Must be called before each `prepare` and
    /// each `execute`; a previously attached context is dropped.
    pub fn set_context(&mut self, ctx: StateSnapshot) {
        self.clean_ctx = Some(ctx);
    }

    /// Number of transactions pending in the standby queue.
    pub fn standby_q_len(&self) -> u64 {
        let (start, end) = self.standby_queue_range();
        end - start
    }

    /// The block's committed transaction records.
    pub fn committed_txs(&self) -> &[Transaction] {
        &self.committed_txs
    }

    /// `(cumulative_gas_used, cumulative_gas_refund, cumulative_gas_fee)`.
    pub fn gas_used_info(&self) -> (u64, U256, U256) {
        (
            self.cumulative_gas_used,
            self.cumulative_gas_refund,
            self.cumulative_gas_fee,
        )
    }
}
