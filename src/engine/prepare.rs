//! Prepare phase.
//!
//! Validates the collected transactions in parallel, deducts upfront gas
//! fees and extends the standby queue in a seeded-deterministic order.
//! Neither the worker count nor scheduling may influence the queue order or
//! the set of recorded-invalid transactions: each sender address is mutated
//! by exactly one worker (the first-owner rule), and the final enqueue runs
//! single-threaded over the reordered list.

use super::balance::{add_system_balance, sub_sender_balance};
use super::pool::parallel_run;
use super::{queue, TxEngine, MAX_TX_GAS_LIMIT};
use crate::store::StateSnapshot;
use crate::types::{Address, Transaction, TxToRun, RECEIPT_STATUS_FAILED};
use parking_lot::Mutex;
use primitive_types::U256;
use rand_mt::Mt19937GenRand64;
use rustc_hash::FxHashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::OnceLock;
use tracing::debug;

/// Transient per-input record of the parallel read pass, dropped after
/// enqueueing.
struct PreparedInfo {
    tx: TxToRun,
    gas_fee: U256,
    valid: bool,
    status_str: &'static str,
}

/// One worker's private working set.
struct WorkerSlice {
    ctx: StateSnapshot,
    /// Sender addresses this worker saw first, in observation order
    accounts: Vec<Address>,
    changed: bool,
    total_gas_fee: U256,
    expected_nonce: FxHashMap<Address, u64>,
}

impl TxEngine {
    /// Validate the collected transactions and move the valid ones into the
    /// standby queue; record the rest as failed. Clears the input list and
    /// closes the clean context.
    pub fn prepare(&mut self, reorder_seed: u64, min_gas_price: u64) {
        if self.tx_list.is_empty() {
            if let Some(mut ctx) = self.clean_ctx.take() {
                ctx.close(false);
            }
            return;
        }

        let (infos, slices) = self.parallel_read_accounts(min_gas_price);

        // first-owner rule: each address belongs to the lowest-id worker
        // that saw it, so every account row is mutated by exactly one worker
        let mut owner: FxHashMap<Address, usize> = FxHashMap::default();
        for (idx, slice) in slices.iter().enumerate() {
            for addr in &slice.accounts {
                owner.entry(*addr).or_insert(idx);
            }
        }

        let (order, addr_to_infos) = reorder_infos(&infos, reorder_seed);

        let info_cells: Vec<Mutex<PreparedInfo>> = infos.into_iter().map(Mutex::new).collect();
        let slice_cells: Vec<Mutex<WorkerSlice>> = slices.into_iter().map(Mutex::new).collect();

        parallel_run(&self.pool, |worker_id| {
            let mut guard = slice_cells[worker_id].lock();
            let slice = &mut *guard;
            for addr in &slice.accounts {
                if owner.get(addr) != Some(&worker_id) {
                    // this address belongs to another worker
                    continue;
                }
                let Some(indices) = addr_to_infos.get(addr) else {
                    continue;
                };
                for &i in indices {
                    let mut info = info_cells[i].lock();
                    if !info.valid {
                        continue;
                    }
                    let sender = info.tx.from;
                    let Some(expected) = slice.expected_nonce.get_mut(&sender) else {
                        continue;
                    };
                    if *expected != info.tx.nonce {
                        info.valid = false;
                        info.status_str = "incorrect nonce";
                        continue;
                    }
                    *expected += 1;
                    if sub_sender_balance(&mut slice.ctx, &sender, info.gas_fee).is_err() {
                        info.valid = false;
                        info.status_str = "not enough balance to pay gasfee";
                        continue;
                    }
                    slice.total_gas_fee += info.gas_fee;
                    slice.changed = true;
                }
            }
        });

        let mut slices: Vec<WorkerSlice> =
            slice_cells.into_iter().map(Mutex::into_inner).collect();
        for slice in &mut slices {
            slice.ctx.close(slice.changed);
        }

        let infos: Vec<PreparedInfo> = info_cells.into_iter().map(Mutex::into_inner).collect();
        let valid = infos.iter().filter(|info| info.valid).count();
        debug!(
            collected = infos.len(),
            queued = valid,
            invalid = infos.len() - valid,
            "prepare: batch validated"
        );

        let mut ctx = self
            .clean_ctx
            .as_ref()
            .expect("context must be attached before prepare")
            .fork();
        for slice in &slices {
            let _ = add_system_balance(&mut ctx, slice.total_gas_fee);
        }
        self.insert_to_standby_queue(&mut ctx, &order, &infos);
        self.tx_list.clear();
        ctx.close(true);
        if let Some(mut clean) = self.clean_ctx.take() {
            clean.close(false);
        }
    }

    /// Parallel read pass: signature, gas-parameter and account-existence
    /// checks, plus first-sight sender registration per worker.
    fn parallel_read_accounts(
        &self,
        min_gas_price: u64,
    ) -> (Vec<PreparedInfo>, Vec<WorkerSlice>) {
        let clean = self
            .clean_ctx
            .as_ref()
            .expect("context must be attached before prepare");
        let height = clean.height();
        let count = self.tx_list.len();
        let estimated = count / self.parallelism + 1;

        let info_slots: Vec<OnceLock<PreparedInfo>> =
            (0..count).map(|_| OnceLock::new()).collect();
        let slice_slots: Vec<OnceLock<WorkerSlice>> =
            (0..self.parallelism).map(|_| OnceLock::new()).collect();
        let cursor = AtomicUsize::new(0);

        parallel_run(&self.pool, |worker_id| {
            let mut slice = WorkerSlice {
                ctx: clean.fork(),
                accounts: Vec::with_capacity(estimated),
                changed: false,
                total_gas_fee: U256::zero(),
                expected_nonce: FxHashMap::default(),
            };
            loop {
                let idx = cursor.fetch_add(1, Ordering::Relaxed);
                if idx >= count {
                    break;
                }
                let tx = &self.tx_list[idx];
                let info = match self.signer.recover_sender(tx) {
                    Ok(sender) => {
                        let tx_to_run = TxToRun::from_signed(tx, sender, height);
                        self.check_prepared_tx(&mut slice, tx_to_run, min_gas_price)
                    }
                    Err(_) => PreparedInfo {
                        // keep the record, with the sender omitted
                        tx: TxToRun::from_signed(tx, Address::zero(), height),
                        gas_fee: U256::zero(),
                        valid: false,
                        status_str: "invalid signature",
                    },
                };
                let _ = info_slots[idx].set(info);
            }
            let _ = slice_slots[worker_id].set(slice);
        });

        let infos = info_slots
            .into_iter()
            .filter_map(OnceLock::into_inner)
            .collect();
        let slices = slice_slots
            .into_iter()
            .filter_map(OnceLock::into_inner)
            .collect();
        (infos, slices)
    }

    /// Parameter and account checks for one recovered transaction.
    fn check_prepared_tx(
        &self,
        slice: &mut WorkerSlice,
        tx: TxToRun,
        min_gas_price: u64,
    ) -> PreparedInfo {
        let mut info = PreparedInfo {
            tx,
            gas_fee: U256::zero(),
            valid: false,
            status_str: "",
        };
        let gas_price = U256::from_big_endian(&info.tx.gas_price);
        if gas_price < U256::from(min_gas_price) {
            info.status_str = "invalid gas price";
            return info;
        }
        if info.tx.gas_limit > MAX_TX_GAS_LIMIT {
            info.status_str = "invalid gas limit";
            return info;
        }
        let sender = info.tx.from;
        let Some(account) = slice.ctx.get_account(&sender) else {
            info.status_str = "non-existent account";
            return info;
        };
        info.valid = true;
        if !slice.expected_nonce.contains_key(&sender) {
            slice.accounts.push(sender);
            slice.expected_nonce.insert(sender, account.nonce);
        }
        // mod-2^256 wrapping, matching the chain's fee arithmetic
        info.gas_fee = U256::from(info.tx.gas_limit).overflowing_mul(gas_price).0;
        info
    }

    /// Enqueue valid infos in reorder order; record the rest as failed.
    fn insert_to_standby_queue(
        &mut self,
        ctx: &mut StateSnapshot,
        order: &[usize],
        infos: &[PreparedInfo],
    ) {
        let (start, mut end) = queue::get_range(ctx);
        for &i in order {
            let info = &infos[i];
            if !info.valid {
                self.record_invalid_tx(info);
                continue;
            }
            queue::put(ctx, end, info.tx.to_bytes());
            end += 1;
        }
        queue::set_range(ctx, start, end);
    }

    /// Append a failed record for a transaction Prepare rejected. No gas is
    /// charged and the cumulative counter does not advance.
    fn record_invalid_tx(&mut self, info: &PreparedInfo) {
        let tx = Transaction {
            hash: info.tx.hash,
            transaction_index: self.committed_txs.len() as i64,
            nonce: info.tx.nonce,
            block_hash: self
                .current_block
                .as_ref()
                .map(|b| b.hash)
                .unwrap_or_default(),
            block_number: info.tx.height as i64,
            from: info.tx.from,
            to: info.tx.to,
            value: info.tx.value,
            gas_price: info.tx.gas_price,
            gas: info.tx.gas_limit,
            input: info.tx.input.clone(),
            cumulative_gas_used: self.cumulative_gas_used,
            gas_used: 0,
            status: RECEIPT_STATUS_FAILED,
            status_str: info.status_str.to_string(),
            ..Default::default()
        };
        self.committed_txs.push(tx);
    }
}

/// Group infos by sender (arrival order preserved within a sender), shuffle
/// the distinct senders with MT19937-64, and emit the infos address by
/// address. The shuffle is `len` iterations of two 63-bit draws mod `len`
/// and a swap; each draw keeps the high 63 bits of the raw output, as in
/// the reference `genrand64_int63`. This is a consensus constant, bias and
/// all; nodes only agree if the exact draw sequence is reproduced.
fn reorder_infos(
    infos: &[PreparedInfo],
    reorder_seed: u64,
) -> (Vec<usize>, FxHashMap<Address, Vec<usize>>) {
    let mut addr_to_infos: FxHashMap<Address, Vec<usize>> = FxHashMap::default();
    let mut addr_list: Vec<Address> = Vec::with_capacity(infos.len());
    for (i, info) in infos.iter().enumerate() {
        match addr_to_infos.entry(info.tx.from) {
            std::collections::hash_map::Entry::Occupied(mut entry) => entry.get_mut().push(i),
            std::collections::hash_map::Entry::Vacant(entry) => {
                entry.insert(vec![i]);
                addr_list.push(info.tx.from);
            }
        }
    }

    let mut rng = Mt19937GenRand64::new(reorder_seed);
    let len = addr_list.len();
    for _ in 0..len {
        let r0 = (rng.next_u64() >> 1) as usize % len;
        let r1 = (rng.next_u64() >> 1) as usize % len;
        addr_list.swap(r0, r1);
    }

    let mut order = Vec::with_capacity(infos.len());
    for addr in &addr_list {
        order.extend(addr_to_infos[addr].iter().copied());
    }
    (order, addr_to_infos)
}
