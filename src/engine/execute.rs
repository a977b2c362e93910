//! Execute phase.
//!
//! Drains the standby queue in bounded rounds. Each round loads a prefix of
//! the queue, runs every transaction optimistically on its own snapshot,
//! then walks the runners serially in load order: a runner whose touched
//! short keys intersect the set written by already-committed runners is
//! requeued, everything else commits. Modifications land in world state at
//! the end of each round, so later rounds see earlier rounds' writes.

use super::pool::parallel_run;
use super::{queue, TxEngine};
use crate::types::{logs_bloom, BlockInfo, Log, Transaction, TxToRun, RECEIPT_STATUS_FAILED};
use crate::vm::{ExecStatus, TxRunner};
use primitive_types::U256;
use rustc_hash::FxHashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::OnceLock;
use tracing::debug;

struct TxRange {
    start: u64,
    end: u64,
}

impl TxEngine {
    /// Execute queued transactions for `block`. Resets the committed list,
    /// the cumulative counters and the block context before running.
    pub fn execute(&mut self, block: BlockInfo) {
        self.committed_txs.clear();
        self.cumulative_gas_used = 0;
        self.cumulative_gas_refund = U256::zero();
        self.cumulative_gas_fee = U256::zero();
        self.current_block = Some(block.clone());

        let (start, end) = self.standby_queue_range();
        if start == end {
            return;
        }
        let mut range = TxRange { start, end };

        let mut committable: Vec<TxRunner> = Vec::new();
        for round in 0..self.round_count {
            if range.start == range.end {
                break;
            }
            let runners = self.execute_one_round(&mut range, &block);
            let loaded = runners.len();
            let mut committed = 0usize;
            for runner in runners {
                if let Some(runner) = runner {
                    committed += 1;
                    committable.push(runner);
                }
            }
            debug!(
                round,
                loaded,
                committed,
                pending = range.end - range.start,
                "execute: round finished"
            );
        }
        self.collect_committable_txs(committable);
    }

    /// Current `(start, end)` of the standby queue, from a fresh snapshot.
    pub(super) fn standby_queue_range(&self) -> (u64, u64) {
        let mut ctx = self
            .clean_ctx
            .as_ref()
            .expect("context must be attached before execute")
            .fork();
        let range = queue::get_range(&mut ctx);
        ctx.close(false);
        range
    }

    /// One round: load, run in parallel, detect conflicts, update the
    /// queue. Slots of runners that were requeued or dropped come back as
    /// `None`; the rest are committable.
    fn execute_one_round(&mut self, range: &mut TxRange, block: &BlockInfo) -> Vec<Option<TxRunner>> {
        let txs = self.load_standby_txs(range);
        let mut runners = self.run_txs_in_parallel(txs, block);
        self.detect_conflicts_and_update_queue(range, &mut runners);
        runners
    }

    /// Load at most `runner_cap` transactions from the front of the queue.
    fn load_standby_txs(&self, range: &TxRange) -> Vec<TxToRun> {
        let mut ctx = self
            .clean_ctx
            .as_ref()
            .expect("context must be attached before execute")
            .fork();
        let end = range.end.min(range.start + self.runner_cap as u64);
        let mut txs = Vec::with_capacity((end - range.start) as usize);
        for pos in range.start..end {
            let bytes = queue::get(&mut ctx, pos).expect("standby queue entry missing");
            txs.push(TxToRun::from_bytes(&bytes).expect("standby queue entry must decode"));
        }
        ctx.close(false);
        txs
    }

    /// Run every loaded transaction on its own snapshot. Runners of one
    /// round never see each other's writes.
    fn run_txs_in_parallel(&self, txs: Vec<TxToRun>, block: &BlockInfo) -> Vec<Option<TxRunner>> {
        let clean = self
            .clean_ctx
            .as_ref()
            .expect("context must be attached before execute");
        let slots: Vec<OnceLock<TxRunner>> = (0..txs.len()).map(|_| OnceLock::new()).collect();
        let cursor = AtomicUsize::new(0);

        parallel_run(&self.pool, |_| loop {
            let idx = cursor.fetch_add(1, Ordering::Relaxed);
            if idx >= txs.len() {
                break;
            }
            let mut runner = TxRunner::new(idx, clean.fork(), txs[idx].clone());
            self.vm.run_tx(&mut runner, block);
            let _ = slots[idx].set(runner);
        });

        slots.into_iter().map(OnceLock::into_inner).collect()
    }

    /// Serial commit pass plus the queue update.
    ///
    /// `touched` accumulates the short keys written by committed runners; a
    /// runner touching any of them cannot commit this round. Short keys are
    /// an 8-byte projection, so a collision can requeue a transaction
    /// spuriously but can never corrupt state.
    fn detect_conflicts_and_update_queue(
        &mut self,
        range: &mut TxRange,
        runners: &mut [Option<TxRunner>],
    ) {
        let mut touched: FxHashSet<u64> = FxHashSet::default();
        for slot in runners.iter_mut() {
            let Some(runner) = slot.as_mut() else {
                continue;
            };
            let mut can_commit = true;
            runner.ctx.scan_all_short_keys(|key, _| {
                if touched.contains(&u64::from_le_bytes(key)) {
                    can_commit = false;
                    return true;
                }
                false
            });
            if can_commit {
                runner.ctx.scan_all_short_keys(|key, dirty| {
                    if dirty {
                        touched.insert(u64::from_le_bytes(key));
                    }
                    false
                });
            } else {
                runner.status = ExecStatus::FailedToCommit;
            }
            runner.ctx.close(can_commit);
        }

        let mut ctx = self
            .clean_ctx
            .as_ref()
            .expect("context must be attached before execute")
            .fork();
        for slot in runners.iter_mut() {
            queue::delete(&mut ctx, range.start);
            range.start += 1;
            let status = match slot.as_ref() {
                Some(runner) => runner.status,
                None => continue,
            };
            match status {
                ExecStatus::FailedToCommit | ExecStatus::NonceTooLarge => {
                    // still pending; retry once its dependencies commit
                    if let Some(runner) = slot.take() {
                        queue::put(&mut ctx, range.end, runner.tx.to_bytes());
                        range.end += 1;
                    }
                }
                ExecStatus::AccountNotExist | ExecStatus::NonceTooSmall => {
                    // drop it, charging the full gas limit for the invalid
                    // inclusion; no record is kept
                    if let Some(runner) = slot.take() {
                        self.cumulative_gas_used += runner.tx.gas_limit;
                    }
                }
                _ => {}
            }
        }
        queue::set_range(&mut ctx, range.start, range.end);
        ctx.close(true);
    }

    /// Build the block's committed records in commit order.
    fn collect_committable_txs(&mut self, committable: Vec<TxRunner>) {
        let block = self
            .current_block
            .clone()
            .expect("block context set at execute start");
        let height = self
            .clean_ctx
            .as_ref()
            .expect("context must be attached before execute")
            .height();

        let mut log_index: u64 = 0;
        for (idx, runner) in committable.into_iter().enumerate() {
            self.cumulative_gas_used += runner.gas_used;
            self.cumulative_gas_refund += runner.gas_refund;
            let gas_price = U256::from_big_endian(&runner.tx.gas_price);
            self.cumulative_gas_fee += U256::from(runner.gas_used) * gas_price;

            let mut tx = Transaction {
                hash: runner.tx.hash,
                transaction_index: idx as i64,
                nonce: runner.tx.nonce,
                block_hash: block.hash,
                block_number: height as i64,
                from: runner.tx.from,
                to: runner.tx.to,
                value: runner.tx.value,
                gas_price: runner.tx.gas_price,
                gas: runner.tx.gas_limit,
                input: runner.tx.input.clone(),
                cumulative_gas_used: self.cumulative_gas_used,
                gas_used: runner.gas_used,
                contract_address: runner.created_contract,
                out_data: runner.out_data.clone(),
                status_str: runner.status.as_str().to_string(),
                ..Default::default()
            };
            if runner.status.is_failure() {
                tx.status = RECEIPT_STATUS_FAILED;
            }
            tx.logs = runner
                .logs
                .iter()
                .map(|log| {
                    let stamped = Log {
                        address: log.address,
                        topics: log.topics.clone(),
                        data: log.data.clone(),
                        block_number: block.number as u64,
                        block_hash: block.hash,
                        tx_hash: runner.tx.hash,
                        tx_index: idx as u32,
                        index: log_index,
                        removed: false,
                    };
                    log_index += 1;
                    stamped
                })
                .collect();
            tx.logs_bloom = logs_bloom(&tx.logs);
            self.committed_txs.push(tx);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::testutil::*;
    use super::*;
    use crate::types::{Address, RECEIPT_STATUS_SUCCESSFUL};
    use std::sync::Arc;

    fn ttr(from_seed: u8, nonce: u64, gas_limit: u64, input: Vec<u8>) -> TxToRun {
        let mut hash = [0u8; 32];
        hash[0] = from_seed;
        hash[8] = nonce as u8;
        hash[9] = input.first().copied().unwrap_or(0);
        TxToRun {
            hash,
            from: addr_of(from_seed),
            to: Address::new([0x99; 20]),
            nonce,
            value: [0u8; 32],
            gas_limit,
            gas_price: u256_bytes(2),
            input,
            height: 1,
        }
    }

    fn block() -> BlockInfo {
        BlockInfo::new([7u8; 32], 12, 1_700_000_000, Address::new([0x0c; 20]))
    }

    #[test]
    fn test_execute_empty_queue_is_noop() {
        let (mut engine, trunk) = engine_with_vm(2, Arc::new(ScriptedVm));
        engine.set_context(trunk.snapshot_at(1));
        engine.execute(block());
        assert!(engine.committed_txs().is_empty());
        assert_eq!(engine.gas_used_info(), (0, U256::zero(), U256::zero()));
    }

    #[test]
    fn test_execute_commits_independent_txs() {
        let (mut engine, trunk) = engine_with_vm(4, Arc::new(ScriptedVm));
        enqueue_ttrs(
            &trunk,
            &[
                ttr(1, 0, 50_000, write_slots_input(&[1])),
                ttr(2, 0, 50_000, write_slots_input(&[2])),
                ttr(3, 0, 50_000, write_slots_input(&[3])),
            ],
        );

        engine.set_context(trunk.snapshot_at(1));
        engine.execute(block());

        let records = engine.committed_txs();
        assert_eq!(records.len(), 3);
        assert_eq!(queue_len(&trunk), 0);
        for (i, record) in records.iter().enumerate() {
            assert_eq!(record.transaction_index, i as i64);
            assert_eq!(record.status, RECEIPT_STATUS_SUCCESSFUL);
            assert_eq!(record.gas_used, SCRIPT_GAS);
            assert_eq!(record.cumulative_gas_used, SCRIPT_GAS * (i as u64 + 1));
            assert_eq!(record.block_hash, block().hash);
        }
        let (gas_used, refund, fee) = engine.gas_used_info();
        assert_eq!(gas_used, 3 * SCRIPT_GAS);
        assert_eq!(refund, U256::from(30));
        // gas price 2 for every tx
        assert_eq!(fee, U256::from(3 * SCRIPT_GAS * 2));

        // the round's writes reached world state
        let mut snap = trunk.snapshot_at(1);
        let mut key = b"slot".to_vec();
        key.extend_from_slice(&1u64.to_be_bytes());
        assert!(snap.get(&key).is_some());
    }

    #[test]
    fn test_conflicting_txs_requeue_and_commit_next_round() {
        let (mut engine, trunk) = engine_with_vm(2, Arc::new(ScriptedVm));
        // both write slot 42
        let t1 = ttr(1, 0, 50_000, write_slots_input(&[42]));
        let t2 = ttr(2, 0, 50_000, write_slots_input(&[42]));
        enqueue_ttrs(&trunk, &[t1.clone(), t2.clone()]);

        engine.set_context(trunk.snapshot_at(1));
        engine.execute(block());

        // both committed across two rounds, first-loaded first
        let records = engine.committed_txs();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].hash, t1.hash);
        assert_eq!(records[1].hash, t2.hash);
        assert_eq!(queue_len(&trunk), 0);

        // round one advanced start by 2 and requeued t2 at the old end
        let mut ctx = trunk.snapshot_at(1);
        let (start, end) = queue::get_range(&mut ctx);
        assert_eq!((start, end), (3, 3));
    }

    #[test]
    fn test_single_round_leaves_conflicting_tx_pending() {
        // a single round must leave the conflicting tx pending
        let (mut engine, trunk) = {
            let config = crate::engine::EngineConfig {
                round_count: 1,
                parallelism: 2,
                ..Default::default()
            };
            let engine = crate::engine::TxEngine::new(
                config,
                Arc::new(crate::signer::Ed25519Recovery),
                Arc::new(ScriptedVm),
            );
            (engine, crate::store::TrunkStore::new())
        };
        let t1 = ttr(1, 0, 50_000, write_slots_input(&[42]));
        let t2 = ttr(2, 0, 50_000, write_slots_input(&[42]));
        enqueue_ttrs(&trunk, &[t1, t2.clone()]);

        engine.set_context(trunk.snapshot_at(1));
        engine.execute(block());

        assert_eq!(engine.committed_txs().len(), 1);
        assert_eq!(queue_len(&trunk), 1);

        // the survivor is t2, waiting at the requeued position
        let mut ctx = trunk.snapshot_at(1);
        let (start, _) = queue::get_range(&mut ctx);
        let bytes = queue::get(&mut ctx, start).unwrap();
        assert_eq!(TxToRun::from_bytes(&bytes).unwrap().hash, t2.hash);
    }

    #[test]
    fn test_nonce_too_small_dropped_with_gas_penalty() {
        let (mut engine, trunk) = engine_with_vm(2, Arc::new(ScriptedVm));
        let stale = ttr(1, 0, 77_000, vec![3]); // scripted NonceTooSmall
        let good = ttr(2, 0, 50_000, write_slots_input(&[8]));
        enqueue_ttrs(&trunk, &[stale.clone(), good.clone()]);

        engine.set_context(trunk.snapshot_at(1));
        engine.execute(block());

        let records = engine.committed_txs();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].hash, good.hash);
        assert_eq!(queue_len(&trunk), 0);

        let (gas_used, _, _) = engine.gas_used_info();
        assert_eq!(gas_used, 77_000 + SCRIPT_GAS);
    }

    #[test]
    fn test_account_not_exist_dropped_without_record() {
        let (mut engine, trunk) = engine_with_vm(2, Arc::new(ScriptedVm));
        enqueue_ttrs(&trunk, &[ttr(1, 0, 30_000, vec![5])]);

        engine.set_context(trunk.snapshot_at(1));
        engine.execute(block());

        assert!(engine.committed_txs().is_empty());
        assert_eq!(queue_len(&trunk), 0);
        let (gas_used, _, _) = engine.gas_used_info();
        assert_eq!(gas_used, 30_000);
    }

    #[test]
    fn test_reverted_tx_still_commits_as_failed() {
        let (mut engine, trunk) = engine_with_vm(2, Arc::new(ScriptedVm));
        enqueue_ttrs(&trunk, &[ttr(1, 0, 30_000, vec![6])]);

        engine.set_context(trunk.snapshot_at(1));
        engine.execute(block());

        let records = engine.committed_txs();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, RECEIPT_STATUS_FAILED);
        assert_eq!(records[0].status_str, "revert");
        assert_eq!(records[0].gas_used, SCRIPT_GAS);
    }

    #[test]
    fn test_logs_are_stamped_with_monotonic_index() {
        let (mut engine, trunk) = engine_with_vm(2, Arc::new(ScriptedVm));
        let mut with_log_a = write_slots_input(&[1]);
        with_log_a[0] = 2;
        let mut with_log_b = write_slots_input(&[2]);
        with_log_b[0] = 2;
        enqueue_ttrs(
            &trunk,
            &[ttr(1, 0, 30_000, with_log_a), ttr(2, 0, 30_000, with_log_b)],
        );

        engine.set_context(trunk.snapshot_at(1));
        engine.execute(block());

        let records = engine.committed_txs();
        assert_eq!(records.len(), 2);
        let mut indices = Vec::new();
        for (tx_idx, record) in records.iter().enumerate() {
            assert_ne!(record.logs_bloom, [0u8; 256]);
            for log in &record.logs {
                assert_eq!(log.block_hash, block().hash);
                assert_eq!(log.block_number, block().number as u64);
                assert_eq!(log.tx_hash, record.hash);
                assert_eq!(log.tx_index, tx_idx as u32);
                assert!(!log.removed);
                indices.push(log.index);
            }
        }
        assert_eq!(indices, vec![0, 1]);
    }

    #[test]
    fn test_runner_cap_bounds_round_size() {
        let config = crate::engine::EngineConfig {
            runner_cap: 2,
            round_count: 10,
            parallelism: 2,
            ..Default::default()
        };
        let mut engine = crate::engine::TxEngine::new(
            config,
            Arc::new(crate::signer::Ed25519Recovery),
            Arc::new(ScriptedVm),
        );
        let trunk = crate::store::TrunkStore::new();
        let ttrs: Vec<TxToRun> = (1..=5)
            .map(|i| ttr(i, 0, 30_000, write_slots_input(&[i as u64])))
            .collect();
        enqueue_ttrs(&trunk, &ttrs);

        engine.set_context(trunk.snapshot_at(1));
        engine.execute(block());

        // 3 rounds of at most 2 runners drain all 5
        assert_eq!(engine.committed_txs().len(), 5);
        assert_eq!(queue_len(&trunk), 0);
    }
}
