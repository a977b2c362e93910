//! The virtual-machine seam.
//!
//! The engine treats "run one transaction" as an injected primitive: it
//! hands the VM a runner holding a private state snapshot and the
//! transaction, and the VM fills in the outputs and a terminal status.

mod native;

pub use native::{NativeVm, TX_BASE_GAS};

use crate::store::StateSnapshot;
use crate::types::{Address, BlockInfo, Hash32, TxToRun};
use primitive_types::U256;

/// Terminal status of one transaction run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ExecStatus {
    #[default]
    Success,
    /// Set by the engine's conflict detection, never by a VM.
    FailedToCommit,
    NonceTooLarge,
    NonceTooSmall,
    AccountNotExist,
    Revert,
    OutOfGas,
    InternalError,
}

impl ExecStatus {
    /// Everything except `Success` is a failure in the committed record.
    pub fn is_failure(self) -> bool {
        self != ExecStatus::Success
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ExecStatus::Success => "success",
            ExecStatus::FailedToCommit => "failed to commit",
            ExecStatus::NonceTooLarge => "tx nonce too large",
            ExecStatus::NonceTooSmall => "tx nonce too small",
            ExecStatus::AccountNotExist => "account not exist",
            ExecStatus::Revert => "revert",
            ExecStatus::OutOfGas => "out of gas",
            ExecStatus::InternalError => "internal error",
        }
    }
}

/// A log as produced by the VM, before block-position stamping.
#[derive(Clone, Debug, Default)]
pub struct VmLog {
    pub address: Address,
    pub topics: Vec<Hash32>,
    pub data: Vec<u8>,
}

/// Per-transaction execution scratchpad for one round.
pub struct TxRunner {
    /// Index within the round's load order
    pub id: usize,
    /// Private snapshot; not visible to other runners of the same round
    pub ctx: StateSnapshot,
    pub tx: TxToRun,
    pub gas_used: u64,
    pub gas_refund: U256,
    pub out_data: Vec<u8>,
    pub created_contract: Address,
    pub logs: Vec<VmLog>,
    pub status: ExecStatus,
}

impl TxRunner {
    pub fn new(id: usize, ctx: StateSnapshot, tx: TxToRun) -> Self {
        Self {
            id,
            ctx,
            tx,
            gas_used: 0,
            gas_refund: U256::zero(),
            out_data: Vec::new(),
            created_contract: Address::zero(),
            logs: Vec::new(),
            status: ExecStatus::default(),
        }
    }
}

/// "Run one transaction" primitive. Implementations read and write state
/// exclusively through the runner's snapshot.
pub trait TxVm: Send + Sync {
    fn run_tx(&self, runner: &mut TxRunner, block: &BlockInfo);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_failure_classes() {
        assert!(!ExecStatus::Success.is_failure());
        for status in [
            ExecStatus::FailedToCommit,
            ExecStatus::NonceTooLarge,
            ExecStatus::NonceTooSmall,
            ExecStatus::AccountNotExist,
            ExecStatus::Revert,
            ExecStatus::OutOfGas,
            ExecStatus::InternalError,
        ] {
            assert!(status.is_failure());
        }
    }

    #[test]
    fn test_status_strings_are_distinct() {
        let all = [
            ExecStatus::Success,
            ExecStatus::FailedToCommit,
            ExecStatus::NonceTooLarge,
            ExecStatus::NonceTooSmall,
            ExecStatus::AccountNotExist,
            ExecStatus::Revert,
            ExecStatus::OutOfGas,
            ExecStatus::InternalError,
        ];
        for (i, a) in all.iter().enumerate() {
            for b in &all[i + 1..] {
                assert_ne!(a.as_str(), b.as_str());
            }
        }
    }
}
