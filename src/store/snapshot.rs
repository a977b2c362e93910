//! Copy-on-write snapshot over the trunk store.
//!
//! Every read and write lands in a private cache; the cache records which
//! entries were touched and which of those are dirty. Closing the snapshot
//! either merges the dirty entries into the trunk as one atomic unit or
//! throws everything away. The touched-entry scan is what the execute
//! phase's conflict detection runs on.

use super::TrunkStore;
use crate::types::{Account, Address};
use rustc_hash::FxHashMap;
use sha2::{Digest, Sha256};

/// Size of the short-key projection handed to scan visitors.
pub const SHORT_KEY_SIZE: usize = 8;

const ACCOUNT_KEY_PREFIX: &[u8] = b"acct";

/// Storage key of an account record.
pub fn account_key(addr: &Address) -> Vec<u8> {
    let mut key = Vec::with_capacity(ACCOUNT_KEY_PREFIX.len() + Address::LEN);
    key.extend_from_slice(ACCOUNT_KEY_PREFIX);
    key.extend_from_slice(addr.as_ref());
    key
}

/// 8-byte projection of a full key. Collisions are tolerated by the
/// consumers: a false positive in conflict detection only requeues a
/// transaction.
fn short_key(key: &[u8]) -> [u8; SHORT_KEY_SIZE] {
    let digest = Sha256::digest(key);
    let mut short = [0u8; SHORT_KEY_SIZE];
    short.copy_from_slice(&digest[..SHORT_KEY_SIZE]);
    short
}

struct CacheEntry {
    value: Option<Vec<u8>>,
    dirty: bool,
}

/// A private view of the trunk at a fixed chain height.
pub struct StateSnapshot {
    trunk: TrunkStore,
    cache: FxHashMap<Vec<u8>, CacheEntry>,
    height: u64,
}

impl StateSnapshot {
    pub(super) fn new(trunk: TrunkStore, height: u64) -> Self {
        Self {
            trunk,
            cache: FxHashMap::default(),
            height,
        }
    }

    /// Chain height this snapshot (and its forks) was minted at.
    pub fn height(&self) -> u64 {
        self.height
    }

    /// Fresh sibling snapshot over the same trunk, empty cache.
    pub fn fork(&self) -> StateSnapshot {
        StateSnapshot::new(self.trunk.clone(), self.height)
    }

    pub fn get(&mut self, key: &[u8]) -> Option<Vec<u8>> {
        if let Some(entry) = self.cache.get(key) {
            return entry.value.clone();
        }
        let value = self.trunk.get(key);
        self.cache.insert(
            key.to_vec(),
            CacheEntry {
                value: value.clone(),
                dirty: false,
            },
        );
        value
    }

    pub fn set(&mut self, key: &[u8], value: Vec<u8>) {
        self.cache.insert(
            key.to_vec(),
            CacheEntry {
                value: Some(value),
                dirty: true,
            },
        );
    }

    pub fn delete(&mut self, key: &[u8]) {
        self.cache.insert(
            key.to_vec(),
            CacheEntry {
                value: None,
                dirty: true,
            },
        );
    }

    pub fn get_account(&mut self, addr: &Address) -> Option<Account> {
        let bytes = self.get(&account_key(addr))?;
        borsh::from_slice(&bytes).ok()
    }

    pub fn set_account(&mut self, addr: &Address, account: &Account) {
        let bytes = borsh::to_vec(account).expect("account serialization cannot fail");
        self.set(&account_key(addr), bytes);
    }

    /// Visit the short key of every entry touched by this snapshot (read or
    /// written) with its dirty flag. The visitor returns `true` to stop.
    /// Visit order is the cache's own iteration order, stable for a given
    /// snapshot state.
    pub fn scan_all_short_keys<F>(&self, mut visitor: F)
    where
        F: FnMut([u8; SHORT_KEY_SIZE], bool) -> bool,
    {
        for (key, entry) in &self.cache {
            if visitor(short_key(key), entry.dirty) {
                break;
            }
        }
    }

    /// Whether any entry was written.
    pub fn is_dirty(&self) -> bool {
        self.cache.values().any(|e| e.dirty)
    }

    /// Release the snapshot. With `write_back`, dirty entries merge into the
    /// trunk atomically; without, they are discarded. Idempotent.
    pub fn close(&mut self, write_back: bool) {
        let cache = std::mem::take(&mut self.cache);
        if write_back {
            self.trunk.apply(
                cache
                    .into_iter()
                    .filter(|(_, e)| e.dirty)
                    .map(|(k, e)| (k, e.value)),
            );
        }
    }
}
