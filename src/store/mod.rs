//! Transactional KV state.
//!
//! A shared trunk store holds the committed world state; engine phases work
//! on private copy-on-write snapshots of it and either merge their writes
//! back as one atomic unit or discard them.

mod snapshot;

pub use snapshot::{account_key, StateSnapshot, SHORT_KEY_SIZE};

use dashmap::DashMap;
use rustc_hash::FxBuildHasher;
use std::sync::Arc;

/// DashMap with FxHasher, the profile used for hot shared state.
type FastDashMap<K, V> = DashMap<K, V, FxBuildHasher>;

/// The committed world state shared by all snapshots.
#[derive(Clone, Default)]
pub struct TrunkStore {
    entries: Arc<FastDashMap<Vec<u8>, Vec<u8>>>,
    commit_lock: Arc<parking_lot::Mutex<()>>,
}

impl TrunkStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mint a fresh snapshot with an empty cache, pinned at `height`.
    pub fn snapshot_at(&self, height: u64) -> StateSnapshot {
        StateSnapshot::new(self.clone(), height)
    }

    pub(crate) fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.entries.get(key).map(|r| r.value().clone())
    }

    /// Merge one snapshot's dirty entries. The commit lock makes the merge
    /// atomic with respect to other merges into the same trunk.
    pub(crate) fn apply<I>(&self, writes: I)
    where
        I: IntoIterator<Item = (Vec<u8>, Option<Vec<u8>>)>,
    {
        let _guard = self.commit_lock.lock();
        for (key, value) in writes {
            match value {
                Some(value) => {
                    self.entries.insert(key, value);
                }
                None => {
                    self.entries.remove(&key);
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_insert_and_delete() {
        let trunk = TrunkStore::new();
        trunk.apply(vec![
            (b"k1".to_vec(), Some(b"v1".to_vec())),
            (b"k2".to_vec(), Some(b"v2".to_vec())),
        ]);
        assert_eq!(trunk.get(b"k1"), Some(b"v1".to_vec()));
        assert_eq!(trunk.len(), 2);

        trunk.apply(vec![(b"k1".to_vec(), None)]);
        assert_eq!(trunk.get(b"k1"), None);
        assert_eq!(trunk.len(), 1);
    }
}
