//! Persistent standby queue.
//!
//! A FIFO of encoded pending transactions stored in the KV state. One
//! header key holds the 16-byte big-endian `[start, end)` range; live
//! entries sit at `start..end` under position-suffixed keys. `end` is
//! monotonically non-decreasing over the chain's lifetime.

use crate::store::StateSnapshot;

/// Header key. Consensus constant.
pub const STANDBY_QUEUE_KEY: &[u8] = b"stbq";

const STANDBY_ENTRY_PREFIX: &[u8] = b"stbe";

/// Key of the queue entry at `pos`.
pub fn entry_key(pos: u64) -> Vec<u8> {
    let mut key = Vec::with_capacity(STANDBY_ENTRY_PREFIX.len() + 8);
    key.extend_from_slice(STANDBY_ENTRY_PREFIX);
    key.extend_from_slice(&pos.to_be_bytes());
    key
}

/// Read `(start, end)`; an absent or malformed header reads as `(0, 0)`.
pub fn get_range(ctx: &mut StateSnapshot) -> (u64, u64) {
    match ctx.get(STANDBY_QUEUE_KEY) {
        Some(bytes) if bytes.len() == 16 => {
            let start = u64::from_be_bytes(bytes[..8].try_into().expect("length checked"));
            let end = u64::from_be_bytes(bytes[8..].try_into().expect("length checked"));
            (start, end)
        }
        _ => (0, 0),
    }
}

pub fn set_range(ctx: &mut StateSnapshot, start: u64, end: u64) {
    let mut bytes = [0u8; 16];
    bytes[..8].copy_from_slice(&start.to_be_bytes());
    bytes[8..].copy_from_slice(&end.to_be_bytes());
    ctx.set(STANDBY_QUEUE_KEY, bytes.to_vec());
}

pub fn get(ctx: &mut StateSnapshot, pos: u64) -> Option<Vec<u8>> {
    ctx.get(&entry_key(pos))
}

pub fn put(ctx: &mut StateSnapshot, pos: u64, bytes: Vec<u8>) {
    ctx.set(&entry_key(pos), bytes);
}

pub fn delete(ctx: &mut StateSnapshot, pos: u64) {
    ctx.delete(&entry_key(pos));
}
