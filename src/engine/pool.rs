//! Fork-join worker pool primitive.
//!
//! One operation: run the closure once per pool thread, handing each its
//! worker id, and return only after every worker has finished. There is no
//! result channel; workers coordinate through the shared cells and atomic
//! cursors they capture.

use rayon::ThreadPool;

pub(crate) fn parallel_run<F>(pool: &ThreadPool, f: F)
where
    F: Fn(usize) + Sync,
{
    pool.broadcast(|ctx| f(ctx.index()));
}
