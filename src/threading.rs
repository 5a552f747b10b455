//! Divide-and-conquer partitioning of a cursor's outer range.
//!
//! The addressable positions of a [`MultiIndex`] (elements without bins, bins
//! with bins) are split recursively in halves, one half per branch of a
//! `rayon::join`, until a range is at most [`MIN_PARTITION_LENGTH`] long or a
//! single thread is left. Each leaf receives an independent `(begin, end)`
//! cursor pair. Since seeking past empty bins is deterministic, adjacent
//! partitions meet exactly and together cover every element once.
//!
//! Without the `parallel` feature the same recursion runs on the calling thread.

use log::debug;

use crate::multi_index::MultiIndex;
use crate::{Result, MIN_PARTITION_LENGTH};

#[cfg(feature = "parallel")]
pub trait MaybeSync: Sync {}
#[cfg(feature = "parallel")]
impl<T: Sync> MaybeSync for T {}

#[cfg(not(feature = "parallel"))]
pub trait MaybeSync {}
#[cfg(not(feature = "parallel"))]
impl<T> MaybeSync for T {}

/// Call `f(begin, end)` once per partition of the cursor's positions.
///
/// Partitions cover `0..index.position_count()` without overlap. With the
/// `parallel` feature they may run concurrently; the first error encountered
/// is returned.
pub fn for_each_partition<'a, const N: usize, F>(index: &MultiIndex<'a, N>, f: F) -> Result<()>
where
    F: Fn(MultiIndex<'a, N>, MultiIndex<'a, N>) -> Result<()> + MaybeSync,
{
    let total = index.position_count();
    #[cfg(feature = "parallel")]
    let nthreads = rayon::current_num_threads();
    #[cfg(not(feature = "parallel"))]
    let nthreads = 1;
    debug!("partitioning {total} positions for {nthreads} thread(s)");
    partition(index, 0, total, nthreads, MIN_PARTITION_LENGTH, &f)
}

fn partition<'a, const N: usize, F>(
    index: &MultiIndex<'a, N>,
    start: usize,
    stop: usize,
    nthreads: usize,
    min_len: usize,
    f: &F,
) -> Result<()>
where
    F: Fn(MultiIndex<'a, N>, MultiIndex<'a, N>) -> Result<()> + MaybeSync,
{
    let len = stop - start;
    if nthreads <= 1 || len <= min_len.max(1) {
        let mut begin = index.clone();
        begin.set_index(start);
        let mut end = index.clone();
        end.set_index(stop);
        return f(begin, end);
    }

    let mid = start + len / 2;
    let left_threads = nthreads >> 1;
    let right_threads = nthreads - left_threads;
    let (left, right) = join(
        || partition(index, start, mid, left_threads, min_len, f),
        || partition(index, mid, stop, right_threads, min_len, f),
    );
    left?;
    right
}

#[cfg(feature = "parallel")]
fn join<A, B>(a: A, b: B) -> (Result<()>, Result<()>)
where
    A: FnOnce() -> Result<()> + Send,
    B: FnOnce() -> Result<()> + Send,
{
    rayon::join(a, b)
}

#[cfg(not(feature = "parallel"))]
fn join<A, B>(a: A, b: B) -> (Result<()>, Result<()>)
where
    A: FnOnce() -> Result<()>,
    B: FnOnce() -> Result<()>,
{
    (a(), b())
}
