//! Bin-scatter kernel: redistribute flat values into their bins.
//!
//! Every source element carries a target bin index (negative means the
//! element is discarded). Each destination bin owns a write cursor, seeded
//! with the bin's start offset, that advances by one per element written, so
//! elements land in source order within their bin.
//!
//! With many bins a direct scatter misses cache on almost every write. The
//! chunked strategy first buckets a block of elements by groups of
//! `chunk_size` neighbouring bins, then writes one group at a time.

use log::debug;

use crate::threading::MaybeSync;
use crate::{
    BinError, Result, CHUNKING_MIN_BINS, CHUNKING_MIN_EVENTS, CHUNK_BLOCK_FACTOR, CHUNK_SIZES,
};

/// Largest chunk size whose within-chunk offsets fit the `u16` tags.
const MAX_CHUNK_SIZE: usize = 1 << 16;

/// Integer type of a per-element bin assignment.
pub trait BinIndex: Copy + MaybeSync {
    /// The target bin, or `None` if the element is discarded.
    fn to_bin(self) -> Option<usize>;
}

impl BinIndex for i64 {
    #[inline]
    fn to_bin(self) -> Option<usize> {
        usize::try_from(self).ok()
    }
}

impl BinIndex for i32 {
    #[inline]
    fn to_bin(self) -> Option<usize> {
        usize::try_from(self).ok()
    }
}

/// How elements are written into their bins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScatterStrategy {
    Direct,
    Chunked { chunk_size: usize },
}

impl ScatterStrategy {
    /// Pick the strategy for scattering `n_events` elements into `n_bins` bins.
    ///
    /// Chunking only pays off with many bins and many events; the chunk size
    /// is then the smallest candidate whose square covers the bin count.
    pub fn select(n_bins: usize, n_events: usize) -> Self {
        if n_bins <= CHUNKING_MIN_BINS || n_events <= CHUNKING_MIN_EVENTS {
            return Self::Direct;
        }
        let chunk_size = CHUNK_SIZES
            .iter()
            .copied()
            .find(|&c| c * c >= n_bins)
            .unwrap_or(CHUNK_SIZES[CHUNK_SIZES.len() - 1]);
        Self::Chunked { chunk_size }
    }
}

fn check_len(a: usize, b: usize) -> Result<()> {
    if a != b {
        return Err(BinError::LengthMismatch(a, b));
    }
    Ok(())
}

/// Scatter `src` into `dst`, choosing the strategy from the problem size.
///
/// `cursors[b]` is the next write position of bin `b` in `dst` and is
/// advanced past every element written. On error `dst` and `cursors` may be
/// partially updated. An out-of-range bin index leaves every element before
/// it written under either strategy; after a cursor overflow the chunked
/// strategy may have written a different subset than the direct one.
pub fn scatter_into<T, I>(
    dst: &mut [T],
    cursors: &mut [usize],
    src: &[T],
    bin_indices: &[I],
) -> Result<()>
where
    T: Clone,
    I: BinIndex,
{
    check_len(src.len(), bin_indices.len())?;
    let strategy = ScatterStrategy::select(cursors.len(), bin_indices.len());
    scatter_with(
        strategy,
        dst.len(),
        cursors,
        bin_indices,
        |i| src[i].clone(),
        |j, value| dst[j] = value,
    )
}

/// Scatter values and their variances together.
///
/// Both destinations share one set of cursors: element `i` is written to the
/// same position of `dst_values` and `dst_variances`.
pub fn scatter_with_variances_into<T, I>(
    dst_values: &mut [T],
    dst_variances: &mut [T],
    cursors: &mut [usize],
    src_values: &[T],
    src_variances: &[T],
    bin_indices: &[I],
) -> Result<()>
where
    T: Clone,
    I: BinIndex,
{
    check_len(src_values.len(), bin_indices.len())?;
    check_len(src_variances.len(), bin_indices.len())?;
    check_len(dst_values.len(), dst_variances.len())?;
    let strategy = ScatterStrategy::select(cursors.len(), bin_indices.len());
    scatter_with(
        strategy,
        dst_values.len(),
        cursors,
        bin_indices,
        |i| (src_values[i].clone(), src_variances[i].clone()),
        |j, (value, variance)| {
            dst_values[j] = value;
            dst_variances[j] = variance;
        },
    )
}

/// Scatter element by element in source order.
pub fn scatter_direct<T, I>(
    dst: &mut [T],
    cursors: &mut [usize],
    src: &[T],
    bin_indices: &[I],
) -> Result<()>
where
    T: Clone,
    I: BinIndex,
{
    check_len(src.len(), bin_indices.len())?;
    direct(dst.len(), cursors, bin_indices, |i| src[i].clone(), |j, value| {
        dst[j] = value
    })
}

/// Scatter in two passes over groups of `chunk_size` neighbouring bins.
///
/// Produces exactly the output of [`scatter_direct`]. `chunk_size` is clamped
/// to `1..=65536`.
pub fn scatter_chunked<T, I>(
    dst: &mut [T],
    cursors: &mut [usize],
    src: &[T],
    bin_indices: &[I],
    chunk_size: usize,
) -> Result<()>
where
    T: Clone,
    I: BinIndex,
{
    check_len(src.len(), bin_indices.len())?;
    chunked(
        chunk_size,
        dst.len(),
        cursors,
        bin_indices,
        |i| src[i].clone(),
        |j, value| dst[j] = value,
    )
}

fn scatter_with<E, I, R, W>(
    strategy: ScatterStrategy,
    dst_len: usize,
    cursors: &mut [usize],
    bin_indices: &[I],
    read: R,
    write: W,
) -> Result<()>
where
    I: BinIndex,
    R: Fn(usize) -> E,
    W: FnMut(usize, E),
{
    debug!(
        "scattering {} elements into {} bins: {strategy:?}",
        bin_indices.len(),
        cursors.len()
    );
    match strategy {
        ScatterStrategy::Direct => direct(dst_len, cursors, bin_indices, read, write),
        ScatterStrategy::Chunked { chunk_size } => {
            chunked(chunk_size, dst_len, cursors, bin_indices, read, write)
        }
    }
}

/// Claim the next write position of `bin`.
#[inline]
fn advance(cursors: &mut [usize], bin: usize, dst_len: usize) -> Result<usize> {
    let bins = cursors.len();
    let cursor = cursors
        .get_mut(bin)
        .ok_or(BinError::BinOutOfRange { index: bin, bins })?;
    if *cursor >= dst_len {
        return Err(BinError::CursorOutOfRange {
            cursor: *cursor,
            len: dst_len,
        });
    }
    let position = *cursor;
    *cursor += 1;
    Ok(position)
}

fn direct<E, I, R, W>(
    dst_len: usize,
    cursors: &mut [usize],
    bin_indices: &[I],
    read: R,
    mut write: W,
) -> Result<()>
where
    I: BinIndex,
    R: Fn(usize) -> E,
    W: FnMut(usize, E),
{
    for (i, index) in bin_indices.iter().enumerate() {
        let Some(bin) = index.to_bin() else {
            continue;
        };
        let position = advance(cursors, bin, dst_len)?;
        write(position, read(i));
    }
    Ok(())
}

fn chunked<E, I, R, W>(
    chunk_size: usize,
    dst_len: usize,
    cursors: &mut [usize],
    bin_indices: &[I],
    read: R,
    mut write: W,
) -> Result<()>
where
    I: BinIndex,
    R: Fn(usize) -> E,
    W: FnMut(usize, E),
{
    let chunk_size = chunk_size.clamp(1, MAX_CHUNK_SIZE);
    let n_bins = cursors.len();
    let n_chunks = n_bins.div_ceil(chunk_size);
    // Per chunk: buffered elements and their bin offsets within the chunk.
    let mut chunks: Vec<(Vec<E>, Vec<u16>)> =
        (0..n_chunks).map(|_| (Vec::new(), Vec::new())).collect();
    let block = (n_bins * CHUNK_BLOCK_FACTOR).max(1);

    for (block_index, block_indices) in bin_indices.chunks(block).enumerate() {
        let first = block_index * block;
        let mut failed = None;
        for (k, index) in block_indices.iter().enumerate() {
            let Some(bin) = index.to_bin() else {
                continue;
            };
            if bin >= n_bins {
                failed = Some(BinError::BinOutOfRange {
                    index: bin,
                    bins: n_bins,
                });
                break;
            }
            let (values, offsets) = &mut chunks[bin / chunk_size];
            values.push(read(first + k));
            offsets.push((bin % chunk_size) as u16);
        }
        // Elements ahead of a bad index are still written, as in `direct`.
        flush(&mut chunks, chunk_size, cursors, dst_len, &mut write)?;
        if let Some(err) = failed {
            return Err(err);
        }
    }
    Ok(())
}

/// Write every buffered element to its bin and empty the buffers.
fn flush<E, W>(
    chunks: &mut [(Vec<E>, Vec<u16>)],
    chunk_size: usize,
    cursors: &mut [usize],
    dst_len: usize,
    write: &mut W,
) -> Result<()>
where
    W: FnMut(usize, E),
{
    for (c, (values, offsets)) in chunks.iter_mut().enumerate() {
        let base = c * chunk_size;
        for (value, &offset) in values.drain(..).zip(offsets.iter()) {
            let position = advance(cursors, base + offset as usize, dst_len)?;
            write(position, value);
        }
        offsets.clear();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_thresholds() {
        assert_eq!(ScatterStrategy::select(512, 1 << 20), ScatterStrategy::Direct);
        assert_eq!(ScatterStrategy::select(10_000, 128 * 1024), ScatterStrategy::Direct);
        assert_eq!(
            ScatterStrategy::select(513, 128 * 1024 + 1),
            ScatterStrategy::Chunked { chunk_size: 128 }
        );
    }

    #[test]
    fn test_select_chunk_ladder() {
        let n = 1 << 20;
        let chunk = |bins| match ScatterStrategy::select(bins, n) {
            ScatterStrategy::Chunked { chunk_size } => chunk_size,
            ScatterStrategy::Direct => 0,
        };
        assert_eq!(chunk(128 * 128), 128);
        assert_eq!(chunk(128 * 128 + 1), 256);
        assert_eq!(chunk(256 * 256), 256);
        assert_eq!(chunk(300_000), 1024);
        assert_eq!(chunk(2_000_000), 1024);
    }

    #[test]
    fn test_direct_is_stable() {
        // Bins [0, 2), [2, 5), [5, 6).
        let src = [10, 11, 12, 13, 14, 15];
        let bins: [i64; 6] = [1, 0, 1, 2, 0, 1];
        let mut cursors = [0, 2, 5];
        let mut dst = [0; 6];
        scatter_direct(&mut dst, &mut cursors, &src, &bins).unwrap();
        assert_eq!(dst, [11, 14, 10, 12, 15, 13]);
        assert_eq!(cursors, [2, 5, 6]);
    }

    #[test]
    fn test_chunked_matches_direct_small_chunks() {
        let n_bins = 10;
        let src: Vec<u32> = (0..100).collect();
        // Indices in -3..=9; the negative ones are discarded.
        let bins: Vec<i32> = (0..100).map(|i| (i * 7 % 13) - 3).collect();
        let mut sizes = vec![0usize; n_bins];
        for &b in &bins {
            if b >= 0 {
                sizes[b as usize] += 1;
            }
        }
        let mut starts = Vec::new();
        let mut acc = 0;
        for s in &sizes {
            starts.push(acc);
            acc += s;
        }

        let mut expected = vec![u32::MAX; acc];
        let mut cursors = starts.clone();
        scatter_direct(&mut expected, &mut cursors, &src, &bins).unwrap();

        for chunk_size in [1, 3, 4, 16] {
            let mut dst = vec![u32::MAX; acc];
            let mut cursors = starts.clone();
            scatter_chunked(&mut dst, &mut cursors, &src, &bins, chunk_size).unwrap();
            assert_eq!(dst, expected, "chunk size {chunk_size}");
        }
        assert!(!expected.contains(&u32::MAX));
    }

    #[test]
    fn test_negative_indices_discarded() {
        let src = ["a", "b", "c"];
        let bins: [i64; 3] = [-1, 0, -7];
        let mut cursors = [0];
        let mut dst = [""; 1];
        scatter_into(&mut dst, &mut cursors, &src, &bins).unwrap();
        assert_eq!(dst, ["b"]);
        assert_eq!(cursors, [1]);
    }

    #[test]
    fn test_bin_out_of_range() {
        let mut dst = [0.0; 2];
        let mut cursors = [0, 1];
        let err = scatter_direct(&mut dst, &mut cursors, &[1.0], &[2i64]).unwrap_err();
        assert_eq!(err, BinError::BinOutOfRange { index: 2, bins: 2 });
        let mut cursors = [0, 1];
        let err = scatter_chunked(&mut dst, &mut cursors, &[1.0], &[5i64], 1).unwrap_err();
        assert_eq!(err, BinError::BinOutOfRange { index: 5, bins: 2 });
    }

    #[test]
    fn test_bad_index_leaves_same_state_in_both_strategies() {
        let src = [10, 11, 12, 13, 14];
        let bins: [i64; 5] = [0, 1, 0, 5, 1];

        let mut direct_dst = [0; 4];
        let mut direct_cursors = [0, 2];
        let err = scatter_direct(&mut direct_dst, &mut direct_cursors, &src, &bins).unwrap_err();
        assert_eq!(err, BinError::BinOutOfRange { index: 5, bins: 2 });
        assert_eq!(direct_dst, [10, 12, 11, 0]);
        assert_eq!(direct_cursors, [2, 3]);

        for chunk_size in [1, 2] {
            let mut dst = [0; 4];
            let mut cursors = [0, 2];
            let err = scatter_chunked(&mut dst, &mut cursors, &src, &bins, chunk_size).unwrap_err();
            assert_eq!(err, BinError::BinOutOfRange { index: 5, bins: 2 });
            assert_eq!(dst, direct_dst, "chunk size {chunk_size}");
            assert_eq!(cursors, direct_cursors, "chunk size {chunk_size}");
        }
    }

    #[test]
    fn test_cursor_out_of_range() {
        let mut dst = [0.0; 2];
        let mut cursors = [1];
        let err = scatter_into(&mut dst, &mut cursors, &[1.0, 2.0], &[0i32, 0]).unwrap_err();
        assert_eq!(err, BinError::CursorOutOfRange { cursor: 2, len: 2 });
    }

    #[test]
    fn test_length_mismatch() {
        let mut dst = [0.0; 2];
        let err = scatter_into(&mut dst, &mut [0], &[1.0, 2.0], &[0i64]).unwrap_err();
        assert_eq!(err, BinError::LengthMismatch(2, 1));
    }

    #[test]
    fn test_variances_follow_values() {
        let values = [1.0, 2.0, 3.0, 4.0];
        let variances = [0.1, 0.2, 0.3, 0.4];
        let bins: [i64; 4] = [1, -1, 0, 1];
        let mut cursors = [0, 1];
        let mut dst_values = [0.0; 3];
        let mut dst_variances = [0.0; 3];
        scatter_with_variances_into(
            &mut dst_values,
            &mut dst_variances,
            &mut cursors,
            &values,
            &variances,
            &bins,
        )
        .unwrap();
        assert_eq!(dst_values, [3.0, 1.0, 4.0]);
        assert_eq!(dst_variances, [0.3, 0.1, 0.4]);
    }

    #[test]
    fn test_variances_length_checked() {
        let mut a = [0.0; 2];
        let mut b = [0.0; 1];
        let err =
            scatter_with_variances_into(&mut a, &mut b, &mut [0], &[1.0], &[1.0], &[0i64])
                .unwrap_err();
        assert_eq!(err, BinError::LengthMismatch(2, 1));
    }
}
