//! Inner-run driver over a [`MultiIndex`] range.
//!
//! Numeric kernels are fastest when handed a whole contiguous run of the
//! innermost dimension at once. [`for_each_inner_block`] walks a cursor range
//! run by run, so the per-element carry check only happens at run boundaries.

use crate::multi_index::MultiIndex;
use crate::Result;

/// Iterate `[begin, end)` in innermost runs, calling `f(offsets, len, inner_strides)`.
///
/// The callback receives the flat offset of every operand at the start of the
/// run, the number of elements in the run, and every operand's innermost
/// stride, so element `k` of operand `i` is at `offsets[i] + k * inner_strides[i]`.
/// Runs never cross a bin boundary and are never empty.
pub fn for_each_inner_block<const N: usize, F>(
    begin: &MultiIndex<'_, N>,
    end: &MultiIndex<'_, N>,
    mut f: F,
) -> Result<()>
where
    F: FnMut(&[isize; N], usize, &[isize; N]) -> Result<()>,
{
    let mut it = begin.clone();
    let inner_strides = it.inner_strides();
    while it != *end {
        let len = if it.in_same_chunk(end, 1) {
            it.inner_distance_to(end)
        } else {
            it.inner_distance_to_end()
        };
        f(&it.get(), len, &inner_strides)?;
        it.increment_inner_by(len);
        it.increment_outer();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dims::{Dim, Dimensions};
    use crate::params::{BinParams, ViewParams};

    #[test]
    fn test_dense_runs_cover_rows() {
        let dims = Dimensions::new(&[(Dim::Y, 3), (Dim::X, 4)]).unwrap();
        let index = MultiIndex::new(&[ViewParams::contiguous(dims)]).unwrap();
        let mut runs = Vec::new();
        for_each_inner_block(&index.begin(), &index.end(), |offsets, len, strides| {
            runs.push((offsets[0], len, strides[0]));
            Ok(())
        })
        .unwrap();
        assert_eq!(runs, vec![(0, 4, 1), (4, 4, 1), (8, 4, 1)]);
    }

    #[test]
    fn test_partial_range_stops_mid_row() {
        let dims = Dimensions::new(&[(Dim::Y, 3), (Dim::X, 4)]).unwrap();
        let index = MultiIndex::new(&[ViewParams::contiguous(dims)]).unwrap();
        let mut begin = index.clone();
        begin.set_index(2);
        let mut end = index.clone();
        end.set_index(9);
        let mut runs = Vec::new();
        for_each_inner_block(&begin, &end, |offsets, len, _| {
            runs.push((offsets[0], len));
            Ok(())
        })
        .unwrap();
        assert_eq!(runs, vec![(2, 2), (4, 4), (8, 1)]);
    }

    #[test]
    fn test_binned_runs_are_bins() {
        let table = [(0, 3), (3, 3), (3, 4), (4, 8)];
        let outer = Dimensions::new(&[(Dim::X, 4)]).unwrap();
        let buffer = Dimensions::new(&[(Dim::EVENT, 8)]).unwrap();
        let bins = BinParams::new(Dim::EVENT, buffer, &table).unwrap();
        let events = ViewParams::binned(outer.clone(), &[1], bins).unwrap();
        let scale = ViewParams::contiguous(outer);
        let index = MultiIndex::new(&[events, scale]).unwrap();

        let mut runs = Vec::new();
        for_each_inner_block(&index.begin(), &index.end(), |offsets, len, strides| {
            runs.push((*offsets, len, *strides));
            Ok(())
        })
        .unwrap();
        assert_eq!(
            runs,
            vec![([0, 0], 3, [1, 0]), ([3, 2], 1, [1, 0]), ([4, 3], 4, [1, 0])]
        );
    }

    #[test]
    fn test_callback_error_stops_iteration() {
        let dims = Dimensions::new(&[(Dim::Y, 3), (Dim::X, 2)]).unwrap();
        let index = MultiIndex::new(&[ViewParams::contiguous(dims)]).unwrap();
        let mut calls = 0;
        let result = for_each_inner_block(&index.begin(), &index.end(), |_, _, _| {
            calls += 1;
            Err(crate::BinError::LengthMismatch(0, 1))
        });
        assert!(result.is_err());
        assert_eq!(calls, 1);
    }
}
