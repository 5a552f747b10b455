//! Bin-size agreement checks run before a binned iteration starts.

use crate::multi_index::MultiIndex;
use crate::params::{BinParams, ViewParams};
use crate::{BinError, Result};

/// Check that every binned operand agrees with the first one.
///
/// Binned operands must slice their buffers along the same dimension, share
/// the extents of every other buffer dimension, and report the same length
/// for corresponding bins. Dense operands are ignored. Agreement with the
/// first binned operand implies pairwise agreement.
pub fn validate_bin_indices(params: &[ViewParams<'_>]) -> Result<()> {
    let mut binned = params
        .iter()
        .filter_map(|p| p.bin_params().map(|bins| (p, bins)));
    let Some((first, first_bins)) = binned.next() else {
        return Ok(());
    };
    for (other, other_bins) in binned {
        validate_nested_dims(first_bins, other_bins)?;
        validate_bin_sizes(first, first_bins, other, other_bins)?;
    }
    Ok(())
}

fn validate_nested_dims(a: &BinParams<'_>, b: &BinParams<'_>) -> Result<()> {
    let mismatch = || BinError::NestedDimsMismatch(a.dims().clone(), b.dims().clone());
    if a.dim() != b.dim() || a.dims().labels() != b.dims().labels() {
        return Err(mismatch());
    }
    let agree = a
        .dims()
        .iter()
        .zip(b.dims().iter())
        .all(|((dim, ea), (_, eb))| dim == a.dim() || ea == eb);
    if !agree {
        return Err(mismatch());
    }
    Ok(())
}

fn validate_bin_sizes(
    a: &ViewParams<'_>,
    a_bins: &BinParams<'_>,
    b: &ViewParams<'_>,
    b_bins: &BinParams<'_>,
) -> Result<()> {
    let index = MultiIndex::dense(a.dims(), [a.strides(), b.strides()])?;
    for (position, [ia, ib]) in index.iter().enumerate() {
        let len_a = a_bins.bin_len(ia as usize);
        let len_b = b_bins.bin_len(ib as usize);
        if len_a != len_b {
            return Err(BinError::BinSizeMismatch {
                position,
                a: len_a,
                b: len_b,
            });
        }
    }
    Ok(())
}
