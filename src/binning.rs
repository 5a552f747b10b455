//! Producing bins: edge checks, per-element bin assignment, index tables.
//!
//! These are the steps upstream of the scatter kernel. [`bin_1d`] strings
//! them together: assign every coordinate to a bin by binary search over the
//! edges, count the bin sizes, turn the sizes into a `(begin, end)` table and
//! scatter the values into a freshly allocated buffer.

use log::debug;

use crate::dims::{Dim, Dimensions};
use crate::params::{BinParams, IndexPair, ViewParams};
use crate::scatter::{scatter_into, BinIndex};
use crate::{BinError, Result};

/// Check that `edges` delimit at least one bin and are sorted.
pub fn validate_edges(edges: &[f64]) -> Result<()> {
    if edges.len() < 2 {
        return Err(BinError::InvalidEdges(format!(
            "need at least 2 edges, got {}",
            edges.len()
        )));
    }
    if let Some(i) = edges.iter().position(|e| e.is_nan()) {
        return Err(BinError::InvalidEdges(format!("edge {i} is NaN")));
    }
    if let Some(i) = edges.windows(2).position(|w| w[1] < w[0]) {
        return Err(BinError::InvalidEdges(format!(
            "edges not sorted at {}: {} > {}",
            i + 1,
            edges[i],
            edges[i + 1]
        )));
    }
    Ok(())
}

/// Bin of every coordinate: `i` with `edges[i] <= x < edges[i + 1]`, else `-1`.
///
/// The last edge is exclusive. NaN coordinates are never binned.
pub fn assign_bins(coords: &[f64], edges: &[f64]) -> Result<Vec<i64>> {
    validate_edges(edges)?;
    let first = edges[0];
    let last = edges[edges.len() - 1];
    Ok(coords
        .iter()
        .map(|&x| {
            if x.is_nan() || x < first || x >= last {
                -1
            } else {
                edges.partition_point(|&e| e <= x) as i64 - 1
            }
        })
        .collect())
}

/// Number of elements routed to each of `n_bins` bins.
pub fn count_per_bin<I: BinIndex>(bin_indices: &[I], n_bins: usize) -> Result<Vec<usize>> {
    let mut sizes = vec![0; n_bins];
    for bin in bin_indices.iter().filter_map(|i| i.to_bin()) {
        let size = sizes
            .get_mut(bin)
            .ok_or(BinError::BinOutOfRange { index: bin, bins: n_bins })?;
        *size += 1;
    }
    Ok(sizes)
}

/// Packed `(begin, end)` table for consecutive bins of the given sizes.
pub fn indices_from_sizes(sizes: &[usize]) -> Vec<IndexPair> {
    sizes
        .iter()
        .scan(0, |begin, &size| {
            let pair = (*begin, *begin + size);
            *begin += size;
            Some(pair)
        })
        .collect()
}

/// Write cursors seeded at the start of every bin.
pub fn cursors_from_indices(indices: &[IndexPair]) -> Vec<usize> {
    indices.iter().map(|&(begin, _)| begin).collect()
}

/// Elements packed bin by bin, with the `(begin, end)` range of every bin.
#[derive(Debug, Clone, PartialEq)]
pub struct BinnedBuffer<T> {
    indices: Vec<IndexPair>,
    buffer: Vec<T>,
}

impl<T> BinnedBuffer<T> {
    pub fn new(indices: Vec<IndexPair>, buffer: Vec<T>) -> Result<Self> {
        if let Some((i, &(begin, end))) = indices
            .iter()
            .enumerate()
            .find(|(_, pair)| pair.0 > pair.1 || pair.1 > buffer.len())
        {
            return Err(BinError::InvalidBinIndices(format!(
                "bin {i} has range ({begin}, {end}) in a buffer of length {}",
                buffer.len()
            )));
        }
        Ok(Self { indices, buffer })
    }

    pub fn n_bins(&self) -> usize {
        self.indices.len()
    }

    pub fn indices(&self) -> &[IndexPair] {
        &self.indices
    }

    pub fn buffer(&self) -> &[T] {
        &self.buffer
    }

    /// Contents of bin `i`, or `None` past the last bin.
    pub fn bin(&self, i: usize) -> Option<&[T]> {
        let &(begin, end) = self.indices.get(i)?;
        self.buffer.get(begin..end)
    }

    pub fn into_parts(self) -> (Vec<IndexPair>, Vec<T>) {
        (self.indices, self.buffer)
    }

    /// Describe the buffer as a binned operand with outer dimension `dim`.
    ///
    /// Bins are sliced along [`Dim::EVENT`].
    pub fn view_params(&self, dim: Dim) -> Result<ViewParams<'_>> {
        let outer = Dimensions::new(&[(dim, self.n_bins())])?;
        let nested = Dimensions::new(&[(Dim::EVENT, self.buffer.len())])?;
        let bins = BinParams::new(Dim::EVENT, nested, &self.indices)?;
        ViewParams::binned(outer, &[1], bins)
    }
}

/// Histogram-style binning of `values` by their `coords` into `edges`.
///
/// Elements outside the edges are dropped. Within a bin, elements keep their
/// input order.
pub fn bin_1d<T>(values: &[T], coords: &[f64], edges: &[f64]) -> Result<BinnedBuffer<T>>
where
    T: Clone + Default,
{
    if values.len() != coords.len() {
        return Err(BinError::LengthMismatch(values.len(), coords.len()));
    }
    let bin_indices = assign_bins(coords, edges)?;
    let sizes = count_per_bin(&bin_indices, edges.len() - 1)?;
    let indices = indices_from_sizes(&sizes);
    let mut cursors = cursors_from_indices(&indices);
    let total = indices.last().map_or(0, |&(_, end)| end);
    debug!(
        "binning {} elements into {} bins, {} dropped",
        values.len(),
        sizes.len(),
        values.len() - total
    );
    let mut buffer = vec![T::default(); total];
    scatter_into(&mut buffer, &mut cursors, values, &bin_indices)?;
    Ok(BinnedBuffer { indices, buffer })
}
