//! Synchronized multi-operand cursor over dense and binned operands.
//!
//! A [`MultiIndex`] walks the iteration space of `N` operands and keeps one
//! flat element offset per operand. Dimensions are stored innermost-first:
//! position 0 is the fastest-varying dimension.
//!
//! Without bins the iteration space is the shared dense shape. With at least
//! one binned operand it is split in two blocks:
//!
//! - `0..inner_ndim`: the dims of the bin contents (the buffer dims, with the
//!   extent along the bin dimension replaced by the current bin's length)
//! - `inner_ndim..ndim`: the outer dims, one position per bin
//!
//! Binned operands address their current bin through the bin-index table and
//! step through it with their buffer strides. Dense operands have stride 0 in
//! the nested block, so their value is broadcast over the bin contents.
//!
//! The cursor never stops on an empty bin: whenever a bin of length 0 is
//! loaded it seeks forward to the next non-empty bin, or to the end.

use std::iter::FusedIterator;

use log::trace;

use crate::dims::Dimensions;
use crate::params::{contiguous_strides, IndexPair, ViewParams};
use crate::validate::validate_bin_indices;
use crate::{BinError, Result, MAX_NDIM, MAX_OPERANDS};

/// Bin-table state of one operand.
#[derive(Debug, Clone, Copy, Default)]
struct BinCursor<'a> {
    /// `None` for dense operands.
    indices: Option<&'a [IndexPair]>,
    /// Buffer elements per step along the bin dimension.
    bin_stride: isize,
    /// Table position of the currently loaded bin.
    bin_index: isize,
}

/// Cursor producing synchronized flat offsets into `N` operands.
///
/// Cloning copies the full state; a clone iterates independently. The cursor
/// borrows the bin-index tables of its operands for `'a`.
#[derive(Debug, Clone)]
pub struct MultiIndex<'a, const N: usize> {
    /// Current flat offset per operand.
    offsets: [isize; N],
    /// `strides[dim][operand]`, innermost dim first.
    strides: [[isize; N]; MAX_NDIM],
    coord: [usize; MAX_NDIM],
    shape: [usize; MAX_NDIM],
    /// Dims of the bin contents when binned, else all dims.
    inner_ndim: usize,
    ndim: usize,
    /// Position of the bin dimension within the inner block; `None` if dense.
    nested_dim: Option<usize>,
    /// No element to visit at all.
    empty: bool,
    bins: [BinCursor<'a>; N],
}

fn check_operand_count<const N: usize>() -> Result<()> {
    if N == 0 || N > MAX_OPERANDS {
        return Err(BinError::OperandCount {
            count: N,
            max: MAX_OPERANDS,
        });
    }
    Ok(())
}

fn check_rank(ndim: usize) -> Result<()> {
    if ndim > MAX_NDIM {
        return Err(BinError::RankTooLarge {
            ndim,
            max: MAX_NDIM,
        });
    }
    Ok(())
}

/// Mixed-radix decomposition of `flat` against `shape` (innermost first).
///
/// The last coordinate takes the remainder, so `flat == volume` yields the
/// one-past-end coordinate.
fn extract_indices(mut flat: usize, shape: &[usize], coord: &mut [usize]) {
    match shape.split_last() {
        None => coord[0] = flat,
        Some((_, init)) => {
            for (c, &extent) in coord.iter_mut().zip(init) {
                *c = flat % extent;
                flat /= extent;
            }
            coord[init.len()] = flat;
        }
    }
}

impl<'a, const N: usize> MultiIndex<'a, N> {
    fn blank(inner_ndim: usize, ndim: usize) -> Self {
        Self {
            offsets: [0; N],
            strides: [[0; N]; MAX_NDIM],
            coord: [0; MAX_NDIM],
            shape: [0; MAX_NDIM],
            inner_ndim,
            ndim,
            nested_dim: None,
            empty: false,
            bins: [BinCursor::default(); N],
        }
    }

    /// Dense cursor over `dims`, one stride slice per operand aligned with it.
    pub fn dense(dims: &Dimensions, strides: [&[isize]; N]) -> Result<Self> {
        check_operand_count::<N>()?;
        let ndim = dims.ndim();
        check_rank(ndim)?;
        if let Some(s) = strides.iter().find(|s| s.len() != ndim) {
            return Err(BinError::StrideLengthMismatch {
                strides: s.len(),
                ndim,
            });
        }

        let mut index = Self::blank(ndim, ndim);
        for (op, s) in strides.iter().enumerate() {
            index.store_strides(op, 0, s);
        }
        index.store_shape(0, dims.shape());
        index.empty = dims.volume() == 0;
        trace!("dense multi-index over {dims} for {N} operand(s)");
        Ok(index)
    }

    /// Cursor over operands sharing one iteration shape.
    ///
    /// If any operand is binned, bin sizes are validated across all binned
    /// operands before the cursor is positioned on the first non-empty bin.
    pub fn new(params: &[ViewParams<'a>; N]) -> Result<Self> {
        check_operand_count::<N>()?;
        let dims = params[0].dims();
        if let Some(p) = params.iter().find(|p| p.dims() != dims) {
            return Err(BinError::ShapeMismatch(dims.clone(), p.dims().clone()));
        }
        if params.iter().any(ViewParams::is_binned) {
            Self::binned(params)
        } else {
            Self::dense(dims, std::array::from_fn(|op| params[op].strides()))
        }
    }

    fn binned(params: &[ViewParams<'a>; N]) -> Result<Self> {
        validate_bin_indices(params)?;
        let Some(nested) = params.iter().find_map(ViewParams::bin_params) else {
            return Err(BinError::InvalidBinIndices("no binned operand".into()));
        };
        let inner_dims = nested.dims();
        let bin_dims = params[0].dims();
        let inner_ndim = inner_dims.ndim();
        let bin_ndim = bin_dims.ndim();
        check_rank(inner_ndim + bin_ndim)?;

        let mut index = Self::blank(inner_ndim, inner_ndim + bin_ndim);
        for (op, p) in params.iter().enumerate() {
            if let Some(bins) = p.bin_params() {
                index.store_strides(op, 0, &contiguous_strides(bins.dims()));
                index.bins[op] = BinCursor {
                    indices: Some(bins.indices()),
                    bin_stride: bins.bin_stride(),
                    bin_index: 0,
                };
            }
            index.store_strides(op, inner_ndim, p.strides());
        }
        index.store_shape(0, inner_dims.shape());
        index.store_shape(inner_ndim, bin_dims.shape());

        let slice_dim = inner_dims.index(nested.dim()).unwrap_or(0);
        let nested_dim = inner_ndim - 1 - slice_dim;
        index.nested_dim = Some(nested_dim);
        let template_empty = index.shape[..inner_ndim]
            .iter()
            .enumerate()
            .any(|(d, &extent)| d != nested_dim && extent == 0);
        index.empty = bin_dims.volume() == 0 || template_empty;
        trace!(
            "binned multi-index: nested {inner_dims} along {}, outer {bin_dims}, {N} operand(s)",
            nested.dim()
        );

        if index.empty {
            index.move_to_end();
            return Ok(index);
        }
        for op in 0..N {
            index.load_bin_params(op);
        }
        if index.shape[nested_dim] == 0 {
            index.seek_bin();
        }
        Ok(index)
    }

    /// Store `strides` (outermost first) reversed, starting at `first_dim`.
    fn store_strides(&mut self, op: usize, first_dim: usize, strides: &[isize]) {
        for (d, &s) in strides.iter().rev().enumerate() {
            self.strides[first_dim + d][op] = s;
        }
    }

    fn store_shape(&mut self, first_dim: usize, shape: &[usize]) {
        for (d, &extent) in shape.iter().rev().enumerate() {
            self.shape[first_dim + d] = extent;
        }
    }

    // ========================================================================
    // Stepping
    // ========================================================================

    /// Advance by one element.
    #[inline]
    pub fn increment(&mut self) {
        for (offset, &s) in self.offsets.iter_mut().zip(&self.strides[0]) {
            *offset += s;
        }
        self.coord[0] += 1;
        if self.dim_at_end(0) {
            self.increment_outer();
        }
    }

    /// Carry exhausted inner dimensions outward.
    ///
    /// Each exhausted dimension is rewound and the next one stepped in a
    /// single offset update. When the last nested dimension is exhausted the
    /// cursor moves on to the next non-empty bin. A no-op unless the
    /// innermost dimension is at its end.
    pub fn increment_outer(&mut self) {
        let mut d = 0;
        while d + 1 < self.inner_ndim && self.dim_at_end(d) {
            let rewind = self.coord[d] as isize;
            for op in 0..N {
                self.offsets[op] += self.strides[d + 1][op] - rewind * self.strides[d][op];
            }
            self.coord[d + 1] += 1;
            self.coord[d] = 0;
            d += 1;
        }
        if self.bin_ndim() != 0 && self.dim_at_end(self.inner_ndim - 1) {
            self.seek_bin();
        }
    }

    /// Advance the innermost coordinate by `distance` without carrying.
    ///
    /// The caller guarantees `distance <= inner_distance_to_end()`.
    #[inline]
    pub fn increment_inner_by(&mut self, distance: usize) {
        let distance_i = distance as isize;
        for (offset, &s) in self.offsets.iter_mut().zip(&self.strides[0]) {
            *offset += distance_i * s;
        }
        self.coord[0] += distance;
    }

    // ========================================================================
    // Positioning
    // ========================================================================

    /// Random-access positioning.
    ///
    /// Without bins `index` is the flat element position. With bins it is the
    /// position of the *bin* in the outer dims; if that bin is empty the
    /// cursor seeks forward to the next non-empty bin (or the end).
    pub fn set_index(&mut self, index: usize) {
        if self.empty {
            self.move_to_end();
            return;
        }
        if self.has_bins() {
            self.set_bins_index(index);
        } else {
            let n = self.inner_ndim;
            extract_indices(index, &self.shape[..n], &mut self.coord);
            for op in 0..N {
                self.offsets[op] = self.flat_index(op, 0, n);
            }
        }
    }

    /// Position one past the last element.
    pub fn set_to_end(&mut self) {
        self.move_to_end();
        if self.has_bins() {
            let (inner, ndim) = (self.inner_ndim, self.ndim);
            for op in 0..N {
                self.bins[op].bin_index = self.flat_index(op, inner, ndim);
                // Binned operands are not loaded at the end; dense ones get their
                // one-past-end offset.
                if self.bins[op].indices.is_none() {
                    self.offsets[op] = self.flat_index(op, 0, ndim);
                }
            }
        } else {
            for op in 0..N {
                self.offsets[op] = self.flat_index(op, 0, self.inner_ndim);
            }
        }
    }

    /// Copy positioned on the first element.
    pub fn begin(&self) -> Self {
        let mut it = self.clone();
        it.set_index(0);
        it
    }

    /// Copy positioned one past the last element.
    pub fn end(&self) -> Self {
        let mut it = self.clone();
        it.set_to_end();
        it
    }

    /// Iterate offsets from [`begin`](Self::begin) to [`end`](Self::end).
    pub fn iter(&self) -> Offsets<'a, N> {
        Offsets {
            it: self.begin(),
            end: self.end(),
        }
    }

    /// Iterate offsets between two positions in the sense of [`set_index`](Self::set_index).
    pub fn iter_range(&self, start: usize, stop: usize) -> Offsets<'a, N> {
        let mut it = self.clone();
        it.set_index(start);
        let mut end = self.clone();
        end.set_index(stop);
        Offsets { it, end }
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Current flat offset of every operand.
    #[inline]
    pub fn get(&self) -> [isize; N] {
        self.offsets
    }

    /// Stride of every operand along the innermost dimension.
    #[inline]
    pub fn inner_strides(&self) -> [isize; N] {
        self.strides[0]
    }

    /// Extent of the innermost dimension (of the current bin, if binned).
    #[inline]
    pub fn inner_size(&self) -> usize {
        self.shape[0]
    }

    /// Elements left in the innermost dimension from the current position.
    #[inline]
    pub fn inner_distance_to_end(&self) -> usize {
        self.shape[0].saturating_sub(self.coord[0])
    }

    /// Innermost steps from here to `other`, assumed to be in the same run.
    #[inline]
    pub fn inner_distance_to(&self, other: &Self) -> usize {
        other.coord[0].saturating_sub(self.coord[0])
    }

    /// True iff all coordinates from `first_dim` outward match.
    pub fn in_same_chunk(&self, other: &Self, first_dim: usize) -> bool {
        (first_dim..self.ndim).all(|d| self.coord[d] == other.coord[d])
    }

    /// True if operand 0 has stride 0 in any iterated dimension.
    pub fn has_stride_zero(&self) -> bool {
        (0..self.ndim).any(|d| self.strides[d][0] == 0)
    }

    /// True if any operand is binned.
    pub fn has_bins(&self) -> bool {
        self.nested_dim.is_some()
    }

    /// True if there is no element to visit; then `begin() == end()`.
    pub fn is_empty(&self) -> bool {
        self.empty
    }

    /// Number of iterated dimensions, nested and outer together.
    pub fn ndim(&self) -> usize {
        self.ndim
    }

    /// Number of dimensions iterated within one bin (all of them without bins).
    pub fn inner_ndim(&self) -> usize {
        self.inner_ndim
    }

    /// Number of outer (bin) dimensions; 0 without bins.
    pub fn bin_ndim(&self) -> usize {
        self.ndim - self.inner_ndim
    }

    /// Number of positions addressable by [`set_index`](Self::set_index).
    ///
    /// Elements without bins, bins (including empty ones) with bins. Zero if
    /// the cursor is empty.
    pub fn position_count(&self) -> usize {
        if self.empty {
            return 0;
        }
        if self.has_bins() {
            self.shape[self.inner_ndim..self.ndim].iter().product()
        } else {
            self.shape[..self.inner_ndim].iter().product()
        }
    }

    /// Current coordinates, innermost first.
    pub fn coord(&self) -> &[usize] {
        &self.coord[..self.ndim]
    }

    // ========================================================================
    // Internals
    // ========================================================================

    #[inline]
    fn dim_at_end(&self, dim: usize) -> bool {
        self.coord[dim] == self.shape[dim].max(1)
    }

    fn at_end(&self) -> bool {
        self.dim_at_end(self.ndim.max(1) - 1)
    }

    /// Flat element position without bins, counting the end as the volume.
    fn element_position(&self) -> Option<usize> {
        if self.has_bins() {
            return None;
        }
        Some(
            (0..self.ndim.max(1))
                .rev()
                .fold(0, |position, d| position * self.shape[d] + self.coord[d]),
        )
    }

    fn nested(&self) -> usize {
        self.nested_dim.unwrap_or(0)
    }

    /// Canonical one-past-end coordinates: all zero but the outermost.
    fn move_to_end(&mut self) {
        let last = self.ndim.max(1) - 1;
        self.coord = [0; MAX_NDIM];
        self.coord[last] = self.shape[last].max(1);
    }

    fn flat_index(&self, op: usize, first_dim: usize, end_dim: usize) -> isize {
        (first_dim..end_dim)
            .map(|d| self.coord[d] as isize * self.strides[d][op])
            .sum()
    }

    fn set_bins_index(&mut self, index: usize) {
        let (inner, ndim) = (self.inner_ndim, self.ndim);
        self.coord[..inner].fill(0);
        if inner == ndim {
            // A single bin: any position past it is the end.
            if index != 0 {
                self.set_to_end();
                return;
            }
        } else {
            extract_indices(index, &self.shape[inner..ndim], &mut self.coord[inner..ndim]);
        }
        for op in 0..N {
            self.bins[op].bin_index = self.flat_index(op, inner, ndim);
            self.load_bin_params(op);
        }
        if self.shape[self.nested()] == 0 && !self.at_end() {
            self.seek_bin();
        }
    }

    fn seek_bin(&mut self) {
        loop {
            self.increment_bins();
            if self.shape[self.nested()] != 0 || self.at_end() {
                break;
            }
        }
    }

    fn increment_bins(&mut self) {
        if self.bin_ndim() == 0 {
            self.set_to_end();
            return;
        }
        let dim = self.inner_ndim;
        for op in 0..N {
            self.bins[op].bin_index += self.strides[dim][op];
        }
        self.coord[..dim].fill(0);
        self.coord[dim] += 1;
        if self.dim_at_end(dim) {
            self.increment_outer_bins();
        }
        if !self.at_end() {
            for op in 0..N {
                self.load_bin_params(op);
            }
        }
    }

    fn increment_outer_bins(&mut self) {
        let mut d = self.inner_ndim;
        while d + 1 < self.ndim && self.dim_at_end(d) {
            let rewind = self.coord[d] as isize;
            for op in 0..N {
                self.bins[op].bin_index += self.strides[d + 1][op] - rewind * self.strides[d][op];
            }
            self.coord[d + 1] += 1;
            self.coord[d] = 0;
            d += 1;
        }
    }

    fn load_bin_params(&mut self, op: usize) {
        match self.bins[op].indices {
            None => self.offsets[op] = self.flat_index(op, 0, self.ndim),
            Some(indices) if !self.at_end() => {
                // Bin sizes agree across operands, so the shared nested extent
                // can be taken from whichever operand loads last.
                let (begin, end) = indices[self.bins[op].bin_index as usize];
                let nested = self.nested();
                self.shape[nested] = end - begin;
                self.offsets[op] = self.bins[op].bin_stride * begin as isize;
            }
            Some(_) => {}
        }
    }
}

impl<const N: usize> PartialEq for MultiIndex<'_, N> {
    /// Cursors over congruent operands compare by coordinates only.
    fn eq(&self, other: &Self) -> bool {
        let n = self.ndim.max(1);
        self.coord[..n] == other.coord[..n]
    }
}

impl<const N: usize> Eq for MultiIndex<'_, N> {}

/// Iterator over the offsets of a [`MultiIndex`] range.
#[derive(Debug, Clone)]
pub struct Offsets<'a, const N: usize> {
    it: MultiIndex<'a, N>,
    end: MultiIndex<'a, N>,
}

impl<const N: usize> Iterator for Offsets<'_, N> {
    type Item = [isize; N];

    #[inline]
    fn next(&mut self) -> Option<[isize; N]> {
        if self.it == self.end {
            return None;
        }
        let offsets = self.it.get();
        self.it.increment();
        Some(offsets)
    }

    /// Exact without bins; bin contents are only known once visited.
    fn size_hint(&self) -> (usize, Option<usize>) {
        match (self.it.element_position(), self.end.element_position()) {
            (Some(it), Some(end)) => {
                let remaining = end.saturating_sub(it);
                (remaining, Some(remaining))
            }
            _ if self.it == self.end => (0, Some(0)),
            _ => (0, None),
        }
    }
}

// `increment` never moves a cursor off the canonical end.
impl<const N: usize> FusedIterator for Offsets<'_, N> {}
