//! Operand descriptors consumed by [`MultiIndex`](crate::MultiIndex).
//!
//! A [`ViewParams`] describes how one operand is laid out relative to the
//! shared iteration dimensions: one stride per iterated dimension (0 for
//! broadcast), plus optional [`BinParams`] when every element is a bin of a
//! shared buffer.

use smallvec::SmallVec;

use crate::dims::{Dim, Dimensions};
use crate::{BinError, Result, MAX_NDIM};

/// `(begin, end)` range of one bin inside its buffer, along the bin dimension.
pub type IndexPair = (usize, usize);

/// Element strides, one per dimension.
pub type Strides = SmallVec<[isize; MAX_NDIM]>;

/// Row-major strides of a contiguous array with shape `dims`.
pub fn contiguous_strides(dims: &Dimensions) -> Strides {
    let mut strides: Strides = SmallVec::from_elem(0, dims.ndim());
    let mut acc = 1isize;
    for (stride, &extent) in strides.iter_mut().rev().zip(dims.shape().iter().rev()) {
        *stride = acc;
        acc *= extent as isize;
    }
    strides
}

/// Strides of a row-major array with shape `data_dims`, seen through `iter_dims`.
///
/// Labels of `iter_dims` missing from `data_dims` get stride 0. Every label of
/// `data_dims` must be iterated with the same extent.
pub fn broadcast_strides(iter_dims: &Dimensions, data_dims: &Dimensions) -> Result<Strides> {
    for (dim, extent) in data_dims.iter() {
        match iter_dims.extent(dim) {
            None => return Err(BinError::DimensionNotFound(dim, iter_dims.clone())),
            Some(e) if e != extent => {
                return Err(BinError::ExtentMismatch {
                    dim,
                    a: e,
                    b: extent,
                })
            }
            Some(_) => {}
        }
    }
    Ok(iter_dims
        .labels()
        .iter()
        .map(|&dim| data_dims.offset(dim).map_or(0, |o| o as isize))
        .collect())
}

fn check_stride_len(dims: &Dimensions, strides: &[isize]) -> Result<()> {
    if dims.ndim() != strides.len() {
        return Err(BinError::StrideLengthMismatch {
            strides: strides.len(),
            ndim: dims.ndim(),
        });
    }
    Ok(())
}

/// Ragged addressing of a binned operand.
///
/// `dims` are the dims of the shared buffer holding all bins; its extent along
/// `dim` is the full buffer length. `indices` holds one `(begin, end)` pair per
/// outer element, addressed through the outer strides of the owning
/// [`ViewParams`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinParams<'a> {
    dim: Dim,
    dims: Dimensions,
    indices: &'a [IndexPair],
}

impl<'a> BinParams<'a> {
    pub fn new(dim: Dim, dims: Dimensions, indices: &'a [IndexPair]) -> Result<Self> {
        let len = dims
            .extent(dim)
            .ok_or_else(|| BinError::DimensionNotFound(dim, dims.clone()))?;
        if let Some((i, &(begin, end))) = indices
            .iter()
            .enumerate()
            .find(|(_, pair)| pair.0 > pair.1 || pair.1 > len)
        {
            return Err(BinError::InvalidBinIndices(format!(
                "bin {i} has range ({begin}, {end}) in a buffer of length {len}"
            )));
        }
        Ok(Self { dim, dims, indices })
    }

    /// The dimension bins are sliced along.
    pub fn dim(&self) -> Dim {
        self.dim
    }

    pub fn dims(&self) -> &Dimensions {
        &self.dims
    }

    pub fn indices(&self) -> &'a [IndexPair] {
        self.indices
    }

    /// Buffer elements spanned by one step along the bin dimension.
    pub fn bin_stride(&self) -> isize {
        self.dims.offset(self.dim).map_or(0, |o| o as isize)
    }

    /// Length of the bin stored at table position `i`.
    pub fn bin_len(&self, i: usize) -> usize {
        let (begin, end) = self.indices[i];
        end - begin
    }
}

/// Layout of one operand relative to the shared iteration dimensions.
///
/// For a binned operand `dims` are the outer dimensions and `strides` step
/// through the bin-index table; for a dense operand they step through data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewParams<'a> {
    dims: Dimensions,
    strides: Strides,
    bins: Option<BinParams<'a>>,
}

impl<'a> ViewParams<'a> {
    /// Dense operand with explicit strides aligned with `dims`.
    pub fn dense(dims: Dimensions, strides: &[isize]) -> Result<Self> {
        check_stride_len(&dims, strides)?;
        Ok(Self {
            dims,
            strides: SmallVec::from_slice(strides),
            bins: None,
        })
    }

    /// Dense, row-major operand covering all of `dims`.
    pub fn contiguous(dims: Dimensions) -> Self {
        let strides = contiguous_strides(&dims);
        Self {
            dims,
            strides,
            bins: None,
        }
    }

    /// Row-major operand of shape `data_dims` broadcast to `iter_dims`.
    pub fn broadcast(iter_dims: &Dimensions, data_dims: &Dimensions) -> Result<Self> {
        let strides = broadcast_strides(iter_dims, data_dims)?;
        Ok(Self {
            dims: iter_dims.clone(),
            strides,
            bins: None,
        })
    }

    /// Binned operand; `strides` address entries of the bin-index table.
    ///
    /// Addressing starts at table entry 0 with no base offset, so a negative
    /// stride is accepted only along a dimension of extent 1. Reverse a table
    /// by reordering it instead.
    pub fn binned(dims: Dimensions, strides: &[isize], bins: BinParams<'a>) -> Result<Self> {
        check_stride_len(&dims, strides)?;
        if dims.volume() > 0 {
            let (lo, hi) = reachable_range(dims.shape(), strides);
            let len = bins.indices.len() as isize;
            if lo < 0 || hi >= len {
                return Err(BinError::InvalidBinIndices(format!(
                    "table of {len} bins addressed in [{lo}, {hi}] by {dims}"
                )));
            }
        }
        Ok(Self {
            dims,
            strides: SmallVec::from_slice(strides),
            bins: Some(bins),
        })
    }

    pub fn dims(&self) -> &Dimensions {
        &self.dims
    }

    pub fn strides(&self) -> &[isize] {
        &self.strides
    }

    pub fn bin_params(&self) -> Option<&BinParams<'a>> {
        self.bins.as_ref()
    }

    pub fn is_binned(&self) -> bool {
        self.bins.is_some()
    }
}

/// Smallest and largest flat index reachable with `shape` and `strides`.
fn reachable_range(shape: &[usize], strides: &[isize]) -> (isize, isize) {
    let mut lo = 0isize;
    let mut hi = 0isize;
    for (&extent, &stride) in shape.iter().zip(strides) {
        let span = (extent as isize - 1) * stride;
        if span < 0 {
            lo += span;
        } else {
            hi += span;
        }
    }
    (lo, hi)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contiguous_strides() {
        let dims = Dimensions::new(&[(Dim::Z, 4), (Dim::Y, 2), (Dim::X, 3)]).unwrap();
        assert_eq!(contiguous_strides(&dims).as_slice(), &[6, 3, 1]);
        assert!(contiguous_strides(&Dimensions::scalar()).is_empty());
    }

    #[test]
    fn test_broadcast_strides_transposed_and_missing() {
        let iter = Dimensions::new(&[(Dim::Z, 4), (Dim::Y, 2), (Dim::X, 3)]).unwrap();
        // Data stored as (x, z): y is broadcast, x is the outer data dimension.
        let data = Dimensions::new(&[(Dim::X, 3), (Dim::Z, 4)]).unwrap();
        let strides = broadcast_strides(&iter, &data).unwrap();
        assert_eq!(strides.as_slice(), &[1, 0, 4]);
    }

    #[test]
    fn test_broadcast_strides_errors() {
        let iter = Dimensions::new(&[(Dim::X, 3)]).unwrap();
        let extra = Dimensions::new(&[(Dim::Y, 3)]).unwrap();
        assert!(matches!(
            broadcast_strides(&iter, &extra),
            Err(BinError::DimensionNotFound(Dim::Y, _))
        ));
        let wrong = Dimensions::new(&[(Dim::X, 2)]).unwrap();
        assert!(matches!(
            broadcast_strides(&iter, &wrong),
            Err(BinError::ExtentMismatch { dim: Dim::X, .. })
        ));
    }

    #[test]
    fn test_dense_stride_length_checked() {
        let dims = Dimensions::new(&[(Dim::X, 3)]).unwrap();
        assert_eq!(
            ViewParams::dense(dims, &[1, 1]).unwrap_err(),
            BinError::StrideLengthMismatch {
                strides: 2,
                ndim: 1
            }
        );
    }

    #[test]
    fn test_bin_params_validation() {
        let buffer = Dimensions::new(&[(Dim::EVENT, 5)]).unwrap();
        let good = [(0, 2), (2, 5)];
        let params = BinParams::new(Dim::EVENT, buffer.clone(), &good).unwrap();
        assert_eq!(params.bin_stride(), 1);
        assert_eq!(params.bin_len(1), 3);

        let inverted = [(2, 1)];
        assert!(matches!(
            BinParams::new(Dim::EVENT, buffer.clone(), &inverted),
            Err(BinError::InvalidBinIndices(_))
        ));
        let too_long = [(0, 6)];
        assert!(BinParams::new(Dim::EVENT, buffer.clone(), &too_long).is_err());
        assert!(BinParams::new(Dim::X, buffer, &good).is_err());
    }

    #[test]
    fn test_bin_stride_of_2d_buffer() {
        // Bins slice the outer `event` dimension of an (event, x) buffer.
        let buffer = Dimensions::new(&[(Dim::EVENT, 10), (Dim::X, 3)]).unwrap();
        let table = [(0, 4), (4, 10)];
        let params = BinParams::new(Dim::EVENT, buffer, &table).unwrap();
        assert_eq!(params.bin_stride(), 3);
    }

    #[test]
    fn test_binned_table_coverage_checked() {
        let buffer = Dimensions::new(&[(Dim::EVENT, 5)]).unwrap();
        let table = [(0, 2), (2, 5)];
        let outer = Dimensions::new(&[(Dim::X, 3)]).unwrap();
        let bins = BinParams::new(Dim::EVENT, buffer, &table).unwrap();
        assert!(matches!(
            ViewParams::binned(outer.clone(), &[1], bins.clone()),
            Err(BinError::InvalidBinIndices(_))
        ));
        // Broadcasting a single bin over x only ever reads entry 0.
        let view = ViewParams::binned(outer, &[0], bins).unwrap();
        assert!(view.is_binned());
    }

    #[test]
    fn test_binned_negative_stride_needs_unit_extent() {
        let buffer = Dimensions::new(&[(Dim::EVENT, 5)]).unwrap();
        let table = [(0, 2), (2, 5)];
        let bins = BinParams::new(Dim::EVENT, buffer, &table).unwrap();
        let reversed = Dimensions::new(&[(Dim::X, 2)]).unwrap();
        assert!(matches!(
            ViewParams::binned(reversed, &[-1], bins.clone()),
            Err(BinError::InvalidBinIndices(_))
        ));
        let single = Dimensions::new(&[(Dim::Y, 1), (Dim::X, 2)]).unwrap();
        assert!(ViewParams::binned(single, &[-1, 1], bins).is_ok());
    }
}
