//! Dimension labels and ordered shapes.
//!
//! [`Dimensions`] is an ordered sequence of `(label, extent)` pairs in
//! row-major order: the last label is the innermost, fastest-varying one.

use std::fmt;

use smallvec::SmallVec;

use crate::{BinError, Result, MAX_NDIM};

/// A dimension label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Dim(&'static str);

impl Dim {
    pub const X: Dim = Dim("x");
    pub const Y: Dim = Dim("y");
    pub const Z: Dim = Dim("z");
    pub const TIME: Dim = Dim("time");
    pub const EVENT: Dim = Dim("event");
    pub const ROW: Dim = Dim("row");

    /// Create a label from a static name.
    pub const fn new(name: &'static str) -> Self {
        Dim(name)
    }

    pub fn name(&self) -> &'static str {
        self.0
    }
}

impl fmt::Display for Dim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// Ordered mapping from dimension label to extent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Dimensions {
    labels: SmallVec<[Dim; MAX_NDIM]>,
    shape: SmallVec<[usize; MAX_NDIM]>,
}

impl Dimensions {
    /// Build dimensions from `(label, extent)` pairs, outermost first.
    pub fn new(dims: &[(Dim, usize)]) -> Result<Self> {
        let mut out = Self::default();
        for &(dim, extent) in dims {
            out.push(dim, extent)?;
        }
        Ok(out)
    }

    /// Zero-dimensional (scalar) shape.
    pub fn scalar() -> Self {
        Self::default()
    }

    /// Append `dim` as the new innermost dimension.
    pub fn push(&mut self, dim: Dim, extent: usize) -> Result<()> {
        if self.contains(dim) {
            return Err(BinError::DuplicateDimension(dim));
        }
        self.labels.push(dim);
        self.shape.push(extent);
        Ok(())
    }

    pub fn ndim(&self) -> usize {
        self.labels.len()
    }

    /// Number of elements; 1 for a scalar.
    pub fn volume(&self) -> usize {
        self.shape.iter().product()
    }

    pub fn labels(&self) -> &[Dim] {
        &self.labels
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn iter(&self) -> impl Iterator<Item = (Dim, usize)> + '_ {
        self.labels.iter().copied().zip(self.shape.iter().copied())
    }

    pub fn contains(&self, dim: Dim) -> bool {
        self.labels.contains(&dim)
    }

    /// True if every label of `other` is present here with the same extent.
    pub fn includes(&self, other: &Dimensions) -> bool {
        other
            .iter()
            .all(|(dim, extent)| self.extent(dim) == Some(extent))
    }

    /// Position of `dim`, counting from the outermost dimension.
    pub fn index(&self, dim: Dim) -> Option<usize> {
        self.labels.iter().position(|&d| d == dim)
    }

    pub fn extent(&self, dim: Dim) -> Option<usize> {
        self.index(dim).map(|i| self.shape[i])
    }

    /// The innermost label, if any.
    pub fn inner(&self) -> Option<Dim> {
        self.labels.last().copied()
    }

    /// Row-major element stride of `dim`: the product of all extents inside it.
    pub fn offset(&self, dim: Dim) -> Option<usize> {
        self.index(dim)
            .map(|i| self.shape[i + 1..].iter().product())
    }

    /// Copy with the extent of `dim` replaced.
    pub fn with_extent(&self, dim: Dim, extent: usize) -> Result<Self> {
        let i = self
            .index(dim)
            .ok_or_else(|| BinError::DimensionNotFound(dim, self.clone()))?;
        let mut out = self.clone();
        out.shape[i] = extent;
        Ok(out)
    }

    /// Union of two shapes.
    ///
    /// Labels of `self` keep their order, labels only found in `other` are
    /// appended in their order. Shared labels must agree on the extent.
    pub fn merge(&self, other: &Dimensions) -> Result<Self> {
        let mut out = self.clone();
        for (dim, extent) in other.iter() {
            match self.extent(dim) {
                Some(a) if a != extent => {
                    return Err(BinError::ExtentMismatch { dim, a, b: extent })
                }
                Some(_) => {}
                None => out.push(dim, extent)?,
            }
        }
        Ok(out)
    }
}

impl fmt::Display for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for (i, (dim, extent)) in self.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{dim}: {extent}")?;
        }
        f.write_str(")")
    }
}
