//! Broadcasting multi-index iteration over dense and binned strided operands.
//!
//! This crate is the position-generating core of a labelled array engine. It
//! walks one to four operands in lock-step, yielding per-operand flat offsets,
//! where each operand may be dense, broadcast (stride 0), or *binned*: every
//! element along the outer dimensions is itself a variable-length slice of a
//! shared buffer, addressed through a table of `(begin, end)` pairs.
//!
//! # Core Types
//!
//! - [`Dimensions`]: Ordered label → extent map
//! - [`ViewParams`] / [`BinParams`]: Operand descriptors (shape, strides, bin table)
//! - [`MultiIndex`]: Synchronized cursor producing flat offsets for `N` operands
//!
//! # Kernels
//!
//! - [`for_each_inner_block`]: Drive a cursor range in contiguous inner runs
//! - [`for_each_partition`]: Split the outer range across worker threads
//! - [`scatter_into`], [`scatter_with_variances_into`], [`scatter_values`]: Bin-scatter kernel
//! - [`bin_1d`]: Edge validation, bin assignment and scatter in one call
//!
//! # Example
//!
//! ```rust
//! use strided_bins::{Dim, Dimensions, MultiIndex, ViewParams};
//!
//! // `b` has no `x` dimension and is broadcast along it.
//! let dims = Dimensions::new(&[(Dim::Y, 2), (Dim::X, 3)]).unwrap();
//! let a = ViewParams::dense(dims.clone(), &[3, 1]).unwrap();
//! let b = ViewParams::dense(dims, &[1, 0]).unwrap();
//!
//! let index = MultiIndex::new(&[a, b]).unwrap();
//! let offsets: Vec<[isize; 2]> = index.iter().collect();
//! assert_eq!(
//!     offsets,
//!     vec![[0, 0], [1, 0], [2, 0], [3, 1], [4, 1], [5, 1]]
//! );
//! ```
//!
//! # Binned Example
//!
//! ```rust
//! use strided_bins::{BinParams, Dim, Dimensions, MultiIndex, ViewParams};
//!
//! // Three bins of lengths 2, 0 and 3 over a buffer of 5 events.
//! let table = [(0, 2), (2, 2), (2, 5)];
//! let outer = Dimensions::new(&[(Dim::X, 3)]).unwrap();
//! let buffer = Dimensions::new(&[(Dim::EVENT, 5)]).unwrap();
//! let bins = BinParams::new(Dim::EVENT, buffer, &table).unwrap();
//! let events = ViewParams::binned(outer, &[1], bins).unwrap();
//!
//! let index = MultiIndex::new(&[events]).unwrap();
//! let offsets: Vec<isize> = index.iter().map(|[i]| i).collect();
//! assert_eq!(offsets, vec![0, 1, 2, 3, 4]);
//! ```

pub mod binning;
pub mod dims;
mod kernel;
pub mod multi_index;
pub mod params;
pub mod scatter;
mod threading;
mod validate;
pub mod values;

// ============================================================================
// Shape and operand descriptors
// ============================================================================
pub use dims::{Dim, Dimensions};
pub use params::{BinParams, IndexPair, Strides, ViewParams};

// ============================================================================
// Iteration
// ============================================================================
pub use kernel::for_each_inner_block;
pub use multi_index::{MultiIndex, Offsets};
pub use threading::{for_each_partition, MaybeSync};
pub use validate::validate_bin_indices;

// ============================================================================
// Scatter and binning
// ============================================================================
pub use binning::{
    assign_bins, bin_1d, count_per_bin, cursors_from_indices, indices_from_sizes,
    validate_edges, BinnedBuffer,
};
pub use scatter::{
    scatter_chunked, scatter_direct, scatter_into, scatter_with_variances_into, BinIndex,
    ScatterStrategy,
};
pub use values::{scatter_values, scatter_values_with_variances, DType, DateTime, Values};

// ============================================================================
// Constants
// ============================================================================

/// Maximum number of dimensions a cursor iterates (nested plus outer).
pub const MAX_NDIM: usize = 4;

/// Maximum number of operands walked by one cursor.
pub const MAX_OPERANDS: usize = 4;

/// Chunked scatter is only considered above this many destination bins.
pub const CHUNKING_MIN_BINS: usize = 512;

/// Chunked scatter is only considered above this many source elements.
pub const CHUNKING_MIN_EVENTS: usize = 128 * 1024;

/// Candidate chunk sizes (bins per chunk) for the chunked scatter.
pub const CHUNK_SIZES: [usize; 4] = [128, 256, 512, 1024];

/// Source elements per chunked-scatter block, as a multiple of the bin count.
///
/// Bounds the memory held by the per-chunk temporary buffers.
pub const CHUNK_BLOCK_FACTOR: usize = 64;

/// Minimum number of outer positions handed to one worker.
pub const MIN_PARTITION_LENGTH: usize = 1 << 10;

// ============================================================================
// Error types
// ============================================================================

/// Errors raised while building operand descriptors, cursors or bins.
///
/// All of them are functions of shapes and index tables only, so they are
/// deterministic and never worth retrying.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BinError {
    /// The same label appears twice in one set of dimensions.
    #[error("duplicate dimension {0}")]
    DuplicateDimension(Dim),

    /// A label was looked up but is not present.
    #[error("dimension {0} not found in {1}")]
    DimensionNotFound(Dim, Dimensions),

    /// Two dimension sets disagree on the extent of a shared label.
    #[error("extent mismatch for dimension {dim}: {a} vs {b}")]
    ExtentMismatch { dim: Dim, a: usize, b: usize },

    /// Operands do not share one iteration shape.
    #[error("shape mismatch: {0} vs {1}")]
    ShapeMismatch(Dimensions, Dimensions),

    /// Stride array length doesn't match dimensions.
    #[error("stride and dims length mismatch: {strides} strides for {ndim} dims")]
    StrideLengthMismatch { strides: usize, ndim: usize },

    /// More iterated dimensions than a cursor can hold.
    #[error("rank {ndim} exceeds the supported maximum of {max}")]
    RankTooLarge { ndim: usize, max: usize },

    /// Zero operands, or more than a cursor can hold.
    #[error("{count} operands given, between 1 and {max} are supported")]
    OperandCount { count: usize, max: usize },

    /// Corresponding bins of two binned operands differ in length.
    #[error("bin size mismatch at bin {position}: {a} vs {b}")]
    BinSizeMismatch { position: usize, a: usize, b: usize },

    /// Binned operands disagree on the layout of their buffers.
    #[error("nested dims mismatch between binned operands: {0} vs {1}")]
    NestedDimsMismatch(Dimensions, Dimensions),

    /// A bin-index table is too short or holds an inverted pair.
    #[error("invalid bin indices: {0}")]
    InvalidBinIndices(String),

    /// Bin edges are too few, unsorted, or NaN.
    #[error("invalid bin edges: {0}")]
    InvalidEdges(String),

    /// Two buffers that must be the same length are not.
    #[error("length mismatch: {0} vs {1}")]
    LengthMismatch(usize, usize),

    /// A bin index addresses a bin without a write cursor.
    #[error("bin index {index} out of range for {bins} bins")]
    BinOutOfRange { index: usize, bins: usize },

    /// A write cursor ran past the destination buffer.
    #[error("write cursor {cursor} out of range for destination of length {len}")]
    CursorOutOfRange { cursor: usize, len: usize },

    /// Element types of source and destination differ.
    #[error("dtype mismatch: {0} vs {1}")]
    DTypeMismatch(DType, DType),
}

/// Result type for this crate.
pub type Result<T> = std::result::Result<T, BinError>;
