//! Element buffers of any supported type behind one closed variant.
//!
//! Scatter is generic over the element type; [`scatter_values`] matches the
//! variant once per call and hands the typed slices to the generic kernel, so
//! the per-element loop stays monomorphic. [`scatter_values_with_variances`]
//! does the same for a value buffer travelling with its variances.

use std::fmt;

use crate::scatter::{scatter_into, scatter_with_variances_into, BinIndex};
use crate::{BinError, Result};

/// A point in time, as a tick count since the epoch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DateTime(pub i64);

/// Element type tag of a [`Values`] buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DType {
    F64,
    F32,
    I64,
    I32,
    Bool,
    Vector3,
    String,
    DateTime,
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DType::F64 => "float64",
            DType::F32 => "float32",
            DType::I64 => "int64",
            DType::I32 => "int32",
            DType::Bool => "bool",
            DType::Vector3 => "vector3",
            DType::String => "string",
            DType::DateTime => "datetime64",
        };
        f.write_str(name)
    }
}

/// A flat buffer of elements of one supported type.
#[derive(Debug, Clone, PartialEq)]
pub enum Values {
    F64(Vec<f64>),
    F32(Vec<f32>),
    I64(Vec<i64>),
    I32(Vec<i32>),
    Bool(Vec<bool>),
    Vector3(Vec<[f64; 3]>),
    String(Vec<String>),
    DateTime(Vec<DateTime>),
}

macro_rules! dispatch {
    ($values:expr, $buf:ident => $body:expr) => {
        match $values {
            Values::F64($buf) => $body,
            Values::F32($buf) => $body,
            Values::I64($buf) => $body,
            Values::I32($buf) => $body,
            Values::Bool($buf) => $body,
            Values::Vector3($buf) => $body,
            Values::String($buf) => $body,
            Values::DateTime($buf) => $body,
        }
    };
}

macro_rules! impl_from_vec {
    ($($t:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<Vec<$t>> for Values {
                fn from(v: Vec<$t>) -> Self {
                    Values::$variant(v)
                }
            }
        )*
    };
}

impl_from_vec!(
    f64 => F64,
    f32 => F32,
    i64 => I64,
    i32 => I32,
    bool => Bool,
    [f64; 3] => Vector3,
    String => String,
    DateTime => DateTime,
);

impl Values {
    /// Buffer of `len` default elements (zero, `false`, empty string, epoch).
    pub fn with_len(dtype: DType, len: usize) -> Self {
        match dtype {
            DType::F64 => Values::F64(vec![0.0; len]),
            DType::F32 => Values::F32(vec![0.0; len]),
            DType::I64 => Values::I64(vec![0; len]),
            DType::I32 => Values::I32(vec![0; len]),
            DType::Bool => Values::Bool(vec![false; len]),
            DType::Vector3 => Values::Vector3(vec![[0.0; 3]; len]),
            DType::String => Values::String(vec![String::new(); len]),
            DType::DateTime => Values::DateTime(vec![DateTime::default(); len]),
        }
    }

    pub fn dtype(&self) -> DType {
        match self {
            Values::F64(_) => DType::F64,
            Values::F32(_) => DType::F32,
            Values::I64(_) => DType::I64,
            Values::I32(_) => DType::I32,
            Values::Bool(_) => DType::Bool,
            Values::Vector3(_) => DType::Vector3,
            Values::String(_) => DType::String,
            Values::DateTime(_) => DType::DateTime,
        }
    }

    pub fn len(&self) -> usize {
        dispatch!(self, v => v.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Type-erased [`scatter_into`]: `dst` and `src` must hold the same type.
pub fn scatter_values<I: BinIndex>(
    dst: &mut Values,
    cursors: &mut [usize],
    src: &Values,
    bin_indices: &[I],
) -> Result<()> {
    let (dst_dtype, src_dtype) = (dst.dtype(), src.dtype());
    match (dst, src) {
        (Values::F64(d), Values::F64(s)) => scatter_into(d, cursors, s, bin_indices),
        (Values::F32(d), Values::F32(s)) => scatter_into(d, cursors, s, bin_indices),
        (Values::I64(d), Values::I64(s)) => scatter_into(d, cursors, s, bin_indices),
        (Values::I32(d), Values::I32(s)) => scatter_into(d, cursors, s, bin_indices),
        (Values::Bool(d), Values::Bool(s)) => scatter_into(d, cursors, s, bin_indices),
        (Values::Vector3(d), Values::Vector3(s)) => scatter_into(d, cursors, s, bin_indices),
        (Values::String(d), Values::String(s)) => scatter_into(d, cursors, s, bin_indices),
        (Values::DateTime(d), Values::DateTime(s)) => scatter_into(d, cursors, s, bin_indices),
        _ => Err(BinError::DTypeMismatch(dst_dtype, src_dtype)),
    }
}

/// Type-erased [`scatter_with_variances_into`].
///
/// All four buffers must hold the same type; otherwise the first type that
/// differs from `dst_values` is reported.
pub fn scatter_values_with_variances<I: BinIndex>(
    dst_values: &mut Values,
    dst_variances: &mut Values,
    cursors: &mut [usize],
    src_values: &Values,
    src_variances: &Values,
    bin_indices: &[I],
) -> Result<()> {
    let dtypes = [
        dst_values.dtype(),
        dst_variances.dtype(),
        src_values.dtype(),
        src_variances.dtype(),
    ];
    macro_rules! typed {
        ($($variant:ident),*) => {
            match (dst_values, dst_variances, src_values, src_variances) {
                $(
                    (
                        Values::$variant(dv),
                        Values::$variant(dw),
                        Values::$variant(sv),
                        Values::$variant(sw),
                    ) => scatter_with_variances_into(dv, dw, cursors, sv, sw, bin_indices),
                )*
                _ => {
                    let other = dtypes
                        .iter()
                        .copied()
                        .find(|&d| d != dtypes[0])
                        .unwrap_or(dtypes[0]);
                    Err(BinError::DTypeMismatch(dtypes[0], other))
                }
            }
        };
    }
    typed!(F64, F32, I64, I32, Bool, Vector3, String, DateTime)
}
