use thiserror::Error;

use crate::dtype::DType;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TensorError {
    #[error("shape mismatch: expected {expected:?}, got {got:?}")]
    ShapeMismatch { expected: Vec<usize>, got: Vec<usize> },
    #[error("dtype mismatch: expected {expected}, got {got}")]
    DTypeMismatch { expected: DType, got: DType },
    #[error("invalid axis {axis} for tensor with {ndim} dimensions")]
    InvalidAxis { axis: i64, ndim: usize },
    #[error("cannot broadcast shapes {a:?} and {b:?}")]
    BroadcastError { a: Vec<usize>, b: Vec<usize> },
    #[error("tensor rank {rank} exceeds the supported maximum of {max}")]
    RankTooHigh { rank: usize, max: usize },
    #[error("lengths {lengths:?} and strides {strides:?} have different ranks")]
    StrideRankMismatch {
        lengths: Vec<usize>,
        strides: Vec<usize>,
    },
    #[error("tensor has no elements: {0:?}")]
    Empty(Vec<usize>),
    #[error("tensor with lengths {0:?} is too large to address")]
    Overflow(Vec<usize>),
    #[error("tensor with lengths {0:?} is not contiguous")]
    NotContiguous(Vec<usize>),
    #[error("unsupported dtype: {0}")]
    UnsupportedDType(DType),
    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, TensorError>;
