use std::fmt;

use crate::dtype::DType;
use crate::error::{Result, TensorError};
use crate::shape::Shape;

/// Highest tensor rank the kernels' index decomposition supports.
pub const MAX_RANK: usize = 5;

/// Lengths, strides (in elements), and dtype of a tensor in device memory.
///
/// A descriptor says nothing about where the data lives; it only fixes how
/// a logical coordinate maps to an element offset. Contiguity is derived
/// from the strides, never stored.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TensorDescriptor {
    dtype: DType,
    shape: Shape,
    strides: Vec<usize>,
}

impl TensorDescriptor {
    /// Create a descriptor with explicit strides.
    ///
    /// Fails on a rank mismatch, or with [`TensorError::Overflow`] if the
    /// storage extent in bytes does not fit in an `i64`.
    pub fn new(dtype: DType, lengths: &[usize], strides: &[usize]) -> Result<Self> {
        if lengths.len() != strides.len() {
            return Err(TensorError::StrideRankMismatch {
                lengths: lengths.to_vec(),
                strides: strides.to_vec(),
            });
        }
        let desc = TensorDescriptor {
            dtype,
            shape: Shape::from_slice(lengths),
            strides: strides.to_vec(),
        };
        desc.check_addressable()?;
        Ok(desc)
    }

    /// Create a packed row-major descriptor.
    pub fn contiguous(dtype: DType, lengths: &[usize]) -> Self {
        let shape = Shape::from_slice(lengths);
        let strides = shape.strides();
        TensorDescriptor {
            dtype,
            shape,
            strides,
        }
    }

    /// Element type.
    pub fn dtype(&self) -> DType {
        self.dtype
    }

    /// Lengths as a [`Shape`], for broadcasting and display.
    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    /// Length of every dimension, outermost first.
    pub fn lengths(&self) -> &[usize] {
        self.shape.dims()
    }

    /// Stride of every dimension, in elements.
    pub fn strides(&self) -> &[usize] {
        &self.strides
    }

    /// Number of dimensions.
    pub fn rank(&self) -> usize {
        self.shape.ndim()
    }

    /// Number of logical elements.
    pub fn element_count(&self) -> usize {
        self.shape.numel()
    }

    /// Number of elements the backing buffer must hold: one past the
    /// largest reachable offset. Saturates at `usize::MAX`.
    pub fn element_space(&self) -> usize {
        if self.element_count() == 0 {
            return 0;
        }
        self.lengths()
            .iter()
            .zip(&self.strides)
            .map(|(&len, &stride)| (len - 1).saturating_mul(stride))
            .fold(1usize, usize::saturating_add)
    }

    /// Fails with [`TensorError::Overflow`] unless the element count and
    /// the byte extent of the storage both fit in an `i64`.
    pub fn check_addressable(&self) -> Result<()> {
        let overflow = || TensorError::Overflow(self.lengths().to_vec());
        if self.shape.checked_numel()? == 0 {
            return Ok(());
        }
        let last = self
            .lengths()
            .iter()
            .zip(&self.strides)
            .try_fold(0usize, |acc, (&len, &stride)| {
                (len - 1).checked_mul(stride).and_then(|o| acc.checked_add(o))
            })
            .ok_or_else(overflow)?;
        let bytes = last
            .checked_add(1)
            .and_then(|n| n.checked_mul(self.dtype.size_in_bytes()))
            .ok_or_else(overflow)?;
        if i64::try_from(bytes).is_err() {
            return Err(overflow());
        }
        Ok(())
    }

    /// Bytes needed to back this descriptor.
    pub fn byte_space(&self) -> usize {
        self.element_space() * self.dtype.size_in_bytes()
    }

    pub fn is_contiguous(&self) -> bool {
        self.shape.is_contiguous(&self.strides)
    }

    /// Same lengths and dtype, row-major strides.
    pub fn to_contiguous(&self) -> TensorDescriptor {
        TensorDescriptor::contiguous(self.dtype, self.lengths())
    }

    /// Fails if the rank exceeds `max_rank`. Rank zero is rejected by
    /// [`TensorDescriptor::check_nonempty`], not here.
    pub fn check_rank(&self, max_rank: usize) -> Result<()> {
        if self.rank() > max_rank {
            return Err(TensorError::RankTooHigh {
                rank: self.rank(),
                max: max_rank,
            });
        }
        Ok(())
    }

    /// Fails if any dimension has length zero, the rank is zero, or the
    /// tensor is too large to address.
    pub fn check_nonempty(&self) -> Result<()> {
        if self.rank() == 0 || self.element_count() == 0 {
            return Err(TensorError::Empty(self.lengths().to_vec()));
        }
        self.check_addressable()
    }
}

impl fmt::Display for TensorDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.dtype, self.shape)?;
        if !self.is_contiguous() {
            write!(f, " strides={:?}", self.strides)?;
        }
        Ok(())
    }
}
