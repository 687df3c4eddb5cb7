//! Rank-bounded strided addressing.
//!
//! A [`TensorView<N>`] is the form in which every kernel sees a tensor: `N`
//! lengths and `N` strides, with lower-rank tensors padded by trailing
//! singleton dimensions. A kernel walks linear indices `0..element_count()`,
//! turns each into coordinates with [`TensorView::coordinates_of`], and
//! reads storage at [`TensorView::offset_of`]. Because the walk always
//! follows the logical row-major order, the same kernel body is correct for
//! contiguous, permuted, broadcast (stride 0) and diagonal layouts.
//!
//! All arithmetic is `i64`. Offsets beyond the backing buffer are the
//! caller's responsibility; the device reports them as out-of-bounds
//! accesses rather than the view checking them.

use crate::descriptor::TensorDescriptor;
use crate::error::{Result, TensorError};
use crate::shape::Shape;

/// The canonical kernel rank.
pub type TensorView5 = TensorView<5>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TensorView<const N: usize> {
    pub size: [i64; N],
    pub stride: [i64; N],
}

impl<const N: usize> TensorView<N> {
    /// A view with explicit lengths and strides, both in elements.
    pub fn new(size: [i64; N], stride: [i64; N]) -> Self {
        TensorView { size, stride }
    }

    /// Row-major view over `size`.
    pub fn contiguous(size: [i64; N]) -> Self {
        let mut stride = [1i64; N];
        let mut running = 1i64;
        for i in (0..N).rev() {
            stride[i] = running;
            running = running.saturating_mul(size[i]);
        }
        TensorView { size, stride }
    }

    /// Project a descriptor onto rank `N`, appending singleton dimensions
    /// after the innermost real one.
    ///
    /// Padded dimensions have length 1, so they never change an offset; they
    /// inherit the innermost stride so that the padded view still reports
    /// the same contiguity as the descriptor.
    pub fn from_descriptor(desc: &TensorDescriptor) -> Result<Self> {
        desc.check_rank(N)?;
        let lengths = desc.lengths();
        let strides = desc.strides();
        let inner_stride = strides.last().map(|&s| s as i64).unwrap_or(1);

        let mut size = [1i64; N];
        let mut stride = [inner_stride; N];
        for i in 0..lengths.len() {
            size[i] = lengths[i] as i64;
            stride[i] = strides[i] as i64;
        }
        Ok(TensorView { size, stride })
    }

    /// Project `desc` onto the broadcast `target` shape: `desc` is aligned to
    /// the right of `target` (numpy rules) and every broadcast dimension gets
    /// stride 0.
    pub fn broadcast_from(desc: &TensorDescriptor, target: &Shape) -> Result<Self> {
        if !desc.shape().broadcasts_to(target) {
            return Err(TensorError::BroadcastError {
                a: desc.lengths().to_vec(),
                b: target.dims().to_vec(),
            });
        }
        if target.ndim() > N {
            return Err(TensorError::RankTooHigh {
                rank: target.ndim(),
                max: N,
            });
        }

        let lead = target.ndim() - desc.rank();
        let mut size = [1i64; N];
        let mut stride = [0i64; N];
        for i in 0..target.ndim() {
            size[i] = target.dim(i) as i64;
            if i >= lead {
                let src = i - lead;
                if desc.lengths()[src] == target.dim(i) {
                    stride[i] = desc.strides()[src] as i64;
                }
            }
        }
        Ok(TensorView { size, stride })
    }

    /// Reinterpret a contiguous descriptor with new lengths of the same
    /// element count.
    pub fn reshape(desc: &TensorDescriptor, size: [i64; N]) -> Result<Self> {
        if !desc.is_contiguous() {
            return Err(TensorError::NotContiguous(desc.lengths().to_vec()));
        }
        let numel = size.iter().try_fold(1i64, |acc, &s| acc.checked_mul(s));
        if numel != i64::try_from(desc.element_count()).ok() {
            return Err(TensorError::ShapeMismatch {
                expected: desc.lengths().to_vec(),
                got: size.iter().map(|&s| s as usize).collect(),
            });
        }
        Ok(Self::contiguous(size))
    }

    /// View of the diagonal of `desc` taken over dimensions `dim1` and
    /// `dim2`, shifted by `offset` (positive: above the main diagonal).
    ///
    /// The two dimensions are removed and the diagonal becomes the last
    /// real dimension, matching `torch.diagonal`. Returns the view and the
    /// element offset of the diagonal's first element.
    pub fn diagonal_of(
        desc: &TensorDescriptor,
        dim1: usize,
        dim2: usize,
        offset: i64,
    ) -> Result<(Self, i64)> {
        let rank = desc.rank();
        if rank < 2 || rank - 1 > N {
            return Err(TensorError::RankTooHigh {
                rank: rank.saturating_sub(1),
                max: N,
            });
        }
        for dim in [dim1, dim2] {
            if dim >= rank {
                return Err(TensorError::InvalidAxis {
                    axis: dim as i64,
                    ndim: rank,
                });
            }
        }
        if dim1 == dim2 {
            return Err(TensorError::Other(format!(
                "diagonal dimensions must differ, both are {dim1}"
            )));
        }

        let lengths = desc.lengths();
        let strides = desc.strides();
        let (len1, len2) = (lengths[dim1] as i64, lengths[dim2] as i64);
        let (stride1, stride2) = (strides[dim1] as i64, strides[dim2] as i64);

        let (diag_len, base) = if offset >= 0 {
            ((len2 - offset).min(len1).max(0), offset * stride2)
        } else {
            ((len1 + offset).min(len2).max(0), -offset * stride1)
        };

        let mut size = [1i64; N];
        let mut stride = [0i64; N];
        let mut next = 0;
        for d in (0..rank).filter(|&d| d != dim1 && d != dim2) {
            size[next] = lengths[d] as i64;
            stride[next] = strides[d] as i64;
            next += 1;
        }
        size[next] = diag_len;
        stride[next] = stride1 + stride2;
        for s in stride.iter_mut().skip(next + 1) {
            *s = stride1 + stride2;
        }

        Ok((TensorView { size, stride }, base))
    }

    /// Change the canonical rank. Growing pads trailing singleton
    /// dimensions; shrinking is only allowed when the dropped dimensions
    /// all have length 1.
    pub fn to_rank<const M: usize>(&self) -> Result<TensorView<M>> {
        if let Some(extra) = self.size.iter().skip(M).find(|&&s| s != 1) {
            return Err(TensorError::Other(format!(
                "cannot drop dimension of length {extra} when narrowing a view to rank {M}"
            )));
        }
        let inner = self.stride.get(N.saturating_sub(1)).copied().unwrap_or(1);
        let mut size = [1i64; M];
        let mut stride = [inner; M];
        for i in 0..N.min(M) {
            size[i] = self.size[i];
            stride[i] = self.stride[i];
        }
        Ok(TensorView { size, stride })
    }

    /// Number of addressable elements, saturating at `i64::MAX`.
    pub fn element_count(&self) -> i64 {
        self.size.iter().fold(1i64, |acc, &s| acc.saturating_mul(s))
    }

    /// Row-major decomposition of a linear index into coordinates.
    #[inline]
    pub fn coordinates_of(&self, index: i64) -> [i64; N] {
        let mut coords = [0i64; N];
        let mut rest = index;
        for i in (0..N).rev() {
            let len = self.size[i];
            if len > 0 {
                coords[i] = rest % len;
                rest /= len;
            }
        }
        coords
    }

    #[inline]
    pub fn offset_of(&self, coords: &[i64; N]) -> i64 {
        coords
            .iter()
            .zip(&self.stride)
            .map(|(&c, &s)| c * s)
            .sum()
    }

    /// Storage offset of the element at a logical linear index.
    #[inline]
    pub fn offset_at(&self, index: i64) -> i64 {
        self.offset_of(&self.coordinates_of(index))
    }

    pub fn is_contiguous(&self) -> bool {
        let mut expected = 1i64;
        for i in (0..N).rev() {
            if self.size[i] != 1 && self.stride[i] != expected {
                return false;
            }
            expected *= self.size[i];
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dtype::DType;
    use std::collections::HashSet;

    /// Strides of `lengths` with the outermost and innermost dimension
    /// swapped in memory.
    fn swapped_strides(lengths: &[usize]) -> Vec<usize> {
        let mut swapped = lengths.to_vec();
        let last = swapped.len() - 1;
        swapped.swap(0, last);
        let mut strides = Shape::from_slice(&swapped).strides();
        strides.swap(0, last);
        strides
    }

    #[test]
    fn test_inner_expansion() {
        let desc = TensorDescriptor::contiguous(DType::F32, &[3, 4]);
        let tv = TensorView5::from_descriptor(&desc).unwrap();
        assert_eq!(tv.size, [3, 4, 1, 1, 1]);
        assert_eq!(tv.stride, [4, 1, 1, 1, 1]);
        assert_eq!(tv.element_count(), 12);
        assert!(tv.is_contiguous());
    }

    #[test]
    fn test_rank_too_high() {
        let desc = TensorDescriptor::contiguous(DType::F32, &[1, 2, 1, 2, 1, 2]);
        assert!(TensorView5::from_descriptor(&desc).is_err());
    }

    #[test]
    fn test_coordinates_roundtrip_contiguous() {
        let tv = TensorView::<3>::contiguous([2, 3, 4]);
        for i in 0..24 {
            assert_eq!(tv.offset_at(i), i);
        }
        assert_eq!(tv.coordinates_of(17), [1, 1, 1]);
    }

    #[test]
    fn test_offsets_are_unique_for_permuted_layout() {
        let lengths = [2usize, 10, 3, 7];
        let strides = swapped_strides(&lengths);
        let desc = TensorDescriptor::new(DType::F32, &lengths, &strides).unwrap();
        let tv = TensorView5::from_descriptor(&desc).unwrap();
        assert!(!tv.is_contiguous());

        let offsets: HashSet<i64> = (0..tv.element_count()).map(|i| tv.offset_at(i)).collect();
        assert_eq!(offsets.len(), desc.element_count());
        assert!(offsets.iter().all(|&o| o >= 0 && (o as usize) < desc.element_space()));
    }

    #[test]
    fn test_broadcast_from() {
        let desc = TensorDescriptor::contiguous(DType::F32, &[3, 1]);
        let tv = TensorView5::broadcast_from(&desc, &Shape::new(vec![2, 3, 4])).unwrap();
        assert_eq!(tv.size, [2, 3, 4, 1, 1]);
        assert_eq!(tv.stride[0], 0);
        assert_eq!(tv.stride[1], 1);
        assert_eq!(tv.stride[2], 0);
        // Every element of the row resolves to the same storage cell.
        assert_eq!(tv.offset_of(&[1, 2, 3, 0, 0]), 2);

        let bad = TensorDescriptor::contiguous(DType::F32, &[5]);
        assert!(TensorView5::broadcast_from(&bad, &Shape::new(vec![2, 4])).is_err());
    }

    #[test]
    fn test_reshape_requires_contiguous() {
        let desc = TensorDescriptor::contiguous(DType::F32, &[2, 3, 4]);
        let tv = TensorView::<2>::reshape(&desc, [6, 4]).unwrap();
        assert_eq!(tv.stride, [4, 1]);
        assert!(TensorView::<2>::reshape(&desc, [5, 4]).is_err());

        let strided = TensorDescriptor::new(DType::F32, &[2, 3], &[1, 2]).unwrap();
        assert!(TensorView::<2>::reshape(&strided, [3, 2]).is_err());
    }

    #[test]
    fn test_oversized_view_saturates() {
        let desc = TensorDescriptor::contiguous(DType::F32, &[2, 3, 4]);
        assert!(TensorView::<2>::reshape(&desc, [i64::MAX, 2]).is_err());
        let tv = TensorView::<3>::contiguous([i64::MAX, 4, 4]);
        assert_eq!(tv.element_count(), i64::MAX);
        assert_eq!(tv.stride, [16, 4, 1]);
    }

    #[test]
    fn test_diagonal_of_square() {
        let desc = TensorDescriptor::contiguous(DType::F32, &[4, 4]);
        let (main, base) = TensorView::<2>::diagonal_of(&desc, 0, 1, 0).unwrap();
        assert_eq!(base, 0);
        assert_eq!(main.size, [4, 1]);
        let offsets: Vec<i64> = (0..4).map(|i| main.offset_at(i)).collect();
        assert_eq!(offsets, vec![0, 5, 10, 15]);

        let (upper, base) = TensorView::<2>::diagonal_of(&desc, 0, 1, 1).unwrap();
        assert_eq!(upper.size[0], 3);
        assert_eq!(base, 1);

        let (lower, base) = TensorView::<2>::diagonal_of(&desc, 0, 1, -2).unwrap();
        assert_eq!(lower.size[0], 2);
        assert_eq!(base, 8);
    }

    #[test]
    fn test_diagonal_of_batched_keeps_batch_first() {
        // [batch=2, 3, 3]; diagonal over the last two dims.
        let desc = TensorDescriptor::contiguous(DType::F32, &[2, 3, 3]);
        let (tv, base) = TensorView5::diagonal_of(&desc, 1, 2, 0).unwrap();
        assert_eq!(base, 0);
        assert_eq!(&tv.size[..2], &[2, 3]);
        assert_eq!(&tv.stride[..2], &[9, 4]);
    }

    #[test]
    fn test_diagonal_of_rejects_same_dim() {
        let desc = TensorDescriptor::contiguous(DType::F32, &[3, 3]);
        assert!(TensorView::<2>::diagonal_of(&desc, 1, 1, 0).is_err());
        assert!(TensorView::<2>::diagonal_of(&desc, 0, 2, 0).is_err());
    }

    #[test]
    fn test_to_rank() {
        let tv = TensorView::<2>::contiguous([3, 4]);
        let wide: TensorView5 = tv.to_rank().unwrap();
        assert_eq!(wide.size, [3, 4, 1, 1, 1]);
        let back: TensorView<2> = wide.to_rank().unwrap();
        assert_eq!(back, tv);
        let narrow: Result<TensorView<1>> = tv.to_rank();
        assert!(narrow.is_err());
    }
}
