use crate::error::{Result, TensorError};
use std::fmt;

/// Tensor lengths, outermost dimension first.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Shape {
    dims: Vec<usize>,
}

impl Shape {
    /// Wrap `dims` without validation; zero lengths are allowed.
    pub fn new(dims: Vec<usize>) -> Self {
        Shape { dims }
    }

    pub fn from_slice(dims: &[usize]) -> Self {
        Shape {
            dims: dims.to_vec(),
        }
    }

    /// Number of dimensions (rank).
    pub fn ndim(&self) -> usize {
        self.dims.len()
    }

    /// Total number of elements. A rank-0 shape holds one element.
    ///
    /// Saturates at `usize::MAX`; use [`Shape::checked_numel`] where an
    /// overflow must be reported.
    pub fn numel(&self) -> usize {
        self.dims.iter().fold(1usize, |acc, &d| acc.saturating_mul(d))
    }

    /// Total number of elements, or [`TensorError::Overflow`] if the
    /// product does not fit in a kernel's `i64` index.
    pub fn checked_numel(&self) -> Result<usize> {
        self.dims
            .iter()
            .try_fold(1usize, |acc, &d| acc.checked_mul(d))
            .filter(|&n| i64::try_from(n).is_ok())
            .ok_or_else(|| TensorError::Overflow(self.dims.clone()))
    }

    /// Returns the size of dimension `i`.
    ///
    /// # Panics
    /// Panics if `i >= ndim()`.
    pub fn dim(&self, i: usize) -> usize {
        self.dims[i]
    }

    /// Lengths of every dimension.
    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    /// Row-major strides, in elements. For `[d0, d1, d2]` this is `[d1*d2, d2, 1]`.
    pub fn strides(&self) -> Vec<usize> {
        let mut strides = vec![0usize; self.dims.len()];
        let mut running = 1usize;
        for (stride, &dim) in strides.iter_mut().zip(&self.dims).rev() {
            *stride = running;
            running = running.saturating_mul(dim);
        }
        strides
    }

    /// True if `strides` match the row-major layout of this shape.
    ///
    /// Dimensions of length 1 never contribute to addressing, so their
    /// stride is ignored.
    pub fn is_contiguous(&self, strides: &[usize]) -> bool {
        if strides.len() != self.dims.len() {
            return false;
        }
        self.strides()
            .iter()
            .zip(strides)
            .zip(&self.dims)
            .all(|((expected, got), &dim)| dim == 1 || expected == got)
    }

    /// Resolve a possibly negative axis against this rank.
    pub fn normalize_axis(&self, axis: i64) -> Result<usize> {
        let ndim = self.ndim() as i64;
        let resolved = if axis < 0 { axis + ndim } else { axis };
        if resolved < 0 || resolved >= ndim {
            return Err(TensorError::InvalidAxis {
                axis,
                ndim: self.ndim(),
            });
        }
        Ok(resolved as usize)
    }

    /// Compute the broadcast shape of `a` and `b` using numpy-style rules:
    /// the shorter shape is left-padded with ones, and each dimension pair
    /// must be equal or contain a 1.
    pub fn broadcast_shape(a: &Shape, b: &Shape) -> Result<Shape> {
        let max_ndim = a.ndim().max(b.ndim());
        let mut result = Vec::with_capacity(max_ndim);

        for i in 0..max_ndim {
            let da = a.dim_from_right(i);
            let db = b.dim_from_right(i);
            let d = match (da, db) {
                (x, y) if x == y => x,
                (1, y) => y,
                (x, 1) => x,
                _ => {
                    return Err(TensorError::BroadcastError {
                        a: a.dims.clone(),
                        b: b.dims.clone(),
                    })
                }
            };
            result.push(d);
        }

        result.reverse();
        Ok(Shape::new(result))
    }

    /// True if this shape broadcasts to `target` without changing `target`.
    pub fn broadcasts_to(&self, target: &Shape) -> bool {
        match Shape::broadcast_shape(self, target) {
            Ok(out) => &out == target,
            Err(_) => false,
        }
    }

    fn dim_from_right(&self, i: usize) -> usize {
        if i < self.ndim() {
            self.dims[self.ndim() - 1 - i]
        } else {
            1
        }
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, d) in self.dims.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", d)?;
        }
        write!(f, "]")
    }
}

impl From<Vec<usize>> for Shape {
    fn from(dims: Vec<usize>) -> Self {
        Shape::new(dims)
    }
}

impl From<&[usize]> for Shape {
    fn from(dims: &[usize]) -> Self {
        Shape::from_slice(dims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_shape() {
        let s = Shape::new(vec![2, 3, 4]);
        assert_eq!(s.ndim(), 3);
        assert_eq!(s.numel(), 24);
        assert_eq!(s.dim(1), 3);
        assert_eq!(s.to_string(), "[2, 3, 4]");
    }

    #[test]
    fn test_strides() {
        let s = Shape::new(vec![2, 3, 4]);
        assert_eq!(s.strides(), vec![12, 4, 1]);
        assert_eq!(Shape::new(vec![]).strides(), Vec::<usize>::new());
    }

    #[test]
    fn test_is_contiguous_ignores_unit_dims() {
        let s = Shape::new(vec![2, 1, 4]);
        assert!(s.is_contiguous(&[4, 4, 1]));
        assert!(s.is_contiguous(&[4, 99, 1]));
        assert!(!s.is_contiguous(&[1, 4, 2]));
    }

    #[test]
    fn test_normalize_axis() {
        let s = Shape::new(vec![2, 3, 4]);
        assert_eq!(s.normalize_axis(-1).unwrap(), 2);
        assert_eq!(s.normalize_axis(0).unwrap(), 0);
        assert!(s.normalize_axis(3).is_err());
        assert!(s.normalize_axis(-4).is_err());
    }

    #[test]
    fn test_broadcast_expand() {
        let a = Shape::new(vec![2, 1]);
        let b = Shape::new(vec![1, 3]);
        assert_eq!(Shape::broadcast_shape(&a, &b).unwrap().dims(), &[2, 3]);
    }

    #[test]
    fn test_broadcast_different_ndim() {
        let a = Shape::new(vec![3]);
        let b = Shape::new(vec![2, 3]);
        assert_eq!(Shape::broadcast_shape(&a, &b).unwrap().dims(), &[2, 3]);
        assert!(a.broadcasts_to(&b));
        assert!(!b.broadcasts_to(&a));
    }

    #[test]
    fn test_broadcast_error() {
        let a = Shape::new(vec![2, 3]);
        let b = Shape::new(vec![2, 4]);
        assert!(Shape::broadcast_shape(&a, &b).is_err());
    }
}
