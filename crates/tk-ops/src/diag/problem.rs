use std::fmt;

use tk_runtime::DevicePtr;
use tk_tensor::{TensorDescriptor, MAX_RANK};

use crate::error::{bad_param, Result};
use crate::problem::{
    check_float, check_lengths, check_rank, check_same_dtype, check_tensor, resolve_axis, CacheKey,
    ProblemDescription,
};

/// Which side of the copy holds the diagonal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// The input's elements, in logical order, become the `(dim1, dim2)`
    /// diagonal of a zeroed output.
    Embed { dim1: usize, dim2: usize },
    /// The `(0, 1)` diagonal of a matrix input becomes a vector output.
    Extract,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Embed { dim1, dim2 } => write!(f, "embed({dim1},{dim2})"),
            Direction::Extract => write!(f, "extract"),
        }
    }
}

/// Number of elements on diagonal `offset` of a `rows x cols` matrix.
pub fn diagonal_length(rows: usize, cols: usize, offset: i64) -> usize {
    let (rows, cols) = (rows as i64, cols as i64);
    let len = if offset >= 0 {
        (cols - offset).min(rows)
    } else {
        (rows + offset).min(cols)
    };
    len.max(0) as usize
}

/// Output lengths of `diag`: a square matrix for a vector input, the
/// diagonal for a matrix input.
pub fn diag_output_lengths(input: &TensorDescriptor, offset: i64) -> Result<Vec<usize>> {
    match input.lengths() {
        &[n] => {
            let m = n + offset.unsigned_abs() as usize;
            Ok(vec![m, m])
        }
        &[rows, cols] => {
            let len = diagonal_length(rows, cols, offset);
            if len == 0 {
                return Err(bad_param(format!(
                    "diagonal {offset} of a {rows}x{cols} matrix is empty"
                )));
            }
            Ok(vec![len])
        }
        other => Err(bad_param(format!(
            "diag expects a 1-D or 2-D input, got lengths {other:?}"
        ))),
    }
}

/// Output lengths of `diagflat`: the input flattened onto a square matrix.
pub fn diagflat_output_lengths(input: &TensorDescriptor, offset: i64) -> Vec<usize> {
    let m = input.element_count() + offset.unsigned_abs() as usize;
    vec![m, m]
}

/// Output lengths of `diag_embed` and the resolved diagonal dimensions.
pub fn diag_embed_output_lengths(
    input: &TensorDescriptor,
    offset: i64,
    dim1: i64,
    dim2: i64,
) -> Result<(Vec<usize>, usize, usize)> {
    check_rank(input, "input", MAX_RANK - 1)?;
    let out_rank = input.rank() + 1;
    let d1 = resolve_axis(dim1, out_rank, "dim1")?;
    let d2 = resolve_axis(dim2, out_rank, "dim2")?;
    if d1 == d2 {
        return Err(bad_param(format!(
            "diagonal dimensions must differ, both resolve to {d1}"
        )));
    }
    let (last, leading) = input
        .lengths()
        .split_last()
        .ok_or_else(|| bad_param("diag_embed input must have at least one dimension"))?;
    let m = last + offset.unsigned_abs() as usize;
    let mut rest = leading.iter();
    let lengths = (0..out_rank)
        .map(|d| {
            if d == d1 || d == d2 {
                m
            } else {
                rest.next().copied().unwrap_or(1)
            }
        })
        .collect();
    Ok((lengths, d1, d2))
}

/// One call of the diagonal family, reduced to a copy direction and a
/// diagonal offset.
#[derive(Debug, Clone)]
pub struct DiagProblemDescription {
    input: TensorDescriptor,
    output: TensorDescriptor,
    direction: Direction,
    offset: i64,
}

impl DiagProblemDescription {
    fn checked(
        input: &TensorDescriptor,
        output: &TensorDescriptor,
        expected: &[usize],
        direction: Direction,
        offset: i64,
    ) -> Result<Self> {
        check_tensor(input, "input")?;
        check_tensor(output, "output")?;
        check_float(input, "input")?;
        check_same_dtype(input, "input", output, "output")?;
        check_lengths(output, "output", expected)?;
        Ok(DiagProblemDescription {
            input: input.clone(),
            output: output.clone(),
            direction,
            offset,
        })
    }

    /// `diag`: embed a vector or extract from a matrix.
    pub fn diag(input: &TensorDescriptor, output: &TensorDescriptor, offset: i64) -> Result<Self> {
        let expected = diag_output_lengths(input, offset)?;
        let direction = if input.rank() == 1 {
            Direction::Embed { dim1: 0, dim2: 1 }
        } else {
            Direction::Extract
        };
        Self::checked(input, output, &expected, direction, offset)
    }

    pub fn diagflat(input: &TensorDescriptor, output: &TensorDescriptor, offset: i64) -> Result<Self> {
        let expected = diagflat_output_lengths(input, offset);
        Self::checked(input, output, &expected, Direction::Embed { dim1: 0, dim2: 1 }, offset)
    }

    pub fn diag_embed(
        input: &TensorDescriptor,
        output: &TensorDescriptor,
        offset: i64,
        dim1: i64,
        dim2: i64,
    ) -> Result<Self> {
        let (expected, dim1, dim2) = diag_embed_output_lengths(input, offset, dim1, dim2)?;
        Self::checked(input, output, &expected, Direction::Embed { dim1, dim2 }, offset)
    }

    pub fn input(&self) -> &TensorDescriptor {
        &self.input
    }

    pub fn output(&self) -> &TensorDescriptor {
        &self.output
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn offset(&self) -> i64 {
        self.offset
    }
}

impl ProblemDescription for DiagProblemDescription {
    type InvokeParams = InvokeParams;

    fn cache_key(&self) -> CacheKey {
        CacheKey::new("diag")
            .tensor("input", &self.input)
            .tensor("output", &self.output)
            .field("direction", self.direction)
            .field("offset", self.offset)
    }
}

#[derive(Debug, Clone)]
pub struct InvokeParams {
    pub input_desc: TensorDescriptor,
    pub output_desc: TensorDescriptor,
    pub input: DevicePtr,
    pub output: DevicePtr,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tk_tensor::DType;

    fn desc(lengths: &[usize]) -> TensorDescriptor {
        TensorDescriptor::contiguous(DType::F32, lengths)
    }

    #[test]
    fn test_diagonal_length() {
        assert_eq!(diagonal_length(3, 5, 0), 3);
        assert_eq!(diagonal_length(3, 5, 2), 3);
        assert_eq!(diagonal_length(3, 5, 3), 2);
        assert_eq!(diagonal_length(3, 5, -1), 2);
        assert_eq!(diagonal_length(3, 5, -3), 0);
        assert_eq!(diagonal_length(3, 5, 6), 0);
    }

    #[test]
    fn test_diag_lengths() {
        assert_eq!(diag_output_lengths(&desc(&[4]), -2).unwrap(), vec![6, 6]);
        assert_eq!(diag_output_lengths(&desc(&[4, 6]), 1).unwrap(), vec![4]);
        assert!(diag_output_lengths(&desc(&[4, 6]), 6).is_err());
        assert!(diag_output_lengths(&desc(&[2, 2, 2]), 0).is_err());
        assert_eq!(diagflat_output_lengths(&desc(&[2, 3]), 1), vec![7, 7]);
    }

    #[test]
    fn test_diag_embed_lengths() {
        let x = desc(&[2, 3, 4]);
        assert_eq!(diag_embed_output_lengths(&x, 0, -2, -1).unwrap(), (vec![2, 3, 4, 4], 2, 3));
        assert_eq!(diag_embed_output_lengths(&x, 1, 0, 2).unwrap(), (vec![5, 2, 5, 3], 0, 2));
        assert_eq!(diag_embed_output_lengths(&x, -1, 3, 1).unwrap(), (vec![2, 5, 3, 5], 3, 1));
        assert!(diag_embed_output_lengths(&x, 0, 1, -3).is_err());
        assert!(diag_embed_output_lengths(&desc(&[1, 1, 1, 1, 2]), 0, 0, 1).is_err());
    }

    #[test]
    fn test_direction() {
        let v = desc(&[3]);
        let m = desc(&[3, 3]);
        assert_eq!(
            DiagProblemDescription::diag(&v, &m, 0).unwrap().direction(),
            Direction::Embed { dim1: 0, dim2: 1 }
        );
        assert_eq!(DiagProblemDescription::diag(&m, &v, 0).unwrap().direction(), Direction::Extract);
        assert!(DiagProblemDescription::diag(&v, &desc(&[4, 4]), 0).is_err());
    }
}
