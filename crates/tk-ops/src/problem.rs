//! Problem descriptions and the validation rules they share.
//!
//! A problem description is the validated, immutable form of one operator
//! call: owned copies of its tensor descriptors plus scalar parameters.
//! Constructors run every check up front, so a value that exists is legal.

use std::fmt;

use tk_runtime::DevicePtr;
use tk_tensor::{DType, TensorDescriptor, MAX_RANK};

use crate::error::{bad_param, Result};

pub trait ProblemDescription {
    /// Runtime arguments for one execution of a solution to this problem.
    type InvokeParams: 'static;

    /// Key under which solutions are cached. Structurally identical
    /// problems produce equal keys.
    fn cache_key(&self) -> CacheKey;
}

/// Ordered `name=value` fields identifying a problem.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new(family: &str) -> Self {
        CacheKey(family.to_string())
    }

    pub fn field(mut self, name: &str, value: impl fmt::Display) -> Self {
        self.0.push_str(&format!(";{name}={value}"));
        self
    }

    /// Adds dtype, lengths and contiguity class of a tensor. Exact strides
    /// are left out: kernels take them at launch time.
    pub fn tensor(self, name: &str, desc: &TensorDescriptor) -> Self {
        let class = if desc.is_contiguous() { "c" } else { "nc" };
        self.field(name, format_args!("{}{}{}", desc.dtype(), desc.shape(), class))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A tensor operand: its descriptor and the device address of its data.
#[derive(Debug, Clone, Copy)]
pub struct TensorRef<'a> {
    pub desc: &'a TensorDescriptor,
    pub ptr: DevicePtr,
}

impl<'a> TensorRef<'a> {
    pub fn new(desc: &'a TensorDescriptor, ptr: DevicePtr) -> Self {
        TensorRef { desc, ptr }
    }
}

pub(crate) fn check_rank(desc: &TensorDescriptor, name: &str, max: usize) -> Result<()> {
    if desc.rank() > max {
        return Err(bad_param(format!(
            "{name} has rank {}, at most {max} is supported",
            desc.rank()
        )));
    }
    Ok(())
}

/// Rank within the kernel limit and no zero-length dimension.
pub(crate) fn check_tensor(desc: &TensorDescriptor, name: &str) -> Result<()> {
    check_rank(desc, name, MAX_RANK)?;
    if desc.check_nonempty().is_err() {
        return Err(bad_param(format!("{name} is empty: {desc}")));
    }
    Ok(())
}

pub(crate) fn check_same_lengths(
    a: &TensorDescriptor,
    a_name: &str,
    b: &TensorDescriptor,
    b_name: &str,
) -> Result<()> {
    if a.lengths() != b.lengths() {
        return Err(bad_param(format!(
            "{a_name} lengths {:?} do not match {b_name} lengths {:?}",
            a.lengths(),
            b.lengths()
        )));
    }
    Ok(())
}

pub(crate) fn check_lengths(desc: &TensorDescriptor, name: &str, expected: &[usize]) -> Result<()> {
    if desc.lengths() != expected {
        return Err(bad_param(format!(
            "{name} lengths {:?}, expected {expected:?}",
            desc.lengths()
        )));
    }
    Ok(())
}

pub(crate) fn check_same_dtype(
    a: &TensorDescriptor,
    a_name: &str,
    b: &TensorDescriptor,
    b_name: &str,
) -> Result<()> {
    if a.dtype() != b.dtype() {
        return Err(bad_param(format!(
            "{a_name} is {} but {b_name} is {}",
            a.dtype(),
            b.dtype()
        )));
    }
    Ok(())
}

pub(crate) fn check_float(desc: &TensorDescriptor, name: &str) -> Result<()> {
    if !desc.dtype().is_float() {
        return Err(bad_param(format!(
            "{name} must be a floating point tensor, got {}",
            desc.dtype()
        )));
    }
    Ok(())
}

pub(crate) fn check_index(desc: &TensorDescriptor, name: &str) -> Result<()> {
    if !desc.dtype().is_index() {
        return Err(bad_param(format!(
            "{name} must be an i32 or i64 tensor, got {}",
            desc.dtype()
        )));
    }
    Ok(())
}

pub(crate) fn check_dtype(desc: &TensorDescriptor, name: &str, dtype: DType) -> Result<()> {
    if desc.dtype() != dtype {
        return Err(bad_param(format!(
            "{name} must be {dtype}, got {}",
            desc.dtype()
        )));
    }
    Ok(())
}

/// Resolve a possibly negative axis against `rank`.
pub(crate) fn resolve_axis(axis: i64, rank: usize, name: &str) -> Result<usize> {
    let resolved = if axis < 0 { axis + rank as i64 } else { axis };
    if resolved < 0 || resolved >= rank as i64 {
        return Err(bad_param(format!(
            "{name} {axis} is out of range for rank {rank}"
        )));
    }
    Ok(resolved as usize)
}
