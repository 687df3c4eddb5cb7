use tk_runtime::DevicePtr;
use tk_tensor::TensorDescriptor;

use crate::error::{bad_param, Result};
use crate::problem::{
    check_float, check_lengths, check_same_dtype, check_tensor, resolve_axis, CacheKey,
    ProblemDescription,
};

/// Lengths of a GLU result: `input` with `dim` halved.
pub fn halved_lengths(input: &TensorDescriptor, dim: usize) -> Result<Vec<usize>> {
    let len = input.lengths()[dim];
    if len % 2 != 0 {
        return Err(bad_param(format!(
            "GLU split dimension {dim} must have even length, got {len}"
        )));
    }
    let mut lengths = input.lengths().to_vec();
    lengths[dim] = len / 2;
    Ok(lengths)
}

#[derive(Debug, Clone)]
pub struct FwdProblemDescription {
    input: TensorDescriptor,
    output: TensorDescriptor,
    dim: usize,
}

impl FwdProblemDescription {
    pub fn new(input: &TensorDescriptor, output: &TensorDescriptor, dim: i64) -> Result<Self> {
        check_tensor(input, "input")?;
        check_tensor(output, "output")?;
        check_float(input, "input")?;
        check_same_dtype(input, "input", output, "output")?;
        let dim = resolve_axis(dim, input.rank(), "dim")?;
        check_lengths(output, "output", &halved_lengths(input, dim)?)?;
        Ok(FwdProblemDescription {
            input: input.clone(),
            output: output.clone(),
            dim,
        })
    }

    pub fn input(&self) -> &TensorDescriptor {
        &self.input
    }

    pub fn output(&self) -> &TensorDescriptor {
        &self.output
    }

    /// Split dimension, non-negative.
    pub fn dim(&self) -> usize {
        self.dim
    }
}

impl ProblemDescription for FwdProblemDescription {
    type InvokeParams = FwdInvokeParams;

    fn cache_key(&self) -> CacheKey {
        CacheKey::new("glu_fwd")
            .tensor("input", &self.input)
            .tensor("output", &self.output)
            .field("dim", self.dim)
    }
}

#[derive(Debug, Clone)]
pub struct FwdInvokeParams {
    pub input_desc: TensorDescriptor,
    pub output_desc: TensorDescriptor,
    pub input: DevicePtr,
    pub output: DevicePtr,
}

#[derive(Debug, Clone)]
pub struct BwdProblemDescription {
    input: TensorDescriptor,
    output_grad: TensorDescriptor,
    input_grad: TensorDescriptor,
    dim: usize,
}

impl BwdProblemDescription {
    pub fn new(
        input: &TensorDescriptor,
        output_grad: &TensorDescriptor,
        input_grad: &TensorDescriptor,
        dim: i64,
    ) -> Result<Self> {
        check_tensor(input, "input")?;
        check_tensor(output_grad, "output_grad")?;
        check_tensor(input_grad, "input_grad")?;
        check_float(input, "input")?;
        check_same_dtype(input, "input", output_grad, "output_grad")?;
        check_same_dtype(input, "input", input_grad, "input_grad")?;
        let dim = resolve_axis(dim, input.rank(), "dim")?;
        check_lengths(output_grad, "output_grad", &halved_lengths(input, dim)?)?;
        check_lengths(input_grad, "input_grad", input.lengths())?;
        Ok(BwdProblemDescription {
            input: input.clone(),
            output_grad: output_grad.clone(),
            input_grad: input_grad.clone(),
            dim,
        })
    }

    pub fn input(&self) -> &TensorDescriptor {
        &self.input
    }

    pub fn output_grad(&self) -> &TensorDescriptor {
        &self.output_grad
    }

    pub fn dim(&self) -> usize {
        self.dim
    }
}

impl ProblemDescription for BwdProblemDescription {
    type InvokeParams = BwdInvokeParams;

    fn cache_key(&self) -> CacheKey {
        CacheKey::new("glu_bwd")
            .tensor("input", &self.input)
            .tensor("output_grad", &self.output_grad)
            .tensor("input_grad", &self.input_grad)
            .field("dim", self.dim)
    }
}

#[derive(Debug, Clone)]
pub struct BwdInvokeParams {
    pub input_desc: TensorDescriptor,
    pub output_grad_desc: TensorDescriptor,
    pub input_grad_desc: TensorDescriptor,
    pub input: DevicePtr,
    pub output_grad: DevicePtr,
    pub input_grad: DevicePtr,
}
