//! Embedding lookup and its weight-gradient accumulation.

pub mod problem;
pub mod solvers;

use tk_runtime::{DevicePtr, Handle};

use crate::error::Result;
use crate::problem::TensorRef;

pub use problem::{
    resolve_padding_idx, BwdInvokeParams, BwdProblemDescription, FwdInvokeParams,
    FwdProblemDescription, MAX_INDEX_RANK,
};
use solvers::{BACKWARD, FORWARD};

/// Gather rows of `weight` into `output`; out-of-range indices yield zero
/// rows.
pub fn embedding_forward(
    handle: &mut Handle,
    input: TensorRef<'_>,
    weight: TensorRef<'_>,
    output: TensorRef<'_>,
) -> Result<()> {
    let problem = FwdProblemDescription::new(input.desc, weight.desc, output.desc)?;
    let params = FwdInvokeParams {
        input: input.ptr,
        weight: weight.ptr,
        output: output.ptr,
    };
    FORWARD.execute(handle, &problem, &params)
}

/// Overwrite `weight_grad` with the summed output-grad rows of every index.
///
/// Rows equal to `padding_idx` (negative counts from the end) receive no
/// gradient. A non-null `indices_freq` holds one occurrence count per
/// embedding row, in the index dtype; each contribution is divided by its
/// row's count.
pub fn embedding_backward(
    handle: &mut Handle,
    input: TensorRef<'_>,
    output_grad: TensorRef<'_>,
    weight_grad: TensorRef<'_>,
    indices_freq: DevicePtr,
    padding_idx: Option<i64>,
) -> Result<()> {
    let problem = BwdProblemDescription::new(input.desc, output_grad.desc, weight_grad.desc, padding_idx)?;
    let params = BwdInvokeParams {
        weight_grad_desc: weight_grad.desc.clone(),
        input: input.ptr,
        output_grad: output_grad.ptr,
        weight_grad: weight_grad.ptr,
        indices_freq,
    };
    BACKWARD.execute(handle, &problem, &params)
}
