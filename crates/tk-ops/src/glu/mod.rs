//! Gated linear unit: split along `dim` into `a` and `b`, emit
//! `a * sigmoid(b)`.

pub mod problem;
pub mod solvers;

use tk_runtime::Handle;

use crate::error::Result;
use crate::problem::TensorRef;

pub use problem::{
    halved_lengths, BwdInvokeParams, BwdProblemDescription, FwdInvokeParams, FwdProblemDescription,
};
use solvers::{BACKWARD, FORWARD};

pub fn glu_forward(
    handle: &mut Handle,
    dim: i64,
    input: TensorRef<'_>,
    output: TensorRef<'_>,
) -> Result<()> {
    let problem = FwdProblemDescription::new(input.desc, output.desc, dim)?;
    let params = FwdInvokeParams {
        input_desc: input.desc.clone(),
        output_desc: output.desc.clone(),
        input: input.ptr,
        output: output.ptr,
    };
    FORWARD.execute(handle, &problem, &params)
}

/// Writes both halves of `input_grad`.
pub fn glu_backward(
    handle: &mut Handle,
    dim: i64,
    input: TensorRef<'_>,
    output_grad: TensorRef<'_>,
    input_grad: TensorRef<'_>,
) -> Result<()> {
    let problem = BwdProblemDescription::new(input.desc, output_grad.desc, input_grad.desc, dim)?;
    let params = BwdInvokeParams {
        input_desc: input.desc.clone(),
        output_grad_desc: output_grad.desc.clone(),
        input_grad_desc: input_grad.desc.clone(),
        input: input.ptr,
        output_grad: output_grad.ptr,
        input_grad: input_grad.ptr,
    };
    BACKWARD.execute(handle, &problem, &params)
}
