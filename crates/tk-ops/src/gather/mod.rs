//! GatherV2: select slices of `param` along one axis by integer index, and
//! the matching scatter-add backward pass.
//!
//! Only contiguous tensors have a solver; other layouts report
//! `NotImplemented`. Index values outside `0..param.lengths()[axis]`
//! produce zeros forward and contribute nothing backward.

pub mod problem;
pub mod solvers;

use tk_runtime::Handle;

use crate::error::Result;
use crate::problem::TensorRef;

pub use problem::{
    gather_output_lengths, BwdInvokeParams, BwdProblemDescription, FwdInvokeParams,
    FwdProblemDescription, GatherGeometry, GatherParams,
};
use solvers::{BACKWARD, FORWARD};

pub fn gatherv2_forward(
    handle: &mut Handle,
    params: GatherParams,
    param: TensorRef<'_>,
    indices: TensorRef<'_>,
    output: TensorRef<'_>,
) -> Result<()> {
    let problem = FwdProblemDescription::new(param.desc, indices.desc, output.desc, params)?;
    let invoke_params = FwdInvokeParams {
        param: param.ptr,
        indices: indices.ptr,
        output: output.ptr,
    };
    FORWARD.execute(handle, &problem, &invoke_params)
}

/// Overwrites `param_grad` with the scattered sum of `output_grad`.
pub fn gatherv2_backward(
    handle: &mut Handle,
    params: GatherParams,
    output_grad: TensorRef<'_>,
    indices: TensorRef<'_>,
    param_grad: TensorRef<'_>,
) -> Result<()> {
    let problem = BwdProblemDescription::new(param_grad.desc, indices.desc, output_grad.desc, params)?;
    let invoke_params = BwdInvokeParams {
        param_grad_desc: param_grad.desc.clone(),
        output_grad: output_grad.ptr,
        indices: indices.ptr,
        param_grad: param_grad.ptr,
    };
    BACKWARD.execute(handle, &problem, &invoke_params)
}
