//! Absolute-difference loss (L1) and its smooth variant.
//!
//! The reduced forward pass is the one operator in the crate that needs a
//! workspace: query [`l1loss_forward_workspace_size`] first and pass a
//! buffer of at least that many bytes.

pub mod problem;
pub mod solvers;

use log::debug;
use tk_runtime::{DevicePtr, Handle};

use crate::error::{bad_param, Result};
use crate::problem::TensorRef;
use crate::WORKSPACE_UNAVAILABLE;

pub use problem::{
    BwdInvokeParams, BwdProblemDescription, FwdInvokeParams, FwdProblemDescription, L1LossParams,
    Reduction,
};
use solvers::{BACKWARD, FORWARD};

/// Workspace bytes needed by [`l1loss_forward`], or
/// [`WORKSPACE_UNAVAILABLE`] if the call would be rejected.
pub fn l1loss_forward_workspace_size(
    handle: &Handle,
    reduction: Reduction,
    input: &tk_tensor::TensorDescriptor,
    target: &tk_tensor::TensorDescriptor,
    output: &tk_tensor::TensorDescriptor,
) -> usize {
    forward_workspace_size(handle, L1LossParams::l1(reduction), input, target, output)
}

pub fn smooth_l1loss_forward_workspace_size(
    handle: &Handle,
    reduction: Reduction,
    beta: f32,
    input: &tk_tensor::TensorDescriptor,
    target: &tk_tensor::TensorDescriptor,
    output: &tk_tensor::TensorDescriptor,
) -> usize {
    forward_workspace_size(handle, L1LossParams::smooth(reduction, beta), input, target, output)
}

fn forward_workspace_size(
    handle: &Handle,
    params: L1LossParams,
    input: &tk_tensor::TensorDescriptor,
    target: &tk_tensor::TensorDescriptor,
    output: &tk_tensor::TensorDescriptor,
) -> usize {
    FwdProblemDescription::new(input, target, output, params)
        .and_then(|problem| FORWARD.workspace_size(handle, &problem))
        .unwrap_or_else(|e| {
            debug!("l1loss workspace query rejected: {e}");
            WORKSPACE_UNAVAILABLE
        })
}

/// L1 loss forward: `|input - target|`, optionally summed or averaged.
pub fn l1loss_forward(
    handle: &mut Handle,
    reduction: Reduction,
    workspace: DevicePtr,
    workspace_size: usize,
    input: TensorRef<'_>,
    target: TensorRef<'_>,
    output: TensorRef<'_>,
) -> Result<()> {
    forward(handle, L1LossParams::l1(reduction), workspace, workspace_size, input, target, output)
}

/// Smooth L1 loss forward with threshold `beta`.
pub fn smooth_l1loss_forward(
    handle: &mut Handle,
    params: L1LossParams,
    workspace: DevicePtr,
    workspace_size: usize,
    input: TensorRef<'_>,
    target: TensorRef<'_>,
    output: TensorRef<'_>,
) -> Result<()> {
    forward(handle, params, workspace, workspace_size, input, target, output)
}

fn forward(
    handle: &mut Handle,
    params: L1LossParams,
    workspace: DevicePtr,
    workspace_size: usize,
    input: TensorRef<'_>,
    target: TensorRef<'_>,
    output: TensorRef<'_>,
) -> Result<()> {
    let problem = FwdProblemDescription::new(input.desc, target.desc, output.desc, params)?;
    let required = FORWARD.workspace_size(handle, &problem)?;
    if required > 0 && (workspace.is_null() || workspace_size < required) {
        return Err(bad_param(format!(
            "workspace of {workspace_size} bytes is too small, {required} required"
        )));
    }
    let invoke_params = FwdInvokeParams {
        input_desc: input.desc.clone(),
        target_desc: target.desc.clone(),
        output_desc: output.desc.clone(),
        input: input.ptr,
        target: target.ptr,
        output: output.ptr,
        workspace,
        workspace_size,
        reduction: params.reduction,
    };
    FORWARD.execute(handle, &problem, &invoke_params)
}

/// L1 loss backward. Either gradient pointer may be null to skip it.
pub fn l1loss_backward(
    handle: &mut Handle,
    reduction: Reduction,
    input: TensorRef<'_>,
    target: TensorRef<'_>,
    output_grad: TensorRef<'_>,
    input_grad: TensorRef<'_>,
    target_grad: TensorRef<'_>,
) -> Result<()> {
    backward(handle, L1LossParams::l1(reduction), input, target, output_grad, input_grad, target_grad)
}

pub fn smooth_l1loss_backward(
    handle: &mut Handle,
    params: L1LossParams,
    input: TensorRef<'_>,
    target: TensorRef<'_>,
    output_grad: TensorRef<'_>,
    input_grad: TensorRef<'_>,
    target_grad: TensorRef<'_>,
) -> Result<()> {
    backward(handle, params, input, target, output_grad, input_grad, target_grad)
}

fn backward(
    handle: &mut Handle,
    params: L1LossParams,
    input: TensorRef<'_>,
    target: TensorRef<'_>,
    output_grad: TensorRef<'_>,
    input_grad: TensorRef<'_>,
    target_grad: TensorRef<'_>,
) -> Result<()> {
    let problem = BwdProblemDescription::new(
        input.desc,
        target.desc,
        output_grad.desc,
        input_grad.desc,
        target_grad.desc,
        params,
    )?;
    let invoke_params = BwdInvokeParams {
        input_desc: input.desc.clone(),
        target_desc: target.desc.clone(),
        output_grad_desc: output_grad.desc.clone(),
        input_grad_desc: input_grad.desc.clone(),
        target_grad_desc: target_grad.desc.clone(),
        input: input.ptr,
        target: target.ptr,
        output_grad: output_grad.ptr,
        input_grad: input_grad.ptr,
        target_grad: target_grad.ptr,
    };
    BACKWARD.execute(handle, &problem, &invoke_params)
}
