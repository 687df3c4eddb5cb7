//! Elementwise select: `output = condition ? input : other`, with numpy
//! broadcasting of all three operands.

pub mod problem;
pub mod solvers;

use tk_runtime::Handle;

use crate::error::Result;
use crate::problem::TensorRef;

pub use problem::{
    where_output_shape, BwdInvokeParams, BwdProblemDescription, FwdInvokeParams,
    FwdProblemDescription,
};
use solvers::{BACKWARD, FORWARD};

pub fn where_forward(
    handle: &mut Handle,
    condition: TensorRef<'_>,
    input: TensorRef<'_>,
    other: TensorRef<'_>,
    output: TensorRef<'_>,
) -> Result<()> {
    let problem = FwdProblemDescription::new(condition.desc, input.desc, other.desc, output.desc)?;
    let params = FwdInvokeParams {
        condition_desc: condition.desc.clone(),
        input_desc: input.desc.clone(),
        other_desc: other.desc.clone(),
        output_desc: output.desc.clone(),
        condition: condition.ptr,
        input: input.ptr,
        other: other.ptr,
        output: output.ptr,
    };
    FORWARD.execute(handle, &problem, &params)
}

/// Gradients of a broadcast operand are summed over the broadcast
/// dimensions. A null gradient pointer is left untouched.
pub fn where_backward(
    handle: &mut Handle,
    condition: TensorRef<'_>,
    output_grad: TensorRef<'_>,
    input_grad: TensorRef<'_>,
    other_grad: TensorRef<'_>,
) -> Result<()> {
    let problem = BwdProblemDescription::new(
        condition.desc,
        output_grad.desc,
        input_grad.desc,
        other_grad.desc,
    )?;
    let params = BwdInvokeParams {
        condition_desc: condition.desc.clone(),
        output_grad_desc: output_grad.desc.clone(),
        input_grad_desc: input_grad.desc.clone(),
        other_grad_desc: other_grad.desc.clone(),
        condition: condition.ptr,
        output_grad: output_grad.ptr,
        input_grad: input_grad.ptr,
        other_grad: other_grad.ptr,
    };
    BACKWARD.execute(handle, &problem, &params)
}
