//! Diagonal family: `diag`, `diagflat` and `diag_embed`.
//!
//! All three are strided copies between a tensor's logical element order
//! and a diagonal view of another tensor, so every input layout works.

pub mod problem;
pub mod solvers;

use tk_runtime::Handle;

use crate::error::Result;
use crate::problem::TensorRef;

pub use problem::{
    diag_embed_output_lengths, diag_output_lengths, diagflat_output_lengths, diagonal_length,
    DiagProblemDescription, Direction, InvokeParams,
};
use solvers::FORWARD;

fn execute(
    handle: &mut Handle,
    problem: DiagProblemDescription,
    input: TensorRef<'_>,
    output: TensorRef<'_>,
) -> Result<()> {
    let params = InvokeParams {
        input_desc: input.desc.clone(),
        output_desc: output.desc.clone(),
        input: input.ptr,
        output: output.ptr,
    };
    FORWARD.execute(handle, &problem, &params)
}

/// Vector input: square output with the input on diagonal `offset`.
/// Matrix input: the elements of diagonal `offset`.
pub fn diag_forward(
    handle: &mut Handle,
    offset: i64,
    input: TensorRef<'_>,
    output: TensorRef<'_>,
) -> Result<()> {
    let problem = DiagProblemDescription::diag(input.desc, output.desc, offset)?;
    execute(handle, problem, input, output)
}

pub fn diagflat_forward(
    handle: &mut Handle,
    offset: i64,
    input: TensorRef<'_>,
    output: TensorRef<'_>,
) -> Result<()> {
    let problem = DiagProblemDescription::diagflat(input.desc, output.desc, offset)?;
    execute(handle, problem, input, output)
}

/// Place the last input dimension on the `(dim1, dim2)` diagonal of an
/// output one rank higher.
pub fn diag_embed_forward(
    handle: &mut Handle,
    offset: i64,
    dim1: i64,
    dim2: i64,
    input: TensorRef<'_>,
    output: TensorRef<'_>,
) -> Result<()> {
    let problem = DiagProblemDescription::diag_embed(input.desc, output.desc, offset, dim1, dim2)?;
    execute(handle, problem, input, output)
}
