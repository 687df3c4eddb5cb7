//! Multi-pass ping-pong sum reduction over a caller-supplied workspace.
//!
//! A reduced loss first writes one partial value per element into region A
//! of the workspace. Each `ReduceSumLoss` pass then sums blocks of
//! [`LOCAL_SIZE_REDUCE`] values, shrinking the live element count by that
//! factor, and alternates between region A and region B. The final pass
//! writes the single remaining value into the operator's output.

use tk_runtime::{align_up, DevicePtr, Handle, Kernel, KernelInfo};
use tk_tensor::DType;

use crate::error::Result;
use crate::solver::{type_build_params, KernelPlan};

/// Work-group size of elementwise loss kernels.
pub const LOCAL_SIZE_FWD: usize = 256;
/// Block size consumed by one reduction work-group.
pub const LOCAL_SIZE_REDUCE: usize = 1024;

pub const REDUCE_KERNEL_FILE: &str = "ReduceSum.cl";
pub const REDUCE_KERNEL_NAME: &str = "ReduceSumLoss";

/// Elements a reduction over `n` values needs: `n` for the first region
/// plus `ceil(n / block)` for the second.
pub fn reduction_workspace_elements(n: usize, block: usize) -> usize {
    n + n.div_ceil(block)
}

/// Input size of every reduction pass. There is always at least one pass,
/// even when `n` is already 1.
pub fn reduction_pass_sizes(n: usize, block: usize) -> Vec<usize> {
    let mut sizes = Vec::new();
    let mut size = n;
    loop {
        sizes.push(size);
        size = size.div_ceil(block);
        if size <= 1 {
            break;
        }
    }
    sizes
}

/// Byte layout of the two ping-pong regions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceLayout {
    pub elem_size: usize,
    /// Elements of region A, which starts at byte 0.
    pub region_a_len: usize,
    /// Byte offset of region B.
    pub region_b_offset: usize,
    pub region_b_len: usize,
    pub pass_sizes: Vec<usize>,
}

impl WorkspaceLayout {
    pub fn new(n: usize, block: usize, elem_size: usize, alignment: usize) -> Self {
        WorkspaceLayout {
            elem_size,
            region_a_len: n,
            region_b_offset: align_up(n * elem_size, alignment.max(1)),
            region_b_len: n.div_ceil(block),
            pass_sizes: reduction_pass_sizes(n, block),
        }
    }

    pub fn total_bytes(&self) -> usize {
        self.region_b_offset + self.region_b_len * self.elem_size
    }
}

/// Append one `ReduceSumLoss` launch per pass of `layout`.
pub fn push_reduce_kernels(plan: &mut KernelPlan, layout: &WorkspaceLayout, dtype: DType) {
    for &size in &layout.pass_sizes {
        let build = type_build_params(dtype).define("REDUCE_SIZE", LOCAL_SIZE_REDUCE);
        plan.push(KernelInfo::linear(
            REDUCE_KERNEL_FILE,
            REDUCE_KERNEL_NAME,
            build,
            size,
            LOCAL_SIZE_REDUCE,
        ));
    }
}

/// Issue the reduction passes. The partial values must already be in
/// region A; the result lands in element 0 of `output`.
pub fn run_reduction(
    handle: &mut Handle,
    kernels: &[Kernel],
    layout: &WorkspaceLayout,
    workspace: DevicePtr,
    output: DevicePtr,
) -> Result<()> {
    let mut src = workspace;
    let mut dst = workspace.byte_add(layout.region_b_offset);
    let passes = kernels.len().min(layout.pass_sizes.len());
    for (i, (kernel, &size)) in kernels.iter().zip(&layout.pass_sizes).enumerate() {
        let out = if i + 1 == passes { output } else { dst };
        handle.run(kernel, &[src.into(), out.into(), size.into()])?;
        std::mem::swap(&mut src, &mut dst);
    }
    Ok(())
}
