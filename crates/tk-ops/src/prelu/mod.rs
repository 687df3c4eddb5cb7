//! Parametric ReLU: `x` for positive inputs, `w * x` otherwise, with one
//! shared slope or one slope per channel.
//!
//! The shared-slope backward pass reduces its weight gradient through a
//! workspace; query [`prelu_backward_workspace_size`] first.

pub mod problem;
pub mod solvers;

use log::debug;
use tk_runtime::{DevicePtr, Handle};
use tk_tensor::TensorDescriptor;

use crate::error::{bad_param, Result};
use crate::problem::TensorRef;
use crate::WORKSPACE_UNAVAILABLE;

pub use problem::{BwdInvokeParams, BwdProblemDescription, FwdInvokeParams, FwdProblemDescription};
use solvers::{BACKWARD, FORWARD};

pub fn prelu_forward(
    handle: &mut Handle,
    input: TensorRef<'_>,
    weight: TensorRef<'_>,
    output: TensorRef<'_>,
) -> Result<()> {
    let problem = FwdProblemDescription::new(input.desc, weight.desc, output.desc)?;
    let params = FwdInvokeParams {
        input_desc: input.desc.clone(),
        weight_desc: weight.desc.clone(),
        output_desc: output.desc.clone(),
        input: input.ptr,
        weight: weight.ptr,
        output: output.ptr,
    };
    FORWARD.execute(handle, &problem, &params)
}

/// Workspace bytes needed by [`prelu_backward`], or
/// [`WORKSPACE_UNAVAILABLE`] if the call would be rejected.
pub fn prelu_backward_workspace_size(
    handle: &Handle,
    input: &TensorDescriptor,
    weight: &TensorDescriptor,
    output_grad: &TensorDescriptor,
    input_grad: &TensorDescriptor,
    weight_grad: &TensorDescriptor,
) -> usize {
    BwdProblemDescription::new(input, weight, output_grad, input_grad, weight_grad)
        .and_then(|problem| BACKWARD.workspace_size(handle, &problem))
        .unwrap_or_else(|e| {
            debug!("prelu workspace query rejected: {e}");
            WORKSPACE_UNAVAILABLE
        })
}

/// PReLU backward. Either gradient pointer may be null to skip it; the
/// workspace is only needed when the weight gradient is requested.
#[allow(clippy::too_many_arguments)]
pub fn prelu_backward(
    handle: &mut Handle,
    workspace: DevicePtr,
    workspace_size: usize,
    input: TensorRef<'_>,
    weight: TensorRef<'_>,
    output_grad: TensorRef<'_>,
    input_grad: TensorRef<'_>,
    weight_grad: TensorRef<'_>,
) -> Result<()> {
    let problem = BwdProblemDescription::new(
        input.desc,
        weight.desc,
        output_grad.desc,
        input_grad.desc,
        weight_grad.desc,
    )?;
    if !weight_grad.ptr.is_null() {
        let required = BACKWARD.workspace_size(handle, &problem)?;
        if required > 0 && (workspace.is_null() || workspace_size < required) {
            return Err(bad_param(format!(
                "workspace of {workspace_size} bytes is too small, {required} required"
            )));
        }
    }
    let params = BwdInvokeParams {
        input_desc: input.desc.clone(),
        weight_desc: weight.desc.clone(),
        output_grad_desc: output_grad.desc.clone(),
        input_grad_desc: input_grad.desc.clone(),
        weight_grad_desc: weight_grad.desc.clone(),
        input: input.ptr,
        weight: weight.ptr,
        output_grad: output_grad.ptr,
        input_grad: input_grad.ptr,
        weight_grad: weight_grad.ptr,
        workspace,
        workspace_size,
    };
    BACKWARD.execute(handle, &problem, &params)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Status;
    use crate::kernels::HostKernels;
    use crate::reduce::reduction_workspace_elements;
    use crate::testing::{assert_close, download, quantize, random_values, swapped_strides, upload};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::sync::Arc;
    use tk_tensor::DType;

    fn handle() -> Handle {
        Handle::new(Arc::new(HostKernels))
    }

    /// Channel of each logical element of a row-major `lengths`.
    fn channels(lengths: &[usize]) -> Vec<usize> {
        let inner: usize = lengths[2..].iter().product();
        let n: usize = lengths.iter().product();
        (0..n).map(|i| i / inner % lengths[1]).collect()
    }

    fn slope(w: &[f64], c: usize) -> f64 {
        if w.len() == 1 {
            w[0]
        } else {
            w[c]
        }
    }

    struct Grads {
        input: Vec<f64>,
        weight: Vec<f64>,
    }

    fn host_backward(x: &[f64], w: &[f64], g: &[f64], ch: &[usize]) -> Grads {
        let mut weight = vec![0.0; w.len()];
        let input = x
            .iter()
            .zip(g)
            .zip(ch)
            .map(|((&x, &g), &c)| {
                if x > 0.0 {
                    g
                } else {
                    weight[if w.len() == 1 { 0 } else { c }] += x * g;
                    slope(w, c) * g
                }
            })
            .collect();
        Grads { input, weight }
    }

    #[test]
    fn test_forward_shared_and_per_channel() {
        let mut h = handle();
        let mut rng = StdRng::seed_from_u64(61);
        let lengths = [3usize, 5, 7, 2];
        let ch = channels(&lengths);
        for dtype in [DType::F32, DType::F16, DType::BF16] {
            for slopes in [1usize, 5] {
                let x_desc = swapped_strides(dtype, &lengths);
                let w_desc = TensorDescriptor::contiguous(dtype, &[slopes]);
                let y_desc = TensorDescriptor::contiguous(dtype, &lengths);
                let x = quantize(dtype, &random_values(&mut rng, x_desc.element_count(), -1.0, 1.0));
                let w = quantize(dtype, &random_values(&mut rng, slopes, 0.0, 0.5));

                let xi = upload(&mut h, &x_desc, &x);
                let wi = upload(&mut h, &w_desc, &w);
                let yi = h.alloc(y_desc.byte_space());
                prelu_forward(
                    &mut h,
                    TensorRef::new(&x_desc, xi),
                    TensorRef::new(&w_desc, wi),
                    TensorRef::new(&y_desc, yi),
                )
                .unwrap();

                let expected: Vec<f64> = x
                    .iter()
                    .zip(&ch)
                    .map(|(&v, &c)| if v > 0.0 { v } else { slope(&w, c) * v })
                    .collect();
                assert_close(dtype, &download(&h, &y_desc, yi), &expected);
            }
        }
    }

    #[test]
    fn test_workspace_size() {
        let h = handle();
        let x = TensorDescriptor::contiguous(DType::F32, &[4, 3, 40, 50]);
        let one = TensorDescriptor::contiguous(DType::F32, &[1]);
        let per_channel = TensorDescriptor::contiguous(DType::F32, &[3]);
        assert_eq!(
            prelu_backward_workspace_size(&h, &x, &one, &x, &x, &one),
            reduction_workspace_elements(24000, 1024) * 4
        );
        assert_eq!(
            prelu_backward_workspace_size(&h, &x, &per_channel, &x, &x, &per_channel),
            0
        );
        assert_eq!(
            prelu_backward_workspace_size(&h, &x, &per_channel, &x, &x, &one),
            WORKSPACE_UNAVAILABLE
        );
    }

    fn run_backward(h: &mut Handle, dtype: DType, lengths: &[usize], slopes: usize, seed: u64) {
        let mut rng = StdRng::seed_from_u64(seed);
        let x_desc = swapped_strides(dtype, lengths);
        let g_desc = TensorDescriptor::contiguous(dtype, lengths);
        let w_desc = TensorDescriptor::contiguous(dtype, &[slopes]);
        let n = g_desc.element_count();
        let x = quantize(dtype, &random_values(&mut rng, n, -1.0, 1.0));
        let g = quantize(dtype, &random_values(&mut rng, n, -1.0, 1.0));
        let w = quantize(dtype, &random_values(&mut rng, slopes, 0.0, 0.5));

        let xi = upload(h, &x_desc, &x);
        let gi = upload(h, &g_desc, &g);
        let wi = upload(h, &w_desc, &w);
        let dxi = h.alloc(g_desc.byte_space());
        let dwi = h.alloc(w_desc.byte_space());
        let ws_size = prelu_backward_workspace_size(h, &x_desc, &w_desc, &g_desc, &g_desc, &w_desc);
        let ws = h.alloc(ws_size);
        prelu_backward(
            h,
            ws,
            ws_size,
            TensorRef::new(&x_desc, xi),
            TensorRef::new(&w_desc, wi),
            TensorRef::new(&g_desc, gi),
            TensorRef::new(&g_desc, dxi),
            TensorRef::new(&w_desc, dwi),
        )
        .unwrap();

        let expected = host_backward(&x, &w, &g, &channels(lengths));
        assert_close(dtype, &download(h, &g_desc, dxi), &expected.input);
        assert_close(dtype, &download(h, &w_desc, dwi), &expected.weight);
    }

    #[test]
    fn test_backward_shared_weight_reduces() {
        let mut h = handle();
        run_backward(&mut h, DType::F32, &[4, 3, 40, 50], 1, 62);
        run_backward(&mut h, DType::F32, &[2, 1], 1, 63);
    }

    #[test]
    fn test_backward_per_channel() {
        let mut h = handle();
        for dtype in [DType::F32, DType::F16, DType::BF16] {
            run_backward(&mut h, dtype, &[3, 6, 5, 4], 6, 64);
        }
        // input grad plus per-channel weight grad, three calls
        assert_eq!(h.stream().launches(), 6);
    }

    #[test]
    fn test_backward_input_grad_only() {
        let mut h = handle();
        let d = TensorDescriptor::contiguous(DType::F32, &[2, 2]);
        let w_desc = TensorDescriptor::contiguous(DType::F32, &[1]);
        let x = upload(&mut h, &d, &[1.0, -2.0, 0.0, 3.0]);
        let w = upload(&mut h, &w_desc, &[0.25]);
        let g = upload(&mut h, &d, &[4.0; 4]);
        let dx = h.alloc(d.byte_space());
        prelu_backward(
            &mut h,
            DevicePtr::NULL,
            0,
            TensorRef::new(&d, x),
            TensorRef::new(&w_desc, w),
            TensorRef::new(&d, g),
            TensorRef::new(&d, dx),
            TensorRef::new(&w_desc, DevicePtr::NULL),
        )
        .unwrap();
        assert_eq!(download(&h, &d, dx), vec![4.0, 1.0, 1.0, 4.0]);
    }

    #[test]
    fn test_weight_grad_only() {
        let mut h = handle();
        let d = TensorDescriptor::contiguous(DType::F32, &[1, 2, 2]);
        let w_desc = TensorDescriptor::contiguous(DType::F32, &[2]);
        let x = upload(&mut h, &d, &[-1.0, 2.0, -3.0, -0.5]);
        let w = upload(&mut h, &w_desc, &[0.1, 0.2]);
        let g = upload(&mut h, &d, &[2.0, 5.0, 1.0, 4.0]);
        let dw = h.alloc(w_desc.byte_space());
        prelu_backward(
            &mut h,
            DevicePtr::NULL,
            0,
            TensorRef::new(&d, x),
            TensorRef::new(&w_desc, w),
            TensorRef::new(&d, g),
            TensorRef::new(&d, DevicePtr::NULL),
            TensorRef::new(&w_desc, dw),
        )
        .unwrap();
        // channel 0: -1 * 2, channel 1: -3 * 1 + -0.5 * 4
        assert_eq!(download(&h, &w_desc, dw), vec![-2.0, -5.0]);
    }

    #[test]
    fn test_shared_weight_grad_needs_workspace() {
        let mut h = handle();
        let d = TensorDescriptor::contiguous(DType::F32, &[8, 8]);
        let w_desc = TensorDescriptor::contiguous(DType::F32, &[1]);
        let ptr = h.alloc(d.byte_space());
        let dw = h.alloc(4);
        let result = prelu_backward(
            &mut h,
            DevicePtr::NULL,
            0,
            TensorRef::new(&d, ptr),
            TensorRef::new(&w_desc, ptr),
            TensorRef::new(&d, ptr),
            TensorRef::new(&d, DevicePtr::NULL),
            TensorRef::new(&w_desc, dw),
        );
        assert_eq!(Status::from(&result), Status::BadParam);
        assert_eq!(h.invoker_count(), 0);
    }
}
