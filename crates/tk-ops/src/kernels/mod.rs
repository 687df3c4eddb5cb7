//! Host implementations of the operator kernels.
//!
//! Each kernel body is generic over its element types and is selected by
//! the `IO_TYPE` (and, for indexed kernels, `INDEX_TYPE`) build define of
//! the launch. Arithmetic is done in `f64` and rounded once on store.

mod copy;
pub(crate) mod embedding;
mod gather;
mod glu;
mod loss;
mod prelu;
mod reduce;
mod select;

use half::{bf16, f16};
use tk_runtime::{BuildParams, KernelFn, KernelInfo, KernelSource};
use tk_tensor::{DType, Element};

/// Integer element usable as a gather/embedding index.
pub trait IndexElement: Element {
    fn to_index(self) -> i64;
}

impl IndexElement for i32 {
    fn to_index(self) -> i64 {
        self as i64
    }
}

impl IndexElement for i64 {
    fn to_index(self) -> i64 {
        self
    }
}

macro_rules! float_kernel {
    ($build:expr, $($kernel:ident)::+) => {
        match $build.dtype("IO_TYPE")? {
            DType::F32 => Some($($kernel)::+::<f32> as KernelFn),
            DType::F64 => Some($($kernel)::+::<f64> as KernelFn),
            DType::F16 => Some($($kernel)::+::<f16> as KernelFn),
            DType::BF16 => Some($($kernel)::+::<bf16> as KernelFn),
            _ => None,
        }
    };
}

macro_rules! indexed_kernel {
    ($build:expr, $($kernel:ident)::+) => {
        match ($build.dtype("IO_TYPE")?, $build.dtype("INDEX_TYPE")?) {
            (DType::F32, DType::I32) => Some($($kernel)::+::<f32, i32> as KernelFn),
            (DType::F32, DType::I64) => Some($($kernel)::+::<f32, i64> as KernelFn),
            (DType::F64, DType::I32) => Some($($kernel)::+::<f64, i32> as KernelFn),
            (DType::F64, DType::I64) => Some($($kernel)::+::<f64, i64> as KernelFn),
            (DType::F16, DType::I32) => Some($($kernel)::+::<f16, i32> as KernelFn),
            (DType::F16, DType::I64) => Some($($kernel)::+::<f16, i64> as KernelFn),
            (DType::BF16, DType::I32) => Some($($kernel)::+::<bf16, i32> as KernelFn),
            (DType::BF16, DType::I64) => Some($($kernel)::+::<bf16, i64> as KernelFn),
            _ => None,
        }
    };
}

/// Kernel source backed by the host implementations in this module.
#[derive(Debug, Default, Clone, Copy)]
pub struct HostKernels;

impl HostKernels {
    fn select(name: &str, build: &BuildParams) -> Option<KernelFn> {
        match name {
            "L1LossReducedForward5d" => float_kernel!(build, loss::reduced_forward),
            "L1LossUnreducedForward5d" => float_kernel!(build, loss::unreduced_forward),
            "L1LossReducedBackward5d" => float_kernel!(build, loss::reduced_backward),
            "L1LossUnreducedBackward5d" => float_kernel!(build, loss::unreduced_backward),
            "ReduceSumLoss" => float_kernel!(build, reduce::reduce_sum),
            "FillZero" => float_kernel!(build, reduce::fill_zero),
            "GLUForward" => float_kernel!(build, glu::forward),
            "GLUBackward" => float_kernel!(build, glu::backward),
            "GatherV2Forward" => indexed_kernel!(build, gather::forward),
            "GatherV2Backward" => indexed_kernel!(build, gather::backward),
            "BatchedGatherV2Backward" => indexed_kernel!(build, gather::batched_backward),
            "StridedCopy" => float_kernel!(build, copy::strided_copy),
            "EmbeddingForward" => indexed_kernel!(build, embedding::forward),
            "EmbeddingBackward" => indexed_kernel!(build, embedding::backward),
            "EmbeddingBagForward" => indexed_kernel!(build, embedding::bag_forward),
            "PReLUForward" => float_kernel!(build, prelu::forward),
            "PReLUBackward" => float_kernel!(build, prelu::backward),
            "PReLUWeightGrad" => float_kernel!(build, prelu::weight_grad),
            "WhereForward" => float_kernel!(build, select::forward),
            "WhereBackward" => float_kernel!(build, select::backward),
            _ => None,
        }
    }
}

impl KernelSource for HostKernels {
    fn name(&self) -> &str {
        "host"
    }

    fn build(&self, info: &KernelInfo) -> Option<KernelFn> {
        Self::select(&info.name, &info.build)
    }
}

#[inline]
pub(crate) fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(name: &str, build: BuildParams) -> KernelInfo {
        KernelInfo::linear("Test.cl", name, build, 1, 1)
    }

    #[test]
    fn test_float_dispatch() {
        for ty in ["float", "double", "half", "bfloat16"] {
            let b = BuildParams::new().define("IO_TYPE", ty);
            assert!(HostKernels.build(&info("GLUForward", b)).is_some(), "{ty}");
        }
        let int = BuildParams::new().define("IO_TYPE", "int");
        assert!(HostKernels.build(&info("GLUForward", int)).is_none());
        assert!(HostKernels.build(&info("GLUForward", BuildParams::new())).is_none());
    }

    #[test]
    fn test_indexed_dispatch() {
        let ok = BuildParams::new()
            .define("IO_TYPE", "half")
            .define("INDEX_TYPE", "long");
        assert!(HostKernels.build(&info("GatherV2Forward", ok)).is_some());
        let bad = BuildParams::new()
            .define("IO_TYPE", "half")
            .define("INDEX_TYPE", "float");
        assert!(HostKernels.build(&info("GatherV2Forward", bad)).is_none());
    }

    #[test]
    fn test_unknown_kernel() {
        let b = BuildParams::new().define("IO_TYPE", "float");
        assert!(HostKernels.build(&info("Conv2d", b)).is_none());
    }

    #[test]
    fn test_sigmoid() {
        assert_eq!(sigmoid(0.0), 0.5);
        assert!(sigmoid(40.0) > 0.999_999);
        assert!(sigmoid(-40.0) < 1e-6);
    }
}
