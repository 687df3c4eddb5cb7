use std::fmt;

use tk_runtime::DevicePtr;
use tk_tensor::TensorDescriptor;

use crate::error::{bad_param, Result};
use crate::problem::{
    check_float, check_lengths, check_same_dtype, check_same_lengths, check_tensor, CacheKey,
    ProblemDescription,
};

/// How per-element losses are combined.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Reduction {
    None,
    Sum,
    Mean,
}

impl fmt::Display for Reduction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reduction::None => write!(f, "none"),
            Reduction::Sum => write!(f, "sum"),
            Reduction::Mean => write!(f, "mean"),
        }
    }
}

/// Parameters of the absolute-difference loss family.
///
/// - `beta`: smooth-L1 threshold; `0.0` is plain L1.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct L1LossParams {
    pub reduction: Reduction,
    pub beta: f32,
}

impl L1LossParams {
    pub fn l1(reduction: Reduction) -> Self {
        L1LossParams {
            reduction,
            beta: 0.0,
        }
    }

    pub fn smooth(reduction: Reduction, beta: f32) -> Self {
        L1LossParams { reduction, beta }
    }

    fn validate(&self) -> Result<()> {
        if !self.beta.is_finite() || self.beta < 0.0 {
            return Err(bad_param(format!(
                "beta must be finite and non-negative, got {}",
                self.beta
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct FwdProblemDescription {
    input: TensorDescriptor,
    target: TensorDescriptor,
    output: TensorDescriptor,
    params: L1LossParams,
}

impl FwdProblemDescription {
    pub fn new(
        input: &TensorDescriptor,
        target: &TensorDescriptor,
        output: &TensorDescriptor,
        params: L1LossParams,
    ) -> Result<Self> {
        params.validate()?;
        check_tensor(input, "input")?;
        check_tensor(target, "target")?;
        check_tensor(output, "output")?;
        check_float(input, "input")?;
        check_same_dtype(input, "input", target, "target")?;
        check_same_dtype(input, "input", output, "output")?;
        check_same_lengths(input, "input", target, "target")?;
        match params.reduction {
            Reduction::None => check_same_lengths(input, "input", output, "output")?,
            Reduction::Sum | Reduction::Mean => {
                if output.element_count() != 1 {
                    return Err(bad_param(format!(
                        "reduced output must hold exactly one element, got {:?}",
                        output.lengths()
                    )));
                }
            }
        }
        Ok(FwdProblemDescription {
            input: input.clone(),
            target: target.clone(),
            output: output.clone(),
            params,
        })
    }

    pub fn input(&self) -> &TensorDescriptor {
        &self.input
    }

    pub fn target(&self) -> &TensorDescriptor {
        &self.target
    }

    pub fn output(&self) -> &TensorDescriptor {
        &self.output
    }

    pub fn params(&self) -> L1LossParams {
        self.params
    }

    pub fn is_reduced(&self) -> bool {
        self.params.reduction != Reduction::None
    }

    /// `N` for a mean, `1` otherwise.
    pub fn divisor(&self) -> f64 {
        divisor(self.params.reduction, self.input.element_count())
    }
}

impl ProblemDescription for FwdProblemDescription {
    type InvokeParams = FwdInvokeParams;

    fn cache_key(&self) -> CacheKey {
        CacheKey::new("l1loss_fwd")
            .tensor("input", &self.input)
            .tensor("target", &self.target)
            .tensor("output", &self.output)
            .field("reduction", self.params.reduction)
            .field("beta", self.params.beta)
    }
}

#[derive(Debug, Clone)]
pub struct FwdInvokeParams {
    pub input_desc: TensorDescriptor,
    pub target_desc: TensorDescriptor,
    pub output_desc: TensorDescriptor,
    pub input: DevicePtr,
    pub target: DevicePtr,
    pub output: DevicePtr,
    pub workspace: DevicePtr,
    pub workspace_size: usize,
    pub reduction: Reduction,
}

#[derive(Debug, Clone)]
pub struct BwdProblemDescription {
    input: TensorDescriptor,
    target: TensorDescriptor,
    output_grad: TensorDescriptor,
    input_grad: TensorDescriptor,
    target_grad: TensorDescriptor,
    params: L1LossParams,
}

impl BwdProblemDescription {
    pub fn new(
        input: &TensorDescriptor,
        target: &TensorDescriptor,
        output_grad: &TensorDescriptor,
        input_grad: &TensorDescriptor,
        target_grad: &TensorDescriptor,
        params: L1LossParams,
    ) -> Result<Self> {
        params.validate()?;
        for (desc, name) in [
            (input, "input"),
            (target, "target"),
            (output_grad, "output_grad"),
            (input_grad, "input_grad"),
            (target_grad, "target_grad"),
        ] {
            check_tensor(desc, name)?;
            check_same_dtype(input, "input", desc, name)?;
        }
        check_float(input, "input")?;
        check_same_lengths(input, "input", target, "target")?;
        check_lengths(input_grad, "input_grad", input.lengths())?;
        check_lengths(target_grad, "target_grad", input.lengths())?;
        match params.reduction {
            Reduction::None => check_lengths(output_grad, "output_grad", input.lengths())?,
            Reduction::Sum | Reduction::Mean => {
                if output_grad.element_count() != 1 {
                    return Err(bad_param(format!(
                        "output_grad of a reduced loss must hold one element, got {:?}",
                        output_grad.lengths()
                    )));
                }
            }
        }
        Ok(BwdProblemDescription {
            input: input.clone(),
            target: target.clone(),
            output_grad: output_grad.clone(),
            input_grad: input_grad.clone(),
            target_grad: target_grad.clone(),
            params,
        })
    }

    pub fn input(&self) -> &TensorDescriptor {
        &self.input
    }

    pub fn params(&self) -> L1LossParams {
        self.params
    }

    pub fn is_reduced(&self) -> bool {
        self.params.reduction != Reduction::None
    }

    pub fn divisor(&self) -> f64 {
        divisor(self.params.reduction, self.input.element_count())
    }
}

impl ProblemDescription for BwdProblemDescription {
    type InvokeParams = BwdInvokeParams;

    fn cache_key(&self) -> CacheKey {
        CacheKey::new("l1loss_bwd")
            .tensor("input", &self.input)
            .tensor("target", &self.target)
            .tensor("output_grad", &self.output_grad)
            .tensor("input_grad", &self.input_grad)
            .tensor("target_grad", &self.target_grad)
            .field("reduction", self.params.reduction)
            .field("beta", self.params.beta)
    }
}

/// Either gradient pointer may be null to skip that gradient.
#[derive(Debug, Clone)]
pub struct BwdInvokeParams {
    pub input_desc: TensorDescriptor,
    pub target_desc: TensorDescriptor,
    pub output_grad_desc: TensorDescriptor,
    pub input_grad_desc: TensorDescriptor,
    pub target_grad_desc: TensorDescriptor,
    pub input: DevicePtr,
    pub target: DevicePtr,
    pub output_grad: DevicePtr,
    pub input_grad: DevicePtr,
    pub target_grad: DevicePtr,
}

fn divisor(reduction: Reduction, n: usize) -> f64 {
    match reduction {
        Reduction::Mean => n as f64,
        Reduction::Sum | Reduction::None => 1.0,
    }
}
