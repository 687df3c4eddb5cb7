use tk_runtime::DevicePtr;
use tk_tensor::TensorDescriptor;

use crate::error::{bad_param, Result};
use crate::problem::{
    check_float, check_same_dtype, check_same_lengths, check_tensor, CacheKey, ProblemDescription,
};

/// A 1-D weight of one shared slope or one slope per channel (dimension 1
/// of `input`).
fn check_weight(input: &TensorDescriptor, weight: &TensorDescriptor, name: &str) -> Result<()> {
    check_tensor(weight, name)?;
    check_same_dtype(input, "input", weight, name)?;
    let count = weight.element_count();
    let channels = (input.rank() >= 2).then(|| input.lengths()[1]);
    if weight.rank() != 1 || (count != 1 && Some(count) != channels) {
        return Err(bad_param(format!(
            "{name} must hold 1 or {} slopes, got lengths {:?}",
            channels.map_or("(no channel dimension)".to_string(), |c| c.to_string()),
            weight.lengths()
        )));
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct FwdProblemDescription {
    input: TensorDescriptor,
    weight: TensorDescriptor,
    output: TensorDescriptor,
}

impl FwdProblemDescription {
    pub fn new(
        input: &TensorDescriptor,
        weight: &TensorDescriptor,
        output: &TensorDescriptor,
    ) -> Result<Self> {
        check_tensor(input, "input")?;
        check_float(input, "input")?;
        check_weight(input, weight, "weight")?;
        check_tensor(output, "output")?;
        check_same_dtype(input, "input", output, "output")?;
        check_same_lengths(input, "input", output, "output")?;
        Ok(FwdProblemDescription {
            input: input.clone(),
            weight: weight.clone(),
            output: output.clone(),
        })
    }

    pub fn input(&self) -> &TensorDescriptor {
        &self.input
    }

    /// True when one slope is shared by every channel.
    pub fn is_single_weight(&self) -> bool {
        self.weight.element_count() == 1
    }
}

impl ProblemDescription for FwdProblemDescription {
    type InvokeParams = FwdInvokeParams;

    fn cache_key(&self) -> CacheKey {
        CacheKey::new("prelu_fwd")
            .tensor("input", &self.input)
            .tensor("weight", &self.weight)
            .tensor("output", &self.output)
    }
}

#[derive(Debug, Clone)]
pub struct FwdInvokeParams {
    pub input_desc: TensorDescriptor,
    pub weight_desc: TensorDescriptor,
    pub output_desc: TensorDescriptor,
    pub input: DevicePtr,
    pub weight: DevicePtr,
    pub output: DevicePtr,
}

#[derive(Debug, Clone)]
pub struct BwdProblemDescription {
    input: TensorDescriptor,
    weight: TensorDescriptor,
    output_grad: TensorDescriptor,
    input_grad: TensorDescriptor,
    weight_grad: TensorDescriptor,
}

impl BwdProblemDescription {
    pub fn new(
        input: &TensorDescriptor,
        weight: &TensorDescriptor,
        output_grad: &TensorDescriptor,
        input_grad: &TensorDescriptor,
        weight_grad: &TensorDescriptor,
    ) -> Result<Self> {
        check_tensor(input, "input")?;
        check_float(input, "input")?;
        check_weight(input, weight, "weight")?;
        for (desc, name) in [(output_grad, "output_grad"), (input_grad, "input_grad")] {
            check_tensor(desc, name)?;
            check_same_dtype(input, "input", desc, name)?;
            check_same_lengths(input, "input", desc, name)?;
        }
        check_tensor(weight_grad, "weight_grad")?;
        check_same_dtype(weight, "weight", weight_grad, "weight_grad")?;
        check_same_lengths(weight, "weight", weight_grad, "weight_grad")?;
        Ok(BwdProblemDescription {
            input: input.clone(),
            weight: weight.clone(),
            output_grad: output_grad.clone(),
            input_grad: input_grad.clone(),
            weight_grad: weight_grad.clone(),
        })
    }

    pub fn input(&self) -> &TensorDescriptor {
        &self.input
    }

    pub fn weight(&self) -> &TensorDescriptor {
        &self.weight
    }

    pub fn is_single_weight(&self) -> bool {
        self.weight.element_count() == 1
    }
}

impl ProblemDescription for BwdProblemDescription {
    type InvokeParams = BwdInvokeParams;

    fn cache_key(&self) -> CacheKey {
        CacheKey::new("prelu_bwd")
            .tensor("input", &self.input)
            .tensor("weight", &self.weight)
            .tensor("output_grad", &self.output_grad)
            .tensor("input_grad", &self.input_grad)
            .tensor("weight_grad", &self.weight_grad)
    }
}

/// Either gradient pointer may be null to skip it. The workspace is only
/// read when a shared-slope weight gradient is requested.
#[derive(Debug, Clone)]
pub struct BwdInvokeParams {
    pub input_desc: TensorDescriptor,
    pub weight_desc: TensorDescriptor,
    pub output_grad_desc: TensorDescriptor,
    pub input_grad_desc: TensorDescriptor,
    pub weight_grad_desc: TensorDescriptor,
    pub input: DevicePtr,
    pub weight: DevicePtr,
    pub output_grad: DevicePtr,
    pub input_grad: DevicePtr,
    pub weight_grad: DevicePtr,
    pub workspace: DevicePtr,
    pub workspace_size: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tk_tensor::DType;

    fn desc(lengths: &[usize]) -> TensorDescriptor {
        TensorDescriptor::contiguous(DType::F32, lengths)
    }

    #[test]
    fn test_weight_count() {
        let x = desc(&[2, 3, 4]);
        assert!(FwdProblemDescription::new(&x, &desc(&[1]), &x).unwrap().is_single_weight());
        assert!(!FwdProblemDescription::new(&x, &desc(&[3]), &x).unwrap().is_single_weight());
        assert!(FwdProblemDescription::new(&x, &desc(&[4]), &x).is_err());
        assert!(FwdProblemDescription::new(&x, &desc(&[1, 3]), &x).is_err());
        // a 1-D input has no channel dimension
        let flat = desc(&[6]);
        assert!(FwdProblemDescription::new(&flat, &desc(&[1]), &flat).is_ok());
        assert!(FwdProblemDescription::new(&flat, &desc(&[6]), &flat).is_err());
    }

    #[test]
    fn test_forward_validation() {
        let x = desc(&[2, 3]);
        assert!(FwdProblemDescription::new(&x, &desc(&[3]), &desc(&[3, 2])).is_err());
        let half = TensorDescriptor::contiguous(DType::F16, &[3]);
        assert!(FwdProblemDescription::new(&x, &half, &x).is_err());
        let ints = TensorDescriptor::contiguous(DType::I32, &[2, 3]);
        assert!(FwdProblemDescription::new(&ints, &desc(&[1]), &ints).is_err());
    }

    #[test]
    fn test_backward_validation() {
        let x = desc(&[2, 3, 4]);
        let w = desc(&[3]);
        assert!(BwdProblemDescription::new(&x, &w, &x, &x, &w).is_ok());
        assert!(BwdProblemDescription::new(&x, &w, &x, &x, &desc(&[1])).is_err());
        assert!(BwdProblemDescription::new(&x, &w, &desc(&[2, 3, 5]), &x, &w).is_err());
        assert!(BwdProblemDescription::new(&x, &w, &x, &desc(&[24]), &w).is_err());
    }
}
