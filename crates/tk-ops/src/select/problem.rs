use tk_runtime::DevicePtr;
use tk_tensor::{DType, Shape, TensorDescriptor};

use crate::error::{bad_param, Result};
use crate::problem::{
    check_dtype, check_float, check_lengths, check_same_dtype, check_tensor, CacheKey,
    ProblemDescription,
};

/// Broadcast shape of condition, input and other.
pub fn where_output_shape(
    condition: &TensorDescriptor,
    input: &TensorDescriptor,
    other: &TensorDescriptor,
) -> Result<Shape> {
    let shape = Shape::broadcast_shape(condition.shape(), input.shape())
        .and_then(|s| Shape::broadcast_shape(&s, other.shape()))
        .map_err(|e| bad_param(format!("where operands do not broadcast: {e}")))?;
    Ok(shape)
}

fn check_operands(
    condition: &TensorDescriptor,
    input: &TensorDescriptor,
    other: &TensorDescriptor,
) -> Result<Shape> {
    check_tensor(condition, "condition")?;
    check_tensor(input, "input")?;
    check_tensor(other, "other")?;
    check_dtype(condition, "condition", DType::U8)?;
    check_float(input, "input")?;
    check_same_dtype(input, "input", other, "other")?;
    where_output_shape(condition, input, other)
}

#[derive(Debug, Clone)]
pub struct FwdProblemDescription {
    condition: TensorDescriptor,
    input: TensorDescriptor,
    other: TensorDescriptor,
    output: TensorDescriptor,
}

impl FwdProblemDescription {
    pub fn new(
        condition: &TensorDescriptor,
        input: &TensorDescriptor,
        other: &TensorDescriptor,
        output: &TensorDescriptor,
    ) -> Result<Self> {
        let shape = check_operands(condition, input, other)?;
        check_tensor(output, "output")?;
        check_same_dtype(input, "input", output, "output")?;
        check_lengths(output, "output", shape.dims())?;
        Ok(FwdProblemDescription {
            condition: condition.clone(),
            input: input.clone(),
            other: other.clone(),
            output: output.clone(),
        })
    }

    pub fn output(&self) -> &TensorDescriptor {
        &self.output
    }
}

impl ProblemDescription for FwdProblemDescription {
    type InvokeParams = FwdInvokeParams;

    fn cache_key(&self) -> CacheKey {
        CacheKey::new("where_fwd")
            .tensor("condition", &self.condition)
            .tensor("input", &self.input)
            .tensor("other", &self.other)
            .tensor("output", &self.output)
    }
}

#[derive(Debug, Clone)]
pub struct FwdInvokeParams {
    pub condition_desc: TensorDescriptor,
    pub input_desc: TensorDescriptor,
    pub other_desc: TensorDescriptor,
    pub output_desc: TensorDescriptor,
    pub condition: DevicePtr,
    pub input: DevicePtr,
    pub other: DevicePtr,
    pub output: DevicePtr,
}

/// Gradient descriptors take the lengths of their forward operands. The
/// descriptors are required even when a gradient pointer is null.
#[derive(Debug, Clone)]
pub struct BwdProblemDescription {
    condition: TensorDescriptor,
    output_grad: TensorDescriptor,
    input_grad: TensorDescriptor,
    other_grad: TensorDescriptor,
}

impl BwdProblemDescription {
    pub fn new(
        condition: &TensorDescriptor,
        output_grad: &TensorDescriptor,
        input_grad: &TensorDescriptor,
        other_grad: &TensorDescriptor,
    ) -> Result<Self> {
        let shape = check_operands(condition, input_grad, other_grad)?;
        check_tensor(output_grad, "output_grad")?;
        check_same_dtype(input_grad, "input_grad", output_grad, "output_grad")?;
        check_lengths(output_grad, "output_grad", shape.dims())?;
        Ok(BwdProblemDescription {
            condition: condition.clone(),
            output_grad: output_grad.clone(),
            input_grad: input_grad.clone(),
            other_grad: other_grad.clone(),
        })
    }

    pub fn output_grad(&self) -> &TensorDescriptor {
        &self.output_grad
    }

    pub fn input_grad(&self) -> &TensorDescriptor {
        &self.input_grad
    }

    pub fn other_grad(&self) -> &TensorDescriptor {
        &self.other_grad
    }
}

impl ProblemDescription for BwdProblemDescription {
    type InvokeParams = BwdInvokeParams;

    fn cache_key(&self) -> CacheKey {
        CacheKey::new("where_bwd")
            .tensor("condition", &self.condition)
            .tensor("output_grad", &self.output_grad)
            .tensor("input_grad", &self.input_grad)
            .tensor("other_grad", &self.other_grad)
    }
}

/// Either gradient pointer may be null to skip that gradient.
#[derive(Debug, Clone)]
pub struct BwdInvokeParams {
    pub condition_desc: TensorDescriptor,
    pub output_grad_desc: TensorDescriptor,
    pub input_grad_desc: TensorDescriptor,
    pub other_grad_desc: TensorDescriptor,
    pub condition: DevicePtr,
    pub output_grad: DevicePtr,
    pub input_grad: DevicePtr,
    pub other_grad: DevicePtr,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn desc(dtype: DType, lengths: &[usize]) -> TensorDescriptor {
        TensorDescriptor::contiguous(dtype, lengths)
    }

    #[test]
    fn test_output_shape() {
        let c = desc(DType::U8, &[4, 1]);
        let x = desc(DType::F32, &[3]);
        let y = desc(DType::F32, &[2, 1, 1]);
        assert_eq!(where_output_shape(&c, &x, &y).unwrap().dims(), &[2, 4, 3]);
        assert!(where_output_shape(&c, &desc(DType::F32, &[2]), &desc(DType::F32, &[3])).is_err());
    }

    #[test]
    fn test_forward_validation() {
        let c = desc(DType::U8, &[2, 3]);
        let x = desc(DType::F32, &[2, 3]);
        assert!(FwdProblemDescription::new(&c, &x, &x, &x).is_ok());
        assert!(FwdProblemDescription::new(&x, &x, &x, &x).is_err());
        assert!(FwdProblemDescription::new(&c, &x, &desc(DType::F16, &[2, 3]), &x).is_err());
        assert!(FwdProblemDescription::new(&c, &x, &x, &desc(DType::F32, &[3, 2])).is_err());
    }

    #[test]
    fn test_backward_validation() {
        let c = desc(DType::U8, &[2, 3]);
        let g = desc(DType::F32, &[2, 3]);
        let row = desc(DType::F32, &[3]);
        assert!(BwdProblemDescription::new(&c, &g, &row, &g).is_ok());
        assert!(BwdProblemDescription::new(&c, &row, &row, &g).is_err());
    }
}
