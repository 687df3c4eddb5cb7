use tk_runtime::DevicePtr;
use tk_tensor::TensorDescriptor;

use crate::error::{bad_param, Result};
use crate::problem::{
    check_float, check_index, check_lengths, check_rank, check_same_dtype, check_tensor, CacheKey,
    ProblemDescription,
};

/// Highest index-tensor rank; the output adds one dimension.
pub const MAX_INDEX_RANK: usize = 4;

pub(crate) fn check_weight(weight: &TensorDescriptor, name: &str) -> Result<()> {
    check_tensor(weight, name)?;
    if weight.rank() != 2 {
        return Err(bad_param(format!(
            "{name} must be 2-D [num_embeddings, dim], got lengths {:?}",
            weight.lengths()
        )));
    }
    check_float(weight, name)
}

fn check_indices(indices: &TensorDescriptor) -> Result<()> {
    check_rank(indices, "input", MAX_INDEX_RANK)?;
    check_tensor(indices, "input")?;
    check_index(indices, "input")
}

/// Resolve a possibly negative padding row against `num_embeddings`.
pub fn resolve_padding_idx(padding_idx: Option<i64>, num_embeddings: usize) -> Result<Option<usize>> {
    let Some(idx) = padding_idx else {
        return Ok(None);
    };
    let n = num_embeddings as i64;
    let resolved = if idx < 0 { idx + n } else { idx };
    if !(0..n).contains(&resolved) {
        return Err(bad_param(format!(
            "padding_idx {idx} is out of range for {num_embeddings} embeddings"
        )));
    }
    Ok(Some(resolved as usize))
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
        check_indices(input)?;
        check_weight(weight, "weight")?;
        check_tensor(output, "output")?;
        check_same_dtype(weight, "weight", output, "output")?;
        let mut expected = input.lengths().to_vec();
        expected.push(weight.lengths()[1]);
        check_lengths(output, "output", &expected)?;
        Ok(FwdProblemDescription {
            input: input.clone(),
            weight: weight.clone(),
            output: output.clone(),
        })
    }

    pub fn input(&self) -> &TensorDescriptor {
        &self.input
    }

    pub fn weight(&self) -> &TensorDescriptor {
        &self.weight
    }

    pub fn num_embeddings(&self) -> usize {
        self.weight.lengths()[0]
    }

    pub fn embedding_dim(&self) -> usize {
        self.weight.lengths()[1]
    }

    pub fn is_all_contiguous(&self) -> bool {
        self.input.is_contiguous() && self.weight.is_contiguous() && self.output.is_contiguous()
    }
}

impl ProblemDescription for FwdProblemDescription {
    type InvokeParams = FwdInvokeParams;

    fn cache_key(&self) -> CacheKey {
        CacheKey::new("embedding_fwd")
            .tensor("input", &self.input)
            .tensor("weight", &self.weight)
            .tensor("output", &self.output)
    }
}

#[derive(Debug, Clone)]
pub struct FwdInvokeParams {
    pub input: DevicePtr,
    pub weight: DevicePtr,
    pub output: DevicePtr,
}

#[derive(Debug, Clone)]
pub struct BwdProblemDescription {
    input: TensorDescriptor,
    output_grad: TensorDescriptor,
    weight_grad: TensorDescriptor,
    padding_idx: Option<usize>,
}

impl BwdProblemDescription {
    pub fn new(
        input: &TensorDescriptor,
        output_grad: &TensorDescriptor,
        weight_grad: &TensorDescriptor,
        padding_idx: Option<i64>,
    ) -> Result<Self> {
        check_indices(input)?;
        check_tensor(output_grad, "output_grad")?;
        check_weight(weight_grad, "weight_grad")?;
        if output_grad.rank() != input.rank() + 1
            || output_grad.lengths()[..input.rank()] != *input.lengths()
        {
            return Err(bad_param(format!(
                "input lengths {:?} and output_grad lengths {:?} mismatch",
                input.lengths(),
                output_grad.lengths()
            )));
        }
        if output_grad.lengths().last() != Some(&weight_grad.lengths()[1]) {
            return Err(bad_param(format!(
                "weight_grad lengths {:?} and output_grad lengths {:?} mismatch",
                weight_grad.lengths(),
                output_grad.lengths()
            )));
        }
        check_same_dtype(weight_grad, "weight_grad", output_grad, "output_grad")?;
        let padding_idx = resolve_padding_idx(padding_idx, weight_grad.lengths()[0])?;
        Ok(BwdProblemDescription {
            input: input.clone(),
            output_grad: output_grad.clone(),
            weight_grad: weight_grad.clone(),
            padding_idx,
        })
    }

    pub fn input(&self) -> &TensorDescriptor {
        &self.input
    }

    pub fn weight_grad(&self) -> &TensorDescriptor {
        &self.weight_grad
    }

    pub fn padding_idx(&self) -> Option<usize> {
        self.padding_idx
    }

    pub fn num_embeddings(&self) -> usize {
        self.weight_grad.lengths()[0]
    }

    pub fn embedding_dim(&self) -> usize {
        self.weight_grad.lengths()[1]
    }

    pub fn is_all_contiguous(&self) -> bool {
        self.input.is_contiguous() && self.output_grad.is_contiguous() && self.weight_grad.is_contiguous()
    }
}

impl ProblemDescription for BwdProblemDescription {
    type InvokeParams = BwdInvokeParams;

    fn cache_key(&self) -> CacheKey {
        let padding = match self.padding_idx {
            Some(idx) => idx.to_string(),
            None => "none".to_string(),
        };
        CacheKey::new("embedding_bwd")
            .tensor("input", &self.input)
            .tensor("output_grad", &self.output_grad)
            .tensor("weight_grad", &self.weight_grad)
            .field("padding_idx", padding)
    }
}

/// `indices_freq` may be null; otherwise it holds one count per embedding
/// row, of the index dtype.
#[derive(Debug, Clone)]
pub struct BwdInvokeParams {
    pub weight_grad_desc: TensorDescriptor,
    pub input: DevicePtr,
    pub output_grad: DevicePtr,
    pub weight_grad: DevicePtr,
    pub indices_freq: DevicePtr,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tk_tensor::DType;

    fn f32s(lengths: &[usize]) -> TensorDescriptor {
        TensorDescriptor::contiguous(DType::F32, lengths)
    }

    fn i64s(lengths: &[usize]) -> TensorDescriptor {
        TensorDescriptor::contiguous(DType::I64, lengths)
    }

    #[test]
    fn test_forward_validation() {
        let w = f32s(&[10, 4]);
        assert!(FwdProblemDescription::new(&i64s(&[2, 3]), &w, &f32s(&[2, 3, 4])).is_ok());
        assert!(FwdProblemDescription::new(&i64s(&[2, 3]), &w, &f32s(&[2, 3, 5])).is_err());
        assert!(FwdProblemDescription::new(&f32s(&[2, 3]), &w, &f32s(&[2, 3, 4])).is_err());
        assert!(FwdProblemDescription::new(&i64s(&[1, 1, 1, 1, 2]), &w, &f32s(&[1, 1, 1, 1, 2, 4])).is_err());
        assert!(FwdProblemDescription::new(&i64s(&[2]), &f32s(&[10, 4, 1]), &f32s(&[2, 4])).is_err());
    }

    #[test]
    fn test_backward_validation() {
        let idx = i64s(&[2, 3]);
        let w = f32s(&[10, 4]);
        assert!(BwdProblemDescription::new(&idx, &f32s(&[2, 3, 4]), &w, None).is_ok());
        // output_grad rank must be input rank + 1
        assert!(BwdProblemDescription::new(&idx, &f32s(&[6, 4]), &w, None).is_err());
        // leading dims must match
        assert!(BwdProblemDescription::new(&idx, &f32s(&[3, 2, 4]), &w, None).is_err());
        // weight width must match the trailing output_grad dim
        assert!(BwdProblemDescription::new(&idx, &f32s(&[2, 3, 5]), &w, None).is_err());
        let half_w = TensorDescriptor::contiguous(DType::F16, &[10, 4]);
        assert!(BwdProblemDescription::new(&idx, &f32s(&[2, 3, 4]), &half_w, None).is_err());
    }

    #[test]
    fn test_padding_idx() {
        assert_eq!(resolve_padding_idx(None, 10).unwrap(), None);
        assert_eq!(resolve_padding_idx(Some(3), 10).unwrap(), Some(3));
        assert_eq!(resolve_padding_idx(Some(-1), 10).unwrap(), Some(9));
        assert!(resolve_padding_idx(Some(10), 10).is_err());
        assert!(resolve_padding_idx(Some(-11), 10).is_err());
    }
}
