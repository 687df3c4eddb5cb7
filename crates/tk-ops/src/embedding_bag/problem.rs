use std::fmt;

use tk_runtime::DevicePtr;
use tk_tensor::TensorDescriptor;

use crate::embedding::problem::check_weight;
use crate::error::{bad_param, Result};
use crate::problem::{
    check_index, check_lengths, check_same_dtype, check_same_lengths, check_tensor, CacheKey,
    ProblemDescription,
};

/// How the rows of one bag are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EmbeddingBagMode {
    Sum,
    Mean,
    Max,
}

impl fmt::Display for EmbeddingBagMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EmbeddingBagMode::Sum => "sum",
            EmbeddingBagMode::Mean => "mean",
            EmbeddingBagMode::Max => "max",
        })
    }
}

#[derive(Debug, Clone)]
pub struct FwdProblemDescription {
    mode: EmbeddingBagMode,
    input: TensorDescriptor,
    offsets: Option<TensorDescriptor>,
    weight: TensorDescriptor,
    per_sample_weights: Option<TensorDescriptor>,
    output: TensorDescriptor,
}

impl FwdProblemDescription {
    /// `input` is either `[bags, bag_size]` without offsets, or a flat
    /// `[n]` list split into bags by the 1-D `offsets`.
    pub fn new(
        mode: EmbeddingBagMode,
        input: &TensorDescriptor,
        offsets: Option<&TensorDescriptor>,
        weight: &TensorDescriptor,
        per_sample_weights: Option<&TensorDescriptor>,
        output: &TensorDescriptor,
    ) -> Result<Self> {
        check_tensor(input, "input")?;
        check_index(input, "input")?;
        check_weight(weight, "weight")?;
        check_tensor(output, "output")?;
        check_same_dtype(weight, "weight", output, "output")?;

        let bags = match offsets {
            Some(offsets) => {
                if input.rank() != 1 {
                    return Err(bad_param(format!(
                        "input must be 1-D when offsets are given, got lengths {:?}",
                        input.lengths()
                    )));
                }
                check_tensor(offsets, "offsets")?;
                if offsets.rank() != 1 {
                    return Err(bad_param(format!(
                        "offsets must be 1-D, got lengths {:?}",
                        offsets.lengths()
                    )));
                }
                check_same_dtype(input, "input", offsets, "offsets")?;
                offsets.lengths()[0]
            }
            None => {
                if input.rank() != 2 {
                    return Err(bad_param(format!(
                        "input must be 2-D [bags, bag_size] without offsets, got lengths {:?}",
                        input.lengths()
                    )));
                }
                input.lengths()[0]
            }
        };

        if let Some(psw) = per_sample_weights {
            if mode != EmbeddingBagMode::Sum {
                return Err(bad_param(format!(
                    "per_sample_weights are only supported with sum mode, got {mode}"
                )));
            }
            check_tensor(psw, "per_sample_weights")?;
            check_same_lengths(psw, "per_sample_weights", input, "input")?;
            check_same_dtype(psw, "per_sample_weights", weight, "weight")?;
        }

        check_lengths(output, "output", &[bags, weight.lengths()[1]])?;
        Ok(FwdProblemDescription {
            mode,
            input: input.clone(),
            offsets: offsets.cloned(),
            weight: weight.clone(),
            per_sample_weights: per_sample_weights.cloned(),
            output: output.clone(),
        })
    }

    pub fn mode(&self) -> EmbeddingBagMode {
        self.mode
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

    pub fn bags(&self) -> usize {
        self.output.lengths()[0]
    }

    /// Indices per bag without offsets; with offsets, the total index
    /// count that bounds the last bag.
    pub fn bag_size(&self) -> usize {
        match self.offsets {
            Some(_) => self.input.lengths()[0],
            None => self.input.lengths()[1],
        }
    }

    pub fn is_all_contiguous(&self) -> bool {
        self.input.is_contiguous()
            && self.weight.is_contiguous()
            && self.output.is_contiguous()
            && self.offsets.as_ref().map_or(true, TensorDescriptor::is_contiguous)
            && self
                .per_sample_weights
                .as_ref()
                .map_or(true, TensorDescriptor::is_contiguous)
    }
}

impl ProblemDescription for FwdProblemDescription {
    type InvokeParams = FwdInvokeParams;

    fn cache_key(&self) -> CacheKey {
        let mut key = CacheKey::new("embedding_bag_fwd")
            .field("mode", self.mode)
            .tensor("input", &self.input);
        if let Some(offsets) = &self.offsets {
            key = key.tensor("offsets", offsets);
        }
        key = key.tensor("weight", &self.weight);
        if let Some(psw) = &self.per_sample_weights {
            key = key.tensor("per_sample_weights", psw);
        }
        key.tensor("output", &self.output)
    }
}

/// `offsets` and `per_sample_weights` are null when the problem was built
/// without them.
#[derive(Debug, Clone)]
pub struct FwdInvokeParams {
    pub input: DevicePtr,
    pub offsets: DevicePtr,
    pub weight: DevicePtr,
    pub per_sample_weights: DevicePtr,
    pub output: DevicePtr,
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
    fn test_fixed_size_bags() {
        let w = f32s(&[10, 4]);
        let p = FwdProblemDescription::new(EmbeddingBagMode::Mean, &i64s(&[3, 5]), None, &w, None, &f32s(&[3, 4]))
            .unwrap();
        assert_eq!((p.bags(), p.bag_size()), (3, 5));
        // flat input needs offsets
        assert!(FwdProblemDescription::new(EmbeddingBagMode::Sum, &i64s(&[15]), None, &w, None, &f32s(&[3, 4])).is_err());
        assert!(FwdProblemDescription::new(EmbeddingBagMode::Sum, &i64s(&[3, 5]), None, &w, None, &f32s(&[5, 4])).is_err());
    }

    #[test]
    fn test_offsets() {
        let w = f32s(&[10, 4]);
        let idx = i64s(&[15]);
        let p = FwdProblemDescription::new(EmbeddingBagMode::Max, &idx, Some(&i64s(&[6])), &w, None, &f32s(&[6, 4]))
            .unwrap();
        assert_eq!((p.bags(), p.bag_size()), (6, 15));
        let i32_offsets = TensorDescriptor::contiguous(DType::I32, &[6]);
        assert!(FwdProblemDescription::new(EmbeddingBagMode::Sum, &idx, Some(&i32_offsets), &w, None, &f32s(&[6, 4])).is_err());
        // 2-D input with offsets
        assert!(FwdProblemDescription::new(EmbeddingBagMode::Sum, &i64s(&[3, 5]), Some(&i64s(&[3])), &w, None, &f32s(&[3, 4])).is_err());
    }

    #[test]
    fn test_per_sample_weights() {
        let w = f32s(&[10, 4]);
        let idx = i64s(&[3, 5]);
        let out = f32s(&[3, 4]);
        let psw = f32s(&[3, 5]);
        assert!(FwdProblemDescription::new(EmbeddingBagMode::Sum, &idx, None, &w, Some(&psw), &out).is_ok());
        assert!(FwdProblemDescription::new(EmbeddingBagMode::Mean, &idx, None, &w, Some(&psw), &out).is_err());
        assert!(FwdProblemDescription::new(EmbeddingBagMode::Sum, &idx, None, &w, Some(&f32s(&[15])), &out).is_err());
        let half = TensorDescriptor::contiguous(DType::F16, &[3, 5]);
        assert!(FwdProblemDescription::new(EmbeddingBagMode::Sum, &idx, None, &w, Some(&half), &out).is_err());
    }

    #[test]
    fn test_key_separates_modes_and_optional_operands() {
        let w = f32s(&[10, 4]);
        let idx = i64s(&[3, 5]);
        let out = f32s(&[3, 4]);
        let key = |mode, psw: Option<&TensorDescriptor>| {
            FwdProblemDescription::new(mode, &idx, None, &w, psw, &out).unwrap().cache_key()
        };
        assert_ne!(key(EmbeddingBagMode::Sum, None), key(EmbeddingBagMode::Mean, None));
        assert_ne!(key(EmbeddingBagMode::Sum, None), key(EmbeddingBagMode::Sum, Some(&f32s(&[3, 5]))));
    }
}
