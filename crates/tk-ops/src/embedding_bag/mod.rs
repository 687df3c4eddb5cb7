//! Embedding bags: look up rows like `embedding`, then sum, average or
//! max-pool the rows of each bag into one output row.

pub mod problem;
pub mod solvers;

use tk_runtime::{DevicePtr, Handle};

use crate::error::Result;
use crate::problem::TensorRef;

pub use problem::{EmbeddingBagMode, FwdInvokeParams, FwdProblemDescription};
use solvers::FORWARD;

/// Reduce the weight rows named by each bag of `input` into `output`
/// (`[bags, dim]`).
///
/// Without `offsets`, `input` is `[bags, bag_size]`. With them, `input` is
/// a flat index list and bag `b` spans `offsets[b]..offsets[b + 1]`, the
/// last bag running to the end. `per_sample_weights` scale each looked-up
/// row and are only accepted in [`EmbeddingBagMode::Sum`]. Out-of-range
/// indices are skipped; an empty bag produces a zero row.
pub fn embedding_bag_forward(
    handle: &mut Handle,
    mode: EmbeddingBagMode,
    input: TensorRef<'_>,
    offsets: Option<TensorRef<'_>>,
    weight: TensorRef<'_>,
    per_sample_weights: Option<TensorRef<'_>>,
    output: TensorRef<'_>,
) -> Result<()> {
    let problem = FwdProblemDescription::new(
        mode,
        input.desc,
        offsets.map(|t| t.desc),
        weight.desc,
        per_sample_weights.map(|t| t.desc),
        output.desc,
    )?;
    let params = FwdInvokeParams {
        input: input.ptr,
        offsets: offsets.map_or(DevicePtr::NULL, |t| t.ptr),
        weight: weight.ptr,
        per_sample_weights: per_sample_weights.map_or(DevicePtr::NULL, |t| t.ptr),
        output: output.ptr,
    };
    FORWARD.execute(handle, &problem, &params)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Status;
    use crate::kernels::HostKernels;
    use crate::testing::{assert_close, download, quantize, random_values, upload};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::sync::Arc;
    use tk_tensor::{DType, TensorDescriptor};

    fn handle() -> Handle {
        Handle::new(Arc::new(HostKernels))
    }

    fn host_bags(
        mode: EmbeddingBagMode,
        idx: &[i64],
        bounds: &[(usize, usize)],
        weight: &[f64],
        dim: usize,
        psw: Option<&[f64]>,
    ) -> Vec<f64> {
        let num_embeddings = (weight.len() / dim) as i64;
        let mut out = Vec::new();
        for &(start, end) in bounds {
            for d in 0..dim {
                let values: Vec<f64> = (start..end)
                    .filter(|&i| (0..num_embeddings).contains(&idx[i]))
                    .map(|i| weight[idx[i] as usize * dim + d] * psw.map_or(1.0, |p| p[i]))
                    .collect();
                out.push(match mode {
                    _ if values.is_empty() => 0.0,
                    EmbeddingBagMode::Sum => values.iter().sum(),
                    EmbeddingBagMode::Mean => values.iter().sum::<f64>() / values.len() as f64,
                    EmbeddingBagMode::Max => values.iter().cloned().fold(f64::NEG_INFINITY, f64::max),
                });
            }
        }
        out
    }

    fn as_f64(v: &[i64]) -> Vec<f64> {
        v.iter().map(|&x| x as f64).collect()
    }

    #[test]
    fn test_fixed_bags_all_modes() {
        let mut h = handle();
        let mut rng = StdRng::seed_from_u64(51);
        let (num_embeddings, dim, bags, bag_size) = (20usize, 6usize, 7usize, 5usize);
        for dtype in [DType::F32, DType::F16, DType::BF16] {
            for mode in [EmbeddingBagMode::Sum, EmbeddingBagMode::Mean, EmbeddingBagMode::Max] {
                let idx_desc = TensorDescriptor::contiguous(DType::I64, &[bags, bag_size]);
                let w_desc = TensorDescriptor::contiguous(dtype, &[num_embeddings, dim]);
                let out_desc = TensorDescriptor::contiguous(dtype, &[bags, dim]);
                let idx: Vec<i64> = (0..bags * bag_size)
                    .map(|_| rng.gen_range(0..num_embeddings as i64))
                    .collect();
                let w = quantize(dtype, &random_values(&mut rng, num_embeddings * dim, -1.0, 1.0));

                let ii = upload(&mut h, &idx_desc, &as_f64(&idx));
                let wi = upload(&mut h, &w_desc, &w);
                let oi = h.alloc(out_desc.byte_space());
                embedding_bag_forward(
                    &mut h,
                    mode,
                    TensorRef::new(&idx_desc, ii),
                    None,
                    TensorRef::new(&w_desc, wi),
                    None,
                    TensorRef::new(&out_desc, oi),
                )
                .unwrap();

                let bounds: Vec<_> = (0..bags).map(|b| (b * bag_size, (b + 1) * bag_size)).collect();
                let expected = host_bags(mode, &idx, &bounds, &w, dim, None);
                assert_close(dtype, &download(&h, &out_desc, oi), &expected);
            }
        }
    }

    #[test]
    fn test_offsets_with_empty_bag_and_bad_index() {
        let mut h = handle();
        let idx_desc = TensorDescriptor::contiguous(DType::I32, &[5]);
        let off_desc = TensorDescriptor::contiguous(DType::I32, &[3]);
        let w_desc = TensorDescriptor::contiguous(DType::F32, &[3, 2]);
        let out_desc = TensorDescriptor::contiguous(DType::F32, &[3, 2]);
        // bags: [0, 2), [2, 2) empty, [2, 5) with an out-of-range index
        let ii = upload(&mut h, &idx_desc, &[0.0, 2.0, 1.0, 7.0, 2.0]);
        let offs = upload(&mut h, &off_desc, &[0.0, 2.0, 2.0]);
        let wi = upload(&mut h, &w_desc, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let out = h.alloc(out_desc.byte_space());
        embedding_bag_forward(
            &mut h,
            EmbeddingBagMode::Mean,
            TensorRef::new(&idx_desc, ii),
            Some(TensorRef::new(&off_desc, offs)),
            TensorRef::new(&w_desc, wi),
            None,
            TensorRef::new(&out_desc, out),
        )
        .unwrap();
        // the bad index is not counted in the mean of the last bag
        assert_eq!(
            download(&h, &out_desc, out),
            vec![3.0, 4.0, 0.0, 0.0, 4.0, 5.0]
        );
    }

    #[test]
    fn test_per_sample_weights() {
        let mut h = handle();
        let mut rng = StdRng::seed_from_u64(52);
        let (num_embeddings, dim, n) = (12usize, 4usize, 30usize);
        let idx: Vec<i64> = (0..n).map(|_| rng.gen_range(0..num_embeddings as i64)).collect();
        let offsets = vec![0i64, 4, 4, 17, 29];
        let idx_desc = TensorDescriptor::contiguous(DType::I64, &[n]);
        let off_desc = TensorDescriptor::contiguous(DType::I64, &[offsets.len()]);
        let w_desc = TensorDescriptor::contiguous(DType::F32, &[num_embeddings, dim]);
        let psw_desc = TensorDescriptor::contiguous(DType::F32, &[n]);
        let out_desc = TensorDescriptor::contiguous(DType::F32, &[offsets.len(), dim]);
        let w = quantize(DType::F32, &random_values(&mut rng, num_embeddings * dim, -1.0, 1.0));
        let psw = quantize(DType::F32, &random_values(&mut rng, n, 0.0, 2.0));

        let ii = upload(&mut h, &idx_desc, &as_f64(&idx));
        let offs = upload(&mut h, &off_desc, &as_f64(&offsets));
        let wi = upload(&mut h, &w_desc, &w);
        let pi = upload(&mut h, &psw_desc, &psw);
        let out = h.alloc(out_desc.byte_space());
        embedding_bag_forward(
            &mut h,
            EmbeddingBagMode::Sum,
            TensorRef::new(&idx_desc, ii),
            Some(TensorRef::new(&off_desc, offs)),
            TensorRef::new(&w_desc, wi),
            Some(TensorRef::new(&psw_desc, pi)),
            TensorRef::new(&out_desc, out),
        )
        .unwrap();

        let bounds = [(0, 4), (4, 4), (4, 17), (17, 29), (29, n)];
        let expected = host_bags(EmbeddingBagMode::Sum, &idx, &bounds, &w, dim, Some(&psw));
        assert_close(DType::F32, &download(&h, &out_desc, out), &expected);
    }

    #[test]
    fn test_weighted_mean_rejected() {
        let mut h = handle();
        let idx_desc = TensorDescriptor::contiguous(DType::I64, &[2, 3]);
        let w_desc = TensorDescriptor::contiguous(DType::F32, &[4, 2]);
        let psw_desc = TensorDescriptor::contiguous(DType::F32, &[2, 3]);
        let out_desc = TensorDescriptor::contiguous(DType::F32, &[2, 2]);
        let ptr = h.alloc(64);
        let result = embedding_bag_forward(
            &mut h,
            EmbeddingBagMode::Mean,
            TensorRef::new(&idx_desc, ptr),
            None,
            TensorRef::new(&w_desc, ptr),
            Some(TensorRef::new(&psw_desc, ptr)),
            TensorRef::new(&out_desc, ptr),
        );
        assert_eq!(Status::from(&result), Status::BadParam);
        assert_eq!(h.invoker_count(), 0);
    }

    #[test]
    fn test_strided_weight_not_implemented() {
        let mut h = handle();
        let idx_desc = TensorDescriptor::contiguous(DType::I64, &[2, 3]);
        let w_desc = TensorDescriptor::new(DType::F32, &[4, 2], &[1, 4]).unwrap();
        let out_desc = TensorDescriptor::contiguous(DType::F32, &[2, 2]);
        let ptr = h.alloc(64);
        let result = embedding_bag_forward(
            &mut h,
            EmbeddingBagMode::Max,
            TensorRef::new(&idx_desc, ptr),
            None,
            TensorRef::new(&w_desc, ptr),
            None,
            TensorRef::new(&out_desc, ptr),
        );
        assert_eq!(Status::from(&result), Status::NotImplemented);
    }
}
