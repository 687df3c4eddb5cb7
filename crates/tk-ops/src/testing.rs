//! Shared helpers for operator tests: host-side layout, random inputs and
//! the RMS error metric used for tolerance checks.

use half::{bf16, f16};
use rand::rngs::StdRng;
use rand::Rng;
use tk_runtime::{DevicePtr, Handle};
use tk_tensor::{DType, Element, TensorDescriptor, TensorView5};

/// Allowed RMS error for results of `dtype`.
pub(crate) fn tolerance(dtype: DType) -> f64 {
    match dtype {
        DType::F16 => 8.2e-3,
        DType::BF16 => 8.2e-3 * 8.0,
        _ => 1.5e-6,
    }
}

/// Root-mean-square difference, relative to the largest magnitude seen.
pub(crate) fn rms_range(a: &[f64], b: &[f64]) -> f64 {
    assert_eq!(a.len(), b.len());
    if a.is_empty() {
        return 0.0;
    }
    let sq: f64 = a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum();
    let mag = a
        .iter()
        .chain(b)
        .fold(f64::MIN_POSITIVE, |m, v| m.max(v.abs()));
    (sq / a.len() as f64).sqrt() / mag
}

pub(crate) fn assert_close(dtype: DType, got: &[f64], expected: &[f64]) {
    let err = rms_range(got, expected);
    assert!(
        err <= tolerance(dtype),
        "rms error {err} exceeds {} for {dtype}",
        tolerance(dtype)
    );
}

pub(crate) fn random_values(rng: &mut StdRng, n: usize, lo: f64, hi: f64) -> Vec<f64> {
    (0..n).map(|_| rng.gen_range(lo..hi)).collect()
}

/// Values as they read back after a round trip through `dtype`.
pub(crate) fn quantize(dtype: DType, values: &[f64]) -> Vec<f64> {
    values
        .iter()
        .map(|&v| match dtype {
            DType::F16 => f16::from_f64(v).to_f64(),
            DType::BF16 => bf16::from_f64(v).to_f64(),
            DType::F32 => v as f32 as f64,
            _ => v,
        })
        .collect()
}

/// A non-contiguous layout: strides of the lengths with the first and last
/// dimensions exchanged, then the first and last strides exchanged back.
pub(crate) fn swapped_strides(dtype: DType, lengths: &[usize]) -> TensorDescriptor {
    let mut swapped = lengths.to_vec();
    let last = swapped.len() - 1;
    swapped.swap(0, last);
    let mut strides = TensorDescriptor::contiguous(dtype, &swapped).strides().to_vec();
    strides.swap(0, last);
    TensorDescriptor::new(dtype, lengths, &strides).unwrap()
}

fn scatter<T: Element>(desc: &TensorDescriptor, values: &[f64]) -> Vec<T> {
    let view = TensorView5::from_descriptor(desc).unwrap();
    let mut host = vec![T::default(); desc.element_space()];
    for (i, &v) in values.iter().enumerate() {
        host[view.offset_at(i as i64) as usize] = T::from_f64(v);
    }
    host
}

/// Allocate a buffer for `desc` and store `values` in logical order.
pub(crate) fn upload(handle: &mut Handle, desc: &TensorDescriptor, values: &[f64]) -> DevicePtr {
    assert_eq!(values.len(), desc.element_count());
    match desc.dtype() {
        DType::F32 => handle.alloc_with(&scatter::<f32>(desc, values)),
        DType::F64 => handle.alloc_with(&scatter::<f64>(desc, values)),
        DType::F16 => handle.alloc_with(&scatter::<f16>(desc, values)),
        DType::BF16 => handle.alloc_with(&scatter::<bf16>(desc, values)),
        DType::I32 => handle.alloc_with(&scatter::<i32>(desc, values)),
        DType::I64 => handle.alloc_with(&scatter::<i64>(desc, values)),
        DType::U8 => handle.alloc_with(&scatter::<u8>(desc, values)),
    }
    .unwrap()
}

fn gather<T: Element>(handle: &Handle, desc: &TensorDescriptor, ptr: DevicePtr) -> Vec<f64> {
    let host = handle.read::<T>(ptr, desc.element_space()).unwrap();
    let view = TensorView5::from_descriptor(desc).unwrap();
    (0..desc.element_count() as i64)
        .map(|i| host[view.offset_at(i) as usize].to_f64())
        .collect()
}

/// Read `desc`'s elements back in logical order.
pub(crate) fn download(handle: &Handle, desc: &TensorDescriptor, ptr: DevicePtr) -> Vec<f64> {
    match desc.dtype() {
        DType::F32 => gather::<f32>(handle, desc, ptr),
        DType::F64 => gather::<f64>(handle, desc, ptr),
        DType::F16 => gather::<f16>(handle, desc, ptr),
        DType::BF16 => gather::<bf16>(handle, desc, ptr),
        DType::I32 => gather::<i32>(handle, desc, ptr),
        DType::I64 => gather::<i64>(handle, desc, ptr),
        DType::U8 => gather::<u8>(handle, desc, ptr),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::create_handle_with_config;
    use tk_runtime::ExecutionConfig;

    #[test]
    fn test_swapped_strides() {
        let d = swapped_strides(DType::F32, &[2, 3, 4]);
        // contiguous strides of [4, 3, 2] are [6, 2, 1]
        assert_eq!(d.strides(), &[1, 2, 6]);
        assert!(!d.is_contiguous());
        assert_eq!(d.element_space(), 24);
    }

    #[test]
    fn test_upload_download_strided() {
        let mut h = create_handle_with_config(ExecutionConfig::default());
        let d = swapped_strides(DType::F16, &[3, 2, 5]);
        let values: Vec<f64> = (0..30).map(|v| v as f64).collect();
        let ptr = upload(&mut h, &d, &values);
        assert_eq!(download(&h, &d, ptr), values);
    }

    #[test]
    fn test_rms_range() {
        assert_eq!(rms_range(&[1.0, 2.0], &[1.0, 2.0]), 0.0);
        assert!((rms_range(&[0.0, 2.0], &[0.0, 1.0]) - (0.5f64).sqrt() / 2.0).abs() < 1e-12);
    }
}
