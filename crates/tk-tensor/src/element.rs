use half::{bf16, f16};

use crate::dtype::DType;

/// A scalar type that can live in device memory.
///
/// Device buffers are plain byte arrays; kernels read and write elements
/// through the little-endian codec below and do their arithmetic in `f64`.
pub trait Element: Copy + Default + PartialEq + Send + Sync + 'static {
    /// The descriptor tag matching this Rust type.
    const DTYPE: DType;

    /// Decode one element from exactly `DTYPE.size_in_bytes()` bytes.
    fn from_le_slice(bytes: &[u8]) -> Self;

    /// Encode this element into exactly `DTYPE.size_in_bytes()` bytes.
    fn write_le_slice(self, out: &mut [u8]);

    fn to_f64(self) -> f64;

    fn from_f64(v: f64) -> Self;
}

macro_rules! impl_element {
    ($ty:ty, $dtype:expr, $n:expr, |$v:ident| $to:expr, |$x:ident| $from:expr) => {
        impl Element for $ty {
            const DTYPE: DType = $dtype;

            #[inline]
            fn from_le_slice(bytes: &[u8]) -> Self {
                let mut raw = [0u8; $n];
                raw.copy_from_slice(&bytes[..$n]);
                <$ty>::from_le_bytes(raw)
            }

            #[inline]
            fn write_le_slice(self, out: &mut [u8]) {
                out[..$n].copy_from_slice(&self.to_le_bytes());
            }

            #[inline]
            fn to_f64(self) -> f64 {
                let $v = self;
                $to
            }

            #[inline]
            fn from_f64($x: f64) -> Self {
                $from
            }
        }
    };
}

impl_element!(f32, DType::F32, 4, |v| v as f64, |x| x as f32);
impl_element!(f64, DType::F64, 8, |v| v, |x| x);
impl_element!(f16, DType::F16, 2, |v| v.to_f64(), |x| f16::from_f64(x));
impl_element!(bf16, DType::BF16, 2, |v| v.to_f64(), |x| bf16::from_f64(x));
impl_element!(i32, DType::I32, 4, |v| v as f64, |x| x as i32);
impl_element!(i64, DType::I64, 8, |v| v as f64, |x| x as i64);
impl_element!(u8, DType::U8, 1, |v| v as f64, |x| x as u8);

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip<T: Element + std::fmt::Debug>(value: T) {
        let mut buf = vec![0u8; T::DTYPE.size_in_bytes()];
        value.write_le_slice(&mut buf);
        assert_eq!(T::from_le_slice(&buf), value);
    }

    #[test]
    fn test_codec_roundtrip() {
        roundtrip(1.25f32);
        roundtrip(-3.5f64);
        roundtrip(f16::from_f32(0.5));
        roundtrip(bf16::from_f32(-2.0));
        roundtrip(-7i32);
        roundtrip(1i64 << 40);
        roundtrip(1u8);
    }

    #[test]
    fn test_dtype_tags() {
        assert_eq!(<f32 as Element>::DTYPE, DType::F32);
        assert_eq!(<f16 as Element>::DTYPE, DType::F16);
        assert_eq!(<bf16 as Element>::DTYPE, DType::BF16);
        assert_eq!(<i64 as Element>::DTYPE, DType::I64);
    }

    #[test]
    fn test_f64_conversion() {
        assert_eq!(f16::from_f64(1.5).to_f64(), 1.5);
        assert_eq!(<i32 as Element>::from_f64(3.0), 3);
    }
}
