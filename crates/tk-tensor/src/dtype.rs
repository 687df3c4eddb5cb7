use std::fmt;

/// Element data types understood by descriptors and kernels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DType {
    /// 16-bit floating point (IEEE 754 half-precision, via the `half` crate).
    F16,
    /// 16-bit brain floating point (8-bit exponent, 7-bit mantissa).
    BF16,
    /// 32-bit floating point.
    F32,
    /// 64-bit floating point.
    F64,
    /// 32-bit signed integer, used for index tensors.
    I32,
    /// 64-bit signed integer, used for index tensors.
    I64,
    /// 8-bit unsigned integer, used for boolean condition masks.
    U8,
}

impl DType {
    /// Returns the size in bytes of a single element.
    pub fn size_in_bytes(&self) -> usize {
        match self {
            DType::U8 => 1,
            DType::F16 | DType::BF16 => 2,
            DType::F32 | DType::I32 => 4,
            DType::F64 | DType::I64 => 8,
        }
    }

    /// Returns true for the floating point types.
    pub fn is_float(&self) -> bool {
        matches!(self, DType::F16 | DType::BF16 | DType::F32 | DType::F64)
    }

    /// Returns true for types accepted as gather/embedding indices.
    pub fn is_index(&self) -> bool {
        matches!(self, DType::I32 | DType::I64)
    }

    /// Name of the type as it appears in kernel build options (`IO_TYPE=...`).
    pub fn kernel_type_name(&self) -> &'static str {
        match self {
            DType::F16 => "half",
            DType::BF16 => "bfloat16",
            DType::F32 => "float",
            DType::F64 => "double",
            DType::I32 => "int",
            DType::I64 => "long",
            DType::U8 => "uchar",
        }
    }

    /// Inverse of [`DType::kernel_type_name`].
    pub fn from_kernel_type_name(name: &str) -> Option<DType> {
        match name {
            "half" => Some(DType::F16),
            "bfloat16" => Some(DType::BF16),
            "float" => Some(DType::F32),
            "double" => Some(DType::F64),
            "int" => Some(DType::I32),
            "long" => Some(DType::I64),
            "uchar" => Some(DType::U8),
            _ => None,
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DType::F16 => write!(f, "f16"),
            DType::BF16 => write!(f, "bf16"),
            DType::F32 => write!(f, "f32"),
            DType::F64 => write!(f, "f64"),
            DType::I32 => write!(f, "i32"),
            DType::I64 => write!(f, "i64"),
            DType::U8 => write!(f, "u8"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [DType; 7] = [
        DType::F16,
        DType::BF16,
        DType::F32,
        DType::F64,
        DType::I32,
        DType::I64,
        DType::U8,
    ];

    #[test]
    fn test_size_in_bytes() {
        assert_eq!(DType::F16.size_in_bytes(), 2);
        assert_eq!(DType::BF16.size_in_bytes(), 2);
        assert_eq!(DType::F32.size_in_bytes(), 4);
        assert_eq!(DType::F64.size_in_bytes(), 8);
        assert_eq!(DType::I64.size_in_bytes(), 8);
        assert_eq!(DType::U8.size_in_bytes(), 1);
    }

    #[test]
    fn test_kernel_type_name_roundtrip() {
        for dtype in ALL {
            let back = DType::from_kernel_type_name(dtype.kernel_type_name()).unwrap();
            assert_eq!(dtype, back);
        }
    }

    #[test]
    fn test_kernel_type_name_unknown() {
        assert!(DType::from_kernel_type_name("quad").is_none());
    }

    #[test]
    fn test_classification() {
        assert!(DType::BF16.is_float());
        assert!(!DType::I32.is_float());
        assert!(DType::I64.is_index());
        assert!(!DType::U8.is_index());
    }
}
