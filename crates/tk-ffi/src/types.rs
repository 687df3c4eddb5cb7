use tk_ops::{EmbeddingBagMode, Reduction, Status};
use tk_runtime::DevicePtr;
use tk_tensor::DType;

/// Status codes returned by all FFI functions.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TkStatus {
    Success = 0,
    BadParam = 1,
    NotImplemented = 2,
    InternalError = 3,
}

impl From<Status> for TkStatus {
    fn from(status: Status) -> Self {
        match status {
            Status::Success => TkStatus::Success,
            Status::BadParam => TkStatus::BadParam,
            Status::NotImplemented => TkStatus::NotImplemented,
            Status::InternalError => TkStatus::InternalError,
        }
    }
}

/// Element types of a tensor descriptor.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TkDataType {
    Half = 0,
    BFloat16 = 1,
    Float = 2,
    Double = 3,
    Int32 = 4,
    Int64 = 5,
    UInt8 = 6,
}

impl From<TkDataType> for DType {
    fn from(dtype: TkDataType) -> Self {
        match dtype {
            TkDataType::Half => DType::F16,
            TkDataType::BFloat16 => DType::BF16,
            TkDataType::Float => DType::F32,
            TkDataType::Double => DType::F64,
            TkDataType::Int32 => DType::I32,
            TkDataType::Int64 => DType::I64,
            TkDataType::UInt8 => DType::U8,
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TkReduction {
    None = 0,
    Sum = 1,
    Mean = 2,
}

impl From<TkReduction> for Reduction {
    fn from(reduction: TkReduction) -> Self {
        match reduction {
            TkReduction::None => Reduction::None,
            TkReduction::Sum => Reduction::Sum,
            TkReduction::Mean => Reduction::Mean,
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TkEmbeddingBagMode {
    Sum = 0,
    Mean = 1,
    Max = 2,
}

impl From<TkEmbeddingBagMode> for EmbeddingBagMode {
    fn from(mode: TkEmbeddingBagMode) -> Self {
        match mode {
            TkEmbeddingBagMode::Sum => EmbeddingBagMode::Sum,
            TkEmbeddingBagMode::Mean => EmbeddingBagMode::Mean,
            TkEmbeddingBagMode::Max => EmbeddingBagMode::Max,
        }
    }
}

/// A device address: allocation id plus byte offset. `buffer == 0` is null.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TkDevicePtr {
    pub buffer: u64,
    pub offset: usize,
}

impl TkDevicePtr {
    pub const NULL: TkDevicePtr = TkDevicePtr { buffer: 0, offset: 0 };
}

impl From<TkDevicePtr> for DevicePtr {
    fn from(ptr: TkDevicePtr) -> Self {
        DevicePtr::from_raw(ptr.buffer, ptr.offset)
    }
}

impl From<DevicePtr> for TkDevicePtr {
    fn from(ptr: DevicePtr) -> Self {
        TkDevicePtr {
            buffer: ptr.buffer(),
            offset: ptr.offset(),
        }
    }
}
