use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DeviceError {
    #[error("invalid device pointer: buffer {0} is not allocated")]
    InvalidPointer(u64),
    #[error("kernel {kernel}: argument {index} is a null pointer")]
    NullPointer { kernel: String, index: usize },
    #[error(
        "out-of-bounds access to buffer {buffer}: byte offset {offset}, {len} bytes, allocation is {size} bytes"
    )]
    OutOfBounds {
        buffer: u64,
        offset: i64,
        len: usize,
        size: usize,
    },
    #[error("kernel {kernel}: argument {index} is missing or not a {expected}")]
    BadArgument {
        kernel: String,
        index: usize,
        expected: &'static str,
    },
    #[error("no kernel `{name}` in {file} for options `{options}`")]
    KernelNotFound {
        file: String,
        name: String,
        options: String,
    },
    #[error("invalid launch configuration for {kernel}: {reason}")]
    LaunchConfig { kernel: String, reason: String },
}

pub type Result<T> = std::result::Result<T, DeviceError>;
