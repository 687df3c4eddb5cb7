//! `tk-runtime` - Execution substrate for tensor-kernels operators.
//!
//! The accelerator is modelled in-process: device memory is a set of byte
//! allocations addressed by [`DevicePtr`], kernels are compiled from a
//! [`KernelInfo`] by a pluggable [`KernelSource`], and launches run in
//! submission order on a single [`Stream`] owned by the [`Handle`].

pub mod backend;
pub mod config;
pub mod error;
pub mod handle;
pub mod kernel;
pub mod memory;
pub mod stream;

pub use backend::KernelSource;
pub use config::ExecutionConfig;
pub use error::{DeviceError, Result};
pub use handle::{Handle, ProfilingScope};
pub use kernel::{align_up, BuildParams, Kernel, KernelArg, KernelContext, KernelFn, KernelInfo};
pub use memory::{DeviceMemory, DevicePtr};
pub use stream::{Event, Stream};
