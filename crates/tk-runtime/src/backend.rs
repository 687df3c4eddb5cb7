use std::fmt::Debug;

use crate::kernel::{KernelFn, KernelInfo};

/// Trait for pluggable kernel providers.
///
/// This is the seam where a real accelerator toolchain would compile kernel
/// source with the plan's build options. Implementations map a kernel
/// description (file, name, `-D` defines) to an executable body; the handle
/// caches the result per distinct description.
pub trait KernelSource: Send + Sync + Debug {
    /// Returns the name of this provider (e.g., "host").
    fn name(&self) -> &str;

    /// Resolve `info` to a kernel body, or `None` if the kernel is unknown or
    /// its build options select an unsupported type combination.
    fn build(&self, info: &KernelInfo) -> Option<KernelFn>;
}
