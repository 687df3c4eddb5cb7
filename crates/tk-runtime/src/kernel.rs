use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tk_tensor::{DType, Element, TensorView5};

use crate::error::{DeviceError, Result};
use crate::memory::{DeviceMemory, DevicePtr};

/// Round `value` up to the next multiple of `multiple`.
pub fn align_up(value: usize, multiple: usize) -> usize {
    if multiple == 0 {
        return value;
    }
    value.div_ceil(multiple) * multiple
}

/// Ordered set of `-D` build defines that select a kernel variant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct BuildParams {
    defines: Vec<(String, String)>,
}

impl BuildParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a define. Returns self for builder-style usage.
    pub fn define(mut self, key: &str, value: impl ToString) -> Self {
        let value = value.to_string();
        match self.defines.iter_mut().find(|(k, _)| k == key) {
            Some(entry) => entry.1 = value,
            None => self.defines.push((key.to_string(), value)),
        }
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.defines
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Data type named by a type define such as `IO_TYPE=float`.
    pub fn dtype(&self, key: &str) -> Option<DType> {
        self.get(key).and_then(DType::from_kernel_type_name)
    }

    /// Render as a compiler option string: `-DIO_TYPE=float -DREDUCE_SIZE=1024`.
    pub fn generate(&self) -> String {
        self.defines
            .iter()
            .map(|(k, v)| format!("-D{k}={v}"))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// One entry of a kernel plan: which kernel to build and how to launch it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelInfo {
    pub file: String,
    pub name: String,
    pub build: BuildParams,
    pub local: [usize; 3],
    pub global: [usize; 3],
}

impl KernelInfo {
    pub fn new(
        file: &str,
        name: &str,
        build: BuildParams,
        local: [usize; 3],
        global: [usize; 3],
    ) -> Self {
        KernelInfo {
            file: file.to_string(),
            name: name.to_string(),
            build,
            local,
            global,
        }
    }

    /// A 1-D launch covering `count` work items in groups of `local`.
    pub fn linear(file: &str, name: &str, build: BuildParams, count: usize, local: usize) -> Self {
        Self::new(
            file,
            name,
            build,
            [local, 1, 1],
            [align_up(count.max(1), local), 1, 1],
        )
    }

    /// Identity of the compiled program: file, kernel name and options.
    pub fn program_key(&self) -> String {
        format!("{}:{}:{}", self.file, self.name, self.build.generate())
    }

    /// Check the work partition against a device's group size limit.
    pub fn validate(&self, max_local_size: usize) -> Result<()> {
        let fail = |reason: String| DeviceError::LaunchConfig {
            kernel: self.name.clone(),
            reason,
        };
        for d in 0..3 {
            if self.local[d] == 0 || self.global[d] == 0 {
                return Err(fail(format!("dimension {d} has a zero size")));
            }
            if self.global[d] % self.local[d] != 0 {
                return Err(fail(format!(
                    "global size {} is not a multiple of local size {} in dimension {d}",
                    self.global[d], self.local[d]
                )));
            }
        }
        let group: usize = self.local.iter().product();
        if group > max_local_size {
            return Err(fail(format!(
                "work-group of {group} items exceeds the limit of {max_local_size}"
            )));
        }
        Ok(())
    }
}

/// A kernel launch argument.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum KernelArg {
    Ptr(DevicePtr),
    Int(i64),
    Uint(u64),
    Float(f64),
    Flag(bool),
    View(TensorView5),
}

impl From<DevicePtr> for KernelArg {
    fn from(p: DevicePtr) -> Self {
        KernelArg::Ptr(p)
    }
}

impl From<i64> for KernelArg {
    fn from(v: i64) -> Self {
        KernelArg::Int(v)
    }
}

impl From<u64> for KernelArg {
    fn from(v: u64) -> Self {
        KernelArg::Uint(v)
    }
}

impl From<usize> for KernelArg {
    fn from(v: usize) -> Self {
        KernelArg::Uint(v as u64)
    }
}

impl From<f64> for KernelArg {
    fn from(v: f64) -> Self {
        KernelArg::Float(v)
    }
}

impl From<f32> for KernelArg {
    fn from(v: f32) -> Self {
        KernelArg::Float(v as f64)
    }
}

impl From<bool> for KernelArg {
    fn from(v: bool) -> Self {
        KernelArg::Flag(v)
    }
}

impl From<TensorView5> for KernelArg {
    fn from(v: TensorView5) -> Self {
        KernelArg::View(v)
    }
}

/// Executable kernel body.
///
/// Bodies iterate their own work items: elementwise kernels loop over
/// `0..global_size(0)`, group-structured kernels loop over `num_groups(0)`.
pub type KernelFn = fn(&mut KernelContext<'_>) -> Result<()>;

/// A kernel realized from a [`KernelInfo`] by a kernel source.
#[derive(Clone)]
pub struct Kernel {
    pub info: Arc<KernelInfo>,
    pub func: KernelFn,
}

impl fmt::Debug for Kernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Kernel")
            .field("name", &self.info.name)
            .field("options", &self.info.build.generate())
            .field("local", &self.info.local)
            .field("global", &self.info.global)
            .finish()
    }
}

impl Kernel {
    pub fn name(&self) -> &str {
        &self.info.name
    }

    /// Run the kernel to completion against `memory`.
    ///
    /// Every allocation named by a pointer argument is moved out of the
    /// memory table for the duration of the body and put back afterwards,
    /// whether the body succeeds or not.
    pub(crate) fn launch(&self, memory: &mut DeviceMemory, args: &[KernelArg]) -> Result<()> {
        let mut buffers = HashMap::new();
        for arg in args {
            if let KernelArg::Ptr(p) = arg {
                if p.is_null() || buffers.contains_key(&p.buffer()) {
                    continue;
                }
                match memory.checkout(p.buffer()) {
                    Ok(bytes) => {
                        buffers.insert(p.buffer(), bytes);
                    }
                    Err(e) => {
                        restore_all(memory, buffers);
                        return Err(e);
                    }
                }
            }
        }

        let mut ctx = KernelContext {
            info: &self.info,
            args,
            buffers,
        };
        let result = (self.func)(&mut ctx);
        restore_all(memory, ctx.buffers);
        result
    }
}

fn restore_all(memory: &mut DeviceMemory, buffers: HashMap<u64, Vec<u8>>) {
    for (id, bytes) in buffers {
        memory.restore(id, bytes);
    }
}

/// What a kernel body sees while it runs: its arguments, the memory they
/// point to, and the launch geometry.
pub struct KernelContext<'a> {
    info: &'a KernelInfo,
    args: &'a [KernelArg],
    buffers: HashMap<u64, Vec<u8>>,
}

impl<'a> KernelContext<'a> {
    pub fn name(&self) -> &str {
        &self.info.name
    }

    pub fn build(&self) -> &BuildParams {
        &self.info.build
    }

    pub fn global_size(&self, dim: usize) -> usize {
        self.info.global[dim]
    }

    pub fn local_size(&self, dim: usize) -> usize {
        self.info.local[dim]
    }

    pub fn num_groups(&self, dim: usize) -> usize {
        self.info.global[dim] / self.info.local[dim]
    }

    fn arg(&self, index: usize, expected: &'static str) -> Result<&KernelArg> {
        self.args.get(index).ok_or_else(|| self.bad_arg(index, expected))
    }

    fn bad_arg(&self, index: usize, expected: &'static str) -> DeviceError {
        DeviceError::BadArgument {
            kernel: self.info.name.clone(),
            index,
            expected,
        }
    }

    pub fn ptr(&self, index: usize) -> Result<DevicePtr> {
        match self.arg(index, "pointer")? {
            KernelArg::Ptr(p) => Ok(*p),
            _ => Err(self.bad_arg(index, "pointer")),
        }
    }

    pub fn is_null(&self, index: usize) -> Result<bool> {
        Ok(self.ptr(index)?.is_null())
    }

    pub fn int(&self, index: usize) -> Result<i64> {
        match self.arg(index, "integer")? {
            KernelArg::Int(v) => Ok(*v),
            KernelArg::Uint(v) => Ok(*v as i64),
            _ => Err(self.bad_arg(index, "integer")),
        }
    }

    pub fn uint(&self, index: usize) -> Result<u64> {
        match self.arg(index, "unsigned integer")? {
            KernelArg::Uint(v) => Ok(*v),
            KernelArg::Int(v) if *v >= 0 => Ok(*v as u64),
            _ => Err(self.bad_arg(index, "unsigned integer")),
        }
    }

    pub fn float(&self, index: usize) -> Result<f64> {
        match self.arg(index, "float")? {
            KernelArg::Float(v) => Ok(*v),
            _ => Err(self.bad_arg(index, "float")),
        }
    }

    pub fn flag(&self, index: usize) -> Result<bool> {
        match self.arg(index, "flag")? {
            KernelArg::Flag(v) => Ok(*v),
            _ => Err(self.bad_arg(index, "flag")),
        }
    }

    pub fn view(&self, index: usize) -> Result<TensorView5> {
        match self.arg(index, "tensor view")? {
            KernelArg::View(v) => Ok(*v),
            _ => Err(self.bad_arg(index, "tensor view")),
        }
    }

    /// Byte range of element `elem` relative to pointer argument `arg`.
    fn locate(&self, arg: usize, elem: i64, size: usize) -> Result<(u64, usize)> {
        let ptr = self.ptr(arg)?;
        if ptr.is_null() {
            return Err(DeviceError::NullPointer {
                kernel: self.info.name.clone(),
                index: arg,
            });
        }
        let len = self
            .buffers
            .get(&ptr.buffer())
            .map(Vec::len)
            .ok_or(DeviceError::InvalidPointer(ptr.buffer()))?;
        let start = ptr.offset() as i64 + elem * size as i64;
        if start < 0 || start as usize + size > len {
            return Err(DeviceError::OutOfBounds {
                buffer: ptr.buffer(),
                offset: start,
                len: size,
                size: len,
            });
        }
        Ok((ptr.buffer(), start as usize))
    }

    /// Read element `elem` of the buffer behind pointer argument `arg`.
    #[inline]
    pub fn load<T: Element>(&self, arg: usize, elem: i64) -> Result<T> {
        let size = T::DTYPE.size_in_bytes();
        let (buffer, start) = self.locate(arg, elem, size)?;
        let bytes = &self.buffers[&buffer][start..start + size];
        Ok(T::from_le_slice(bytes))
    }

    /// Write element `elem` of the buffer behind pointer argument `arg`.
    #[inline]
    pub fn store<T: Element>(&mut self, arg: usize, elem: i64, value: T) -> Result<()> {
        let size = T::DTYPE.size_in_bytes();
        let (buffer, start) = self.locate(arg, elem, size)?;
        if let Some(bytes) = self.buffers.get_mut(&buffer) {
            value.write_le_slice(&mut bytes[start..start + size]);
        }
        Ok(())
    }
}
