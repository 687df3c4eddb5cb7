use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use log::{debug, trace};
use tk_tensor::Element;

use crate::backend::KernelSource;
use crate::config::ExecutionConfig;
use crate::error::{DeviceError, Result};
use crate::kernel::{Kernel, KernelArg, KernelFn, KernelInfo};
use crate::memory::{DeviceMemory, DevicePtr};
use crate::stream::{Event, Stream};

/// Everything an operator call needs: device memory, the execution stream,
/// the kernel source, compiled programs, cached invokers, and the profiling
/// state.
///
/// A handle is used by one thread at a time; share it across threads by
/// wrapping it in a `Mutex`.
pub struct Handle {
    memory: DeviceMemory,
    stream: Stream,
    source: Arc<dyn KernelSource>,
    config: ExecutionConfig,
    programs: HashMap<String, KernelFn>,
    invokers: HashMap<String, Arc<dyn Any + Send + Sync>>,
    profiling: bool,
    kernel_time_ms: f32,
}

impl Handle {
    pub fn new(source: Arc<dyn KernelSource>) -> Self {
        Self::with_config(source, ExecutionConfig::default())
    }

    pub fn with_config(source: Arc<dyn KernelSource>, config: ExecutionConfig) -> Self {
        Handle {
            memory: DeviceMemory::new(),
            stream: Stream::new(),
            source,
            profiling: config.profiling,
            config,
            programs: HashMap::new(),
            invokers: HashMap::new(),
            kernel_time_ms: 0.0,
        }
    }

    pub fn config(&self) -> &ExecutionConfig {
        &self.config
    }

    pub fn source_name(&self) -> &str {
        self.source.name()
    }

    pub fn memory(&self) -> &DeviceMemory {
        &self.memory
    }

    pub fn stream(&self) -> &Stream {
        &self.stream
    }

    // ---- Device memory ----

    pub fn alloc(&mut self, bytes: usize) -> DevicePtr {
        self.memory.alloc(bytes)
    }

    /// Allocate a buffer holding exactly `data`.
    pub fn alloc_with<T: Element>(&mut self, data: &[T]) -> Result<DevicePtr> {
        let ptr = self.memory.alloc(std::mem::size_of_val(data));
        self.memory.write(ptr, data)?;
        Ok(ptr)
    }

    /// Allocate `len` zeroed elements of `T`.
    pub fn alloc_zeroed<T: Element>(&mut self, len: usize) -> DevicePtr {
        self.memory.alloc(len * T::DTYPE.size_in_bytes())
    }

    pub fn free(&mut self, ptr: DevicePtr) -> Result<()> {
        self.memory.free(ptr)
    }

    pub fn write<T: Element>(&mut self, ptr: DevicePtr, data: &[T]) -> Result<()> {
        self.memory.write(ptr, data)
    }

    pub fn read<T: Element>(&self, ptr: DevicePtr, len: usize) -> Result<Vec<T>> {
        self.memory.read(ptr, len)
    }

    // ---- Profiling ----

    pub fn enable_profiling(&mut self, enable: bool) {
        self.profiling = enable;
    }

    pub fn is_profiling_enabled(&self) -> bool {
        self.profiling
    }

    /// Kernel time of the last profiled call, in milliseconds.
    pub fn kernel_time(&self) -> f32 {
        self.kernel_time_ms
    }

    pub fn reset_kernel_time(&mut self) {
        self.kernel_time_ms = 0.0;
    }

    pub fn accum_kernel_time(&mut self, ms: f32) {
        self.kernel_time_ms += ms;
    }

    /// Start timing a multi-launch call.
    ///
    /// Per-launch timing is switched off until the scope ends so the
    /// launches inside are measured as one span. Dropping the scope, on
    /// any path, restores the previous profiling mode.
    pub fn profiling_scope(&mut self) -> ProfilingScope<'_> {
        let was_enabled = self.profiling;
        self.profiling = false;
        let start = was_enabled.then(|| self.stream.record());
        ProfilingScope {
            handle: self,
            was_enabled,
            start,
        }
    }

    // ---- Kernels ----

    /// Realize `info` into a runnable kernel, reusing a previously built
    /// program with the same file, name and options.
    pub fn compile(&mut self, info: &KernelInfo) -> Result<Kernel> {
        info.validate(self.config.max_local_size)?;
        let key = info.program_key();
        let func = match self.programs.get(&key) {
            Some(&func) => {
                debug!("program cache hit: {key}");
                func
            }
            None => {
                debug!("program cache miss: {key} (source: {})", self.source.name());
                let func = self
                    .source
                    .build(info)
                    .ok_or_else(|| DeviceError::KernelNotFound {
                        file: info.file.clone(),
                        name: info.name.clone(),
                        options: info.build.generate(),
                    })?;
                self.programs.insert(key, func);
                func
            }
        };
        Ok(Kernel {
            info: Arc::new(info.clone()),
            func,
        })
    }

    /// Submit one launch. With profiling on, its duration becomes the
    /// handle's kernel time.
    pub fn run(&mut self, kernel: &Kernel, args: &[KernelArg]) -> Result<()> {
        trace!(
            "launch {} global={:?} local={:?}",
            kernel.name(),
            kernel.info.global,
            kernel.info.local
        );
        if !self.profiling {
            return self.stream.submit(&mut self.memory, kernel, args);
        }
        let start = self.stream.record();
        self.stream.submit(&mut self.memory, kernel, args)?;
        self.stream.synchronize();
        let stop = self.stream.record();
        self.kernel_time_ms = start.elapsed_ms(&stop);
        Ok(())
    }

    /// Number of programs compiled so far.
    pub fn program_count(&self) -> usize {
        self.programs.len()
    }

    // ---- Invoker cache ----

    pub fn cached_invoker<T: Any + Send + Sync>(&self, key: &str) -> Option<Arc<T>> {
        self.invokers
            .get(key)
            .cloned()
            .and_then(|entry| entry.downcast::<T>().ok())
    }

    pub fn cache_invoker<T: Any + Send + Sync>(&mut self, key: String, invoker: Arc<T>) {
        self.invokers.insert(key, invoker);
    }

    pub fn invoker_count(&self) -> usize {
        self.invokers.len()
    }

    pub fn clear_invoker_cache(&mut self) {
        self.invokers.clear();
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle")
            .field("source", &self.source.name())
            .field("config", &self.config)
            .field("allocated_bytes", &self.memory.allocated_bytes())
            .field("launches", &self.stream.launches())
            .field("programs", &self.programs.len())
            .field("invokers", &self.invokers.len())
            .field("profiling", &self.profiling)
            .field("kernel_time_ms", &self.kernel_time_ms)
            .finish()
    }
}

/// Guard returned by [`Handle::profiling_scope`]. Derefs to the handle so
/// launches go through it.
pub struct ProfilingScope<'a> {
    handle: &'a mut Handle,
    was_enabled: bool,
    start: Option<Event>,
}

impl ProfilingScope<'_> {
    /// Close the span: wait for the stream and, if profiling was on when
    /// the scope opened, store the elapsed time as the handle's kernel time.
    pub fn finish(mut self) -> Option<f32> {
        let start = self.start?;
        self.handle.stream.synchronize();
        let stop = self.handle.stream.record();
        let elapsed = start.elapsed_ms(&stop);
        self.handle.reset_kernel_time();
        self.handle.accum_kernel_time(elapsed);
        Some(elapsed)
    }
}

impl Deref for ProfilingScope<'_> {
    type Target = Handle;

    fn deref(&self) -> &Handle {
        self.handle
    }
}

impl DerefMut for ProfilingScope<'_> {
    fn deref_mut(&mut self) -> &mut Handle {
        self.handle
    }
}

impl Drop for ProfilingScope<'_> {
    fn drop(&mut self) {
        self.handle.profiling = self.was_enabled;
    }
}
