use std::time::Instant;

use crate::error::Result;
use crate::kernel::{Kernel, KernelArg};
use crate::memory::DeviceMemory;

/// A timestamp recorded on a stream.
#[derive(Debug, Clone, Copy)]
pub struct Event {
    at: Instant,
}

impl Event {
    /// Milliseconds between this event and a later one.
    pub fn elapsed_ms(&self, later: &Event) -> f32 {
        later.at.saturating_duration_since(self.at).as_secs_f32() * 1000.0
    }
}

/// In-order execution queue.
///
/// Launches complete before `submit` returns, so submission order is
/// execution order and every launch observes the writes of the previous
/// one.
#[derive(Debug, Default)]
pub struct Stream {
    launches: u64,
}

impl Stream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn submit(
        &mut self,
        memory: &mut DeviceMemory,
        kernel: &Kernel,
        args: &[KernelArg],
    ) -> Result<()> {
        self.launches += 1;
        kernel.launch(memory, args)
    }

    pub fn record(&self) -> Event {
        Event { at: Instant::now() }
    }

    /// Wait for all submitted work. Nothing is ever pending on this stream.
    pub fn synchronize(&self) {}

    /// Number of launches submitted so far.
    pub fn launches(&self) -> u64 {
        self.launches
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::{BuildParams, KernelContext, KernelInfo};
    use std::sync::Arc;

    fn increment(ctx: &mut KernelContext<'_>) -> Result<()> {
        let v: i32 = ctx.load(0, 0)?;
        ctx.store(0, 0, v + 1)
    }

    #[test]
    fn test_in_order_execution() {
        let mut mem = DeviceMemory::new();
        let counter = mem.alloc(4);
        let kernel = Kernel {
            info: Arc::new(KernelInfo::linear("T.cl", "Inc", BuildParams::new(), 1, 1)),
            func: increment,
        };
        let mut stream = Stream::new();
        let start = stream.record();
        for _ in 0..5 {
            stream
                .submit(&mut mem, &kernel, &[KernelArg::from(counter)])
                .unwrap();
        }
        stream.synchronize();
        let stop = stream.record();
        assert_eq!(mem.read::<i32>(counter, 1).unwrap(), vec![5]);
        assert_eq!(stream.launches(), 5);
        assert!(start.elapsed_ms(&stop) >= 0.0);
        assert_eq!(stop.elapsed_ms(&start), 0.0);
    }
}
