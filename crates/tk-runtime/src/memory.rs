use std::collections::HashMap;

use tk_tensor::Element;

use crate::error::{DeviceError, Result};

/// Address of a byte inside a device allocation.
///
/// Pointers are plain values: copying one does not copy memory, and they
/// may be offset into the middle of an allocation (`byte_add`), which is
/// how a workspace is carved into regions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct DevicePtr {
    buffer: u64,
    offset: usize,
}

impl DevicePtr {
    /// The null pointer; marks an absent optional buffer.
    pub const NULL: DevicePtr = DevicePtr {
        buffer: 0,
        offset: 0,
    };

    pub fn from_raw(buffer: u64, offset: usize) -> Self {
        DevicePtr { buffer, offset }
    }

    pub fn is_null(&self) -> bool {
        self.buffer == 0
    }

    pub fn buffer(&self) -> u64 {
        self.buffer
    }

    /// Byte offset from the start of the allocation.
    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn byte_add(self, bytes: usize) -> Self {
        DevicePtr {
            buffer: self.buffer,
            offset: self.offset + bytes,
        }
    }
}

/// Device-side storage: zero-initialized byte allocations.
#[derive(Debug, Default)]
pub struct DeviceMemory {
    buffers: HashMap<u64, Vec<u8>>,
    next_id: u64,
}

impl DeviceMemory {
    pub fn new() -> Self {
        DeviceMemory {
            buffers: HashMap::new(),
            next_id: 1,
        }
    }

    /// Allocate `bytes` zeroed bytes. Zero-sized requests still get a
    /// distinct, non-null pointer.
    pub fn alloc(&mut self, bytes: usize) -> DevicePtr {
        if self.next_id == 0 {
            self.next_id = 1;
        }
        let id = self.next_id;
        self.next_id += 1;
        self.buffers.insert(id, vec![0u8; bytes]);
        DevicePtr::from_raw(id, 0)
    }

    /// Release the allocation `ptr` points into.
    pub fn free(&mut self, ptr: DevicePtr) -> Result<()> {
        self.buffers
            .remove(&ptr.buffer)
            .map(|_| ())
            .ok_or(DeviceError::InvalidPointer(ptr.buffer))
    }

    /// Bytes addressable from `ptr` to the end of its allocation.
    pub fn size_of(&self, ptr: DevicePtr) -> Result<usize> {
        let buf = self.buffer(ptr)?;
        Ok(buf.len().saturating_sub(ptr.offset))
    }

    /// Total bytes currently allocated.
    pub fn allocated_bytes(&self) -> usize {
        self.buffers.values().map(Vec::len).sum()
    }

    /// Copy host elements to device memory starting at `ptr`.
    pub fn write<T: Element>(&mut self, ptr: DevicePtr, data: &[T]) -> Result<()> {
        let es = T::DTYPE.size_in_bytes();
        let range = self.checked_range(ptr, data.len() * es)?;
        let buf = self.buffer_mut(ptr)?;
        for (chunk, &value) in buf[range].chunks_exact_mut(es).zip(data) {
            value.write_le_slice(chunk);
        }
        Ok(())
    }

    /// Copy `len` elements starting at `ptr` back to the host.
    pub fn read<T: Element>(&self, ptr: DevicePtr, len: usize) -> Result<Vec<T>> {
        let es = T::DTYPE.size_in_bytes();
        let range = self.checked_range(ptr, len * es)?;
        let buf = self.buffer(ptr)?;
        Ok(buf[range].chunks_exact(es).map(T::from_le_slice).collect())
    }

    /// Set `bytes` bytes starting at `ptr` to `value`.
    pub fn fill(&mut self, ptr: DevicePtr, bytes: usize, value: u8) -> Result<()> {
        let range = self.checked_range(ptr, bytes)?;
        self.buffer_mut(ptr)?[range].fill(value);
        Ok(())
    }

    /// Take an allocation out of the table for the duration of a launch.
    pub(crate) fn checkout(&mut self, buffer: u64) -> Result<Vec<u8>> {
        self.buffers
            .remove(&buffer)
            .ok_or(DeviceError::InvalidPointer(buffer))
    }

    pub(crate) fn restore(&mut self, buffer: u64, bytes: Vec<u8>) {
        self.buffers.insert(buffer, bytes);
    }

    fn buffer(&self, ptr: DevicePtr) -> Result<&Vec<u8>> {
        self.buffers
            .get(&ptr.buffer)
            .ok_or(DeviceError::InvalidPointer(ptr.buffer))
    }

    fn buffer_mut(&mut self, ptr: DevicePtr) -> Result<&mut Vec<u8>> {
        self.buffers
            .get_mut(&ptr.buffer)
            .ok_or(DeviceError::InvalidPointer(ptr.buffer))
    }

    fn checked_range(&self, ptr: DevicePtr, len: usize) -> Result<std::ops::Range<usize>> {
        let size = self.buffer(ptr)?.len();
        let end = ptr.offset + len;
        if end > size {
            return Err(DeviceError::OutOfBounds {
                buffer: ptr.buffer,
                offset: ptr.offset as i64,
                len,
                size,
            });
        }
        Ok(ptr.offset..end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use half::f16;

    #[test]
    fn test_alloc_write_read() {
        let mut mem = DeviceMemory::new();
        let ptr = mem.alloc(16);
        assert!(!ptr.is_null());
        mem.write(ptr, &[1.0f32, 2.0, 3.0, 4.0]).unwrap();
        assert_eq!(mem.read::<f32>(ptr, 4).unwrap(), vec![1.0, 2.0, 3.0, 4.0]);
        assert_eq!(mem.read::<f32>(ptr.byte_add(8), 2).unwrap(), vec![3.0, 4.0]);
        assert_eq!(mem.size_of(ptr.byte_add(4)).unwrap(), 12);
    }

    #[test]
    fn test_zero_initialized() {
        let mut mem = DeviceMemory::new();
        let ptr = mem.alloc(6);
        assert_eq!(mem.read::<f16>(ptr, 3).unwrap(), vec![f16::ZERO; 3]);
    }

    #[test]
    fn test_out_of_bounds() {
        let mut mem = DeviceMemory::new();
        let ptr = mem.alloc(8);
        assert!(matches!(
            mem.write(ptr, &[0.0f64, 1.0]),
            Err(DeviceError::OutOfBounds { size: 8, .. })
        ));
        assert!(mem.read::<f32>(ptr.byte_add(6), 1).is_err());
    }

    #[test]
    fn test_free() {
        let mut mem = DeviceMemory::new();
        let a = mem.alloc(4);
        let b = mem.alloc(4);
        assert_ne!(a, b);
        assert_eq!(mem.allocated_bytes(), 8);
        mem.free(a).unwrap();
        assert_eq!(mem.free(a), Err(DeviceError::InvalidPointer(a.buffer())));
        assert!(mem.read::<u8>(a, 1).is_err());
        assert_eq!(mem.allocated_bytes(), 4);
    }

    #[test]
    fn test_fill() {
        let mut mem = DeviceMemory::new();
        let ptr = mem.alloc(4);
        mem.fill(ptr.byte_add(1), 2, 7).unwrap();
        assert_eq!(mem.read::<u8>(ptr, 4).unwrap(), vec![0, 7, 7, 0]);
    }
}
