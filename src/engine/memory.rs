// src/engine/memory.rs - Device heap modeling for the reference engine

//! Handle-addressed device memory with a finite capacity.
//!
//! The reference engine models device-resident memory as a table of
//! byte-storage allocations keyed by opaque handles. A configurable
//! capacity makes device out-of-memory a reachable, testable failure mode
//! with the same `required`/`available` diagnostics a real backend reports.

use std::collections::HashMap;
use thiserror::Error;

/// Errors raised by device-heap operations.
#[derive(Debug, Clone, Error)]
pub enum DeviceMemoryError {
    /// The heap cannot satisfy the requested allocation.
    #[error("device out of memory: requested {requested} bytes, {available} available")]
    OutOfMemory {
        /// Bytes requested by the failed allocation.
        requested: usize,
        /// Bytes still unallocated in the heap.
        available: usize,
    },
    /// The handle does not name a live allocation.
    #[error("unknown device memory handle {0}")]
    UnknownHandle(u64),
    /// A device-side copy was attempted between differently-sized allocations.
    #[error("device copy size mismatch: dst {dst_bytes} bytes, src {src_bytes} bytes")]
    SizeMismatch {
        /// Destination allocation size in bytes.
        dst_bytes: usize,
        /// Source allocation size in bytes.
        src_bytes: usize,
    },
}

/// Opaque handle naming one live device allocation.
pub type DeviceHandle = u64;

/// The device memory pool: allocations keyed by handle, bounded by capacity.
#[derive(Debug)]
pub struct DeviceHeap {
    allocations: HashMap<DeviceHandle, Vec<u8>>,
    capacity_bytes: usize,
    used_bytes: usize,
    next_handle: DeviceHandle,
}

impl DeviceHeap {
    /// Create a heap with the given total capacity in bytes.
    #[must_use]
    pub fn new(capacity_bytes: usize) -> Self {
        Self {
            allocations: HashMap::new(),
            capacity_bytes,
            used_bytes: 0,
            next_handle: 1,
        }
    }

    /// Allocate `bytes` of zeroed device memory, returning its handle.
    pub fn alloc(&mut self, bytes: usize) -> Result<DeviceHandle, DeviceMemoryError> {
        let available = self.capacity_bytes - self.used_bytes;
        if bytes > available {
            return Err(DeviceMemoryError::OutOfMemory {
                requested: bytes,
                available,
            });
        }
        let handle = self.next_handle;
        self.next_handle += 1;
        self.allocations.insert(handle, vec![0u8; bytes]);
        self.used_bytes += bytes;
        Ok(handle)
    }

    /// Release the allocation named by `handle`.
    pub fn free(&mut self, handle: DeviceHandle) -> Result<(), DeviceMemoryError> {
        match self.allocations.remove(&handle) {
            Some(storage) => {
                self.used_bytes -= storage.len();
                Ok(())
            }
            None => Err(DeviceMemoryError::UnknownHandle(handle)),
        }
    }

    /// Immutable view of an allocation's bytes.
    pub fn bytes(&self, handle: DeviceHandle) -> Result<&[u8], DeviceMemoryError> {
        self.allocations
            .get(&handle)
            .map(Vec::as_slice)
            .ok_or(DeviceMemoryError::UnknownHandle(handle))
    }

    /// Mutable view of an allocation's bytes.
    pub fn bytes_mut(&mut self, handle: DeviceHandle) -> Result<&mut [u8], DeviceMemoryError> {
        self.allocations
            .get_mut(&handle)
            .map(Vec::as_mut_slice)
            .ok_or(DeviceMemoryError::UnknownHandle(handle))
    }

    /// Copy one whole allocation into another (device-to-device).
    pub fn copy(
        &mut self,
        dst: DeviceHandle,
        src: DeviceHandle,
    ) -> Result<(), DeviceMemoryError> {
        let src_bytes = self.bytes(src)?.len();
        let dst_bytes = self.bytes(dst)?.len();
        if src_bytes != dst_bytes {
            return Err(DeviceMemoryError::SizeMismatch {
                dst_bytes,
                src_bytes,
            });
        }
        // HashMap cannot hand out two borrows at once; detach the
        // destination for the duration of the copy.
        let mut dst_storage = self
            .allocations
            .remove(&dst)
            .ok_or(DeviceMemoryError::UnknownHandle(dst))?;
        dst_storage.copy_from_slice(self.bytes(src).expect("src handle verified above"));
        self.allocations.insert(dst, dst_storage);
        Ok(())
    }

    /// Overwrite every byte of an allocation with `value` (device memset).
    pub fn fill(&mut self, handle: DeviceHandle, value: u8) -> Result<(), DeviceMemoryError> {
        self.bytes_mut(handle)?.fill(value);
        Ok(())
    }

    /// Run `op` with mutable access to `dst` and shared access to `a`/`b`.
    ///
    /// This is the access pattern of a two-input elementwise kernel. `dst`
    /// must be distinct from both sources.
    pub fn with_dst_and_sources<F>(
        &mut self,
        dst: DeviceHandle,
        a: DeviceHandle,
        b: DeviceHandle,
        op: F,
    ) -> Result<(), DeviceMemoryError>
    where
        F: FnOnce(&mut [u8], &[u8], &[u8]),
    {
        // Validate all three up front so the detach below cannot leak.
        self.bytes(a)?;
        self.bytes(b)?;
        let mut dst_storage = self
            .allocations
            .remove(&dst)
            .ok_or(DeviceMemoryError::UnknownHandle(dst))?;
        let a_bytes = self.bytes(a).expect("src handle verified above");
        let b_bytes = self.bytes(b).expect("src handle verified above");
        op(&mut dst_storage, a_bytes, b_bytes);
        self.allocations.insert(dst, dst_storage);
        Ok(())
    }

    /// Bytes currently allocated.
    #[must_use]
    pub fn used_bytes(&self) -> usize {
        self.used_bytes
    }

    /// Bytes still available for allocation.
    #[must_use]
    pub fn available_bytes(&self) -> usize {
        self.capacity_bytes - self.used_bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alloc_free_accounting() {
        let mut heap = DeviceHeap::new(1024);
        let h = heap.alloc(600).unwrap();
        assert_eq!(heap.used_bytes(), 600);
        assert_eq!(heap.available_bytes(), 424);
        heap.free(h).unwrap();
        assert_eq!(heap.used_bytes(), 0);
    }

    #[test]
    fn test_out_of_memory_reports_availability() {
        let mut heap = DeviceHeap::new(1024);
        let _h = heap.alloc(1000).unwrap();
        let err = heap.alloc(100).unwrap_err();
        match err {
            DeviceMemoryError::OutOfMemory {
                requested,
                available,
            } => {
                assert_eq!(requested, 100);
                assert_eq!(available, 24);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_unknown_handle() {
        let mut heap = DeviceHeap::new(64);
        assert!(matches!(
            heap.free(42),
            Err(DeviceMemoryError::UnknownHandle(42))
        ));
        assert!(heap.bytes(7).is_err());
    }

    #[test]
    fn test_device_copy_and_fill() {
        let mut heap = DeviceHeap::new(64);
        let src = heap.alloc(8).unwrap();
        let dst = heap.alloc(8).unwrap();
        heap.bytes_mut(src).unwrap().copy_from_slice(&[1, 2, 3, 4, 5, 6, 7, 8]);
        heap.copy(dst, src).unwrap();
        assert_eq!(heap.bytes(dst).unwrap(), &[1, 2, 3, 4, 5, 6, 7, 8]);

        heap.fill(src, 0x5A).unwrap();
        assert_eq!(heap.bytes(src).unwrap(), &[0x5A; 8]);
        // The copy made earlier must be unaffected by the fill.
        assert_eq!(heap.bytes(dst).unwrap(), &[1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn test_copy_size_mismatch() {
        let mut heap = DeviceHeap::new(64);
        let src = heap.alloc(8).unwrap();
        let dst = heap.alloc(4).unwrap();
        assert!(matches!(
            heap.copy(dst, src),
            Err(DeviceMemoryError::SizeMismatch { .. })
        ));
    }
}
