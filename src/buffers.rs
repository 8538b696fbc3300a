// src/buffers.rs - Buffer allocation across the three memory classes

//! Buffer allocation and ownership for host-plain, host-pinned, and
//! device memory.
//!
//! Each memory class has exactly one allocation path and exactly one
//! release path, and release happens in `Drop`, so pairing a buffer with
//! the wrong deallocator is unrepresentable: plain host buffers are
//! `Vec`-backed, pinned host buffers carry their own page-aligned raw
//! allocation, and device buffers release their heap handle through the
//! engine when dropped.
//!
//! Pinned memory models page-locked allocation: a structurally distinct
//! allocator whose failure mode is separate from plain host allocation.
//! Pinned-vs-plain mismatches are a classic latent bug in transfer code,
//! which is why the matrix toggles it independently.

use crate::element::Element;
use crate::engine::{DeviceEngine, DeviceHandle, DeviceMemoryError};
use std::alloc::{alloc_zeroed, dealloc, Layout};
use std::marker::PhantomData;
use std::ptr::NonNull;
use thiserror::Error;

/// Page size used for pinned allocations.
const PINNED_PAGE_ALIGN: usize = 4096;

/// Which memory space a buffer lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryClass {
    /// Ordinary pageable host heap memory.
    HostPlain,
    /// Page-locked host memory, eligible for direct-memory-access transfers.
    HostPinned,
    /// Device-resident memory.
    Device,
}

impl MemoryClass {
    /// Short name used in logs and diagnostics.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            MemoryClass::HostPlain => "host-plain",
            MemoryClass::HostPinned => "host-pinned",
            MemoryClass::Device => "device",
        }
    }

    /// True for either host class.
    #[must_use]
    pub const fn is_host(self) -> bool {
        matches!(self, MemoryClass::HostPlain | MemoryClass::HostPinned)
    }
}

/// Buffer allocation failures, one variant per failing allocator.
#[derive(Debug, Clone, Error)]
pub enum AllocationError {
    /// Buffers of zero elements are not allocatable.
    #[error("cannot allocate a zero-element buffer")]
    ZeroCount,
    /// The plain host allocator could not satisfy the request.
    #[error("host allocation of {bytes} bytes failed")]
    HostOutOfMemory {
        /// Requested size in bytes.
        bytes: usize,
    },
    /// The pinned host allocator could not satisfy the request. Distinct
    /// from plain host failure: pinned capacity is typically far smaller.
    #[error("pinned host allocation of {bytes} bytes failed")]
    PinnedOutOfMemory {
        /// Requested size in bytes.
        bytes: usize,
    },
    /// The device heap could not satisfy the request.
    #[error(transparent)]
    Device(#[from] DeviceMemoryError),
}

/// Page-aligned, page-locked host allocation.
///
/// Owns a raw allocation released by its own `Drop`; this is the one
/// release path for pinned memory.
#[derive(Debug)]
pub struct PinnedAlloc<T> {
    ptr: NonNull<T>,
    count: usize,
    layout: Layout,
}

impl<T: Element> PinnedAlloc<T> {
    fn new(count: usize) -> Result<Self, AllocationError> {
        let bytes = count
            .checked_mul(T::SIZE)
            .ok_or(AllocationError::PinnedOutOfMemory { bytes: usize::MAX })?;
        let layout = Layout::from_size_align(bytes, PINNED_PAGE_ALIGN)
            .map_err(|_| AllocationError::PinnedOutOfMemory { bytes })?;
        // SAFETY: layout has nonzero size (count > 0 enforced by the
        // allocator) and page alignment exceeds T's alignment. Zeroed
        // bytes are a valid value for every supported element type.
        let raw = unsafe { alloc_zeroed(layout) };
        let ptr = NonNull::new(raw.cast::<T>())
            .ok_or(AllocationError::PinnedOutOfMemory { bytes })?;
        Ok(Self { ptr, count, layout })
    }

    fn as_slice(&self) -> &[T] {
        // SAFETY: ptr is valid for count elements for the life of self.
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.count) }
    }

    fn as_mut_slice(&mut self) -> &mut [T] {
        // SAFETY: as above, and &mut self guarantees exclusivity.
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.count) }
    }
}

impl<T> Drop for PinnedAlloc<T> {
    fn drop(&mut self) {
        // SAFETY: allocated with exactly this layout in `new`.
        unsafe { dealloc(self.ptr.as_ptr().cast::<u8>(), self.layout) };
    }
}

#[derive(Debug)]
enum HostStorage<T> {
    Plain(Vec<T>),
    Pinned(PinnedAlloc<T>),
}

/// A host-resident buffer of `T`, plain or pinned.
///
/// Element count and memory class are fixed at allocation.
#[derive(Debug)]
pub struct HostBuffer<T> {
    storage: HostStorage<T>,
}

impl<T: Element> HostBuffer<T> {
    /// The buffer's memory class.
    #[must_use]
    pub fn class(&self) -> MemoryClass {
        match self.storage {
            HostStorage::Plain(_) => MemoryClass::HostPlain,
            HostStorage::Pinned(_) => MemoryClass::HostPinned,
        }
    }

    /// Element count.
    #[must_use]
    pub fn len(&self) -> usize {
        match &self.storage {
            HostStorage::Plain(v) => v.len(),
            HostStorage::Pinned(p) => p.count,
        }
    }

    /// True if the buffer holds no elements (never, by construction).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Shared view of the elements.
    #[must_use]
    pub fn as_slice(&self) -> &[T] {
        match &self.storage {
            HostStorage::Plain(v) => v.as_slice(),
            HostStorage::Pinned(p) => p.as_slice(),
        }
    }

    /// Exclusive view of the elements.
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        match &mut self.storage {
            HostStorage::Plain(v) => v.as_mut_slice(),
            HostStorage::Pinned(p) => p.as_mut_slice(),
        }
    }

    /// Populate every element from its index.
    pub fn fill_with(&mut self, f: impl Fn(usize) -> T) {
        for (i, slot) in self.as_mut_slice().iter_mut().enumerate() {
            *slot = f(i);
        }
    }

    /// Size of the buffer contents in bytes.
    #[must_use]
    pub fn size_bytes(&self) -> usize {
        self.len() * T::SIZE
    }
}

/// A device-resident buffer of `T`.
///
/// Owns a device heap handle; the handle is released through the engine
/// when the buffer drops, which is the one release path for device memory.
#[derive(Debug)]
pub struct DeviceBuffer<T> {
    handle: DeviceHandle,
    count: usize,
    engine: DeviceEngine,
    _elements: PhantomData<T>,
}

impl<T: Element> DeviceBuffer<T> {
    /// The device heap handle backing this buffer.
    #[must_use]
    pub fn handle(&self) -> DeviceHandle {
        self.handle
    }

    /// Element count.
    #[must_use]
    pub fn len(&self) -> usize {
        self.count
    }

    /// True if the buffer holds no elements (never, by construction).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Size of the buffer contents in bytes.
    #[must_use]
    pub fn size_bytes(&self) -> usize {
        self.count * T::SIZE
    }
}

impl<T> Drop for DeviceBuffer<T> {
    fn drop(&mut self) {
        self.engine.release(self.handle);
    }
}

/// The single allocation surface for all three memory classes.
#[derive(Debug, Clone)]
pub struct BufferAllocator {
    engine: DeviceEngine,
}

impl BufferAllocator {
    /// Bind an allocator to the scenario's device engine.
    #[must_use]
    pub fn new(engine: DeviceEngine) -> Self {
        Self { engine }
    }

    /// Allocate a zeroed host buffer of `count` elements in the requested
    /// host class.
    ///
    /// # Panics
    /// Panics if called with [`MemoryClass::Device`]; device buffers come
    /// from [`BufferAllocator::device`], which returns a different type.
    pub fn host<T: Element>(
        &self,
        class: MemoryClass,
        count: usize,
    ) -> Result<HostBuffer<T>, AllocationError> {
        if count == 0 {
            return Err(AllocationError::ZeroCount);
        }
        let storage = match class {
            MemoryClass::HostPlain => {
                let bytes = count
                    .checked_mul(T::SIZE)
                    .ok_or(AllocationError::HostOutOfMemory { bytes: usize::MAX })?;
                let mut v: Vec<T> = Vec::new();
                v.try_reserve_exact(count)
                    .map_err(|_| AllocationError::HostOutOfMemory { bytes })?;
                v.resize(count, T::default());
                HostStorage::Plain(v)
            }
            MemoryClass::HostPinned => HostStorage::Pinned(PinnedAlloc::new(count)?),
            MemoryClass::Device => panic!("host() called with MemoryClass::Device"),
        };
        tracing::debug!(
            "allocated {} {} buffer: {} x {}",
            class.label(),
            T::KIND,
            count,
            T::SIZE
        );
        Ok(HostBuffer { storage })
    }

    /// Allocate a zeroed device buffer of `count` elements.
    pub fn device<T: Element>(&self, count: usize) -> Result<DeviceBuffer<T>, AllocationError> {
        if count == 0 {
            return Err(AllocationError::ZeroCount);
        }
        let bytes = count.checked_mul(T::SIZE).ok_or_else(|| {
            AllocationError::Device(DeviceMemoryError::OutOfMemory {
                requested: usize::MAX,
                available: self.engine.available_bytes(),
            })
        })?;
        let handle = self.engine.alloc(bytes)?;
        tracing::debug!(
            "allocated device {} buffer: handle {handle}, {count} x {}",
            T::KIND,
            T::SIZE
        );
        Ok(DeviceBuffer {
            handle,
            count,
            engine: self.engine.clone(),
            _elements: PhantomData,
        })
    }
}
