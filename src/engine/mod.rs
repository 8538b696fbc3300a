// src/engine/mod.rs - Reference copy/compute engine

//! In-process reference implementation of the copy/compute engine.
//!
//! The verification layers above (buffers, transfer, matrix) consume a
//! narrow contract: allocate/free device memory, blocking host↔device
//! copies, enqueued device-to-device copies, fills and kernel launches,
//! and a blocking synchronize. This module provides that contract against
//! a modeled device so the whole matrix runs on any host.
//!
//! # Module Organization
//! - `memory`: handle-addressed device heap with capacity accounting
//! - `queue`: single in-order command queue (worker thread)
//! - `kernels`: launch geometry and the vector-add oracle kernel

pub mod kernels;
pub mod memory;
pub mod queue;

pub use kernels::{vector_add, LaunchConfig, LaunchError};
pub use memory::{DeviceHandle, DeviceHeap, DeviceMemoryError};
pub use queue::{CommandQueue, QueueError};

use crate::element::Element;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Errors surfaced through the engine facade.
#[derive(Debug, Clone, Error)]
pub enum EngineError {
    /// A device memory operation failed.
    #[error(transparent)]
    Memory(#[from] DeviceMemoryError),
    /// Queue submission or synchronization failed.
    #[error(transparent)]
    Queue(#[from] QueueError),
}

/// Engine construction parameters.
#[derive(Debug, Clone, Copy)]
pub struct DeviceConfig {
    /// Modeled device memory capacity in bytes.
    pub memory_bytes: usize,
    /// Modeled compute-unit count, used to derive the block budget.
    pub compute_units: u32,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            memory_bytes: 1 << 30,
            compute_units: 16,
        }
    }
}

#[derive(Debug)]
struct EngineInner {
    heap: Arc<Mutex<DeviceHeap>>,
    queue: CommandQueue,
    compute_units: u32,
}

/// Handle to one device context: heap plus its ordered command queue.
///
/// Cheaply cloneable; clones share the same device. Dropping the last
/// clone shuts the worker down. One engine is constructed per scenario,
/// so no device state leaks across scenario boundaries.
///
/// # Panics
/// Methods panic if the internal heap mutex is poisoned.
#[derive(Debug, Clone)]
pub struct DeviceEngine {
    inner: Arc<EngineInner>,
}

impl DeviceEngine {
    /// Bring up a device context with the given capacity and geometry.
    #[must_use]
    pub fn new(config: DeviceConfig) -> Self {
        tracing::debug!(
            "device engine up: {} bytes, {} compute units",
            config.memory_bytes,
            config.compute_units
        );
        let heap = Arc::new(Mutex::new(DeviceHeap::new(config.memory_bytes)));
        let queue = CommandQueue::new(Arc::clone(&heap));
        Self {
            inner: Arc::new(EngineInner {
                heap,
                queue,
                compute_units: config.compute_units,
            }),
        }
    }

    /// Modeled compute-unit count.
    #[must_use]
    pub fn compute_units(&self) -> u32 {
        self.inner.compute_units
    }

    /// Allocate `bytes` of device memory.
    pub fn alloc(&self, bytes: usize) -> Result<DeviceHandle, DeviceMemoryError> {
        self.lock_heap().alloc(bytes)
    }

    /// Release a device allocation.
    ///
    /// Drains the queue first so no queued operation can observe a dangling
    /// handle. This is the buffer drop path; failures are logged, not
    /// propagated.
    pub fn release(&self, handle: DeviceHandle) {
        if let Err(err) = self.inner.queue.synchronize() {
            tracing::debug!("queue drain before free of handle {handle}: {err}");
        }
        if let Err(err) = self.lock_heap().free(handle) {
            tracing::debug!("device free of handle {handle}: {err}");
        }
    }

    /// Blocking host-to-device write of a whole allocation.
    pub fn write_bytes(&self, handle: DeviceHandle, src: &[u8]) -> Result<(), EngineError> {
        self.inner.queue.synchronize()?;
        let mut heap = self.lock_heap();
        let dst = heap.bytes_mut(handle)?;
        if dst.len() != src.len() {
            return Err(DeviceMemoryError::SizeMismatch {
                dst_bytes: dst.len(),
                src_bytes: src.len(),
            }
            .into());
        }
        dst.copy_from_slice(src);
        Ok(())
    }

    /// Blocking device-to-host read of a whole allocation.
    pub fn read_bytes(&self, handle: DeviceHandle, dst: &mut [u8]) -> Result<(), EngineError> {
        self.inner.queue.synchronize()?;
        let heap = self.lock_heap();
        let src = heap.bytes(handle)?;
        if dst.len() != src.len() {
            return Err(DeviceMemoryError::SizeMismatch {
                dst_bytes: dst.len(),
                src_bytes: src.len(),
            }
            .into());
        }
        dst.copy_from_slice(src);
        Ok(())
    }

    /// Enqueue a device-to-device copy of a whole allocation.
    pub fn copy_device(&self, dst: DeviceHandle, src: DeviceHandle) -> Result<(), EngineError> {
        self.inner
            .queue
            .submit(Box::new(move |heap| heap.copy(dst, src)))?;
        Ok(())
    }

    /// Enqueue a fill of every byte of an allocation with `value`.
    pub fn fill(&self, handle: DeviceHandle, value: u8) -> Result<(), EngineError> {
        self.inner
            .queue
            .submit(Box::new(move |heap| heap.fill(handle, value)))?;
        Ok(())
    }

    /// Enqueue the vector-add oracle kernel over three device allocations.
    ///
    /// Non-blocking; call [`DeviceEngine::synchronize`] before reading `c`.
    pub fn launch_vector_add<T: Element>(
        &self,
        cfg: LaunchConfig,
        a: DeviceHandle,
        b: DeviceHandle,
        c: DeviceHandle,
        count: usize,
    ) -> Result<(), EngineError> {
        let bytes = count * T::SIZE;
        self.inner.queue.submit(Box::new(move |heap| {
            let shortest = heap
                .bytes(a)?
                .len()
                .min(heap.bytes(b)?.len())
                .min(heap.bytes(c)?.len());
            if bytes > shortest {
                return Err(DeviceMemoryError::SizeMismatch {
                    dst_bytes: shortest,
                    src_bytes: bytes,
                });
            }
            heap.with_dst_and_sources(c, a, b, |c_bytes, a_bytes, b_bytes| {
                vector_add::<T>(
                    cfg,
                    &mut c_bytes[..bytes],
                    &a_bytes[..bytes],
                    &b_bytes[..bytes],
                    count,
                );
            })
        }))?;
        Ok(())
    }

    /// Block until all queued device work has completed.
    pub fn synchronize(&self) -> Result<(), QueueError> {
        self.inner.queue.synchronize()
    }

    /// Device memory still available, in bytes.
    #[must_use]
    pub fn available_bytes(&self) -> usize {
        self.lock_heap().available_bytes()
    }

    fn lock_heap(&self) -> std::sync::MutexGuard<'_, DeviceHeap> {
        self.inner.heap.lock().expect("device heap mutex poisoned")
    }
}
