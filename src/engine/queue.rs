// src/engine/queue.rs - Ordered device command queue

//! The engine's single in-order execution queue.
//!
//! Device-side work (kernel launches, device-to-device copies, fills) is
//! submitted from the host thread without blocking and executed by a
//! background worker in submission order, which is exactly the contract of
//! a default device stream. A blocking [`CommandQueue::synchronize`] must
//! be issued before the host inspects anything a queued operation writes.
//!
//! Failures latch: once a queued operation fails, later operations are
//! discarded and every subsequent synchronize reports the first failure,
//! matching a poisoned device context.

use crate::engine::memory::{DeviceHeap, DeviceMemoryError};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use thiserror::Error;

/// Errors reported by queue synchronization.
#[derive(Debug, Clone, Error)]
pub enum QueueError {
    /// A previously submitted operation failed; the queue is poisoned.
    #[error("queued device operation failed: {0}")]
    OperationFailed(String),
    /// The worker thread is gone (engine already shut down).
    #[error("device command queue disconnected")]
    Disconnected,
}

/// A device operation: runs against the heap on the worker thread.
pub type DeviceOp = Box<dyn FnOnce(&mut DeviceHeap) -> Result<(), DeviceMemoryError> + Send>;

enum Command {
    Exec(DeviceOp),
    Sync(Sender<Result<(), QueueError>>),
    Shutdown,
}

/// In-order command queue backed by a worker thread.
#[derive(Debug)]
pub struct CommandQueue {
    sender: Sender<Command>,
    worker: Option<JoinHandle<()>>,
}

impl CommandQueue {
    /// Spawn the worker for a heap shared with the host side of the engine.
    #[must_use]
    pub fn new(heap: Arc<Mutex<DeviceHeap>>) -> Self {
        let (sender, receiver) = channel();
        let worker = std::thread::spawn(move || worker_loop(&heap, &receiver));
        Self {
            sender,
            worker: Some(worker),
        }
    }

    /// Enqueue a device operation. Returns immediately; the operation runs
    /// after everything submitted before it.
    pub fn submit(&self, op: DeviceOp) -> Result<(), QueueError> {
        self.sender
            .send(Command::Exec(op))
            .map_err(|_| QueueError::Disconnected)
    }

    /// Block until every submitted operation has executed.
    ///
    /// Reports the first failure among operations submitted so far; the
    /// failure is sticky across subsequent synchronizes.
    pub fn synchronize(&self) -> Result<(), QueueError> {
        let (reply, confirm) = channel();
        self.sender
            .send(Command::Sync(reply))
            .map_err(|_| QueueError::Disconnected)?;
        confirm.recv().map_err(|_| QueueError::Disconnected)?
    }
}

impl Drop for CommandQueue {
    fn drop(&mut self) {
        let _ = self.sender.send(Command::Shutdown);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

fn worker_loop(heap: &Arc<Mutex<DeviceHeap>>, receiver: &Receiver<Command>) {
    let mut latched: Option<QueueError> = None;

    while let Ok(command) = receiver.recv() {
        match command {
            Command::Exec(op) => {
                if latched.is_some() {
                    // Poisoned queue: discard without executing.
                    continue;
                }
                let result = {
                    let mut heap = heap.lock().expect("device heap mutex poisoned");
                    op(&mut heap)
                };
                if let Err(err) = result {
                    tracing::debug!("queued device operation failed: {err}");
                    latched = Some(QueueError::OperationFailed(err.to_string()));
                }
            }
            Command::Sync(reply) => {
                let outcome = match &latched {
                    Some(err) => Err(err.clone()),
                    None => Ok(()),
                };
                let _ = reply.send(outcome);
            }
            Command::Shutdown => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queue_with_heap(capacity: usize) -> (CommandQueue, Arc<Mutex<DeviceHeap>>) {
        let heap = Arc::new(Mutex::new(DeviceHeap::new(capacity)));
        (CommandQueue::new(Arc::clone(&heap)), heap)
    }

    #[test]
    fn test_operations_execute_in_submission_order() {
        let (queue, heap) = queue_with_heap(64);
        let handle = heap.lock().unwrap().alloc(4).unwrap();

        for value in 1..=4u8 {
            queue
                .submit(Box::new(move |heap| {
                    let bytes = heap.bytes_mut(handle)?;
                    bytes[usize::from(value) - 1] = value;
                    Ok(())
                }))
                .unwrap();
        }
        queue.synchronize().unwrap();

        assert_eq!(heap.lock().unwrap().bytes(handle).unwrap(), &[1, 2, 3, 4]);
    }

    #[test]
    fn test_failure_latches_and_skips_later_work() {
        let (queue, heap) = queue_with_heap(64);
        let handle = heap.lock().unwrap().alloc(1).unwrap();

        // References a handle that does not exist.
        queue
            .submit(Box::new(|heap| heap.fill(999, 0).map(|_| ())))
            .unwrap();
        // Would succeed, but must be discarded by the poisoned queue.
        queue
            .submit(Box::new(move |heap| heap.fill(handle, 7)))
            .unwrap();

        assert!(matches!(
            queue.synchronize(),
            Err(QueueError::OperationFailed(_))
        ));
        // Sticky: a second synchronize reports the same first failure.
        assert!(matches!(
            queue.synchronize(),
            Err(QueueError::OperationFailed(_))
        ));
        assert_eq!(heap.lock().unwrap().bytes(handle).unwrap(), &[0]);
    }

    #[test]
    fn test_synchronize_on_empty_queue() {
        let (queue, _heap) = queue_with_heap(16);
        queue.synchronize().unwrap();
    }
}
