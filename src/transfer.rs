// src/transfer.rs - Transfer orchestration between memory classes

//! Copy orchestration across host-plain, host-pinned, and device buffers.
//!
//! Every copy is declared with a [`TransferDirection`]. `Inferred` resolves
//! the direction purely from the endpoint memory classes and must be
//! observably identical to the matching explicit tag; an explicit tag that
//! contradicts the endpoints is a [`TransferError`]. Both host classes
//! resolve identically: pinning changes the allocator, never the routing.
//!
//! Host↔device copies are blocking with respect to host-buffer validity
//! (they drain the device queue before touching memory); device-to-device
//! copies are enqueued. Staged variants route data through detour buffers
//! to exercise extra engine paths without changing observable results.

use crate::buffers::{DeviceBuffer, HostBuffer, MemoryClass};
use crate::element::Element;
use crate::engine::{DeviceEngine, EngineError};
use thiserror::Error;

/// Sentinel byte written over a detoured device buffer to prove the detour
/// copy, not the original, feeds the final read-back.
pub const CORRUPTION_SENTINEL: u8 = 0x5A;

/// Declared direction of one copy operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferDirection {
    /// Host memory to device memory.
    HostToDevice,
    /// Device memory to host memory.
    DeviceToHost,
    /// Host memory to host memory.
    HostToHost,
    /// Device memory to device memory.
    DeviceToDevice,
    /// Resolve from the endpoint memory classes.
    Inferred,
}

impl TransferDirection {
    /// Short name used in logs and diagnostics.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            TransferDirection::HostToDevice => "host-to-device",
            TransferDirection::DeviceToHost => "device-to-host",
            TransferDirection::HostToHost => "host-to-host",
            TransferDirection::DeviceToDevice => "device-to-device",
            TransferDirection::Inferred => "inferred",
        }
    }

    /// This direction, or `Inferred` when default-direction mode is on.
    #[must_use]
    pub const fn or_inferred(self, use_default: bool) -> Self {
        if use_default {
            TransferDirection::Inferred
        } else {
            self
        }
    }

    /// The direction dictated by a pair of endpoint memory classes.
    #[must_use]
    pub const fn resolve(dst: MemoryClass, src: MemoryClass) -> Self {
        match (dst.is_host(), src.is_host()) {
            (true, true) => TransferDirection::HostToHost,
            (false, true) => TransferDirection::HostToDevice,
            (true, false) => TransferDirection::DeviceToHost,
            (false, false) => TransferDirection::DeviceToDevice,
        }
    }
}

impl std::fmt::Display for TransferDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Copy source endpoint.
pub enum CopySrc<'a, T> {
    /// Read from a host buffer.
    Host(&'a HostBuffer<T>),
    /// Read from a device buffer.
    Device(&'a DeviceBuffer<T>),
}

/// Copy destination endpoint. Exclusive borrows: a copy mutates only `dst`.
pub enum CopyDst<'a, T> {
    /// Write into a host buffer.
    Host(&'a mut HostBuffer<T>),
    /// Write into a device buffer.
    Device(&'a mut DeviceBuffer<T>),
}

/// Transfer failures.
#[derive(Debug, Clone, Error)]
pub enum TransferError {
    /// Copy endpoints hold different element counts.
    #[error("transfer length mismatch: dst holds {dst_count} elements, src holds {src_count}")]
    LengthMismatch {
        /// Destination element count.
        dst_count: usize,
        /// Source element count.
        src_count: usize,
    },
    /// The explicit direction contradicts the endpoint memory classes.
    #[error("direction {requested} does not match endpoints (resolved: {resolved})")]
    WrongDirection {
        /// Direction the caller declared.
        requested: TransferDirection,
        /// Direction the endpoint classes dictate.
        resolved: TransferDirection,
    },
    /// The underlying engine rejected or failed the copy.
    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// Issues copy operations against one scenario's device engine.
#[derive(Debug, Clone)]
pub struct TransferOrchestrator {
    engine: DeviceEngine,
}

impl TransferOrchestrator {
    /// Bind an orchestrator to the scenario's device engine.
    #[must_use]
    pub fn new(engine: DeviceEngine) -> Self {
        Self { engine }
    }

    /// Copy `src` into `dst` under the declared direction.
    ///
    /// Requires equal element counts. With `Inferred` the direction comes
    /// from the endpoint classes; an explicit direction must match them.
    pub fn copy<T: Element>(
        &self,
        dst: CopyDst<'_, T>,
        src: CopySrc<'_, T>,
        direction: TransferDirection,
    ) -> Result<(), TransferError> {
        let (dst_count, dst_class) = match &dst {
            CopyDst::Host(b) => (b.len(), b.class()),
            CopyDst::Device(b) => (b.len(), MemoryClass::Device),
        };
        let (src_count, src_class) = match &src {
            CopySrc::Host(b) => (b.len(), b.class()),
            CopySrc::Device(b) => (b.len(), MemoryClass::Device),
        };

        if dst_count != src_count {
            return Err(TransferError::LengthMismatch {
                dst_count,
                src_count,
            });
        }
        let resolved = TransferDirection::resolve(dst_class, src_class);
        if direction != TransferDirection::Inferred && direction != resolved {
            return Err(TransferError::WrongDirection {
                requested: direction,
                resolved,
            });
        }
        tracing::debug!(
            "copy {} -> {}: {} ({} bytes, declared {})",
            src_class.label(),
            dst_class.label(),
            resolved.label(),
            dst_count * T::SIZE,
            direction.label()
        );

        match (dst, src) {
            (CopyDst::Host(dst), CopySrc::Host(src)) => {
                dst.as_mut_slice().copy_from_slice(src.as_slice());
                Ok(())
            }
            (CopyDst::Device(dst), CopySrc::Host(src)) => {
                let mut staged = vec![0u8; src.size_bytes()];
                for (i, v) in src.as_slice().iter().enumerate() {
                    v.store(&mut staged, i);
                }
                self.engine.write_bytes(dst.handle(), &staged)?;
                Ok(())
            }
            (CopyDst::Host(dst), CopySrc::Device(src)) => {
                let mut staged = vec![0u8; src.size_bytes()];
                self.engine.read_bytes(src.handle(), &mut staged)?;
                for (i, slot) in dst.as_mut_slice().iter_mut().enumerate() {
                    *slot = T::load(&staged, i);
                }
                Ok(())
            }
            (CopyDst::Device(dst), CopySrc::Device(src)) => {
                self.engine.copy_device(dst.handle(), src.handle())?;
                Ok(())
            }
        }
    }

    /// Overwrite every byte of a device buffer with the corruption
    /// sentinel. Enqueued, like any other device-side write.
    pub fn corrupt_device<T: Element>(
        &self,
        buffer: &mut DeviceBuffer<T>,
    ) -> Result<(), TransferError> {
        tracing::debug!(
            "corrupting device buffer handle {} with 0x{CORRUPTION_SENTINEL:02X}",
            buffer.handle()
        );
        self.engine.fill(buffer.handle(), CORRUPTION_SENTINEL)?;
        Ok(())
    }

    /// Upload a host buffer to the device through an intermediate host
    /// detour buffer (host-to-host staging).
    pub fn upload_via_host_detour<T: Element>(
        &self,
        dst: &mut DeviceBuffer<T>,
        src: &HostBuffer<T>,
        detour: &mut HostBuffer<T>,
        use_default: bool,
    ) -> Result<(), TransferError> {
        self.copy(
            CopyDst::Host(detour),
            CopySrc::Host(src),
            TransferDirection::HostToHost.or_inferred(use_default),
        )?;
        self.copy(
            CopyDst::Device(dst),
            CopySrc::Host(detour),
            TransferDirection::HostToDevice.or_inferred(use_default),
        )
    }

    /// Read a device buffer back to host through a device detour buffer,
    /// corrupting the original after the detour copy to prove the detour
    /// is the source of truth for the read-back.
    pub fn download_via_device_detour<T: Element>(
        &self,
        dst: &mut HostBuffer<T>,
        src: &mut DeviceBuffer<T>,
        detour: &mut DeviceBuffer<T>,
        use_default: bool,
    ) -> Result<(), TransferError> {
        self.copy(
            CopyDst::Device(detour),
            CopySrc::Device(src),
            TransferDirection::DeviceToDevice.or_inferred(use_default),
        )?;
        self.corrupt_device(src)?;
        self.copy(
            CopyDst::Host(dst),
            CopySrc::Device(detour),
            TransferDirection::DeviceToHost.or_inferred(use_default),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffers::BufferAllocator;
    use crate::engine::DeviceConfig;

    fn setup() -> (BufferAllocator, TransferOrchestrator) {
        let engine = DeviceEngine::new(DeviceConfig {
            memory_bytes: 1 << 20,
            compute_units: 4,
        });
        (
            BufferAllocator::new(engine.clone()),
            TransferOrchestrator::new(engine),
        )
    }

    fn patterned_host<T: Element>(
        alloc: &BufferAllocator,
        class: MemoryClass,
        count: usize,
    ) -> HostBuffer<T> {
        let mut buf = alloc.host::<T>(class, count).unwrap();
        buf.fill_with(T::pattern_a);
        buf
    }

    #[test]
    fn test_roundtrip_reproduces_host_contents() {
        // host -> device -> host with no staging must be byte-faithful for
        // every element type and assorted counts.
        fn roundtrip<T: Element>(count: usize) {
            let (alloc, xfer) = setup();
            let src = patterned_host::<T>(&alloc, MemoryClass::HostPlain, count);
            let mut dev = alloc.device::<T>(count).unwrap();
            let mut back = alloc.host::<T>(MemoryClass::HostPlain, count).unwrap();

            xfer.copy(
                CopyDst::Device(&mut dev),
                CopySrc::Host(&src),
                TransferDirection::HostToDevice,
            )
            .unwrap();
            xfer.copy(
                CopyDst::Host(&mut back),
                CopySrc::Device(&dev),
                TransferDirection::DeviceToHost,
            )
            .unwrap();
            assert_eq!(back.as_slice(), src.as_slice());
        }
        for count in [1usize, 2, 255, 1024] {
            roundtrip::<f32>(count);
            roundtrip::<f64>(count);
            roundtrip::<i8>(count);
            roundtrip::<i32>(count);
        }
    }

    #[test]
    fn test_inferred_matches_explicit_for_every_class_pair() {
        let (alloc, xfer) = setup();
        let count = 64;
        let src = patterned_host::<i32>(&alloc, MemoryClass::HostPinned, count);

        // Explicit pipeline.
        let mut dev_e = alloc.device::<i32>(count).unwrap();
        let mut dev2_e = alloc.device::<i32>(count).unwrap();
        let mut host_e = alloc.host::<i32>(MemoryClass::HostPlain, count).unwrap();
        let mut out_e = alloc.host::<i32>(MemoryClass::HostPlain, count).unwrap();
        xfer.copy(CopyDst::Host(&mut host_e), CopySrc::Host(&src), TransferDirection::HostToHost)
            .unwrap();
        xfer.copy(CopyDst::Device(&mut dev_e), CopySrc::Host(&host_e), TransferDirection::HostToDevice)
            .unwrap();
        xfer.copy(CopyDst::Device(&mut dev2_e), CopySrc::Device(&dev_e), TransferDirection::DeviceToDevice)
            .unwrap();
        xfer.copy(CopyDst::Host(&mut out_e), CopySrc::Device(&dev2_e), TransferDirection::DeviceToHost)
            .unwrap();

        // Same pipeline, every direction inferred.
        let mut dev_i = alloc.device::<i32>(count).unwrap();
        let mut dev2_i = alloc.device::<i32>(count).unwrap();
        let mut host_i = alloc.host::<i32>(MemoryClass::HostPlain, count).unwrap();
        let mut out_i = alloc.host::<i32>(MemoryClass::HostPlain, count).unwrap();
        xfer.copy(CopyDst::Host(&mut host_i), CopySrc::Host(&src), TransferDirection::Inferred)
            .unwrap();
        xfer.copy(CopyDst::Device(&mut dev_i), CopySrc::Host(&host_i), TransferDirection::Inferred)
            .unwrap();
        xfer.copy(CopyDst::Device(&mut dev2_i), CopySrc::Device(&dev_i), TransferDirection::Inferred)
            .unwrap();
        xfer.copy(CopyDst::Host(&mut out_i), CopySrc::Device(&dev2_i), TransferDirection::Inferred)
            .unwrap();

        assert_eq!(out_e.as_slice(), out_i.as_slice());
        assert_eq!(out_e.as_slice(), src.as_slice());
    }

    #[test]
    fn test_wrong_explicit_direction_rejected() {
        let (alloc, xfer) = setup();
        let src = patterned_host::<f32>(&alloc, MemoryClass::HostPlain, 8);
        let mut dev = alloc.device::<f32>(8).unwrap();
        let err = xfer
            .copy(
                CopyDst::Device(&mut dev),
                CopySrc::Host(&src),
                TransferDirection::DeviceToHost,
            )
            .unwrap_err();
        match err {
            TransferError::WrongDirection {
                requested,
                resolved,
            } => {
                assert_eq!(requested, TransferDirection::DeviceToHost);
                assert_eq!(resolved, TransferDirection::HostToDevice);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_length_mismatch_rejected() {
        let (alloc, xfer) = setup();
        let src = patterned_host::<i8>(&alloc, MemoryClass::HostPlain, 8);
        let mut dst = alloc.host::<i8>(MemoryClass::HostPlain, 9).unwrap();
        assert!(matches!(
            xfer.copy(
                CopyDst::Host(&mut dst),
                CopySrc::Host(&src),
                TransferDirection::HostToHost
            ),
            Err(TransferError::LengthMismatch {
                dst_count: 9,
                src_count: 8
            })
        ));
    }

    #[test]
    fn test_device_detour_survives_corruption_of_original() {
        let (alloc, xfer) = setup();
        let count = 128;
        let src = patterned_host::<i32>(&alloc, MemoryClass::HostPlain, count);
        let mut original = alloc.device::<i32>(count).unwrap();
        let mut detour = alloc.device::<i32>(count).unwrap();
        let mut out = alloc.host::<i32>(MemoryClass::HostPlain, count).unwrap();

        xfer.copy(
            CopyDst::Device(&mut original),
            CopySrc::Host(&src),
            TransferDirection::HostToDevice,
        )
        .unwrap();
        xfer.download_via_device_detour(&mut out, &mut original, &mut detour, false)
            .unwrap();
        assert_eq!(out.as_slice(), src.as_slice());

        // And the original really was clobbered.
        let mut clobbered = alloc.host::<i32>(MemoryClass::HostPlain, count).unwrap();
        xfer.copy(
            CopyDst::Host(&mut clobbered),
            CopySrc::Device(&original),
            TransferDirection::DeviceToHost,
        )
        .unwrap();
        let sentinel_word = i32::from_ne_bytes([CORRUPTION_SENTINEL; 4]);
        assert!(clobbered.as_slice().iter().all(|&v| v == sentinel_word));
    }

    #[test]
    fn test_host_detour_upload_is_transparent() {
        let (alloc, xfer) = setup();
        let count = 96;
        let src = patterned_host::<f64>(&alloc, MemoryClass::HostPlain, count);
        let mut detour = alloc.host::<f64>(MemoryClass::HostPlain, count).unwrap();
        let mut dev = alloc.device::<f64>(count).unwrap();
        let mut back = alloc.host::<f64>(MemoryClass::HostPlain, count).unwrap();

        xfer.upload_via_host_detour(&mut dev, &src, &mut detour, false)
            .unwrap();
        xfer.copy(
            CopyDst::Host(&mut back),
            CopySrc::Device(&dev),
            TransferDirection::DeviceToHost,
        )
        .unwrap();
        assert_eq!(back.as_slice(), src.as_slice());
    }
}
