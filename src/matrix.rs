// src/matrix.rs - Scenario matrix generation and the verification pipeline

//! The scenario matrix: every combination of memory-class and staging
//! toggles, for every supported element type, driven through one full
//! allocate → transfer → compute → transfer-back → verify → free cycle.
//!
//! Scenarios are generated as an explicit cartesian product rather than
//! nested loops, so the matrix is inspectable and testable apart from the
//! execution pipeline. Each scenario brings up its own [`DeviceEngine`]
//! and drops it on exit (success or failure), so no device state, queue
//! residue, or buffer survives a scenario boundary.
//!
//! The driver is fail-fast: the first failing step aborts the whole run
//! with the failing scenario's parameters attached; later scenarios are
//! not attempted. Masking or retrying a transfer error would hide exactly
//! the bugs this matrix exists to catch.

use crate::buffers::{BufferAllocator, MemoryClass};
use crate::config::Settings;
use crate::element::{Element, ElementKind};
use crate::engine::{DeviceConfig, DeviceEngine, LaunchConfig};
use crate::transfer::{CopyDst, CopySrc, TransferDirection, TransferOrchestrator};
use crate::{verify, CopymatrixError, Result};

/// One fully-determined test run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scenario {
    /// Element type under test.
    pub element: ElementKind,
    /// Allocate host buffers as pinned instead of plain.
    pub use_pinned_host: bool,
    /// Stage uploads through an intermediate host-to-host copy.
    pub use_host_to_host: bool,
    /// Stage the download through a device-to-device detour (with
    /// corruption of the original device result).
    pub use_device_to_device: bool,
    /// Use inferred direction instead of explicit tags on every copy.
    pub use_default_direction: bool,
}

impl Scenario {
    /// The full cartesian product: every toggle combination for every
    /// element kind, in a fixed order.
    #[must_use]
    pub fn matrix() -> Vec<Scenario> {
        let mut scenarios = Vec::with_capacity(ElementKind::ALL.len() * 16);
        for element in ElementKind::ALL {
            for use_pinned_host in [false, true] {
                for use_host_to_host in [false, true] {
                    for use_device_to_device in [false, true] {
                        for use_default_direction in [false, true] {
                            scenarios.push(Scenario {
                                element,
                                use_pinned_host,
                                use_host_to_host,
                                use_device_to_device,
                                use_default_direction,
                            });
                        }
                    }
                }
            }
        }
        scenarios
    }

    /// Host memory class this scenario allocates in.
    #[must_use]
    pub fn host_class(&self) -> MemoryClass {
        if self.use_pinned_host {
            MemoryClass::HostPinned
        } else {
            MemoryClass::HostPlain
        }
    }
}

impl std::fmt::Display for Scenario {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "<{}> usePinnedHost:{} useHostToHost:{} useDeviceToDevice:{} useDefaultDirection:{}",
            self.element,
            self.use_pinned_host,
            self.use_host_to_host,
            self.use_device_to_device,
            self.use_default_direction
        )
    }
}

/// Run the complete matrix, fail-fast.
pub fn run_matrix(settings: &Settings) -> Result<()> {
    let scenarios = Scenario::matrix();
    tracing::info!(
        "running {} scenarios, N={} elements each",
        scenarios.len(),
        settings.count
    );
    for scenario in &scenarios {
        run_scenario(settings, scenario)?;
    }
    tracing::info!("matrix complete: {} scenarios passed", scenarios.len());
    Ok(())
}

/// Run the smoke test: plain i32, explicit directions, no staging.
///
/// A cheap sanity pass over the simplest path before the matrix runs.
pub fn run_smoke(settings: &Settings) -> Result<()> {
    let scenario = Scenario {
        element: ElementKind::I32,
        use_pinned_host: false,
        use_host_to_host: false,
        use_device_to_device: false,
        use_default_direction: false,
    };
    tracing::info!("test: smoke {scenario}");
    run_scenario(settings, &scenario)
}

/// Run one scenario, attaching its parameters to any failure.
pub fn run_scenario(settings: &Settings, scenario: &Scenario) -> Result<()> {
    let outcome = match scenario.element {
        ElementKind::F32 => run_scenario_typed::<f32>(settings, scenario),
        ElementKind::F64 => run_scenario_typed::<f64>(settings, scenario),
        ElementKind::I8 => run_scenario_typed::<i8>(settings, scenario),
        ElementKind::I32 => run_scenario_typed::<i32>(settings, scenario),
    };
    outcome.map_err(|err| {
        tracing::error!("scenario {scenario} failed: {err}");
        CopymatrixError::Scenario {
            scenario: scenario.to_string(),
            source: Box::new(err),
        }
    })
}

fn run_scenario_typed<T: Element>(settings: &Settings, scenario: &Scenario) -> Result<()> {
    let count = settings.count;
    tracing::info!(
        "test: memcpy matrix {scenario} N={count} Nbytes={}",
        count * T::SIZE
    );

    // Per-scenario device context: dropped (and its queue drained) on every
    // exit path, so scenarios share nothing.
    let engine = DeviceEngine::new(DeviceConfig {
        memory_bytes: settings.device_memory_bytes,
        compute_units: settings.compute_units,
    });
    let alloc = BufferAllocator::new(engine.clone());
    let xfer = TransferOrchestrator::new(engine.clone());
    let host_class = scenario.host_class();
    let infer = scenario.use_default_direction;

    let mut a_h = alloc.host::<T>(host_class, count)?;
    let mut b_h = alloc.host::<T>(host_class, count)?;
    let mut c_h = alloc.host::<T>(host_class, count)?;
    a_h.fill_with(T::pattern_a);
    b_h.fill_with(T::pattern_b);

    let mut a_d = alloc.device::<T>(count)?;
    let mut b_d = alloc.device::<T>(count)?;
    let mut c_d = alloc.device::<T>(count)?;

    if scenario.use_host_to_host {
        let mut a_stage = alloc.host::<T>(host_class, count)?;
        let mut b_stage = alloc.host::<T>(host_class, count)?;
        xfer.upload_via_host_detour(&mut a_d, &a_h, &mut a_stage, infer)?;
        xfer.upload_via_host_detour(&mut b_d, &b_h, &mut b_stage, infer)?;
    } else {
        xfer.copy(
            CopyDst::Device(&mut a_d),
            CopySrc::Host(&a_h),
            TransferDirection::HostToDevice.or_inferred(infer),
        )?;
        xfer.copy(
            CopyDst::Device(&mut b_d),
            CopySrc::Host(&b_h),
            TransferDirection::HostToDevice.or_inferred(infer),
        )?;
    }

    let max_blocks = settings.blocks_per_cu.saturating_mul(engine.compute_units());
    let launch = LaunchConfig::for_elements(count, settings.threads_per_block, max_blocks)?;
    engine.launch_vector_add::<T>(launch, a_d.handle(), b_d.handle(), c_d.handle(), count)?;

    if scenario.use_device_to_device {
        let mut c_detour = alloc.device::<T>(count)?;
        xfer.download_via_device_detour(&mut c_h, &mut c_d, &mut c_detour, infer)?;
    } else {
        xfer.copy(
            CopyDst::Host(&mut c_h),
            CopySrc::Device(&c_d),
            TransferDirection::DeviceToHost.or_inferred(infer),
        )?;
    }

    engine.synchronize()?;
    verify::check_vector_add(&a_h, &b_h, &c_h)?;

    tracing::info!("  scenario {scenario} success");
    Ok(())
}
