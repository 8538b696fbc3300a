// src/lib.rs - Main library file for the copymatrix verification tool

//! Copymatrix - heterogeneous memory-copy verification matrix
//!
//! Verifies data-movement correctness across host-plain, host-pinned, and
//! device memory under every combination of transfer direction, staging
//! detour, and direction-inference mode, using a device-side elementwise
//! addition kernel as the compute oracle and exact host-side
//! recomputation as ground truth.
//!
//! The copy/compute engine itself is an external concern consumed through
//! a narrow contract; the [`engine`] module provides an in-process
//! reference implementation so the matrix runs on any host.

#![warn(missing_docs)]
// Note: pinned host buffers require raw page-aligned allocation
#![allow(unsafe_code)]

/// Buffer allocation across the three memory classes
pub mod buffers;
/// Configuration module for run settings
pub mod config;
/// Element types the matrix is generic over
pub mod element;
/// Reference copy/compute engine (device heap, command queue, kernels)
pub mod engine;
/// Scenario generation and the verification pipeline
pub mod matrix;
/// Transfer orchestration and direction resolution
pub mod transfer;
/// Host-side oracle verification
pub mod verify;

// Re-export main types for convenience
pub use buffers::{AllocationError, BufferAllocator, DeviceBuffer, HostBuffer, MemoryClass};
pub use config::Settings;
pub use element::{Element, ElementKind};
pub use engine::{DeviceConfig, DeviceEngine, EngineError, LaunchError, QueueError};
pub use matrix::{run_matrix, run_smoke, Scenario};
pub use transfer::{TransferDirection, TransferError, TransferOrchestrator};
pub use verify::VerifyError;

use thiserror::Error;

/// Main error type for copymatrix
#[derive(Error, Debug)]
pub enum CopymatrixError {
    /// Buffer allocation failed
    #[error("allocation error: {0}")]
    Allocation(#[from] AllocationError),

    /// A copy operation failed
    #[error("transfer error: {0}")]
    Transfer(#[from] TransferError),

    /// Launch geometry could not be computed
    #[error("kernel launch error: {0}")]
    Launch(#[from] LaunchError),

    /// Queue synchronization reported a prior failure
    #[error("synchronization error: {0}")]
    Sync(#[from] QueueError),

    /// Observed output diverged from the oracle
    #[error("verification error: {0}")]
    Verification(#[from] VerifyError),

    /// A direct engine operation failed
    #[error("engine error: {0}")]
    Engine(#[from] EngineError),

    /// A scenario failed; carries the scenario's parameters for reproduction
    #[error("scenario {scenario} failed: {source}")]
    Scenario {
        /// Parameters of the failing scenario.
        scenario: String,
        /// The failing step's error.
        source: Box<CopymatrixError>,
    },
}

/// Result type alias for copymatrix operations
pub type Result<T> = std::result::Result<T, CopymatrixError>;

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
/// Application name from Cargo.toml
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Initialize logging for the verification tool
pub fn init() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    tracing::info!("{} v{}", NAME, VERSION);
}
