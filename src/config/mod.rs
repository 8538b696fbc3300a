// src/config/mod.rs - Configuration module

//! Run configuration: defaults plus CLI overrides.

/// Settings for problem size, launch geometry, and the modeled device.
pub mod settings;

pub use settings::Settings;
