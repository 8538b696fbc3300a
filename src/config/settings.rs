// src/config/settings.rs - Run settings for the verification matrix

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
/// Problem size and launch geometry for a matrix run.
pub struct Settings {
    /// Element count per buffer.
    pub count: usize,
    /// Threads per block for the oracle kernel.
    pub threads_per_block: u32,
    /// Block budget per modeled compute unit.
    pub blocks_per_cu: u32,
    /// Modeled compute-unit count of the device engine.
    pub compute_units: u32,
    /// Modeled device memory capacity in bytes.
    pub device_memory_bytes: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            count: 1 << 20, // 1Mi elements per buffer
            threads_per_block: 256,
            blocks_per_cu: 6,
            compute_units: 16,
            device_memory_bytes: 1 << 30,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_runnable() {
        let s = Settings::default();
        assert!(s.count > 0);
        assert!(s.threads_per_block > 0);
        assert!(s.blocks_per_cu > 0);
        // The default device capacity fits four f64 buffers of the default
        // count with room to spare.
        assert!(s.count * 8 * 4 <= s.device_memory_bytes);
    }
}
