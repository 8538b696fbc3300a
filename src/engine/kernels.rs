// src/engine/kernels.rs - Kernel geometry and the vector-add oracle kernel

//! Launch geometry and the device kernel used as the compute oracle.
//!
//! Execution is partitioned into `grid_blocks` blocks of
//! `block_threads` threads. The block count is the element count divided
//! by the block size, rounded up, then capped at the device's block budget
//! (blocks-per-compute-unit times compute units); the kernel walks a
//! grid-stride loop so a capped grid still covers every element exactly
//! once. Addition has no cross-element dependency, so the result is
//! identical under any partitioning.

use crate::element::Element;
use thiserror::Error;

/// Errors raised when launch geometry cannot be computed.
#[derive(Debug, Clone, Error)]
pub enum LaunchError {
    /// The per-block thread count must be nonzero.
    #[error("invalid launch geometry: {0} threads per block")]
    InvalidBlockDim(u32),
    /// The block budget must allow at least one block.
    #[error("invalid launch geometry: block budget of {0}")]
    InvalidGridDim(u32),
}

/// One kernel launch's block/thread partitioning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaunchConfig {
    /// Number of blocks in the grid.
    pub grid_blocks: u32,
    /// Number of threads per block.
    pub block_threads: u32,
}

impl LaunchConfig {
    /// Compute the grid for `count` elements with the given block size,
    /// capped at `max_blocks` total blocks.
    pub fn for_elements(
        count: usize,
        threads_per_block: u32,
        max_blocks: u32,
    ) -> Result<Self, LaunchError> {
        if threads_per_block == 0 {
            return Err(LaunchError::InvalidBlockDim(threads_per_block));
        }
        if max_blocks == 0 {
            return Err(LaunchError::InvalidGridDim(max_blocks));
        }
        let needed = count.div_ceil(threads_per_block as usize).max(1);
        let grid_blocks = needed.min(max_blocks as usize) as u32;
        Ok(Self {
            grid_blocks,
            block_threads: threads_per_block,
        })
    }

    /// Total threads across the grid; the stride of the grid-stride loop.
    #[must_use]
    pub fn total_threads(&self) -> usize {
        self.grid_blocks as usize * self.block_threads as usize
    }
}

/// The oracle kernel: `c[i] = a[i] + b[i]` over raw device storage.
///
/// Each (block, thread) pair starts at its global index and strides by the
/// grid width, mirroring how the launch executes on real hardware. Every
/// element in `[0, count)` is written exactly once.
pub fn vector_add<T: Element>(cfg: LaunchConfig, c: &mut [u8], a: &[u8], b: &[u8], count: usize) {
    let stride = cfg.total_threads();
    for block in 0..cfg.grid_blocks as usize {
        for thread in 0..cfg.block_threads as usize {
            let mut i = block * cfg.block_threads as usize + thread;
            while i < count {
                let sum = T::load(a, i).add(T::load(b, i));
                sum.store(c, i);
                i += stride;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grid_rounds_up() {
        let cfg = LaunchConfig::for_elements(1000, 256, 1024).unwrap();
        assert_eq!(cfg.grid_blocks, 4);
        assert_eq!(cfg.block_threads, 256);

        let exact = LaunchConfig::for_elements(1024, 256, 1024).unwrap();
        assert_eq!(exact.grid_blocks, 4);
    }

    #[test]
    fn test_grid_caps_at_block_budget() {
        let cfg = LaunchConfig::for_elements(1 << 20, 256, 96).unwrap();
        assert_eq!(cfg.grid_blocks, 96);
    }

    #[test]
    fn test_zero_threads_per_block_rejected() {
        assert!(matches!(
            LaunchConfig::for_elements(1024, 0, 96),
            Err(LaunchError::InvalidBlockDim(0))
        ));
        assert!(matches!(
            LaunchConfig::for_elements(1024, 256, 0),
            Err(LaunchError::InvalidGridDim(0))
        ));
    }

    fn run_add_i32(cfg: LaunchConfig, count: usize) -> Vec<i32> {
        let mut a = vec![0u8; count * 4];
        let mut b = vec![0u8; count * 4];
        let mut c = vec![0u8; count * 4];
        for i in 0..count {
            (i as i32).store(&mut a, i);
            (3 * i as i32).store(&mut b, i);
        }
        vector_add::<i32>(cfg, &mut c, &a, &b, count);
        (0..count).map(|i| i32::load(&c, i)).collect()
    }

    #[test]
    fn test_vector_add_covers_ragged_tail() {
        let cfg = LaunchConfig::for_elements(1001, 64, 1024).unwrap();
        let out = run_add_i32(cfg, 1001);
        for (i, v) in out.iter().enumerate() {
            assert_eq!(*v, 4 * i as i32, "wrong sum at index {i}");
        }
    }

    #[test]
    fn test_result_independent_of_partitioning() {
        let count = 777;
        let baseline = run_add_i32(LaunchConfig::for_elements(count, 1, 1).unwrap(), count);
        for (threads, budget) in [(7u32, 3u32), (64, 2), (256, 1024), (1024, 1)] {
            let cfg = LaunchConfig::for_elements(count, threads, budget).unwrap();
            assert_eq!(
                run_add_i32(cfg, count),
                baseline,
                "partitioning {threads}x{budget} diverged"
            );
        }
    }
}
