// src/verify.rs - Host-side verification against the compute oracle

//! Independent recomputation of the expected result.
//!
//! The verifier never touches device memory: it recomputes
//! `a[i] + b[i]` from the host-resident inputs and compares against the
//! observed host buffer with exact equality (the test patterns are chosen
//! so addition is exact for every supported element type). The first
//! mismatch aborts with index, expected, and actual values.

use crate::buffers::HostBuffer;
use crate::element::Element;
use thiserror::Error;

/// Verification failures.
#[derive(Debug, Clone, Error)]
pub enum VerifyError {
    /// The observed value diverged from the recomputed expectation.
    #[error("mismatch at index {index}: expected {expected}, got {actual}")]
    Mismatch {
        /// First index where observed != expected.
        index: usize,
        /// Recomputed expected value, rendered for diagnostics.
        expected: String,
        /// Observed value, rendered for diagnostics.
        actual: String,
    },
    /// The buffers under comparison hold different element counts.
    #[error("verification length mismatch: inputs {input_count}, observed {observed_count}")]
    LengthMismatch {
        /// Element count of the input buffers.
        input_count: usize,
        /// Element count of the observed buffer.
        observed_count: usize,
    },
}

/// Check `observed[i] == a[i] + b[i]` for every index, reporting the first
/// failure.
pub fn check_vector_add<T: Element>(
    a: &HostBuffer<T>,
    b: &HostBuffer<T>,
    observed: &HostBuffer<T>,
) -> Result<(), VerifyError> {
    if a.len() != observed.len() || b.len() != observed.len() {
        return Err(VerifyError::LengthMismatch {
            input_count: a.len().min(b.len()),
            observed_count: observed.len(),
        });
    }
    for (index, ((&x, &y), &got)) in a
        .as_slice()
        .iter()
        .zip(b.as_slice())
        .zip(observed.as_slice())
        .enumerate()
    {
        let expected = x.add(y);
        if got != expected {
            return Err(VerifyError::Mismatch {
                index,
                expected: expected.to_string(),
                actual: got.to_string(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffers::{BufferAllocator, MemoryClass};
    use crate::engine::{DeviceConfig, DeviceEngine};

    fn host_trio(count: usize) -> (HostBuffer<i32>, HostBuffer<i32>, HostBuffer<i32>) {
        let alloc = BufferAllocator::new(DeviceEngine::new(DeviceConfig {
            memory_bytes: 4096,
            compute_units: 1,
        }));
        let mut a = alloc.host::<i32>(MemoryClass::HostPlain, count).unwrap();
        let mut b = alloc.host::<i32>(MemoryClass::HostPlain, count).unwrap();
        let mut c = alloc.host::<i32>(MemoryClass::HostPlain, count).unwrap();
        a.fill_with(i32::pattern_a);
        b.fill_with(i32::pattern_b);
        c.fill_with(|i| 3 * i as i32);
        (a, b, c)
    }

    #[test]
    fn test_exact_sum_passes() {
        let (a, b, c) = host_trio(256);
        check_vector_add(&a, &b, &c).unwrap();
    }

    #[test]
    fn test_first_mismatch_reported() {
        let (a, b, mut c) = host_trio(256);
        c.as_mut_slice()[17] = -1;
        c.as_mut_slice()[200] = -1;
        match check_vector_add(&a, &b, &c).unwrap_err() {
            VerifyError::Mismatch {
                index,
                expected,
                actual,
            } => {
                assert_eq!(index, 17);
                assert_eq!(expected, "51");
                assert_eq!(actual, "-1");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_length_mismatch_rejected() {
        let (a, b, _) = host_trio(8);
        let (_, _, c) = host_trio(9);
        assert!(matches!(
            check_vector_add(&a, &b, &c),
            Err(VerifyError::LengthMismatch { .. })
        ));
    }
}
