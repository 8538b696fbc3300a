// src/element.rs - Element types supported by the copy-verification matrix

//! Numeric element types exercised by the transfer matrix.
//!
//! The matrix validates transfer and compute correctness independent of
//! element width, so the same pipeline runs over single/double precision
//! floats and narrow/standard integers. The set is closed and known at
//! build time; everything downstream is generic over [`Element`] and
//! instantiated explicitly per [`ElementKind`], with no dynamic dispatch.
//!
//! Test patterns are index-derived and chosen so that `a[i] + b[i]` is
//! exact for every supported type over the tested ranges, which lets the
//! verifier use exact equality even for floating point.

use std::fmt::{Debug, Display};

/// Identifies one of the supported element types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementKind {
    /// Single-precision float.
    F32,
    /// Double-precision float.
    F64,
    /// Narrow (8-bit) signed integer.
    I8,
    /// Standard 32-bit signed integer.
    I32,
}

impl ElementKind {
    /// Every supported element kind, in matrix-enumeration order.
    pub const ALL: [ElementKind; 4] = [
        ElementKind::F32,
        ElementKind::F64,
        ElementKind::I8,
        ElementKind::I32,
    ];

    /// Size of one element in bytes.
    #[must_use]
    pub const fn size_bytes(self) -> usize {
        match self {
            ElementKind::F32 => 4,
            ElementKind::F64 => 8,
            ElementKind::I8 => 1,
            ElementKind::I32 => 4,
        }
    }

    /// Short human-readable name used in logs and diagnostics.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            ElementKind::F32 => "f32",
            ElementKind::F64 => "f64",
            ElementKind::I8 => "i8",
            ElementKind::I32 => "i32",
        }
    }
}

impl Display for ElementKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// An element type the pipeline can allocate, copy, add, and verify.
///
/// `load`/`store` operate on untyped byte storage (the device heap is raw
/// bytes), using native-endian conversion so no alignment is required.
pub trait Element: Copy + Default + PartialEq + Debug + Display + Send + 'static {
    /// The kind tag for this type.
    const KIND: ElementKind;
    /// Size of one element in bytes (matches `KIND.size_bytes()`).
    const SIZE: usize;

    /// Read element `idx` out of raw byte storage.
    fn load(bytes: &[u8], idx: usize) -> Self;

    /// Write `self` as element `idx` into raw byte storage.
    fn store(self, bytes: &mut [u8], idx: usize);

    /// Elementwise addition, the oracle operation.
    #[must_use]
    fn add(self, rhs: Self) -> Self;

    /// Deterministic first-input test pattern for index `i`.
    fn pattern_a(i: usize) -> Self;

    /// Deterministic second-input test pattern for index `i`.
    fn pattern_b(i: usize) -> Self;
}

impl Element for f32 {
    const KIND: ElementKind = ElementKind::F32;
    const SIZE: usize = 4;

    fn load(bytes: &[u8], idx: usize) -> Self {
        let off = idx * Self::SIZE;
        f32::from_ne_bytes(bytes[off..off + Self::SIZE].try_into().unwrap())
    }

    fn store(self, bytes: &mut [u8], idx: usize) {
        let off = idx * Self::SIZE;
        bytes[off..off + Self::SIZE].copy_from_slice(&self.to_ne_bytes());
    }

    fn add(self, rhs: Self) -> Self {
        self + rhs
    }

    // Values below 2048 with quarter fractions are exactly representable,
    // so pattern_a + pattern_b is exact.
    fn pattern_a(i: usize) -> Self {
        (i % 1000) as f32 + 0.5
    }

    fn pattern_b(i: usize) -> Self {
        ((i % 1000) * 2) as f32 + 0.25
    }
}

impl Element for f64 {
    const KIND: ElementKind = ElementKind::F64;
    const SIZE: usize = 8;

    fn load(bytes: &[u8], idx: usize) -> Self {
        let off = idx * Self::SIZE;
        f64::from_ne_bytes(bytes[off..off + Self::SIZE].try_into().unwrap())
    }

    fn store(self, bytes: &mut [u8], idx: usize) {
        let off = idx * Self::SIZE;
        bytes[off..off + Self::SIZE].copy_from_slice(&self.to_ne_bytes());
    }

    fn add(self, rhs: Self) -> Self {
        self + rhs
    }

    fn pattern_a(i: usize) -> Self {
        (i % 100_000) as f64 + 0.5
    }

    fn pattern_b(i: usize) -> Self {
        ((i % 100_000) * 2) as f64 + 0.25
    }
}

impl Element for i8 {
    const KIND: ElementKind = ElementKind::I8;
    const SIZE: usize = 1;

    fn load(bytes: &[u8], idx: usize) -> Self {
        bytes[idx] as i8
    }

    fn store(self, bytes: &mut [u8], idx: usize) {
        bytes[idx] = self as u8;
    }

    fn add(self, rhs: Self) -> Self {
        self.wrapping_add(rhs)
    }

    // Bounded so a + b never exceeds i8::MAX (49 + 2*29 = 107).
    fn pattern_a(i: usize) -> Self {
        (i % 50) as i8
    }

    fn pattern_b(i: usize) -> Self {
        ((i % 30) * 2) as i8
    }
}

impl Element for i32 {
    const KIND: ElementKind = ElementKind::I32;
    const SIZE: usize = 4;

    fn load(bytes: &[u8], idx: usize) -> Self {
        let off = idx * Self::SIZE;
        i32::from_ne_bytes(bytes[off..off + Self::SIZE].try_into().unwrap())
    }

    fn store(self, bytes: &mut [u8], idx: usize) {
        let off = idx * Self::SIZE;
        bytes[off..off + Self::SIZE].copy_from_slice(&self.to_ne_bytes());
    }

    fn add(self, rhs: Self) -> Self {
        self.wrapping_add(rhs)
    }

    fn pattern_a(i: usize) -> Self {
        i as i32
    }

    fn pattern_b(i: usize) -> Self {
        (i as i32).wrapping_mul(2)
    }
}
