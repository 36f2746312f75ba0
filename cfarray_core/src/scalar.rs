use std::fmt;
use std::ops::{Add, Div, Mul, Sub};

/// Runtime tag for the scalar width stored in an array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarKind {
    F32,
    F64,
}

impl ScalarKind {
    /// Width of one scalar in bits.
    pub fn bits(self) -> u32 {
        match self {
            ScalarKind::F32 => 32,
            ScalarKind::F64 => 64,
        }
    }

    /// Width of one scalar in bytes.
    pub fn byte_width(self) -> usize {
        self.bits() as usize / 8
    }

    pub fn name(self) -> &'static str {
        match self {
            ScalarKind::F32 => "f32",
            ScalarKind::F64 => "f64",
        }
    }
}

impl fmt::Display for ScalarKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Floating-point element type of a compressed array.
///
/// Codecs operate on `f64` values; every scalar converts to `f64` exactly,
/// so the round trip through a lossless codec preserves the original bits
/// of finite values.
pub trait Scalar:
    Copy
    + Default
    + PartialEq
    + PartialOrd
    + fmt::Debug
    + fmt::Display
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Div<Output = Self>
    + 'static
{
    const KIND: ScalarKind;

    fn to_f64(self) -> f64;

    fn from_f64(value: f64) -> Self;
}

impl Scalar for f32 {
    const KIND: ScalarKind = ScalarKind::F32;

    #[inline]
    fn to_f64(self) -> f64 {
        self as f64
    }

    #[inline]
    fn from_f64(value: f64) -> Self {
        value as f32
    }
}

impl Scalar for f64 {
    const KIND: ScalarKind = ScalarKind::F64;

    #[inline]
    fn to_f64(self) -> f64 {
        self
    }

    #[inline]
    fn from_f64(value: f64) -> Self {
        value
    }
}
