//! Arrays whose dimensionality and scalar type are chosen at runtime.
//!
//! [`DynArray`] wraps one of the eight `Array<T, D>` instantiations and
//! speaks in slices and `f64`, for callers such as the command-line tool
//! that only learn the shape from their input.

use std::sync::Arc;

use crate::array::{Array, ArrayConfig};
use crate::cache::CacheStats;
use crate::codec::Codec;
use crate::container::{check_len, Container};
use crate::error::{ArrayError, Result};
use crate::scalar::{Scalar, ScalarKind};

#[derive(Debug, Clone)]
pub enum DynArray {
    F32x1(Array<f32, 1>),
    F32x2(Array<f32, 2>),
    F32x3(Array<f32, 3>),
    F32x4(Array<f32, 4>),
    F64x1(Array<f64, 1>),
    F64x2(Array<f64, 2>),
    F64x3(Array<f64, 3>),
    F64x4(Array<f64, 4>),
}

macro_rules! dispatch {
    ($value:expr, $a:ident => $body:expr) => {
        match $value {
            DynArray::F32x1($a) => $body,
            DynArray::F32x2($a) => $body,
            DynArray::F32x3($a) => $body,
            DynArray::F32x4($a) => $body,
            DynArray::F64x1($a) => $body,
            DynArray::F64x2($a) => $body,
            DynArray::F64x3($a) => $body,
            DynArray::F64x4($a) => $body,
        }
    };
}

macro_rules! impl_from_array {
    ($($variant:ident => $t:ty, $d:literal;)*) => {
        $(
            impl From<Array<$t, $d>> for DynArray {
                fn from(array: Array<$t, $d>) -> Self {
                    DynArray::$variant(array)
                }
            }
        )*
    };
}

impl_from_array! {
    F32x1 => f32, 1;
    F32x2 => f32, 2;
    F32x3 => f32, 3;
    F32x4 => f32, 4;
    F64x1 => f64, 1;
    F64x2 => f64, 2;
    F64x3 => f64, 3;
    F64x4 => f64, 4;
}

impl DynArray {
    /// Zero-filled array with `extents.len()` dimensions (1 to 4).
    pub fn new(
        extents: &[usize],
        rate: f64,
        scalar: ScalarKind,
        codec: Arc<dyn Codec>,
    ) -> Result<Self> {
        Self::with_config(
            extents,
            scalar,
            codec,
            ArrayConfig {
                rate,
                ..ArrayConfig::default()
            },
        )
    }

    pub fn with_config(
        extents: &[usize],
        scalar: ScalarKind,
        codec: Arc<dyn Codec>,
        config: ArrayConfig,
    ) -> Result<Self> {
        macro_rules! build {
            ($variant:ident) => {
                DynArray::$variant(Array::with_config(fixed(extents)?, codec, config)?)
            };
        }
        Ok(match (scalar, extents.len()) {
            (ScalarKind::F32, 1) => build!(F32x1),
            (ScalarKind::F32, 2) => build!(F32x2),
            (ScalarKind::F32, 3) => build!(F32x3),
            (ScalarKind::F32, 4) => build!(F32x4),
            (ScalarKind::F64, 1) => build!(F64x1),
            (ScalarKind::F64, 2) => build!(F64x2),
            (ScalarKind::F64, 3) => build!(F64x3),
            (ScalarKind::F64, 4) => build!(F64x4),
            _ => return Err(ArrayError::InvalidShape(extents.to_vec())),
        })
    }

    pub fn dims(&self) -> usize {
        dispatch!(self, a => a.shape().dims())
    }

    pub fn scalar_kind(&self) -> ScalarKind {
        dispatch!(self, a => kind_of(a))
    }

    pub fn shape(&self) -> Vec<usize> {
        dispatch!(self, a => a.shape().extents().to_vec())
    }

    pub fn size(&self) -> usize {
        dispatch!(self, a => a.size())
    }

    /// Element at `coord`; `coord.len()` must equal [`dims`](Self::dims).
    pub fn get(&self, coord: &[usize]) -> Result<f64> {
        dispatch!(self, a => Ok(a.get(fixed(coord)?)?.to_f64()))
    }

    /// Store `value`, rounded to the array's scalar type.
    pub fn set(&self, coord: &[usize], value: f64) -> Result<()> {
        dispatch!(self, a => a.set(fixed(coord)?, Scalar::from_f64(value)))
    }

    /// Every element in row-major order.
    pub fn read(&self, buf: &mut [f64]) -> Result<()> {
        dispatch!(self, a => read_widened(a, buf))
    }

    pub fn write(&self, buf: &[f64]) -> Result<()> {
        dispatch!(self, a => write_narrowed(a, buf))
    }

    pub fn to_vec(&self) -> Result<Vec<f64>> {
        let mut out = vec![0.0; self.size()];
        self.read(&mut out)?;
        Ok(out)
    }

    pub fn rate(&self) -> f64 {
        dispatch!(self, a => a.rate())
    }

    pub fn set_rate(&mut self, rate: f64) -> Result<()> {
        dispatch!(self, a => a.set_rate(rate))
    }

    pub fn codec(&self) -> Arc<dyn Codec> {
        dispatch!(self, a => a.codec())
    }

    pub fn compressed_size(&self) -> usize {
        dispatch!(self, a => a.compressed_size())
    }

    pub fn block_count(&self) -> usize {
        dispatch!(self, a => a.block_count())
    }

    /// Change the shape; `extents.len()` must equal [`dims`](Self::dims).
    /// See [`Array::resize`] for what happens to existing values.
    pub fn resize(&mut self, extents: &[usize], clear_contents: bool) -> Result<()> {
        dispatch!(self, a => a.resize(fixed(extents)?, clear_contents))
    }

    pub fn flush(&self) -> Result<()> {
        dispatch!(self, a => a.flush())
    }

    pub fn cache_stats(&self) -> CacheStats {
        dispatch!(self, a => a.cache_stats())
    }

    pub fn set_cache_capacity(&self, blocks: usize) -> Result<()> {
        dispatch!(self, a => a.set_cache_capacity(blocks))
    }

    pub fn close(self) -> Result<()> {
        dispatch!(self, a => a.close())
    }
}

/// Convert a runtime coordinate or extent slice to a fixed-size array.
fn fixed<const D: usize>(values: &[usize]) -> Result<[usize; D]> {
    values
        .try_into()
        .map_err(|_| ArrayError::DimensionMismatch {
            expected: D,
            actual: values.len(),
        })
}

fn kind_of<T: Scalar, const D: usize>(_: &Array<T, D>) -> ScalarKind {
    T::KIND
}

fn read_widened<T: Scalar, const D: usize>(array: &Array<T, D>, buf: &mut [f64]) -> Result<()> {
    check_len(array.size(), buf.len())?;
    let values = array.to_vec()?;
    for (slot, value) in buf.iter_mut().zip(values) {
        *slot = value.to_f64();
    }
    Ok(())
}

fn write_narrowed<T: Scalar, const D: usize>(array: &Array<T, D>, buf: &[f64]) -> Result<()> {
    let values: Vec<T> = buf.iter().map(|&v| T::from_f64(v)).collect();
    array.write(&values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::testing::TestCodec;

    #[test]
    fn dimensionality_follows_extents() {
        let a = DynArray::new(&[3, 4, 5], 16.0, ScalarKind::F32, TestCodec::shared()).unwrap();
        assert!(matches!(a, DynArray::F32x3(_)));
        assert_eq!(a.dims(), 3);
        assert_eq!(a.shape(), vec![3, 4, 5]);
        assert_eq!(a.size(), 60);
        assert_eq!(a.scalar_kind(), ScalarKind::F32);
        assert_eq!(a.block_count(), 2);
    }

    #[test]
    fn clone_does_not_share_storage() {
        let a = DynArray::new(&[5], 32.0, ScalarKind::F32, TestCodec::shared()).unwrap();
        a.set(&[4], 2.0).unwrap();
        let b = a.clone();
        b.set(&[4], 8.0).unwrap();
        assert_eq!(a.get(&[4]).unwrap(), 2.0);
        assert_eq!(b.get(&[4]).unwrap(), 8.0);
    }

    #[test]
    fn rejects_unsupported_dimensionality() {
        for extents in [&[][..], &[1, 1, 1, 1, 1][..]] {
            assert!(matches!(
                DynArray::new(extents, 16.0, ScalarKind::F64, TestCodec::shared()),
                Err(ArrayError::InvalidShape(_))
            ));
        }
    }

    #[test]
    fn coordinate_length_must_match() {
        let a = DynArray::new(&[4, 4], 32.0, ScalarKind::F64, TestCodec::shared()).unwrap();
        assert!(matches!(
            a.get(&[1]),
            Err(ArrayError::DimensionMismatch { expected: 2, actual: 1 })
        ));
        assert!(matches!(
            a.set(&[1, 2, 3], 1.0),
            Err(ArrayError::DimensionMismatch { expected: 2, actual: 3 })
        ));
        a.set(&[1, 2], 3.5).unwrap();
        assert_eq!(a.get(&[1, 2]).unwrap(), 3.5);
    }

    #[test]
    fn f32_storage_rounds_values() {
        let a = DynArray::new(&[2], 32.0, ScalarKind::F32, TestCodec::shared()).unwrap();
        a.set(&[0], 0.1).unwrap();
        assert_eq!(a.get(&[0]).unwrap(), 0.1f32 as f64);
    }

    #[test]
    fn bulk_io_and_resize() {
        let mut a = DynArray::new(&[2, 3], 64.0, ScalarKind::F64, TestCodec::shared()).unwrap();
        a.write(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
        a.resize(&[3, 2], false).unwrap();
        assert_eq!(a.to_vec().unwrap(), vec![1.0, 2.0, 4.0, 5.0, 0.0, 0.0]);
        assert!(matches!(
            a.resize(&[3], false),
            Err(ArrayError::DimensionMismatch { .. })
        ));
        let mut short = [0.0; 5];
        assert!(matches!(
            a.read(&mut short),
            Err(ArrayError::ShapeMismatch { expected: 6, actual: 5 })
        ));
    }

    #[test]
    fn from_typed_array() {
        let typed: Array<f32, 4> = Array::new([1, 2, 3, 4], 16.0, TestCodec::shared()).unwrap();
        let mut a = DynArray::from(typed);
        assert_eq!(a.dims(), 4);
        a.set_rate(8.0).unwrap();
        assert_eq!(a.rate(), 8.0);
        assert_eq!(a.codec().name(), "test");
        assert!(a.close().is_ok());
    }
}
