//! Windows over another container's index space.
//!
//! - [`View`]: plain or strided window. Borrows its container and owns no
//!   storage; every access is translated and delegated.
//! - [`FlatView`]: the whole container seen as one dimension, row-major.
//! - [`PrivateView`]: an independent compressed copy of a window, taken at
//!   construction. Owns an [`Array`] of its own.
//!
//! Views of views compose: each level translates its local coordinate into
//! the coordinate space of the container beneath it, so the result equals a
//! single translation into the underlying array.
//!
//! A borrowed view cannot outlive its container, and an [`Array`] cannot be
//! resized while any view of it exists, because resizing needs `&mut`.

use std::fmt;
use std::sync::Arc;

use crate::array::Array;
use crate::cache::CacheStats;
use crate::codec::Codec;
use crate::container::Container;
use crate::error::{ArrayError, Result};
use crate::grid::{next_coord, Shape};
use crate::scalar::Scalar;

/// Offset, extents and strides of a window, validated against the shape of
/// the container it refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window<const D: usize> {
    offset: [usize; D],
    shape: Shape<D>,
    strides: [isize; D],
}

impl<const D: usize> Window<D> {
    /// Window whose local coordinate `c` maps to `offset + strides ⊙ c` in
    /// `parent`. Every mapped coordinate must lie inside `parent`, and no
    /// stride may be zero.
    pub fn new(
        parent: Shape<D>,
        offset: [usize; D],
        extents: [usize; D],
        strides: [isize; D],
    ) -> Result<Self> {
        let invalid = || ArrayError::InvalidWindow {
            offset: offset.to_vec(),
            extents: extents.to_vec(),
            strides: strides.to_vec(),
            shape: parent.extents().to_vec(),
        };
        let shape = Shape::new(extents)?;
        let limits = parent.extents();
        for k in 0..D {
            if strides[k] == 0 || offset[k] >= limits[k] {
                return Err(invalid());
            }
            let last = (extents[k] as isize - 1)
                .checked_mul(strides[k])
                .and_then(|span| (offset[k] as isize).checked_add(span))
                .ok_or_else(invalid)?;
            if last < 0 || last as usize >= limits[k] {
                return Err(invalid());
            }
        }
        Ok(Self {
            offset,
            shape,
            strides,
        })
    }

    /// Contiguous window (all strides 1).
    pub fn contiguous(parent: Shape<D>, offset: [usize; D], extents: [usize; D]) -> Result<Self> {
        Self::new(parent, offset, extents, [1; D])
    }

    #[inline]
    pub fn offset(&self) -> [usize; D] {
        self.offset
    }

    #[inline]
    pub fn shape(&self) -> Shape<D> {
        self.shape
    }

    #[inline]
    pub fn strides(&self) -> [isize; D] {
        self.strides
    }

    /// Map an in-range local coordinate into the parent's coordinate space.
    pub fn translate(&self, local: [usize; D]) -> [usize; D] {
        let mut out = [0usize; D];
        for k in 0..D {
            out[k] = (self.offset[k] as isize + self.strides[k] * local[k] as isize) as usize;
        }
        out
    }
}

// ── View ────────────────────────────────────────────────────────────────────

/// Plain or strided window over a borrowed container.
pub struct View<'a, C: ?Sized, const D: usize> {
    container: &'a C,
    window: Window<D>,
}

impl<'a, C: Container<D> + ?Sized, const D: usize> View<'a, C, D> {
    /// Contiguous window of `extents` elements starting at `offset`.
    pub fn new(container: &'a C, offset: [usize; D], extents: [usize; D]) -> Result<Self> {
        let window = Window::contiguous(container.shape(), offset, extents)?;
        Ok(Self { container, window })
    }

    /// Strided window. A negative stride walks its axis backwards from
    /// `offset`.
    pub fn strided(
        container: &'a C,
        offset: [usize; D],
        extents: [usize; D],
        strides: [isize; D],
    ) -> Result<Self> {
        let window = Window::new(container.shape(), offset, extents, strides)?;
        Ok(Self { container, window })
    }

    pub fn window(&self) -> &Window<D> {
        &self.window
    }

    /// The container this view windows.
    pub fn container(&self) -> &'a C {
        self.container
    }

    /// Coordinate in the referenced container of the local coordinate `local`.
    pub fn translate(&self, local: [usize; D]) -> Result<[usize; D]> {
        self.window.shape.check(&local)?;
        Ok(self.window.translate(local))
    }
}

impl<'a, C: Container<D> + ?Sized, const D: usize> Container<D> for View<'a, C, D> {
    type Scalar = C::Scalar;

    fn shape(&self) -> Shape<D> {
        self.window.shape
    }

    fn rate(&self) -> f64 {
        self.container.rate()
    }

    fn codec(&self) -> Arc<dyn Codec> {
        self.container.codec()
    }

    fn compressed_size(&self) -> usize {
        self.container.compressed_size()
    }

    fn get(&self, coord: [usize; D]) -> Result<C::Scalar> {
        self.container.get(self.translate(coord)?)
    }

    fn set(&self, coord: [usize; D], value: C::Scalar) -> Result<()> {
        self.container.set(self.translate(coord)?, value)
    }

    fn flush(&self) -> Result<()> {
        self.container.flush()
    }
}

impl<'a, C: ?Sized, const D: usize> Clone for View<'a, C, D> {
    fn clone(&self) -> Self {
        Self {
            container: self.container,
            window: self.window,
        }
    }
}

impl<'a, C: ?Sized, const D: usize> fmt::Debug for View<'a, C, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("View").field("window", &self.window).finish()
    }
}

// ── FlatView ────────────────────────────────────────────────────────────────

/// One-dimensional view over every element of a container: index `i` is the
/// element at row-major position `i`.
pub struct FlatView<'a, C: ?Sized, const D: usize> {
    container: &'a C,
    source: Shape<D>,
    shape: Shape<1>,
}

impl<'a, C: Container<D> + ?Sized, const D: usize> FlatView<'a, C, D> {
    pub fn new(container: &'a C) -> Self {
        let source = container.shape();
        Self {
            container,
            source,
            shape: source.flattened(),
        }
    }

    /// Coordinate in the referenced container of flat index `index`.
    pub fn translate(&self, index: usize) -> Result<[usize; D]> {
        self.shape.check(&[index])?;
        Ok(self.source.coord_of(index))
    }
}

impl<'a, C: Container<D> + ?Sized, const D: usize> Container<1> for FlatView<'a, C, D> {
    type Scalar = C::Scalar;

    fn shape(&self) -> Shape<1> {
        self.shape
    }

    fn rate(&self) -> f64 {
        self.container.rate()
    }

    fn codec(&self) -> Arc<dyn Codec> {
        self.container.codec()
    }

    fn compressed_size(&self) -> usize {
        self.container.compressed_size()
    }

    fn get(&self, coord: [usize; 1]) -> Result<C::Scalar> {
        self.container.get(self.translate(coord[0])?)
    }

    fn set(&self, coord: [usize; 1], value: C::Scalar) -> Result<()> {
        self.container.set(self.translate(coord[0])?, value)
    }

    fn flush(&self) -> Result<()> {
        self.container.flush()
    }

    fn read(&self, buf: &mut [C::Scalar]) -> Result<()> {
        self.container.read(buf)
    }

    fn write(&self, buf: &[C::Scalar]) -> Result<()> {
        self.container.write(buf)
    }
}

impl<'a, C: ?Sized, const D: usize> fmt::Debug for FlatView<'a, C, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlatView")
            .field("source", &self.source)
            .finish()
    }
}

// ── PrivateView ─────────────────────────────────────────────────────────────

/// Independent compressed copy of a window.
///
/// The copy is taken once, at construction, with the source's codec and
/// rate. Afterwards the two never share state: writes on either side are
/// invisible to the other.
pub struct PrivateView<T: Scalar, const D: usize> {
    array: Array<T, D>,
    window: Window<D>,
}

impl<T: Scalar, const D: usize> PrivateView<T, D> {
    /// Copy the contiguous window `offset`/`extents` of `source`.
    pub fn new<C>(source: &C, offset: [usize; D], extents: [usize; D]) -> Result<Self>
    where
        C: Container<D, Scalar = T> + ?Sized,
    {
        let window = Window::contiguous(source.shape(), offset, extents)?;
        Self::copy(source, window)
    }

    /// Copy a strided window of `source`.
    pub fn strided<C>(
        source: &C,
        offset: [usize; D],
        extents: [usize; D],
        strides: [isize; D],
    ) -> Result<Self>
    where
        C: Container<D, Scalar = T> + ?Sized,
    {
        let window = Window::new(source.shape(), offset, extents, strides)?;
        Self::copy(source, window)
    }

    fn copy<C>(source: &C, window: Window<D>) -> Result<Self>
    where
        C: Container<D, Scalar = T> + ?Sized,
    {
        let extents = window.shape.extents();
        let mut values = Vec::with_capacity(window.shape.size());
        let mut local = [0usize; D];
        loop {
            values.push(source.get(window.translate(local))?);
            if !next_coord(&mut local, &extents) {
                break;
            }
        }
        let array = Array::from_slice(extents, source.rate(), source.codec(), &values)?;
        Ok(Self { array, window })
    }

    /// Window of the source this copy was taken from.
    pub fn window(&self) -> &Window<D> {
        &self.window
    }

    /// Re-encode the private copy at a new rate.
    pub fn set_rate(&mut self, rate: f64) -> Result<()> {
        self.array.set_rate(rate)
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.array.cache_stats()
    }

    pub fn array(&self) -> &Array<T, D> {
        &self.array
    }

    pub fn into_array(self) -> Array<T, D> {
        self.array
    }
}

impl<T: Scalar, const D: usize> Container<D> for PrivateView<T, D> {
    type Scalar = T;

    fn shape(&self) -> Shape<D> {
        self.array.shape()
    }

    fn rate(&self) -> f64 {
        self.array.rate()
    }

    fn codec(&self) -> Arc<dyn Codec> {
        self.array.codec()
    }

    fn compressed_size(&self) -> usize {
        self.array.compressed_size()
    }

    fn get(&self, coord: [usize; D]) -> Result<T> {
        self.array.get(coord)
    }

    fn set(&self, coord: [usize; D], value: T) -> Result<()> {
        self.array.set(coord, value)
    }

    fn flush(&self) -> Result<()> {
        self.array.flush()
    }

    fn read(&self, buf: &mut [T]) -> Result<()> {
        self.array.read(buf)
    }

    fn write(&self, buf: &[T]) -> Result<()> {
        self.array.write(buf)
    }
}

impl<T: Scalar, const D: usize> fmt::Debug for PrivateView<T, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrivateView")
            .field("window", &self.window)
            .field("array", &self.array)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::testing::TestCodec;
    use proptest::prelude::*;

    fn ramp(extents: [usize; 2]) -> Array<f64, 2> {
        let a = Array::new(extents, 64.0, TestCodec::shared()).unwrap();
        let values: Vec<f64> = (0..a.size()).map(|i| i as f64).collect();
        a.write(&values).unwrap();
        a
    }

    #[test]
    fn plain_view_offsets_coordinates() {
        let a = Array::<f64, 2>::new([4, 4], 32.0, TestCodec::shared()).unwrap();
        a.set([1, 1], 7.0).unwrap();
        let v = a.view([1, 1], [2, 2]).unwrap();
        assert_eq!(v.get([0, 0]).unwrap(), a.get([1, 1]).unwrap());
        assert_eq!(v.shape().extents(), [2, 2]);
        assert_eq!(v.size(), 4);
    }

    #[test]
    fn view_writes_are_visible_in_array_and_back() {
        let a = ramp([6, 6]);
        let v = a.view([2, 3], [3, 2]).unwrap();
        v.set([2, 1], -1.0).unwrap();
        assert_eq!(a.get([4, 4]).unwrap(), -1.0);
        a.set([2, 3], -2.0).unwrap();
        assert_eq!(v.get([0, 0]).unwrap(), -2.0);
    }

    #[test]
    fn failed_view_write_restores_earlier_elements() {
        let codec = TestCodec::shared();
        codec.set_reject_non_finite(true);
        let original: Vec<f64> = (0..64).map(|i| i as f64).collect();
        let a = Array::from_slice([8, 8], 64.0, codec, &original).unwrap();
        a.set_cache_capacity(1).unwrap();

        let v = a.view([0, 0], [8, 8]).unwrap();
        let mut buf: Vec<f64> = original.iter().map(|x| x + 100.0).collect();
        buf[10] = f64::NAN;
        assert!(matches!(v.write(&buf), Err(ArrayError::Codec { block: 0, .. })));
        assert_eq!(a.to_vec().unwrap(), original);

        buf[10] = -1.0;
        v.write(&buf).unwrap();
        assert_eq!(a.get([1, 2]).unwrap(), -1.0);
        assert_eq!(a.get([7, 7]).unwrap(), 163.0);
    }

    #[test]
    fn view_rejects_out_of_window_coordinate() {
        let a = ramp([6, 6]);
        let v = a.view([0, 0], [2, 2]).unwrap();
        // In range for the array but not for the view.
        assert!(matches!(v.get([2, 0]), Err(ArrayError::OutOfRange { .. })));
        assert!(v.set([0, 2], 1.0).is_err());
        assert_eq!(a.get([0, 2]).unwrap(), 2.0);
    }

    #[test]
    fn window_must_fit_parent() {
        let a = ramp([4, 4]);
        assert!(matches!(
            a.view([3, 0], [2, 1]),
            Err(ArrayError::InvalidWindow { .. })
        ));
        assert!(matches!(
            a.view([0, 4], [1, 1]),
            Err(ArrayError::InvalidWindow { .. })
        ));
        assert!(matches!(
            a.strided_view([0, 0], [2, 2], [0, 1]),
            Err(ArrayError::InvalidWindow { .. })
        ));
        assert!(matches!(
            a.strided_view([1, 0], [3, 1], [-1, 1]),
            Err(ArrayError::InvalidWindow { .. })
        ));
        assert!(matches!(
            a.view([0, 0], [0, 1]),
            Err(ArrayError::InvalidShape(_))
        ));
    }

    #[test]
    fn strided_view_skips_and_reverses() {
        let a = ramp([4, 6]);
        // Every second column, rows reversed.
        let v = a.strided_view([3, 0], [4, 3], [-1, 2]).unwrap();
        assert_eq!(v.get([0, 0]).unwrap(), 18.0);
        assert_eq!(v.get([0, 2]).unwrap(), 22.0);
        assert_eq!(v.get([3, 1]).unwrap(), 2.0);
        assert_eq!(
            v.to_vec().unwrap(),
            vec![18.0, 20.0, 22.0, 12.0, 14.0, 16.0, 6.0, 8.0, 10.0, 0.0, 2.0, 4.0]
        );
    }

    #[test]
    fn view_of_view_delegates_rate_and_size() {
        let a = ramp([8, 8]);
        let v1 = a.view([1, 1], [6, 6]).unwrap();
        let v2 = v1.view([2, 2], [2, 2]).unwrap();
        assert_eq!(v2.rate(), 64.0);
        assert_eq!(v2.compressed_size(), a.compressed_size());
        assert_eq!(v2.get([1, 1]).unwrap(), a.get([4, 4]).unwrap());
    }

    #[test]
    fn flat_view_indexes_row_major() {
        let a = ramp([3, 5]);
        let f = a.flat_view();
        assert_eq!(f.shape().extents(), [15]);
        assert_eq!(f.get([7]).unwrap(), 7.0);
        f.set([14], 99.0).unwrap();
        assert_eq!(a.get([2, 4]).unwrap(), 99.0);
        assert!(f.get([15]).is_err());
    }

    #[test]
    fn flat_view_of_strided_view() {
        let a = ramp([4, 4]);
        let v = a.strided_view([0, 3], [2, 2], [2, -1]).unwrap();
        let f = v.flat_view();
        assert_eq!(f.to_vec().unwrap(), vec![3.0, 2.0, 11.0, 10.0]);
    }

    #[test]
    fn private_view_is_independent() {
        let a = ramp([6, 6]);
        let p = PrivateView::new(&a, [1, 2], [3, 3]).unwrap();
        assert_eq!(p.get([0, 0]).unwrap(), 8.0);

        a.set([1, 2], 500.0).unwrap();
        assert_eq!(p.get([0, 0]).unwrap(), 8.0);

        p.set([1, 1], -3.0).unwrap();
        assert_eq!(a.get([2, 3]).unwrap(), 15.0);
        assert_eq!(p.window().offset(), [1, 2]);
    }

    #[test]
    fn private_view_encodes_each_block_once() {
        let codec = TestCodec::shared();
        let a: Array<f64, 2> = Array::new([9, 9], 64.0, codec.clone()).unwrap();
        let before = codec.encodes();
        let p = PrivateView::new(&a, [0, 0], [6, 5]).unwrap();
        assert_eq!(p.array().block_count(), 4);
        assert_eq!(codec.encodes() - before, 4);
    }

    #[test]
    fn private_view_of_strided_view_and_rate_change() {
        let a = ramp([4, 4]);
        let v = a.view([0, 0], [4, 4]).unwrap();
        let mut p = PrivateView::strided(&v, [0, 0], [2, 2], [3, 3]).unwrap();
        assert_eq!(p.to_vec().unwrap(), vec![0.0, 3.0, 12.0, 15.0]);
        p.set_rate(32.0).unwrap();
        assert_eq!(p.rate(), 32.0);
        assert_eq!(p.get([1, 1]).unwrap(), 15.0);
        assert_eq!(a.rate(), 64.0);
    }

    proptest! {
        #[test]
        fn nested_views_compose_translations(
            ext in (1usize..13, 1usize..13),
            o1 in (0usize..12, 0usize..12),
            e1 in (1usize..12, 1usize..12),
            s1 in (1isize..3, -2isize..3),
            o2 in (0usize..12, 0usize..12),
            e2 in (1usize..12, 1usize..12),
        ) {
            let a = ramp([ext.0, ext.1]);
            let s1 = [s1.0, if s1.1 == 0 { 1 } else { s1.1 }];
            let v1 = match a.strided_view([o1.0, o1.1], [e1.0, e1.1], s1) {
                Ok(v) => v,
                Err(_) => return Ok(()),
            };
            let v2 = match v1.view([o2.0, o2.1], [e2.0, e2.1]) {
                Ok(v) => v,
                Err(_) => return Ok(()),
            };
            for r in v2.iter() {
                let c = r.coord();
                let direct = a.get(v1.window().translate(v2.window().translate(c))).unwrap();
                prop_assert_eq!(r.get().unwrap(), direct);
            }
        }
    }
}
