use std::sync::Arc;

use crate::codec::Codec;
use crate::error::{ArrayError, Result};
use crate::grid::{next_coord, Shape};
use crate::handle::{Ptr, Ref};
use crate::iter::Iter;
use crate::scalar::Scalar;
use crate::view::{FlatView, View};

/// Shape-aware element access shared by arrays and views.
///
/// Coordinates are `[usize; D]`; every component must be below the matching
/// extent or the call fails with [`ArrayError::OutOfRange`] without touching
/// any data. Bulk buffers and iteration use row-major order, last dimension
/// fastest.
///
/// Reads and writes take `&self`: decoding a block on read mutates the
/// container's cache, and views write through shared references to the
/// containers they window. Containers are therefore not `Sync`.
pub trait Container<const D: usize> {
    type Scalar: Scalar;

    fn shape(&self) -> Shape<D>;

    /// Rate in bits per element of the storage backing this container.
    fn rate(&self) -> f64;

    /// Codec of the storage backing this container.
    fn codec(&self) -> Arc<dyn Codec>;

    /// Bytes of compressed payload in the storage backing this container.
    fn compressed_size(&self) -> usize;

    fn get(&self, coord: [usize; D]) -> Result<Self::Scalar>;

    fn set(&self, coord: [usize; D], value: Self::Scalar) -> Result<()>;

    /// Encode every dirty block of the backing storage.
    fn flush(&self) -> Result<()>;

    /// Total number of elements.
    fn size(&self) -> usize {
        self.shape().size()
    }

    /// Copy every element into `buf` in row-major order.
    fn read(&self, buf: &mut [Self::Scalar]) -> Result<()> {
        let shape = self.shape();
        check_len(shape.size(), buf.len())?;
        let extents = shape.extents();
        let mut coord = [0usize; D];
        for slot in buf.iter_mut() {
            *slot = self.get(coord)?;
            next_coord(&mut coord, &extents);
        }
        Ok(())
    }

    /// Store `buf` (row-major order) into every element.
    ///
    /// Elements are set one by one. If a set fails, the elements already
    /// written get their previous values back before the error is returned.
    fn write(&self, buf: &[Self::Scalar]) -> Result<()> {
        let shape = self.shape();
        check_len(shape.size(), buf.len())?;
        let previous = self.to_vec()?;
        let extents = shape.extents();
        let mut coord = [0usize; D];
        for (written, &value) in buf.iter().enumerate() {
            if let Err(err) = self.set(coord, value) {
                restore(self, &previous[..written], &extents);
                return Err(err);
            }
            next_coord(&mut coord, &extents);
        }
        Ok(())
    }

    /// Every element in row-major order.
    fn to_vec(&self) -> Result<Vec<Self::Scalar>> {
        let mut out = vec![Self::Scalar::default(); self.size()];
        self.read(&mut out)?;
        Ok(out)
    }

    /// Reference to the element at `coord`.
    fn ref_at(&self, coord: [usize; D]) -> Result<Ref<'_, Self, D>>
    where
        Self: Sized,
    {
        self.shape().check(&coord)?;
        Ok(Ref::new(self, coord))
    }

    /// Pointer to the element at `coord`.
    fn ptr_at(&self, coord: [usize; D]) -> Result<Ptr<'_, Self, D>>
    where
        Self: Sized,
    {
        let shape = self.shape();
        shape.check(&coord)?;
        Ok(Ptr::new(self, shape, shape.linear_index(&coord) as isize))
    }

    /// Pointer to the first element.
    fn ptr_begin(&self) -> Ptr<'_, Self, D>
    where
        Self: Sized,
    {
        Ptr::new(self, self.shape(), 0)
    }

    /// Row-major iterator over references to every element.
    fn iter(&self) -> Iter<'_, Self, D>
    where
        Self: Sized,
    {
        Iter::new(self, self.shape(), 0)
    }

    /// Cursor at the first element.
    fn begin(&self) -> Iter<'_, Self, D>
    where
        Self: Sized,
    {
        self.iter()
    }

    /// Cursor one past the last element.
    fn end(&self) -> Iter<'_, Self, D>
    where
        Self: Sized,
    {
        let shape = self.shape();
        Iter::new(self, shape, shape.size())
    }

    /// Contiguous window of `extents` elements starting at `offset`.
    fn view(&self, offset: [usize; D], extents: [usize; D]) -> Result<View<'_, Self, D>>
    where
        Self: Sized,
    {
        View::new(self, offset, extents)
    }

    /// Strided window: local coordinate `c` maps to `offset + strides ⊙ c`.
    fn strided_view(
        &self,
        offset: [usize; D],
        extents: [usize; D],
        strides: [isize; D],
    ) -> Result<View<'_, Self, D>>
    where
        Self: Sized,
    {
        View::strided(self, offset, extents, strides)
    }

    /// One-dimensional view over every element in row-major order.
    fn flat_view(&self) -> FlatView<'_, Self, D>
    where
        Self: Sized,
    {
        FlatView::new(self)
    }
}

/// Set the first `previous.len()` elements, row-major, back to `previous`.
/// An element whose restore fails keeps the value just written.
fn restore<C, const D: usize>(container: &C, previous: &[C::Scalar], extents: &[usize; D])
where
    C: Container<D> + ?Sized,
{
    let mut coord = [0usize; D];
    for &value in previous {
        let _ = container.set(coord, value);
        next_coord(&mut coord, extents);
    }
}

pub(crate) fn check_len(expected: usize, actual: usize) -> Result<()> {
    if expected == actual {
        Ok(())
    } else {
        Err(ArrayError::ShapeMismatch { expected, actual })
    }
}
