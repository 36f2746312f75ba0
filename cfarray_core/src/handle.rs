//! Element handles: [`Ref`] and [`Ptr`].
//!
//! A compressed element has no memory address; it lives inside an encoded
//! block and is materialized only in a cache line. These handles therefore
//! carry a *capability* (the container plus a coordinate or linear
//! position) and go through the container on every access.

use std::cmp::Ordering;
use std::fmt;
use std::ops::{Add, AddAssign, Sub, SubAssign};

use crate::container::Container;
use crate::error::{ArrayError, Result};
use crate::grid::Shape;

/// Reference to one element of a container.
///
/// Reading converts to the value currently stored; writing stores through
/// the container's cache. Compound updates are a `get` followed by a `set`
/// with nothing cached in between, so a write made through another handle
/// in the meantime is overwritten.
pub struct Ref<'a, C: ?Sized, const D: usize> {
    container: &'a C,
    coord: [usize; D],
}

impl<'a, C: ?Sized, const D: usize> Clone for Ref<'a, C, D> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<'a, C: ?Sized, const D: usize> Copy for Ref<'a, C, D> {}

impl<'a, C: Container<D> + ?Sized, const D: usize> Ref<'a, C, D> {
    /// `coord` must be in range for `container`.
    pub(crate) fn new(container: &'a C, coord: [usize; D]) -> Self {
        Self { container, coord }
    }

    #[inline]
    pub fn coord(&self) -> [usize; D] {
        self.coord
    }

    pub fn container(&self) -> &'a C {
        self.container
    }

    pub fn get(&self) -> Result<C::Scalar> {
        self.container.get(self.coord)
    }

    pub fn set(&self, value: C::Scalar) -> Result<()> {
        self.container.set(self.coord, value)
    }

    /// Read-modify-write: store `f(current)`.
    pub fn update(&self, f: impl FnOnce(C::Scalar) -> C::Scalar) -> Result<()> {
        let current = self.get()?;
        self.set(f(current))
    }

    pub fn add(&self, rhs: C::Scalar) -> Result<()> {
        self.update(|v| v + rhs)
    }

    pub fn sub(&self, rhs: C::Scalar) -> Result<()> {
        self.update(|v| v - rhs)
    }

    pub fn mul(&self, rhs: C::Scalar) -> Result<()> {
        self.update(|v| v * rhs)
    }

    pub fn div(&self, rhs: C::Scalar) -> Result<()> {
        self.update(|v| v / rhs)
    }

    /// Assign the value referenced by `other`, which may live in another
    /// container of any dimensionality.
    pub fn copy_from<O, const E: usize>(&self, other: &Ref<'_, O, E>) -> Result<()>
    where
        O: Container<E, Scalar = C::Scalar> + ?Sized,
    {
        self.set(other.get()?)
    }
}

impl<'a, C: ?Sized, const D: usize> PartialEq for Ref<'a, C, D> {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::addr_eq(self.container, other.container) && self.coord == other.coord
    }
}

impl<'a, C: ?Sized, const D: usize> Eq for Ref<'a, C, D> {}

impl<'a, C: ?Sized, const D: usize> fmt::Debug for Ref<'a, C, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ref")
            .field("container", &(self.container as *const C as *const ()))
            .field("coord", &self.coord)
            .finish()
    }
}

/// Pointer-like handle over a container's row-major linear positions.
///
/// Arithmetic moves the position freely, including outside `[0, size)`;
/// only dereferencing requires the position to be in bounds.
pub struct Ptr<'a, C: ?Sized, const D: usize> {
    container: &'a C,
    shape: Shape<D>,
    pos: isize,
}

impl<'a, C: ?Sized, const D: usize> Clone for Ptr<'a, C, D> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<'a, C: ?Sized, const D: usize> Copy for Ptr<'a, C, D> {}

impl<'a, C: Container<D> + ?Sized, const D: usize> Ptr<'a, C, D> {
    pub(crate) fn new(container: &'a C, shape: Shape<D>, pos: isize) -> Self {
        Self {
            container,
            shape,
            pos,
        }
    }

    /// Linear position in row-major order.
    #[inline]
    pub fn position(&self) -> isize {
        self.pos
    }

    pub fn in_bounds(&self) -> bool {
        self.pos >= 0 && (self.pos as usize) < self.shape.size()
    }

    /// Coordinate of the current position, if in bounds.
    pub fn coord(&self) -> Option<[usize; D]> {
        self.in_bounds().then(|| self.shape.coord_of(self.pos as usize))
    }

    pub fn advance(&mut self, n: isize) {
        self.pos += n;
    }

    /// Move by a per-dimension delta. Components that leave their axis carry
    /// into earlier dimensions exactly as linear row-major arithmetic does.
    pub fn step(&mut self, delta: [isize; D]) {
        let strides = self.shape.row_strides();
        self.pos += delta
            .iter()
            .zip(strides)
            .map(|(&d, s)| d * s as isize)
            .sum::<isize>();
    }

    /// Signed number of elements from `self` to `other`.
    pub fn distance(&self, other: &Self) -> isize {
        debug_assert!(std::ptr::addr_eq(self.container, other.container));
        other.pos - self.pos
    }

    /// Reference to the element at the current position.
    pub fn to_ref(&self) -> Result<Ref<'a, C, D>> {
        match self.coord() {
            Some(coord) => Ok(Ref::new(self.container, coord)),
            None => Err(ArrayError::PositionOutOfRange {
                position: self.pos,
                size: self.shape.size(),
            }),
        }
    }

    /// Reference to the element `n` positions away.
    pub fn at(&self, n: isize) -> Result<Ref<'a, C, D>> {
        (*self + n).to_ref()
    }

    pub fn get(&self) -> Result<C::Scalar> {
        self.to_ref()?.get()
    }

    pub fn set(&self, value: C::Scalar) -> Result<()> {
        self.to_ref()?.set(value)
    }
}

impl<'a, C: Container<D> + ?Sized, const D: usize> Add<isize> for Ptr<'a, C, D> {
    type Output = Self;

    fn add(mut self, n: isize) -> Self {
        self.advance(n);
        self
    }
}

impl<'a, C: Container<D> + ?Sized, const D: usize> Sub<isize> for Ptr<'a, C, D> {
    type Output = Self;

    fn sub(mut self, n: isize) -> Self {
        self.advance(-n);
        self
    }
}

impl<'a, C: Container<D> + ?Sized, const D: usize> AddAssign<isize> for Ptr<'a, C, D> {
    fn add_assign(&mut self, n: isize) {
        self.advance(n);
    }
}

impl<'a, C: Container<D> + ?Sized, const D: usize> SubAssign<isize> for Ptr<'a, C, D> {
    fn sub_assign(&mut self, n: isize) {
        self.advance(-n);
    }
}

impl<'a, C: Container<D> + ?Sized, const D: usize> Sub for Ptr<'a, C, D> {
    type Output = isize;

    /// `p2 - p1` is the number of elements from `p1` to `p2`.
    fn sub(self, rhs: Self) -> isize {
        rhs.distance(&self)
    }
}

impl<'a, C: ?Sized, const D: usize> PartialEq for Ptr<'a, C, D> {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::addr_eq(self.container, other.container) && self.pos == other.pos
    }
}

impl<'a, C: ?Sized, const D: usize> Eq for Ptr<'a, C, D> {}

impl<'a, C: ?Sized, const D: usize> PartialOrd for Ptr<'a, C, D> {
    /// Pointers into different containers are unordered.
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        std::ptr::addr_eq(self.container, other.container).then(|| self.pos.cmp(&other.pos))
    }
}

impl<'a, C: ?Sized, const D: usize> fmt::Debug for Ptr<'a, C, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ptr")
            .field("container", &(self.container as *const C as *const ()))
            .field("position", &self.pos)
            .finish()
    }
}
