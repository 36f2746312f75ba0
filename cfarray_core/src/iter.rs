use std::cmp::Ordering;
use std::fmt;
use std::iter::FusedIterator;

use crate::container::Container;
use crate::error::{ArrayError, Result};
use crate::grid::Shape;
use crate::handle::Ref;

/// Random-access cursor over a container in row-major order.
///
/// The cursor position runs from 0 to `size()`; `size()` is the end
/// sentinel and cannot be dereferenced. `Iter` is also a Rust iterator
/// yielding a [`Ref`] for every remaining position, front to back, in the
/// same order [`Container::read`] fills its buffer.
pub struct Iter<'a, C: ?Sized, const D: usize> {
    container: &'a C,
    shape: Shape<D>,
    front: usize,
    back: usize,
}

impl<'a, C: ?Sized, const D: usize> Clone for Iter<'a, C, D> {
    fn clone(&self) -> Self {
        Self {
            container: self.container,
            shape: self.shape,
            front: self.front,
            back: self.back,
        }
    }
}

impl<'a, C: Container<D> + ?Sized, const D: usize> Iter<'a, C, D> {
    pub(crate) fn new(container: &'a C, shape: Shape<D>, position: usize) -> Self {
        let size = shape.size();
        assert!(position <= size, "iterator position {position} past end {size}");
        Self {
            container,
            shape,
            front: position,
            back: size,
        }
    }

    /// Current cursor position.
    #[inline]
    pub fn position(&self) -> usize {
        self.front
    }

    pub fn is_end(&self) -> bool {
        self.front == self.shape.size()
    }

    /// Move the cursor by `n` positions.
    ///
    /// # Panics
    /// Panics if the new position falls outside `[0, size()]`.
    pub fn advance(&mut self, n: isize) {
        let target = self.front as isize + n;
        let size = self.shape.size();
        assert!(
            (0..=size as isize).contains(&target),
            "iterator advanced to {target}, outside [0, {size}]"
        );
        self.front = target as usize;
    }

    /// Signed number of positions from `self` to `other`.
    pub fn distance_to(&self, other: &Self) -> isize {
        debug_assert!(std::ptr::addr_eq(self.container, other.container));
        other.front as isize - self.front as isize
    }

    /// Coordinate at the cursor, unless at the end.
    pub fn coord(&self) -> Option<[usize; D]> {
        (!self.is_end()).then(|| self.shape.coord_of(self.front))
    }

    /// Reference to the element at the cursor.
    pub fn get(&self) -> Result<Ref<'a, C, D>> {
        match self.coord() {
            Some(coord) => Ok(Ref::new(self.container, coord)),
            None => Err(ArrayError::PositionOutOfRange {
                position: self.front as isize,
                size: self.shape.size(),
            }),
        }
    }
}

impl<'a, C: Container<D> + ?Sized, const D: usize> Iterator for Iter<'a, C, D> {
    type Item = Ref<'a, C, D>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.front >= self.back {
            return None;
        }
        let item = Ref::new(self.container, self.shape.coord_of(self.front));
        self.front += 1;
        Some(item)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.back.saturating_sub(self.front);
        (n, Some(n))
    }

    fn nth(&mut self, n: usize) -> Option<Self::Item> {
        self.front = self.front.saturating_add(n).min(self.back.max(self.front));
        self.next()
    }
}

impl<'a, C: Container<D> + ?Sized, const D: usize> DoubleEndedIterator for Iter<'a, C, D> {
    fn next_back(&mut self) -> Option<Self::Item> {
        if self.front >= self.back {
            return None;
        }
        self.back -= 1;
        Some(Ref::new(self.container, self.shape.coord_of(self.back)))
    }
}

impl<'a, C: Container<D> + ?Sized, const D: usize> ExactSizeIterator for Iter<'a, C, D> {}

impl<'a, C: Container<D> + ?Sized, const D: usize> FusedIterator for Iter<'a, C, D> {}

impl<'a, C: ?Sized, const D: usize> PartialEq for Iter<'a, C, D> {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::addr_eq(self.container, other.container) && self.front == other.front
    }
}

impl<'a, C: ?Sized, const D: usize> PartialOrd for Iter<'a, C, D> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        std::ptr::addr_eq(self.container, other.container).then(|| self.front.cmp(&other.front))
    }
}

impl<'a, C: ?Sized, const D: usize> fmt::Debug for Iter<'a, C, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Iter")
            .field("container", &(self.container as *const C as *const ()))
            .field("position", &self.front)
            .field("back", &self.back)
            .finish()
    }
}
