//! Shapes, row-major index arithmetic and the block tiling of an array.
//!
//! Every array is tiled into blocks of [`BLOCK_EDGE`] elements per axis.
//! Blocks are numbered row-major over the block grid and the values inside
//! one block are laid out row-major over its (possibly clipped) extents. The
//! same row-major convention, last dimension fastest, is used for bulk
//! buffers, pointers and iterators.

use crate::codec::BlockInfo;
use crate::error::{ArrayError, Result};
use crate::format::{BLOCK_EDGE, MAX_DIMS};
use crate::scalar::ScalarKind;

/// Extents of a `D`-dimensional array.
///
/// Invariants: `1 <= D <= 4`, every extent is at least 1, and the element
/// count fits in `usize` (and in `isize`, so linear positions can be signed).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Shape<const D: usize> {
    extents: [usize; D],
}

impl<const D: usize> Shape<D> {
    pub fn new(extents: [usize; D]) -> Result<Self> {
        if D == 0 || D > MAX_DIMS || extents.contains(&0) {
            return Err(ArrayError::InvalidShape(extents.to_vec()));
        }
        let size = extents
            .iter()
            .try_fold(1usize, |acc, &e| acc.checked_mul(e))
            .filter(|&n| n <= isize::MAX as usize);
        if size.is_none() {
            return Err(ArrayError::InvalidShape(extents.to_vec()));
        }
        Ok(Self { extents })
    }

    #[inline]
    pub fn extents(&self) -> [usize; D] {
        self.extents
    }

    #[inline]
    pub fn dims(&self) -> usize {
        D
    }

    /// Total number of elements.
    #[inline]
    pub fn size(&self) -> usize {
        self.extents.iter().product()
    }

    pub fn contains(&self, coord: &[usize; D]) -> bool {
        coord.iter().zip(&self.extents).all(|(&c, &e)| c < e)
    }

    /// Fail with [`ArrayError::OutOfRange`] unless `coord` lies inside the shape.
    pub fn check(&self, coord: &[usize; D]) -> Result<()> {
        if self.contains(coord) {
            Ok(())
        } else {
            Err(ArrayError::OutOfRange {
                coord: coord.iter().map(|&c| c as isize).collect(),
                shape: self.extents.to_vec(),
            })
        }
    }

    /// Row-major strides: the linear distance between neighbours along each axis.
    pub fn row_strides(&self) -> [usize; D] {
        let mut strides = [1usize; D];
        for k in (0..D.saturating_sub(1)).rev() {
            strides[k] = strides[k + 1] * self.extents[k + 1];
        }
        strides
    }

    /// Row-major linear index of an in-range coordinate.
    pub fn linear_index(&self, coord: &[usize; D]) -> usize {
        coord
            .iter()
            .zip(&self.extents)
            .fold(0, |acc, (&c, &e)| acc * e + c)
    }

    /// One-dimensional shape with the same element count.
    pub fn flattened(&self) -> Shape<1> {
        Shape {
            extents: [self.size()],
        }
    }

    /// Inverse of [`linear_index`](Self::linear_index) for `linear < size()`.
    pub fn coord_of(&self, mut linear: usize) -> [usize; D] {
        let mut coord = [0usize; D];
        for k in (0..D).rev() {
            coord[k] = linear % self.extents[k];
            linear /= self.extents[k];
        }
        coord
    }
}

/// Advance `coord` to the next row-major position within `extents`.
///
/// Returns `false` (leaving `coord` all zeros) after the last position.
pub fn next_coord<const D: usize>(coord: &mut [usize; D], extents: &[usize; D]) -> bool {
    for k in (0..D).rev() {
        coord[k] += 1;
        if coord[k] < extents[k] {
            return true;
        }
        coord[k] = 0;
    }
    false
}

/// Tiling of a shape into blocks of `BLOCK_EDGE^D` elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockGrid<const D: usize> {
    shape: Shape<D>,
    blocks: Shape<D>,
}

impl<const D: usize> BlockGrid<D> {
    pub fn new(shape: Shape<D>) -> Self {
        let blocks = shape.extents().map(|e| e.div_ceil(BLOCK_EDGE));
        Self {
            shape,
            // Every extent >= 1, so every block count >= 1 and fits.
            blocks: Shape { extents: blocks },
        }
    }

    #[inline]
    pub fn shape(&self) -> Shape<D> {
        self.shape
    }

    /// Number of blocks along each axis.
    #[inline]
    pub fn blocks_per_dim(&self) -> [usize; D] {
        self.blocks.extents()
    }

    #[inline]
    pub fn block_count(&self) -> usize {
        self.blocks.size()
    }

    /// Block id of `coord` and the position of `coord` inside that block's
    /// scratch buffer. `coord` must be in range.
    pub fn locate(&self, coord: &[usize; D]) -> (usize, usize) {
        let block_coord = coord.map(|c| c / BLOCK_EDGE);
        let block = self.blocks.linear_index(&block_coord);
        let extents = self.clipped_extents(&block_coord);
        let mut offset = 0;
        for k in 0..D {
            offset = offset * extents[k] + coord[k] % BLOCK_EDGE;
        }
        (block, offset)
    }

    /// Coordinate of the first element of `block`.
    pub fn block_origin(&self, block: usize) -> [usize; D] {
        self.blocks.coord_of(block).map(|b| b * BLOCK_EDGE)
    }

    /// Extents of `block`, clipped to the array shape.
    pub fn block_extents(&self, block: usize) -> [usize; D] {
        self.clipped_extents(&self.blocks.coord_of(block))
    }

    fn clipped_extents(&self, block_coord: &[usize; D]) -> [usize; D] {
        let extents = self.shape.extents();
        let mut out = [BLOCK_EDGE; D];
        for k in 0..D {
            out[k] = BLOCK_EDGE.min(extents[k] - block_coord[k] * BLOCK_EDGE);
        }
        out
    }

    /// Number of elements held by `block`.
    pub fn block_len(&self, block: usize) -> usize {
        self.block_extents(block).iter().product()
    }

    /// Codec parameters for `block`.
    pub fn block_info(&self, block: usize, scalar: ScalarKind, rate: f64) -> BlockInfo {
        let mut extents = [1usize; MAX_DIMS];
        extents[..D].copy_from_slice(&self.block_extents(block));
        BlockInfo {
            extents,
            dims: D,
            scalar,
            rate,
        }
    }

    /// Row-major linear indices (into a whole-array buffer) of the elements of
    /// `block`, in scratch order.
    pub fn block_linear_indices(&self, block: usize) -> Vec<usize> {
        let origin = self.block_origin(block);
        let extents = self.block_extents(block);
        let mut out = Vec::with_capacity(extents.iter().product());
        let mut local = [0usize; D];
        loop {
            let mut global = origin;
            for k in 0..D {
                global[k] += local[k];
            }
            out.push(self.shape.linear_index(&global));
            if !next_coord(&mut local, &extents) {
                break;
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn shape_rejects_zero_extent() {
        assert!(matches!(
            Shape::new([3, 0]),
            Err(ArrayError::InvalidShape(ref e)) if e == &vec![3, 0]
        ));
    }

    #[test]
    fn shape_rejects_five_dims() {
        assert!(Shape::new([1, 1, 1, 1, 1]).is_err());
    }

    #[test]
    fn shape_rejects_overflowing_size() {
        assert!(Shape::new([usize::MAX, 2]).is_err());
    }

    #[test]
    fn row_major_last_dimension_fastest() {
        let s = Shape::new([2, 3, 4]).unwrap();
        assert_eq!(s.row_strides(), [12, 4, 1]);
        assert_eq!(s.linear_index(&[0, 0, 1]), 1);
        assert_eq!(s.linear_index(&[0, 1, 0]), 4);
        assert_eq!(s.linear_index(&[1, 0, 0]), 12);
        assert_eq!(s.coord_of(23), [1, 2, 3]);
    }

    #[test]
    fn check_reports_coordinate_and_shape() {
        let s = Shape::new([4, 4]).unwrap();
        match s.check(&[1, 4]) {
            Err(ArrayError::OutOfRange { coord, shape }) => {
                assert_eq!(coord, vec![1, 4]);
                assert_eq!(shape, vec![4, 4]);
            }
            other => panic!("expected OutOfRange, got {other:?}"),
        }
    }

    #[test]
    fn next_coord_walks_row_major_then_stops() {
        let extents = [2, 2];
        let mut c = [0, 0];
        let mut seen = vec![c];
        while next_coord(&mut c, &extents) {
            seen.push(c);
        }
        assert_eq!(seen, vec![[0, 0], [0, 1], [1, 0], [1, 1]]);
        assert_eq!(c, [0, 0]);
    }

    #[test]
    fn grid_clips_edge_blocks() {
        let grid = BlockGrid::new(Shape::new([6, 9]).unwrap());
        assert_eq!(grid.blocks_per_dim(), [2, 3]);
        assert_eq!(grid.block_count(), 6);
        assert_eq!(grid.block_extents(0), [4, 4]);
        assert_eq!(grid.block_extents(2), [4, 1]);
        assert_eq!(grid.block_extents(5), [2, 1]);
        assert_eq!(grid.block_origin(5), [4, 8]);
    }

    #[test]
    fn locate_uses_clipped_block_layout() {
        let grid = BlockGrid::new(Shape::new([6, 6]).unwrap());
        // Block 3 is the bottom-right 2x2 corner.
        assert_eq!(grid.locate(&[4, 4]), (3, 0));
        assert_eq!(grid.locate(&[4, 5]), (3, 1));
        assert_eq!(grid.locate(&[5, 4]), (3, 2));
        assert_eq!(grid.locate(&[1, 2]), (0, 6));
    }

    #[test]
    fn block_info_pads_unused_dims_with_one() {
        let grid = BlockGrid::new(Shape::new([5]).unwrap());
        let info = grid.block_info(1, ScalarKind::F32, 8.0);
        assert_eq!(info.extents, [1, 1, 1, 1]);
        assert_eq!(info.len(), 1);
        assert_eq!(info.dims, 1);
    }

    proptest! {
        #[test]
        fn every_coordinate_belongs_to_exactly_one_block(
            a in 1usize..18,
            b in 1usize..18,
            c in 1usize..10,
        ) {
            let shape = Shape::new([a, b, c]).unwrap();
            let grid = BlockGrid::new(shape);
            let mut hits = vec![0u32; shape.size()];
            for block in 0..grid.block_count() {
                let indices = grid.block_linear_indices(block);
                prop_assert_eq!(indices.len(), grid.block_len(block));
                for (offset, &linear) in indices.iter().enumerate() {
                    hits[linear] += 1;
                    prop_assert_eq!(grid.locate(&shape.coord_of(linear)), (block, offset));
                }
            }
            prop_assert!(hits.iter().all(|&h| h == 1));
        }

        #[test]
        fn linear_index_inverts_coord_of(
            a in 1usize..20,
            b in 1usize..20,
            seed in 0usize..10_000,
        ) {
            let shape = Shape::new([a, b]).unwrap();
            let linear = seed % shape.size();
            prop_assert_eq!(shape.linear_index(&shape.coord_of(linear)), linear);
        }
    }
}
