use std::cell::RefCell;
use std::fmt;
use std::sync::Arc;

use crate::cache::{BlockCache, BlockState, CacheStats};
use crate::codec::Codec;
use crate::container::{check_len, Container};
use crate::error::{ArrayError, Result};
use crate::format::{rate_is_valid, DEFAULT_RATE};
use crate::grid::{BlockGrid, Shape};
use crate::scalar::Scalar;
use crate::store::BlockStore;

/// Construction parameters for an [`Array`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ArrayConfig {
    /// Bits per element handed to the codec.
    pub rate: f64,
    /// Number of decoded blocks kept resident. `None` sizes the cache to one
    /// row of blocks, so a row-major sweep decodes every block once.
    pub cache_blocks: Option<usize>,
}

impl Default for ArrayConfig {
    fn default() -> Self {
        Self {
            rate: DEFAULT_RATE,
            cache_blocks: None,
        }
    }
}

struct Inner<T, const D: usize> {
    store: BlockStore<T, D>,
    cache: BlockCache<T>,
    /// Cache capacity follows the shape across resizes.
    auto_cache: bool,
}

/// Compressed `D`-dimensional array of `T`.
///
/// Elements live encoded in a [`BlockStore`]; a small LRU cache of decoded
/// blocks absorbs element reads and writes. Writes stay in the cache until
/// the block is evicted, [`flush`](Container::flush)ed or the array is
/// closed.
///
/// ```text
/// get/set ──▶ locate block ──▶ BlockCache ──miss──▶ BlockStore::decode
///                                  │
///                                  └──evict dirty──▶ BlockStore::encode
/// ```
pub struct Array<T: Scalar, const D: usize> {
    inner: RefCell<Inner<T, D>>,
}

impl<T: Scalar, const D: usize> Array<T, D> {
    /// Zero-filled array of `extents` elements at `rate` bits per element.
    pub fn new(extents: [usize; D], rate: f64, codec: Arc<dyn Codec>) -> Result<Self> {
        Self::with_config(
            extents,
            codec,
            ArrayConfig {
                rate,
                ..ArrayConfig::default()
            },
        )
    }

    pub fn with_config(
        extents: [usize; D],
        codec: Arc<dyn Codec>,
        config: ArrayConfig,
    ) -> Result<Self> {
        check_rate(config.rate)?;
        let grid = BlockGrid::new(Shape::new(extents)?);
        let store = BlockStore::zeroed(grid, codec, config.rate)?;
        Ok(Self::from_store(store, config.cache_blocks))
    }

    /// Array holding `data`, given in row-major order.
    pub fn from_slice(
        extents: [usize; D],
        rate: f64,
        codec: Arc<dyn Codec>,
        data: &[T],
    ) -> Result<Self> {
        check_rate(rate)?;
        let shape = Shape::new(extents)?;
        check_len(shape.size(), data.len())?;
        let store = BlockStore::build(BlockGrid::new(shape), codec, rate, |i| data[i])?;
        Ok(Self::from_store(store, None))
    }

    fn from_store(store: BlockStore<T, D>, cache_blocks: Option<usize>) -> Self {
        let capacity = cache_blocks.unwrap_or_else(|| default_cache_blocks(store.grid()));
        Self {
            inner: RefCell::new(Inner {
                store,
                cache: BlockCache::new(capacity),
                auto_cache: cache_blocks.is_none(),
            }),
        }
    }

    /// Re-encode every block at `rate`.
    ///
    /// Current values (including unflushed writes) are decoded, and a new
    /// store is built at the new rate. If any block fails to encode, the
    /// array is left exactly as it was.
    pub fn set_rate(&mut self, rate: f64) -> Result<()> {
        check_rate(rate)?;
        let values = self.to_vec()?;
        let inner = self.inner.get_mut();
        let store = BlockStore::build(
            *inner.store.grid(),
            inner.store.codec().clone(),
            rate,
            |i| values[i],
        )?;
        inner.store = store;
        inner.cache.clear();
        Ok(())
    }

    /// Change the shape.
    ///
    /// With `clear_contents` false, every coordinate inside both the old and
    /// the new shape keeps its value and new coordinates read zero. With
    /// `clear_contents` true every element reads zero. Dimensionality cannot
    /// change. On failure the array keeps its old shape and contents.
    pub fn resize(&mut self, extents: [usize; D], clear_contents: bool) -> Result<()> {
        let new_shape = Shape::new(extents)?;
        let old_shape = self.shape();
        let old = if clear_contents {
            Vec::new()
        } else {
            self.to_vec()?
        };

        let inner = self.inner.get_mut();
        let grid = BlockGrid::new(new_shape);
        let codec = inner.store.codec().clone();
        let rate = inner.store.rate();
        let store = BlockStore::build(grid, codec, rate, |i| {
            let coord = new_shape.coord_of(i);
            if !clear_contents && old_shape.contains(&coord) {
                old[old_shape.linear_index(&coord)]
            } else {
                T::default()
            }
        })?;

        inner.store = store;
        inner.cache.clear();
        if inner.auto_cache {
            let Inner { store, cache, .. } = inner;
            cache.set_capacity(default_cache_blocks(store.grid()), store)?;
        }
        Ok(())
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.inner.borrow().cache.stats()
    }

    pub fn cache_capacity(&self) -> usize {
        self.inner.borrow().cache.capacity()
    }

    /// Fix the number of resident decoded blocks (minimum 1). Blocks that no
    /// longer fit are flushed and evicted, least recently used first.
    pub fn set_cache_capacity(&self, blocks: usize) -> Result<()> {
        let mut inner = self.inner.borrow_mut();
        let Inner {
            store,
            cache,
            auto_cache,
        } = &mut *inner;
        *auto_cache = false;
        cache.set_capacity(blocks, store)
    }

    /// Residency state of `block` in the cache.
    pub fn cache_state(&self, block: usize) -> BlockState {
        self.inner.borrow().cache.state(block)
    }

    pub fn block_count(&self) -> usize {
        self.inner.borrow().store.grid().block_count()
    }

    /// Bytes held by the store's buffer, including slack and dead slots.
    pub fn allocated_size(&self) -> usize {
        self.inner.borrow().store.allocated_size()
    }

    /// Flush every dirty block and release the array, reporting any encode
    /// failure that dropping would swallow.
    pub fn close(self) -> Result<()> {
        self.flush()
    }
}

impl<T: Scalar, const D: usize> Container<D> for Array<T, D> {
    type Scalar = T;

    fn shape(&self) -> Shape<D> {
        self.inner.borrow().store.grid().shape()
    }

    fn rate(&self) -> f64 {
        self.inner.borrow().store.rate()
    }

    fn codec(&self) -> Arc<dyn Codec> {
        self.inner.borrow().store.codec().clone()
    }

    /// Bytes of encoded payload. Writes still held dirty in the cache are
    /// not reflected until they are flushed.
    fn compressed_size(&self) -> usize {
        self.inner.borrow().store.compressed_size()
    }

    fn get(&self, coord: [usize; D]) -> Result<T> {
        let mut inner = self.inner.borrow_mut();
        let Inner { store, cache, .. } = &mut *inner;
        store.grid().shape().check(&coord)?;
        let (block, offset) = store.grid().locate(&coord);
        let values = cache.fetch(block, store)?;
        Ok(values[offset])
    }

    fn set(&self, coord: [usize; D], value: T) -> Result<()> {
        let mut inner = self.inner.borrow_mut();
        let Inner { store, cache, .. } = &mut *inner;
        store.grid().shape().check(&coord)?;
        let (block, offset) = store.grid().locate(&coord);
        store.check_value(block, value)?;
        let values = cache.fetch_mut(block, store)?;
        values[offset] = value;
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        let mut inner = self.inner.borrow_mut();
        let Inner { store, cache, .. } = &mut *inner;
        cache.flush_all(store)
    }

    /// Block by block: resident blocks are copied from the cache, the rest
    /// are decoded straight from the store without disturbing the cache.
    fn read(&self, buf: &mut [T]) -> Result<()> {
        let inner = self.inner.borrow();
        let grid = *inner.store.grid();
        check_len(grid.shape().size(), buf.len())?;
        for block in 0..grid.block_count() {
            let decoded;
            let values = match inner.cache.peek(block) {
                Some(values) => values,
                None => {
                    decoded = inner.store.decode(block)?;
                    &decoded[..]
                }
            };
            for (&linear, &value) in grid.block_linear_indices(block).iter().zip(values) {
                buf[linear] = value;
            }
        }
        Ok(())
    }

    /// Encodes a complete replacement store and swaps it in only once every
    /// block has succeeded. Resident lines are dropped since every element
    /// was overwritten.
    fn write(&self, buf: &[T]) -> Result<()> {
        let mut inner = self.inner.borrow_mut();
        let grid = *inner.store.grid();
        check_len(grid.shape().size(), buf.len())?;
        let store = BlockStore::build(
            grid,
            inner.store.codec().clone(),
            inner.store.rate(),
            |i| buf[i],
        )?;
        inner.store = store;
        inner.cache.clear();
        Ok(())
    }
}

/// Deep copy. The encoded store and every resident line, unflushed writes
/// included, are duplicated; afterwards the two arrays share only the codec.
/// The copy's cache counters start at zero.
impl<T: Scalar, const D: usize> Clone for Array<T, D> {
    fn clone(&self) -> Self {
        let inner = self.inner.borrow();
        let mut cache = inner.cache.clone();
        cache.reset_stats();
        Self {
            inner: RefCell::new(Inner {
                store: inner.store.clone(),
                cache,
                auto_cache: inner.auto_cache,
            }),
        }
    }
}

impl<T: Scalar, const D: usize> Drop for Array<T, D> {
    fn drop(&mut self) {
        // Best effort; `close` reports the error instead.
        let Inner { store, cache, .. } = self.inner.get_mut();
        let _ = cache.flush_all(store);
    }
}

impl<T: Scalar, const D: usize> fmt::Debug for Array<T, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Ok(inner) = self.inner.try_borrow() else {
            return f.debug_struct("Array").finish_non_exhaustive();
        };
        f.debug_struct("Array")
            .field("scalar", &T::KIND)
            .field("extents", &inner.store.grid().shape().extents())
            .field("rate", &inner.store.rate())
            .field("codec", &inner.store.codec().name())
            .field("compressed_size", &inner.store.compressed_size())
            .field("cache", &inner.cache.stats())
            .finish()
    }
}

fn check_rate(rate: f64) -> Result<()> {
    if rate_is_valid(rate) {
        Ok(())
    } else {
        Err(ArrayError::InvalidRate(rate))
    }
}

/// One row of blocks: the product of the block counts of every dimension
/// but the first.
fn default_cache_blocks<const D: usize>(grid: &BlockGrid<D>) -> usize {
    grid.blocks_per_dim()[1..].iter().product::<usize>().max(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::testing::TestCodec;

    fn ramp<const D: usize>(extents: [usize; D]) -> Array<f64, D> {
        let n: usize = extents.iter().product();
        let data: Vec<f64> = (0..n).map(|i| i as f64).collect();
        Array::from_slice(extents, 64.0, TestCodec::shared(), &data).unwrap()
    }

    #[test]
    fn set_then_get_on_fresh_array() {
        let a: Array<f64, 2> = Array::new([4, 4], 32.0, TestCodec::shared()).unwrap();
        a.set([1, 2], 3.5).unwrap();
        assert_eq!(a.get([1, 2]).unwrap(), 3.5);
        assert_eq!(a.get([0, 0]).unwrap(), 0.0);
    }

    #[test]
    fn writes_survive_flush_and_eviction() {
        let a: Array<f32, 1> = Array::new([16], 32.0, TestCodec::shared()).unwrap();
        a.set_cache_capacity(1).unwrap();
        for i in 0..16 {
            a.set([i], i as f32 * 2.0).unwrap();
        }
        let stats = a.cache_stats();
        assert_eq!(stats.evictions, 3);
        assert_eq!(stats.flushes, 3);
        a.flush().unwrap();
        assert_eq!(a.cache_state(3), BlockState::Clean);
        assert_eq!(a.get([15]).unwrap(), 30.0);
        assert_eq!(a.get([0]).unwrap(), 0.0);
        assert_eq!(a.get([5]).unwrap(), 10.0);
    }

    #[test]
    fn out_of_range_is_reported_without_mutation() {
        let a = ramp([3, 5]);
        match a.set([3, 0], 1.0) {
            Err(ArrayError::OutOfRange { coord, shape }) => {
                assert_eq!(coord, vec![3, 0]);
                assert_eq!(shape, vec![3, 5]);
            }
            other => panic!("expected OutOfRange, got {other:?}"),
        }
        assert!(a.get([0, 5]).is_err());
        assert_eq!(a.to_vec().unwrap(), (0..15).map(|i| i as f64).collect::<Vec<_>>());
        assert_eq!(a.cache_stats().misses, 0);
    }

    #[test]
    fn rejects_bad_rates_and_shapes() {
        let codec = TestCodec::shared();
        assert!(matches!(
            Array::<f64, 1>::new([4], 0.5, codec.clone()),
            Err(ArrayError::InvalidRate(_))
        ));
        assert!(matches!(
            Array::<f64, 1>::new([4], f64::NAN, codec.clone()),
            Err(ArrayError::InvalidRate(_))
        ));
        assert!(matches!(
            Array::<f64, 2>::new([4, 0], 16.0, codec.clone()),
            Err(ArrayError::InvalidShape(_))
        ));
        assert!(matches!(
            Array::<f64, 1>::from_slice([4], 16.0, codec, &[1.0; 3]),
            Err(ArrayError::ShapeMismatch { expected: 4, actual: 3 })
        ));
    }

    #[test]
    fn bulk_read_sees_unflushed_writes() {
        let a = ramp([6, 7]);
        a.set([5, 6], -1.0).unwrap();
        let values = a.to_vec().unwrap();
        assert_eq!(values[41], -1.0);
        assert_eq!(values[40], 40.0);
    }

    #[test]
    fn bulk_write_replaces_dirty_lines() {
        let a = ramp([5, 5]);
        a.set([0, 0], 100.0).unwrap();
        let data = vec![1.5; 25];
        a.write(&data).unwrap();
        assert_eq!(a.get([0, 0]).unwrap(), 1.5);
        assert!(a.write(&data[..24]).is_err());
    }

    #[test]
    fn set_rate_keeps_values_under_lossless_codec() {
        let mut a = ramp([9]);
        a.set([8], 42.0).unwrap();
        a.set_rate(8.0).unwrap();
        assert_eq!(a.rate(), 8.0);
        assert_eq!(a.get([8]).unwrap(), 42.0);
        assert!(matches!(a.set_rate(65.0), Err(ArrayError::InvalidRate(_))));
        assert_eq!(a.rate(), 8.0);
    }

    #[test]
    fn resize_grow_preserves_overlap() {
        let mut a = ramp([3, 3]);
        a.resize([5, 4], false).unwrap();
        assert_eq!(a.shape().extents(), [5, 4]);
        assert_eq!(a.get([2, 2]).unwrap(), 8.0);
        assert_eq!(a.get([1, 0]).unwrap(), 3.0);
        assert_eq!(a.get([0, 3]).unwrap(), 0.0);
        assert_eq!(a.get([4, 0]).unwrap(), 0.0);
    }

    #[test]
    fn resize_shrink_preserves_overlap() {
        let mut a = ramp([6, 6]);
        a.set([1, 1], -7.0).unwrap();
        a.resize([2, 3], false).unwrap();
        assert_eq!(a.to_vec().unwrap(), vec![0.0, 1.0, 2.0, 6.0, -7.0, 8.0]);
        assert_eq!(a.block_count(), 1);
    }

    #[test]
    fn resize_clear_zeroes_everything() {
        let mut a = ramp([4, 4]);
        a.resize([4, 8], true).unwrap();
        assert!(a.to_vec().unwrap().iter().all(|&v| v == 0.0));
        assert_eq!(a.cache_capacity(), 2);
    }

    #[test]
    fn resize_rejects_zero_extent_and_keeps_shape() {
        let mut a = ramp([2, 2]);
        assert!(a.resize([0, 2], false).is_err());
        assert_eq!(a.shape().extents(), [2, 2]);
        assert_eq!(a.get([1, 1]).unwrap(), 3.0);
    }

    #[test]
    fn failing_decode_installs_nothing() {
        let codec = TestCodec::shared();
        let a: Array<f64, 1> = Array::new([8], 64.0, codec.clone()).unwrap();
        a.set_cache_capacity(1).unwrap();
        a.set([0], 2.0).unwrap();
        a.flush().unwrap();

        codec.set_fail_decode(true);
        assert!(matches!(a.get([4]), Err(ArrayError::Codec { block: 1, .. })));
        assert!(a.set([5], 1.0).is_err());
        assert_eq!(a.cache_state(1), BlockState::NotResident);
        assert_eq!(a.cache_state(0), BlockState::Clean);

        codec.set_fail_decode(false);
        assert_eq!(a.get([5]).unwrap(), 0.0);
        assert_eq!(a.get([0]).unwrap(), 2.0);
    }

    #[test]
    fn failing_encode_keeps_block_dirty() {
        let codec = TestCodec::shared();
        let a: Array<f64, 1> = Array::new([8], 64.0, codec.clone()).unwrap();
        a.set_cache_capacity(1).unwrap();
        a.set([1], 5.0).unwrap();

        codec.set_fail_encode(true);
        assert!(a.flush().is_err());
        assert_eq!(a.cache_state(0), BlockState::Dirty);
        // The dirty block cannot be evicted, but other blocks stay usable.
        a.set([4], 9.0).unwrap();
        assert_eq!(a.cache_state(0), BlockState::Dirty);
        assert_eq!(a.get([1]).unwrap(), 5.0);

        codec.set_fail_encode(false);
        a.flush().unwrap();
        assert_eq!(a.cache_state(0), BlockState::Clean);
        assert_eq!(a.cache_capacity(), 1);
        assert_eq!(a.get([4]).unwrap(), 9.0);
        assert_eq!(a.get([1]).unwrap(), 5.0);
    }

    #[test]
    fn unencodable_value_is_refused_by_set() {
        let codec = TestCodec::shared();
        codec.set_reject_non_finite(true);
        let a: Array<f64, 2> = Array::new([8, 8], 64.0, codec.clone()).unwrap();
        a.set_cache_capacity(1).unwrap();
        a.set([0, 1], 5.0).unwrap();

        match a.set([0, 0], f64::NAN) {
            Err(ArrayError::Codec { block: 0, source }) => {
                assert!(source.to_string().contains("test encode"), "got: {source}");
            }
            other => panic!("expected codec error, got {other:?}"),
        }
        assert_eq!(a.get([0, 0]).unwrap(), 0.0);

        // Unrelated blocks evict block 0 without trouble.
        assert_eq!(a.get([4, 4]).unwrap(), 0.0);
        a.set([7, 7], 2.0).unwrap();
        a.flush().unwrap();
        assert_eq!(a.get([0, 1]).unwrap(), 5.0);
        assert_eq!(a.get([7, 7]).unwrap(), 2.0);
    }

    #[test]
    fn clone_is_a_deep_copy_including_unflushed_writes() {
        let codec = TestCodec::shared();
        let a: Array<f32, 2> = Array::new([6, 6], 32.0, codec.clone()).unwrap();
        a.set([5, 5], 3.0).unwrap();
        let b = a.clone();
        assert_eq!(b.cache_stats(), CacheStats::default());
        assert_eq!(b.cache_state(3), BlockState::Dirty);
        assert_eq!(b.get([5, 5]).unwrap(), 3.0);

        a.set([0, 0], -1.0).unwrap();
        b.set([5, 5], 4.0).unwrap();
        a.flush().unwrap();
        b.flush().unwrap();
        assert_eq!(a.get([0, 0]).unwrap(), -1.0);
        assert_eq!(a.get([5, 5]).unwrap(), 3.0);
        assert_eq!(b.get([0, 0]).unwrap(), 0.0);
        assert_eq!(b.get([5, 5]).unwrap(), 4.0);
        assert_eq!(b.compressed_size(), a.compressed_size());
    }

    #[test]
    fn corrupted_payload_is_a_codec_error() {
        let a = ramp([8, 8]);
        a.inner.borrow_mut().store.corrupt(2);
        assert!(a.get([0, 0]).is_ok());
        match a.get([4, 1]) {
            Err(ArrayError::Codec { block: 2, source }) => {
                assert!(source.to_string().contains("checksum"), "got: {source}");
            }
            other => panic!("expected codec error, got {other:?}"),
        }
        assert!(a.to_vec().is_err());
    }

    #[test]
    fn close_reports_flush_failure() {
        let codec = TestCodec::shared();
        let a: Array<f32, 2> = Array::new([4, 4], 32.0, codec.clone()).unwrap();
        a.set([0, 0], 1.0).unwrap();
        codec.set_fail_encode(true);
        assert!(matches!(a.close(), Err(ArrayError::Codec { .. })));

        codec.set_fail_encode(false);
        let b: Array<f32, 2> = Array::new([4, 4], 32.0, codec).unwrap();
        b.set([3, 3], 1.0).unwrap();
        assert!(b.close().is_ok());
    }

    #[test]
    fn default_cache_holds_one_row_of_blocks() {
        let a: Array<f32, 3> = Array::new([9, 9, 13], 16.0, TestCodec::shared()).unwrap();
        assert_eq!(a.block_count(), 3 * 3 * 4);
        assert_eq!(a.cache_capacity(), 12);
        let b: Array<f32, 1> = Array::new([100], 16.0, TestCodec::shared()).unwrap();
        assert_eq!(b.cache_capacity(), 1);
    }

    #[test]
    fn row_major_sweep_decodes_each_block_once() {
        let a = ramp([12, 12]);
        for r in a.iter() {
            r.get().unwrap();
        }
        assert_eq!(a.cache_stats().misses, a.block_count() as u64);
    }
}
