use std::marker::PhantomData;
use std::sync::Arc;

use anyhow::Context;
use xxhash_rust::xxh3::xxh3_64;

use crate::cache::BlockSource;
use crate::codec::Codec;
use crate::error::{ArrayError, Result};
use crate::format::BlockEntry;
use crate::grid::BlockGrid;
use crate::scalar::Scalar;

/// Compressed storage of one array: every block's encoded payload in a
/// single growable byte buffer, plus a block index.
///
/// # Layout
/// ```text
/// [BLOCK 0][BLOCK 1] ... [BLOCK N-1][relocated blocks ...]
/// ```
/// Blocks are written in id order when the store is built. Re-encoding a
/// block writes in place when the new payload fits the block's slot, and
/// otherwise appends it, leaving the old slot dead. Once dead bytes outweigh
/// live ones the buffer is compacted.
///
/// # Integrity
/// Each payload carries an xxhash3-64 checksum in its [`BlockEntry`]; decode
/// verifies it before handing the bytes to the codec.
#[derive(Clone)]
pub struct BlockStore<T, const D: usize> {
    grid: BlockGrid<D>,
    codec: Arc<dyn Codec>,
    rate: f64,
    data: Vec<u8>,
    entries: Vec<BlockEntry>,
    /// Bytes of `data` not referenced by any entry.
    dead: usize,
    _scalar: PhantomData<T>,
}

impl<T: Scalar, const D: usize> BlockStore<T, D> {
    /// Encode every block of `grid`, taking element values from `value_at`
    /// (indexed by row-major linear position).
    ///
    /// Nothing is returned unless every block encoded successfully, so callers
    /// can build a replacement store and swap it in atomically.
    pub fn build(
        grid: BlockGrid<D>,
        codec: Arc<dyn Codec>,
        rate: f64,
        value_at: impl Fn(usize) -> T,
    ) -> Result<Self> {
        let mut store = Self {
            grid,
            codec,
            rate,
            data: Vec::new(),
            entries: Vec::with_capacity(grid.block_count()),
            dead: 0,
            _scalar: PhantomData,
        };
        for block in 0..grid.block_count() {
            let values: Vec<T> = grid
                .block_linear_indices(block)
                .into_iter()
                .map(&value_at)
                .collect();
            let payload = store.encode_payload(block, &values)?;
            let offset = store.data.len();
            store.data.extend_from_slice(&payload);
            store.entries.push(BlockEntry {
                offset,
                len: payload.len(),
                capacity: payload.len(),
                checksum: xxh3_64(&payload),
            });
        }
        Ok(store)
    }

    /// A store whose elements are all zero.
    pub fn zeroed(grid: BlockGrid<D>, codec: Arc<dyn Codec>, rate: f64) -> Result<Self> {
        Self::build(grid, codec, rate, |_| T::default())
    }

    #[inline]
    pub fn grid(&self) -> &BlockGrid<D> {
        &self.grid
    }

    #[inline]
    pub fn rate(&self) -> f64 {
        self.rate
    }

    pub fn codec(&self) -> &Arc<dyn Codec> {
        &self.codec
    }

    /// Access the block index (for inspection).
    pub fn entries(&self) -> &[BlockEntry] {
        &self.entries
    }

    /// Total bytes of live block payloads.
    pub fn compressed_size(&self) -> usize {
        self.entries.iter().map(|e| e.len).sum()
    }

    /// Bytes held by the buffer, including slack and dead slots.
    pub fn allocated_size(&self) -> usize {
        self.data.len()
    }

    /// Decode `block` into its scratch values.
    pub fn decode(&self, block: usize) -> Result<Vec<T>> {
        let entry = self.entries.get(block).copied().ok_or_else(|| ArrayError::Codec {
            block,
            source: anyhow::anyhow!(
                "block index {} out of range (total {})",
                block,
                self.entries.len()
            ),
        })?;
        let payload = &self.data[entry.offset..entry.offset + entry.len];
        let computed = xxh3_64(payload);
        if computed != entry.checksum {
            return Err(ArrayError::Codec {
                block,
                source: anyhow::anyhow!(
                    "checksum mismatch: expected {:016x}, got {:016x}",
                    entry.checksum,
                    computed
                ),
            });
        }

        let info = self.grid.block_info(block, T::KIND, self.rate);
        let values = self
            .codec
            .decode_block(payload, &info)
            .with_context(|| format!("{} decode", self.codec.name()))
            .map_err(|source| ArrayError::Codec { block, source })?;
        if values.len() != info.len() {
            return Err(ArrayError::Codec {
                block,
                source: anyhow::anyhow!(
                    "decoded {} values but the block holds {}",
                    values.len(),
                    info.len()
                ),
            });
        }
        Ok(values.into_iter().map(T::from_f64).collect())
    }

    /// Re-encode `block` from its scratch values.
    ///
    /// On failure the stored payload of `block` is left untouched.
    pub fn encode(&mut self, block: usize, values: &[T]) -> Result<()> {
        let payload = self.encode_payload(block, values)?;
        let entry = &mut self.entries[block];
        if payload.len() <= entry.capacity {
            self.data[entry.offset..entry.offset + payload.len()].copy_from_slice(&payload);
        } else {
            self.dead += entry.capacity;
            entry.offset = self.data.len();
            entry.capacity = payload.len();
            self.data.extend_from_slice(&payload);
        }
        entry.len = payload.len();
        entry.checksum = xxh3_64(&payload);

        if self.dead > self.data.len() - self.dead {
            self.compact();
        }
        Ok(())
    }

    /// Ask the codec whether `value` can be stored in `block`.
    pub fn check_value(&self, block: usize, value: T) -> Result<()> {
        let info = self.grid.block_info(block, T::KIND, self.rate);
        self.codec
            .check_value(value.to_f64(), &info)
            .with_context(|| format!("{} encode", self.codec.name()))
            .map_err(|source| ArrayError::Codec { block, source })
    }

    fn encode_payload(&self, block: usize, values: &[T]) -> Result<Vec<u8>> {
        let info = self.grid.block_info(block, T::KIND, self.rate);
        let values: Vec<f64> = values.iter().map(|v| v.to_f64()).collect();
        self.codec
            .encode_block(&values, &info)
            .with_context(|| format!("{} encode", self.codec.name()))
            .map_err(|source| ArrayError::Codec { block, source })
    }

    /// Rewrite the buffer with every live slot packed in block order.
    fn compact(&mut self) {
        let live: usize = self.entries.iter().map(|e| e.capacity).sum();
        let mut data = Vec::with_capacity(live);
        for entry in &mut self.entries {
            let start = data.len();
            data.extend_from_slice(&self.data[entry.offset..entry.offset + entry.capacity]);
            entry.offset = start;
        }
        self.data = data;
        self.dead = 0;
    }

    /// Overwrite one payload byte. Only used to simulate storage corruption.
    #[cfg(test)]
    pub(crate) fn corrupt(&mut self, block: usize) {
        let offset = self.entries[block].offset;
        self.data[offset] ^= 0xff;
    }
}

impl<T: Scalar, const D: usize> BlockSource<T> for BlockStore<T, D> {
    fn decode_block(&self, block: usize) -> Result<Vec<T>> {
        self.decode(block)
    }

    fn encode_block(&mut self, block: usize, values: &[T]) -> Result<()> {
        self.encode(block, values)
    }
}
