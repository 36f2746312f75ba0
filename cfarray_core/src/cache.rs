//! Decoded-block cache with dirty tracking.
//!
//! [`BlockCache`] keeps a bounded number of decoded blocks ("lines") for one
//! container. Each block is in exactly one of three states:
//!
//! ```text
//!              fetch (miss: decode)          fetch_mut / mark_dirty
//! NotResident ─────────────────────▶ Clean ─────────────────────────▶ Dirty
//!      ▲                               │  ▲                              │
//!      └──────── evict / clear ────────┘  └────── flush (encode) ────────┘
//! ```
//!
//! A Dirty line is never dropped without a successful encode: eviction
//! flushes the victim first, and a failed encode leaves the line Dirty and
//! resident. The only way out of Dirty other than a flush is
//! [`BlockCache::clear`], used after the owner has replaced its whole store.
//!
//! A victim whose encode fails does not block the fetch that needed room.
//! The least recently used Clean line is replaced instead, and when every
//! line is Dirty the cache grows past capacity until the next successful
//! [`BlockCache::flush_all`]. The encode error itself surfaces
//! from `flush`, `flush_all` or `set_capacity`.

use crate::error::Result;

/// Where decoded blocks come from and where dirty blocks go back to.
pub trait BlockSource<T> {
    fn decode_block(&self, block: usize) -> Result<Vec<T>>;

    fn encode_block(&mut self, block: usize, values: &[T]) -> Result<()>;
}

/// Residency state of one block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockState {
    NotResident,
    Clean,
    Dirty,
}

/// Counters for cache behaviour, useful in benchmarks and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    /// Dirty blocks encoded back to storage.
    pub flushes: u64,
}

impl CacheStats {
    /// Fraction of fetches served without decoding.
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            return 0.0;
        }
        self.hits as f64 / total as f64
    }
}

#[derive(Debug, Clone)]
struct CacheLine<T> {
    block: usize,
    data: Vec<T>,
    dirty: bool,
    last_use: u64,
}

/// Bounded LRU cache of decoded blocks.
#[derive(Debug, Clone)]
pub struct BlockCache<T> {
    lines: Vec<CacheLine<T>>,
    capacity: usize,
    clock: u64,
    stats: CacheStats,
}

impl<T: Copy> BlockCache<T> {
    /// Create an empty cache holding at most `capacity` blocks (minimum 1).
    pub fn new(capacity: usize) -> Self {
        Self {
            lines: Vec::new(),
            capacity: capacity.max(1),
            clock: 0,
            stats: CacheStats::default(),
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    /// Number of resident blocks.
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn state(&self, block: usize) -> BlockState {
        match self.find(block) {
            None => BlockState::NotResident,
            Some(i) if self.lines[i].dirty => BlockState::Dirty,
            Some(_) => BlockState::Clean,
        }
    }

    /// Whether any resident block is dirty.
    pub fn has_dirty(&self) -> bool {
        self.lines.iter().any(|l| l.dirty)
    }

    /// Scratch values of `block`, decoding it on a miss.
    pub fn fetch<S: BlockSource<T>>(&mut self, block: usize, source: &mut S) -> Result<&[T]> {
        let i = self.load(block, source)?;
        Ok(&self.lines[i].data)
    }

    /// Mutable scratch values of `block`, decoding it on a miss. The block
    /// is marked dirty only once it is resident.
    pub fn fetch_mut<S: BlockSource<T>>(
        &mut self,
        block: usize,
        source: &mut S,
    ) -> Result<&mut [T]> {
        let i = self.load(block, source)?;
        let line = &mut self.lines[i];
        line.dirty = true;
        Ok(&mut line.data)
    }

    /// Resident scratch values of `block`, without decoding or touching LRU
    /// order.
    pub fn peek(&self, block: usize) -> Option<&[T]> {
        self.find(block).map(|i| self.lines[i].data.as_slice())
    }

    /// Mark a resident block dirty. Returns `false` if it is not resident.
    pub fn mark_dirty(&mut self, block: usize) -> bool {
        match self.find(block) {
            Some(i) => {
                self.lines[i].dirty = true;
                true
            }
            None => false,
        }
    }

    /// Encode `block` if it is resident and dirty.
    pub fn flush<S: BlockSource<T>>(&mut self, block: usize, source: &mut S) -> Result<()> {
        if let Some(i) = self.find(block) {
            self.flush_line(i, source)?;
        }
        Ok(())
    }

    /// Encode every dirty block. Stops at the first failure; blocks not yet
    /// flushed stay dirty. On success, lines held over capacity are evicted.
    pub fn flush_all<S: BlockSource<T>>(&mut self, source: &mut S) -> Result<()> {
        for i in 0..self.lines.len() {
            self.flush_line(i, source)?;
        }
        while self.lines.len() > self.capacity {
            let victim = self.lru_index();
            self.lines.swap_remove(victim);
            self.stats.evictions += 1;
        }
        Ok(())
    }

    /// Zero the counters.
    pub fn reset_stats(&mut self) {
        self.stats = CacheStats::default();
    }

    /// Drop every line, dirty or not. Callers use this only after the
    /// underlying store has been replaced wholesale.
    pub fn clear(&mut self) {
        self.lines.clear();
    }

    /// Change the capacity, flushing and evicting least recently used lines
    /// that no longer fit.
    pub fn set_capacity<S: BlockSource<T>>(
        &mut self,
        capacity: usize,
        source: &mut S,
    ) -> Result<()> {
        self.capacity = capacity.max(1);
        while self.lines.len() > self.capacity {
            let victim = self.lru_index();
            self.flush_line(victim, source)?;
            self.lines.swap_remove(victim);
            self.stats.evictions += 1;
        }
        Ok(())
    }

    fn find(&self, block: usize) -> Option<usize> {
        self.lines.iter().position(|l| l.block == block)
    }

    fn lru_index(&self) -> usize {
        self.lines
            .iter()
            .enumerate()
            .min_by_key(|(_, l)| l.last_use)
            .map(|(i, _)| i)
            .unwrap_or(0)
    }

    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    fn flush_line<S: BlockSource<T>>(&mut self, i: usize, source: &mut S) -> Result<()> {
        let line = &mut self.lines[i];
        if line.dirty {
            source.encode_block(line.block, &line.data)?;
            line.dirty = false;
            self.stats.flushes += 1;
        }
        Ok(())
    }

    /// Line to replace on a miss: the least recently used line once flushed,
    /// or, if that flush fails, the least recently used Clean line. `None`
    /// means every line is Dirty and unflushable, so the new line is added
    /// over capacity.
    fn make_room<S: BlockSource<T>>(&mut self, source: &mut S) -> Option<usize> {
        let lru = self.lru_index();
        if self.flush_line(lru, source).is_ok() {
            return Some(lru);
        }
        self.lines
            .iter()
            .enumerate()
            .filter(|(_, l)| !l.dirty)
            .min_by_key(|(_, l)| l.last_use)
            .map(|(i, _)| i)
    }

    /// Make `block` resident and return its line index.
    fn load<S: BlockSource<T>>(&mut self, block: usize, source: &mut S) -> Result<usize> {
        let now = self.tick();
        if let Some(i) = self.find(block) {
            self.stats.hits += 1;
            self.lines[i].last_use = now;
            return Ok(i);
        }

        // Flush the victim before decoding so a failure on either side leaves
        // no dirty data behind and no half-installed line.
        let victim = if self.lines.len() < self.capacity {
            None
        } else {
            self.make_room(source)
        };

        let data = source.decode_block(block)?;
        self.stats.misses += 1;
        let line = CacheLine {
            block,
            data,
            dirty: false,
            last_use: now,
        };
        match victim {
            Some(v) => {
                self.lines[v] = line;
                self.stats.evictions += 1;
                Ok(v)
            }
            None => {
                self.lines.push(line);
                Ok(self.lines.len() - 1)
            }
        }
    }
}
