/// Edge length of a block along every dimension.
///
/// A block of a `d`-dimensional array holds up to `BLOCK_EDGE^d` scalars;
/// blocks on the upper edges of the array are clipped to its shape.
pub const BLOCK_EDGE: usize = 4;

/// Highest supported dimensionality.
pub const MAX_DIMS: usize = 4;

// ── Rate limits ─────────────────────────────────────────────────────────────

/// Smallest accepted rate, in bits per element.
pub const MIN_RATE: f64 = 1.0;

/// Largest accepted rate, in bits per element.
pub const MAX_RATE: f64 = 64.0;

/// Rate used when none is configured: 16 bits per element.
pub const DEFAULT_RATE: f64 = 16.0;

// ── Codec IDs ──────────────────────────────────────────────────────────────

pub const CODEC_PASSTHROUGH: u16 = 0;
pub const CODEC_ZSTD: u16 = 1;
pub const CODEC_LZ4: u16 = 2;
pub const CODEC_FIXED_RATE: u16 = 4;

// ── Block index entry ───────────────────────────────────────────────────────

/// One entry in the block index of a compressed store.
///
/// Locates the encoded payload of a single block inside the store's byte
/// buffer and carries the checksum used to verify it on decode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BlockEntry {
    /// Byte offset of the payload within the store buffer.
    pub offset: usize,
    /// Length of the current payload in bytes.
    pub len: usize,
    /// Bytes reserved for this block at `offset`. A re-encoded payload that
    /// fits is written in place; a larger one is relocated to the end.
    pub capacity: usize,
    /// xxhash3-64 of the payload bytes.
    pub checksum: u64,
}

/// Whether `rate` lies in the accepted `[MIN_RATE, MAX_RATE]` range.
pub fn rate_is_valid(rate: f64) -> bool {
    rate.is_finite() && (MIN_RATE..=MAX_RATE).contains(&rate)
}
