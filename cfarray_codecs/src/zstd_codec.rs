use anyhow::Context;
use cfarray_core::codec::{le_bytes_to_scalars, scalars_to_le_bytes, BlockInfo, Codec};
use cfarray_core::format::CODEC_ZSTD;

/// Zstandard over the raw scalar bytes of each block.
///
/// Lossless; the rate is ignored. Each block is an independent zstd frame,
/// so any block decodes without touching its neighbours.
///
/// Best for: fields with long runs of repeated values (masks, padding).
pub struct ZstdCodec {
    /// Compression level (1 = fast / larger, 22 = slow / smallest).
    pub level: i32,
}

impl Default for ZstdCodec {
    fn default() -> Self {
        Self { level: 3 }
    }
}

impl ZstdCodec {
    pub fn new(level: i32) -> Self {
        Self { level }
    }
}

impl Codec for ZstdCodec {
    fn id(&self) -> u16 {
        CODEC_ZSTD
    }

    fn name(&self) -> &'static str {
        "zstd"
    }

    fn encode_block(&self, values: &[f64], info: &BlockInfo) -> anyhow::Result<Vec<u8>> {
        let raw = scalars_to_le_bytes(values, info.scalar);
        let compressed = zstd::bulk::compress(&raw, self.level)?;
        Ok(compressed)
    }

    fn decode_block(&self, bytes: &[u8], info: &BlockInfo) -> anyhow::Result<Vec<f64>> {
        // The decoded size is known exactly, so it doubles as the capacity bound.
        let capacity = info.len() * info.scalar.byte_width();
        let raw = zstd::bulk::decompress(bytes, capacity).context("zstd frame")?;
        le_bytes_to_scalars(&raw, info.scalar, info.len())
    }
}
