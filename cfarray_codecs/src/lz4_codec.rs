use cfarray_core::codec::{le_bytes_to_scalars, scalars_to_le_bytes, BlockInfo, Codec};
use cfarray_core::format::CODEC_LZ4;
use lz4_flex::{compress_prepend_size, decompress_size_prepended};

/// LZ4 over the raw scalar bytes of each block.
///
/// Lossless; the rate is ignored. Fastest decode of the bundled codecs, at
/// the cost of weaker compression on noisy floating-point data.
///
/// Best for: hot arrays where element access latency dominates.
pub struct Lz4Codec;

impl Codec for Lz4Codec {
    fn id(&self) -> u16 {
        CODEC_LZ4
    }

    fn name(&self) -> &'static str {
        "lz4"
    }

    fn encode_block(&self, values: &[f64], info: &BlockInfo) -> anyhow::Result<Vec<u8>> {
        Ok(compress_prepend_size(&scalars_to_le_bytes(values, info.scalar)))
    }

    fn decode_block(&self, bytes: &[u8], info: &BlockInfo) -> anyhow::Result<Vec<f64>> {
        let raw = decompress_size_prepended(bytes)
            .map_err(|e| anyhow::anyhow!("lz4 decompress error: {}", e))?;
        le_bytes_to_scalars(&raw, info.scalar, info.len())
    }
}
