use cfarray_core::codec::{le_bytes_to_scalars, scalars_to_le_bytes, BlockInfo, Codec};
use cfarray_core::format::CODEC_PASSTHROUGH;

/// Stores every block as raw little-endian scalars, with no compression.
///
/// Useful for:
/// - Checking array behaviour independently of any lossy codec.
/// - Measuring the uncompressed footprint that other codecs are compared to.
pub struct PassThroughCodec;

impl Codec for PassThroughCodec {
    fn id(&self) -> u16 {
        CODEC_PASSTHROUGH
    }

    fn name(&self) -> &'static str {
        "passthrough"
    }

    fn encode_block(&self, values: &[f64], info: &BlockInfo) -> anyhow::Result<Vec<u8>> {
        Ok(scalars_to_le_bytes(values, info.scalar))
    }

    fn decode_block(&self, bytes: &[u8], info: &BlockInfo) -> anyhow::Result<Vec<f64>> {
        le_bytes_to_scalars(bytes, info.scalar, info.len())
    }
}
