//! Block codecs for `cfarray_core` arrays.
//!
//! | id | codec            | kind                          |
//! |----|------------------|-------------------------------|
//! | 0  | passthrough      | raw scalars                   |
//! | 1  | zstd             | lossless, zstd over raw bytes |
//! | 2  | lz4              | lossless, lz4 over raw bytes  |
//! | 4  | fixed-rate       | lossy block floating point    |

mod bitstream;
mod fixed_rate;
mod lz4_codec;
mod passthrough;
mod zstd_codec;

pub use bitstream::{BitReader, BitWriter};
pub use fixed_rate::FixedRateCodec;
pub use lz4_codec::Lz4Codec;
pub use passthrough::PassThroughCodec;
pub use zstd_codec::ZstdCodec;

use cfarray_core::format::{CODEC_FIXED_RATE, CODEC_LZ4, CODEC_PASSTHROUGH, CODEC_ZSTD};
use cfarray_core::Codec;
use std::sync::Arc;

/// Resolve a bundled codec from its numeric id.
pub fn codec_by_id(id: u16) -> anyhow::Result<Arc<dyn Codec>> {
    match id {
        CODEC_PASSTHROUGH => Ok(Arc::new(PassThroughCodec)),
        CODEC_ZSTD => Ok(Arc::new(ZstdCodec::default())),
        CODEC_LZ4 => Ok(Arc::new(Lz4Codec)),
        CODEC_FIXED_RATE => Ok(Arc::new(FixedRateCodec)),
        _ => anyhow::bail!(
            "unknown codec id {}; supported: 0 (passthrough), 1 (zstd), 2 (lz4), 4 (fixed-rate)",
            id
        ),
    }
}

/// Resolve a bundled codec from its name, as printed by [`Codec::name`].
pub fn codec_by_name(name: &str) -> anyhow::Result<Arc<dyn Codec>> {
    let id = match name {
        "passthrough" => CODEC_PASSTHROUGH,
        "zstd" => CODEC_ZSTD,
        "lz4" => CODEC_LZ4,
        "fixed-rate" | "fixed" => CODEC_FIXED_RATE,
        _ => anyhow::bail!("unknown codec {name:?}; supported: passthrough, zstd, lz4, fixed-rate"),
    };
    codec_by_id(id)
}
