use crate::format::MAX_DIMS;
use crate::scalar::ScalarKind;

/// Everything a codec needs to know about the block it encodes or decodes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlockInfo {
    /// Clipped extents of the block; dimensions beyond `dims` are 1.
    pub extents: [usize; MAX_DIMS],
    /// Dimensionality of the owning array.
    pub dims: usize,
    /// Scalar width of the owning array.
    pub scalar: ScalarKind,
    /// Configured rate in bits per element.
    pub rate: f64,
}

impl BlockInfo {
    /// Number of scalars in the block.
    pub fn len(&self) -> usize {
        self.extents[..self.dims].iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Core compression abstraction.
///
/// Each `Codec` implementation:
/// - Is identified by a stable numeric `id()`.
/// - Must encode/decode individual blocks independently; no cross-block
///   state is permitted. This is the invariant that makes random access
///   possible.
/// - Receives the block's values in row-major order over `info.extents`
///   and must return exactly `info.len()` values from `decode_block`.
pub trait Codec: Send + Sync {
    /// Stable codec ID.
    fn id(&self) -> u16;

    /// Human-readable codec name for CLI display.
    fn name(&self) -> &'static str;

    /// Encode a single independent block.
    fn encode_block(&self, values: &[f64], info: &BlockInfo) -> anyhow::Result<Vec<u8>>;

    /// Decode a single independent block written by `encode_block` with the
    /// same `info`.
    fn decode_block(&self, bytes: &[u8], info: &BlockInfo) -> anyhow::Result<Vec<f64>>;

    /// Fail if `value` could never be encoded into a block described by
    /// `info`.
    ///
    /// Containers ask before accepting an element write, so an unencodable
    /// value is refused by the write itself rather than by a later flush.
    /// The default accepts every value.
    fn check_value(&self, value: f64, info: &BlockInfo) -> anyhow::Result<()> {
        let _ = (value, info);
        Ok(())
    }
}

// ── Raw scalar bytes ───────────────────────────────────────────────────────

/// Serialize `values` as little-endian scalars of width `kind`.
///
/// Shared by the lossless codecs, which compress this byte image.
pub fn scalars_to_le_bytes(values: &[f64], kind: ScalarKind) -> Vec<u8> {
    let mut out = Vec::with_capacity(values.len() * kind.byte_width());
    match kind {
        ScalarKind::F32 => {
            for &v in values {
                out.extend_from_slice(&(v as f32).to_le_bytes());
            }
        }
        ScalarKind::F64 => {
            for &v in values {
                out.extend_from_slice(&v.to_le_bytes());
            }
        }
    }
    out
}

/// Parse exactly `expected` little-endian scalars of width `kind`.
pub fn le_bytes_to_scalars(
    bytes: &[u8],
    kind: ScalarKind,
    expected: usize,
) -> anyhow::Result<Vec<f64>> {
    let width = kind.byte_width();
    if bytes.len() != expected * width {
        anyhow::bail!(
            "raw block holds {} bytes but {} {} scalars need {}",
            bytes.len(),
            expected,
            kind,
            expected * width
        );
    }
    let values = match kind {
        ScalarKind::F32 => bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]) as f64)
            .collect(),
        ScalarKind::F64 => bytes
            .chunks_exact(8)
            .map(|c| f64::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]))
            .collect(),
    };
    Ok(values)
}

#[cfg(test)]
pub(crate) mod testing {
    //! Codecs used by the unit tests of this crate.

    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;

    /// Lossless codec storing raw scalars, with switchable failures and call
    /// counters.
    #[derive(Default)]
    pub struct TestCodec {
        pub fail_encode: AtomicBool,
        pub fail_decode: AtomicBool,
        pub reject_non_finite: AtomicBool,
        pub encodes: AtomicUsize,
        pub decodes: AtomicUsize,
    }

    impl TestCodec {
        pub fn shared() -> Arc<TestCodec> {
            Arc::new(TestCodec::default())
        }

        pub fn encodes(&self) -> usize {
            self.encodes.load(Ordering::SeqCst)
        }

        pub fn decodes(&self) -> usize {
            self.decodes.load(Ordering::SeqCst)
        }

        pub fn set_fail_encode(&self, fail: bool) {
            self.fail_encode.store(fail, Ordering::SeqCst);
        }

        pub fn set_fail_decode(&self, fail: bool) {
            self.fail_decode.store(fail, Ordering::SeqCst);
        }

        pub fn set_reject_non_finite(&self, reject: bool) {
            self.reject_non_finite.store(reject, Ordering::SeqCst);
        }
    }

    impl Codec for TestCodec {
        fn id(&self) -> u16 {
            u16::MAX
        }

        fn name(&self) -> &'static str {
            "test"
        }

        fn encode_block(&self, values: &[f64], info: &BlockInfo) -> anyhow::Result<Vec<u8>> {
            if self.fail_encode.load(Ordering::SeqCst) {
                anyhow::bail!("injected encode failure");
            }
            for &v in values {
                self.check_value(v, info)?;
            }
            self.encodes.fetch_add(1, Ordering::SeqCst);
            Ok(scalars_to_le_bytes(values, info.scalar))
        }

        fn decode_block(&self, bytes: &[u8], info: &BlockInfo) -> anyhow::Result<Vec<f64>> {
            if self.fail_decode.load(Ordering::SeqCst) {
                anyhow::bail!("injected decode failure");
            }
            self.decodes.fetch_add(1, Ordering::SeqCst);
            le_bytes_to_scalars(bytes, info.scalar, info.len())
        }

        fn check_value(&self, value: f64, _info: &BlockInfo) -> anyhow::Result<()> {
            if self.reject_non_finite.load(Ordering::SeqCst) && !value.is_finite() {
                anyhow::bail!("non-finite value {value} refused");
            }
            Ok(())
        }
    }
}
