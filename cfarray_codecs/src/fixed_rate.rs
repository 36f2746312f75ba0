use anyhow::{bail, ensure};
use cfarray_core::codec::{le_bytes_to_scalars, scalars_to_le_bytes, BlockInfo, Codec};
use cfarray_core::format::CODEC_FIXED_RATE;

use crate::bitstream::{BitReader, BitWriter};

/// Bytes of the shared exponent that opens every quantized block.
const EXPONENT_BYTES: usize = 2;

/// Smallest exponent stored; covers every subnormal magnitude.
const MIN_EXPONENT: i32 = f64::MIN_EXP - 1;

/// Lossy block-floating-point codec with a fixed number of bits per value.
///
/// # Layout
/// ```text
/// rate >= scalar width:  [raw little-endian scalars]
/// otherwise:             [e: i16 LE][q_0 .. q_n-1: p bits each, LSB first]
/// ```
/// `e` is the smallest exponent with `max|v| < 2^e`, `p = clamp(floor(rate),
/// 1, 63)`, and each value is stored as the two's-complement integer
/// `q = round(v · 2^(p-1-e))`, clamped to `±(2^(p-1) - 1)`. The absolute
/// error of every value is at most `2^(e+1-p)`.
///
/// Best for: smooth fields where a bounded error buys a fixed, predictable
/// size.
#[derive(Debug, Default, Clone, Copy)]
pub struct FixedRateCodec;

impl FixedRateCodec {
    /// Bits per value actually stored for `info`, or `None` when blocks are
    /// kept verbatim.
    pub fn value_bits(info: &BlockInfo) -> Option<u32> {
        if info.rate >= info.scalar.bits() as f64 {
            return None;
        }
        Some((info.rate.floor() as u32).clamp(1, 63))
    }

    /// Encoded size of a block described by `info`.
    pub fn payload_len(info: &BlockInfo) -> usize {
        match Self::value_bits(info) {
            None => info.len() * info.scalar.byte_width(),
            Some(p) => EXPONENT_BYTES + (p as usize * info.len()).div_ceil(8),
        }
    }
}

impl Codec for FixedRateCodec {
    fn id(&self) -> u16 {
        CODEC_FIXED_RATE
    }

    fn name(&self) -> &'static str {
        "fixed-rate"
    }

    fn encode_block(&self, values: &[f64], info: &BlockInfo) -> anyhow::Result<Vec<u8>> {
        ensure!(
            values.len() == info.len(),
            "block holds {} values but {} were given",
            info.len(),
            values.len()
        );
        let Some(p) = Self::value_bits(info) else {
            return Ok(scalars_to_le_bytes(values, info.scalar));
        };
        for &v in values {
            self.check_value(v, info)?;
        }

        let max_abs = values.iter().fold(0.0f64, |m, v| m.max(v.abs()));
        let e = exponent_above(max_abs);
        let limit = (1i64 << (p - 1)) - 1;

        let bits = 8 * EXPONENT_BYTES + p as usize * values.len();
        let mut out = BitWriter::with_capacity_bits(bits);
        out.write(e as i16 as u16 as u64, 16);
        for &v in values {
            // |v| < 2^e, so the product stays below 2^(p-1) before rounding.
            let q = (ldexp(v, p as i32 - 1 - e).round() as i64).clamp(-limit, limit);
            out.write(q as u64, p);
        }
        Ok(out.finish())
    }

    fn decode_block(&self, bytes: &[u8], info: &BlockInfo) -> anyhow::Result<Vec<f64>> {
        let Some(p) = Self::value_bits(info) else {
            return le_bytes_to_scalars(bytes, info.scalar, info.len());
        };
        let expected = Self::payload_len(info);
        ensure!(
            bytes.len() == expected,
            "{} values at {} bits need {} bytes, payload has {}",
            info.len(),
            p,
            expected,
            bytes.len()
        );

        let mut input = BitReader::new(bytes);
        let e = read_field(&mut input, 16)? as u16 as i16 as i32;
        ensure!(e >= MIN_EXPONENT && e <= f64::MAX_EXP, "exponent {e} out of range");

        let shift = 64 - p;
        (0..info.len())
            .map(|_| {
                let raw = read_field(&mut input, p)?;
                let q = ((raw << shift) as i64) >> shift;
                Ok(ldexp(q as f64, e + 1 - p as i32))
            })
            .collect()
    }

    /// Quantized blocks share one finite exponent, so NaN and infinities are
    /// only storable when the block is kept verbatim.
    fn check_value(&self, value: f64, info: &BlockInfo) -> anyhow::Result<()> {
        if let Some(p) = Self::value_bits(info) {
            ensure!(
                value.is_finite(),
                "cannot quantize non-finite value {value} at {p} bits"
            );
        }
        Ok(())
    }
}

fn read_field(input: &mut BitReader<'_>, bits: u32) -> anyhow::Result<u64> {
    match input.read(bits) {
        Some(v) => Ok(v),
        None => bail!("payload ends mid-field"),
    }
}

/// Smallest `e >= MIN_EXPONENT` with `x < 2^e`, for finite `x >= 0`.
fn exponent_above(x: f64) -> i32 {
    let mut e = MIN_EXPONENT;
    if x >= f64::MIN_POSITIVE {
        // Unbiased exponent of x, plus one.
        e = ((x.to_bits() >> 52) & 0x7ff) as i32 - 1022;
    }
    while x >= ldexp(1.0, e) {
        e += 1;
    }
    e
}

/// `x · 2^e` for `|e| <= 2044`, applied in two halves so neither factor
/// leaves the normal range.
fn ldexp(x: f64, e: i32) -> f64 {
    let half = e / 2;
    x * pow2_normal(half) * pow2_normal(e - half)
}

fn pow2_normal(e: i32) -> f64 {
    debug_assert!((-1022..=1023).contains(&e));
    f64::from_bits(((e + 1023) as u64) << 52)
}
