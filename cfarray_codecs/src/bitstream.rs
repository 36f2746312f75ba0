//! LSB-first bit packing for fixed-width integer fields.

/// Appends fields of 1 to 64 bits to a byte vector, least significant bit
/// first.
#[derive(Debug, Default)]
pub struct BitWriter {
    bytes: Vec<u8>,
    acc: u128,
    filled: u32,
}

impl BitWriter {
    pub fn with_capacity_bits(bits: usize) -> Self {
        Self {
            bytes: Vec::with_capacity(bits.div_ceil(8)),
            acc: 0,
            filled: 0,
        }
    }

    /// Append the low `bits` bits of `value`.
    pub fn write(&mut self, value: u64, bits: u32) {
        debug_assert!((1..=64).contains(&bits));
        self.acc |= ((value & mask(bits)) as u128) << self.filled;
        self.filled += bits;
        while self.filled >= 8 {
            self.bytes.push(self.acc as u8);
            self.acc >>= 8;
            self.filled -= 8;
        }
    }

    /// Flush the partial final byte, zero padded.
    pub fn finish(mut self) -> Vec<u8> {
        if self.filled > 0 {
            self.bytes.push(self.acc as u8);
        }
        self.bytes
    }
}

/// Reads fields written by [`BitWriter`].
#[derive(Debug)]
pub struct BitReader<'a> {
    bytes: &'a [u8],
    next: usize,
    acc: u128,
    filled: u32,
}

impl<'a> BitReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self {
            bytes,
            next: 0,
            acc: 0,
            filled: 0,
        }
    }

    /// Next `bits`-bit field, or `None` once the input is exhausted.
    pub fn read(&mut self, bits: u32) -> Option<u64> {
        debug_assert!((1..=64).contains(&bits));
        while self.filled < bits {
            let byte = *self.bytes.get(self.next)?;
            self.acc |= (byte as u128) << self.filled;
            self.next += 1;
            self.filled += 8;
        }
        let value = (self.acc as u64) & mask(bits);
        self.acc >>= bits;
        self.filled -= bits;
        Some(value)
    }
}

fn mask(bits: u32) -> u64 {
    if bits >= 64 {
        u64::MAX
    } else {
        (1u64 << bits) - 1
    }
}
