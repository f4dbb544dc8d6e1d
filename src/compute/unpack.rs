//! Bit-packed sample stream handling.
//!
//! Sensors such as the 10-bit IR stream deliver samples packed
//! back-to-back, most significant bit first, with no padding at row
//! boundaries. [`BitUnpacker`] walks such a buffer one sample at a time.

use super::{ComputeError, ConfigError};

/// Maximum sample width, the bit width of the sample type.
pub const MAX_BITS_PER_SAMPLE: u32 = u32::BITS;

/// Unpacks MSB-first packed samples from a raw frame buffer.
#[derive(Debug, Clone)]
pub struct BitUnpacker {
    /// Declared frame length in bytes.
    frame_size: usize,
    bits_per_sample: u32,
    mask: u64,
    /// Next byte to read.
    pos: usize,
    /// Pending bits, right-aligned.
    acc: u64,
    /// Number of valid bits in `acc`.
    acc_bits: u32,
}

impl BitUnpacker {
    /// Creates an unpacker for frames of `frame_size` bytes.
    pub fn new(frame_size: usize, bits_per_sample: u32) -> Result<Self, ConfigError> {
        if bits_per_sample == 0 || bits_per_sample > MAX_BITS_PER_SAMPLE {
            return Err(ConfigError::InvalidBitsPerSample {
                bits: bits_per_sample,
                max: MAX_BITS_PER_SAMPLE,
            });
        }
        Ok(Self {
            frame_size,
            bits_per_sample,
            mask: (1u64 << bits_per_sample) - 1,
            pos: 0,
            acc: 0,
            acc_bits: 0,
        })
    }

    /// Returns the sample width in bits.
    #[inline]
    pub fn bits_per_sample(&self) -> u32 {
        self.bits_per_sample
    }

    /// Returns the declared frame length in bytes.
    #[inline]
    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    /// Rewinds to the start of a new frame.
    pub fn start_frame(&mut self) {
        self.pos = 0;
        self.acc = 0;
        self.acc_bits = 0;
    }

    /// Reads the next sample from `data`.
    ///
    /// `data` must be the same buffer for every call within a frame.
    /// Reading stops at the declared frame size even if `data` is longer.
    #[inline]
    pub fn next_sample(&mut self, data: &[u8]) -> Result<u32, ComputeError> {
        let end = self.frame_size.min(data.len());
        while self.acc_bits < self.bits_per_sample {
            if self.pos >= end {
                return Err(ComputeError::BufferExhausted {
                    len: self.frame_size,
                });
            }
            self.acc = (self.acc << 8) | u64::from(data[self.pos]);
            self.pos += 1;
            self.acc_bits += 8;
        }
        self.acc_bits -= self.bits_per_sample;
        let sample = (self.acc >> self.acc_bits) & self.mask;
        // Fewer than 8 bits remain; drop everything above them.
        self.acc &= (1u64 << self.acc_bits) - 1;
        Ok(sample as u32)
    }
}

/// Returns the packed length of `samples` samples of `bits_per_sample` bits.
pub fn packed_len(samples: usize, bits_per_sample: u32) -> usize {
    (samples * bits_per_sample as usize).div_ceil(8)
}

/// Packs samples MSB-first, the inverse of [`BitUnpacker`].
///
/// `bits_per_sample` must be within `1..=32`. Bits above it in each
/// sample are ignored. The final byte is zero-padded.
pub fn pack_samples(samples: &[u32], bits_per_sample: u32) -> Vec<u8> {
    debug_assert!((1..=MAX_BITS_PER_SAMPLE).contains(&bits_per_sample));
    let mut out = Vec::with_capacity(packed_len(samples.len(), bits_per_sample));
    let mask = (1u64 << bits_per_sample) - 1;
    let mut acc: u64 = 0;
    let mut acc_bits: u32 = 0;

    for &sample in samples {
        acc = (acc << bits_per_sample) | (u64::from(sample) & mask);
        acc_bits += bits_per_sample;
        while acc_bits >= 8 {
            acc_bits -= 8;
            out.push((acc >> acc_bits) as u8);
        }
        acc &= (1u64 << acc_bits) - 1;
    }
    if acc_bits > 0 {
        out.push((acc << (8 - acc_bits)) as u8);
    }
    out
}
