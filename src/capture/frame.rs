//! Raw frame type with capture metadata.

use std::time::Instant;

use crate::compute::{pack_samples, packed_len};

/// One bit-packed frame as delivered by a frame source.
///
/// The buffer is immutable once captured; the pipeline only borrows it for
/// the duration of a single `write_frame` call.
#[derive(Clone)]
pub struct RawFrame {
    /// Packed samples, MSB-first, row-major, no row padding.
    data: Vec<u8>,
    width: usize,
    height: usize,
    bits_per_sample: u32,
    /// Capture timestamp.
    timestamp: Instant,
    /// Monotonic sequence number.
    sequence: u64,
}

impl RawFrame {
    /// Creates a new frame.
    pub fn new(
        data: Vec<u8>,
        width: usize,
        height: usize,
        bits_per_sample: u32,
        sequence: u64,
    ) -> Self {
        Self {
            data,
            width,
            height,
            bits_per_sample,
            timestamp: Instant::now(),
            sequence,
        }
    }

    /// Packs unpacked samples MSB-first into a new frame.
    ///
    /// Bits above `bits_per_sample` in each sample are discarded.
    pub fn from_samples(
        samples: &[u32],
        width: usize,
        height: usize,
        bits_per_sample: u32,
        sequence: u64,
    ) -> Self {
        debug_assert_eq!(samples.len(), width * height);
        Self::new(
            pack_samples(samples, bits_per_sample),
            width,
            height,
            bits_per_sample,
            sequence,
        )
    }

    /// Returns the packed sample bytes.
    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Returns the frame width.
    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    /// Returns the frame height.
    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    /// Returns the packed sample width in bits.
    #[inline]
    pub fn bits_per_sample(&self) -> u32 {
        self.bits_per_sample
    }

    /// Returns the capture timestamp.
    #[inline]
    pub fn timestamp(&self) -> Instant {
        self.timestamp
    }

    /// Returns the sequence number.
    #[inline]
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Returns the total number of pixels (width * height).
    #[inline]
    pub fn pixel_count(&self) -> usize {
        self.width * self.height
    }

    /// Returns the length of the buffer as delivered.
    #[inline]
    pub fn declared_len(&self) -> usize {
        self.data.len()
    }

    /// Returns the exact packed length implied by the geometry.
    pub fn expected_len(&self) -> usize {
        packed_len(self.pixel_count(), self.bits_per_sample)
    }

    /// Validates that the buffer size matches the geometry.
    pub fn is_valid(&self) -> bool {
        self.declared_len() == self.expected_len()
    }
}

impl std::fmt::Debug for RawFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawFrame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bits_per_sample", &self.bits_per_sample)
            .field("sequence", &self.sequence)
            .field("bytes", &self.data.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_creation() {
        let frame = RawFrame::new(vec![0u8; 640 * 488 * 10 / 8], 640, 488, 10, 1);

        assert_eq!(frame.width(), 640);
        assert_eq!(frame.height(), 488);
        assert_eq!(frame.sequence(), 1);
        assert_eq!(frame.pixel_count(), 640 * 488);
        assert!(frame.is_valid());
    }

    #[test]
    fn test_frame_rounds_up_partial_byte() {
        let frame = RawFrame::new(vec![0u8; 4], 3, 1, 10, 1);
        assert_eq!(frame.expected_len(), 4);
        assert!(frame.is_valid());
    }

    #[test]
    fn test_from_samples_packs_msb_first() {
        let frame = RawFrame::from_samples(&[0x3FF, 0, 0x155, 1], 2, 2, 10, 7);
        assert_eq!(frame.data(), &[0xFF, 0xC0, 0x05, 0x54, 0x01]);
        assert!(frame.is_valid());
        assert_eq!(frame.sequence(), 7);
    }

    #[test]
    fn test_frame_invalid_size() {
        let frame = RawFrame::new(vec![0u8; 100], 640, 480, 8, 1);
        assert!(!frame.is_valid());
    }
}
