//! Sliding-window speckle contrast estimation.
//!
//! For every pixel the estimator keeps running sums of the sample and its
//! square, first down each column (over the last `window` rows) and then
//! across the row (over the last `window` column sums). Each pixel costs
//! O(1) regardless of the window size.
//!
//! # Ring buffer
//!
//! Only `window + 1` rows are ever needed: the current row, the previous row
//! (for the running column sum) and the row leaving the window. Row `y`
//! lives in physical slot `y mod (window + 1)`; the slot advances once per
//! completed row, so memory is O(window * width) independent of frame height.

use super::ConfigError;

/// Position of a pixel in input and output space.
///
/// `output` is `None` until the pixel completes a full estimator window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PixelCoordinate {
    /// Column in the input frame.
    pub x: usize,
    /// Row in the input frame.
    pub y: usize,
    /// (column, row) in the output image, once valid.
    pub output: Option<(usize, usize)>,
}

impl PixelCoordinate {
    /// Creates an input coordinate with an unset output position.
    pub fn new(x: usize, y: usize) -> Self {
        Self { x, y, output: None }
    }

    /// Returns true if the estimator produced a value for this pixel.
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.output.is_some()
    }
}

/// Per-pixel accumulator record.
#[derive(Debug, Clone, Copy, Default)]
struct PixelStats {
    value: u64,
    value_sq: u128,
    vert_sum: u64,
    vert_sum_sq: u128,
    horiz_sum: u64,
    horiz_sum_sq: u128,
}

/// Incremental estimator of squared speckle contrast over a square window.
///
/// [`compute`](Self::compute) must be called once per pixel in row-major
/// order, after [`start_frame`](Self::start_frame).
#[derive(Debug, Clone)]
pub struct SpatialContrastEstimator {
    window: usize,
    width: usize,
    /// Number of samples in a window (`window²`).
    area: u64,
    /// `window + 1` rows of `width` records, row-major.
    ring: Vec<PixelStats>,
    /// Scan index of the next expected pixel.
    next_index: usize,
}

impl SpatialContrastEstimator {
    /// Creates an estimator for rows of `width` pixels.
    pub fn new(window: usize, width: usize) -> Result<Self, ConfigError> {
        if window == 0 || window % 2 == 0 {
            return Err(ConfigError::InvalidWindow(window));
        }
        if width == 0 {
            return Err(ConfigError::InvalidDimensions { width, height: 0 });
        }
        Ok(Self {
            window,
            width,
            area: (window * window) as u64,
            ring: vec![PixelStats::default(); (window + 1) * width],
            next_index: 0,
        })
    }

    /// Returns the window size.
    #[inline]
    pub fn window(&self) -> usize {
        self.window
    }

    /// Returns the row width.
    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    /// Prepares for a new frame.
    ///
    /// Every slot is written before it is read within a frame, so the
    /// storage itself is not cleared.
    pub fn start_frame(&mut self) {
        self.next_index = 0;
    }

    #[inline]
    fn slot(&self, x: usize, y: usize) -> usize {
        (y % (self.window + 1)) * self.width + x
    }

    /// Adds `value` at `pos` and returns the squared contrast of the window
    /// ending there.
    ///
    /// When the window is not yet full, `pos.output` is left `None` and the
    /// return value is meaningless. Otherwise `pos.output` is set to the
    /// window centre.
    pub fn compute(&mut self, pos: &mut PixelCoordinate, value: u32) -> f64 {
        let (x, y) = (pos.x, pos.y);
        let window = self.window;
        debug_assert!(x < self.width);
        debug_assert_eq!(
            y * self.width + x,
            self.next_index,
            "pixels must arrive in row-major order"
        );
        self.next_index += 1;

        let value = u64::from(value);
        let value_sq = u128::from(value) * u128::from(value);

        // Vertical (column) sums over the last `window` rows.
        let (mut vert_sum, mut vert_sum_sq) = (value, value_sq);
        if y > 0 {
            let above = &self.ring[self.slot(x, y - 1)];
            vert_sum += above.vert_sum;
            vert_sum_sq += above.vert_sum_sq;
        }
        if y >= window {
            let top = &self.ring[self.slot(x, y - window)];
            vert_sum -= top.value;
            vert_sum_sq -= top.value_sq;
        }

        // Horizontal sums of the column sums over the last `window` columns.
        let (mut horiz_sum, mut horiz_sum_sq) = (vert_sum, vert_sum_sq);
        if x > 0 {
            let left = &self.ring[self.slot(x - 1, y)];
            horiz_sum += left.horiz_sum;
            horiz_sum_sq += left.horiz_sum_sq;
        }
        if x >= window {
            let departing = &self.ring[self.slot(x - window, y)];
            horiz_sum -= departing.vert_sum;
            horiz_sum_sq -= departing.vert_sum_sq;
        }

        let slot = self.slot(x, y);
        self.ring[slot] = PixelStats {
            value,
            value_sq,
            vert_sum,
            vert_sum_sq,
            horiz_sum,
            horiz_sum_sq,
        };

        if y + 1 < window || x + 1 < window {
            pos.output = None;
            return 0.0;
        }

        let half = (window - 1) / 2;
        pos.output = Some((x - half, y - half));
        squared_contrast(self.area, horiz_sum, horiz_sum_sq)
    }
}

/// Unbiased squared contrast of `n` samples with sum `sum` and sum of
/// squares `sum_sq`.
///
/// Returns 0 for an all-zero window and for a single-sample window.
pub fn squared_contrast(n: u64, sum: u64, sum_sq: u128) -> f64 {
    if sum == 0 || n < 2 {
        return 0.0;
    }
    let n_wide = u128::from(n);
    let sum_wide = u128::from(sum);
    let sum_squared = sum_wide * sum_wide;
    let spread = n_wide * sum_sq - sum_squared;
    let n = n as f64;
    spread as f64 / (n - 1.0) / sum_squared as f64 * n
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    /// Runs the estimator over a row-major grid, returning (coordinate, K²).
    fn run(window: usize, width: usize, data: &[u32]) -> Vec<(PixelCoordinate, f64)> {
        let mut estimator = SpatialContrastEstimator::new(window, width).unwrap();
        estimator.start_frame();
        data.iter()
            .enumerate()
            .map(|(i, &v)| {
                let mut pos = PixelCoordinate::new(i % width, i / width);
                let k_sq = estimator.compute(&mut pos, v);
                (pos, k_sq)
            })
            .collect()
    }

    /// Independent two-pass computation over the window ending at (x, y).
    fn brute_force(window: usize, width: usize, data: &[u32], x: usize, y: usize) -> f64 {
        let values: Vec<f64> = (y + 1 - window..=y)
            .flat_map(|r| (x + 1 - window..=x).map(move |c| data[r * width + c] as f64))
            .collect();
        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        if mean == 0.0 {
            return 0.0;
        }
        let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
        variance / (mean * mean)
    }

    fn assert_rel_eq(actual: f64, expected: f64, tolerance: f64) {
        let error = (actual - expected).abs();
        let rel = if expected == 0.0 { error } else { error / expected.abs() };
        assert!(rel <= tolerance, "expected {expected}, got {actual} (rel. error {rel})");
    }

    #[test]
    fn test_rejects_even_or_zero_window() {
        assert!(matches!(
            SpatialContrastEstimator::new(4, 10),
            Err(ConfigError::InvalidWindow(4))
        ));
        assert!(SpatialContrastEstimator::new(0, 10).is_err());
        assert!(SpatialContrastEstimator::new(1, 10).is_ok());
    }

    #[test]
    fn test_validity_boundary() {
        for window in [1, 3, 5, 7] {
            let size = window + 3;
            let data = vec![10u32; size * size];
            let half = (window - 1) / 2;
            for (pos, _) in run(window, size, &data) {
                if pos.y < window - 1 || pos.x < window - 1 {
                    assert_eq!(pos.output, None, "window {window} at {pos:?}");
                } else {
                    assert_eq!(pos.output, Some((pos.x - half, pos.y - half)));
                }
            }
        }
    }

    #[test]
    fn test_uniform_window_has_zero_contrast() {
        let data = vec![1000u32; 9 * 9];
        for (pos, k_sq) in run(7, 9, &data) {
            if pos.is_valid() {
                assert_eq!(k_sq, 0.0);
            }
        }
    }

    #[test]
    fn test_all_zero_window() {
        let data = vec![0u32; 5 * 5];
        assert!(run(3, 5, &data).iter().all(|&(_, k_sq)| k_sq == 0.0));
    }

    #[test]
    fn test_checkerboard_center_pixel() {
        // 10-bit checkerboard, 5x5, window 3.
        let width = 5;
        let data: Vec<u32> = (0..25)
            .map(|i| if (i % width + i / width) % 2 == 0 { 1023 } else { 0 })
            .collect();
        let results = run(3, width, &data);

        // Window ending at (3, 3) is centred on (2, 2): five 1023s, four 0s.
        let (pos, k_sq) = results[3 * width + 3];
        assert_eq!(pos.output, Some((2, 2)));
        let (n, sum, sum_sq) = (9.0f64, 5.0 * 1023.0, 5.0 * 1023.0 * 1023.0);
        let expected = n * (n * sum_sq - sum * sum) / ((n - 1.0) * sum * sum);
        assert_rel_eq(k_sq, expected, 1e-9);
        assert_rel_eq(k_sq, 0.9, 1e-9);
    }

    #[test]
    fn test_ring_wraps_over_tall_frames() {
        let width = 6;
        let height = 40;
        let data: Vec<u32> = (0..width * height)
            .map(|i| ((i * 7919) % 251) as u32)
            .collect();
        for (pos, k_sq) in run(3, width, &data) {
            if pos.is_valid() {
                let expected = brute_force(3, width, &data, pos.x, pos.y);
                assert_rel_eq(k_sq, expected, 1e-9);
            }
        }
    }

    #[test]
    fn test_start_frame_restarts_accumulation() {
        let width = 5;
        let mut estimator = SpatialContrastEstimator::new(3, width).unwrap();
        let noisy: Vec<u32> = (0..25).map(|i| (i * 37 % 11) as u32).collect();
        let flat = vec![50u32; 25];

        let mut frame = |data: &[u32]| -> Vec<(PixelCoordinate, f64)> {
            estimator.start_frame();
            data.iter()
                .enumerate()
                .map(|(i, &v)| {
                    let mut pos = PixelCoordinate::new(i % width, i / width);
                    let k_sq = estimator.compute(&mut pos, v);
                    (pos, k_sq)
                })
                .collect()
        };

        assert!(frame(&noisy).iter().any(|&(pos, k_sq)| pos.is_valid() && k_sq > 0.0));
        let second = frame(&flat);
        assert_eq!(second.iter().filter(|(pos, _)| pos.is_valid()).count(), 9);
        assert!(second.iter().all(|&(_, k_sq)| k_sq == 0.0));
    }

    #[test]
    fn test_wide_samples_do_not_overflow() {
        let max = (1u32 << 31) - 1;
        let data: Vec<u32> = (0..49).map(|i| if i % 2 == 0 { max } else { 1 }).collect();
        let results = run(7, 7, &data);
        let (pos, k_sq) = results[48];
        assert!(pos.is_valid());
        assert_rel_eq(k_sq, brute_force(7, 7, &data, 6, 6), 1e-9);
    }

    proptest! {
        #[test]
        fn test_matches_brute_force(
            window in prop::sample::select(vec![1usize, 3, 5]),
            width in 5usize..12,
            height in 5usize..12,
            seed in prop::collection::vec(0u32..1024, 144),
        ) {
            let data: Vec<u32> = seed.iter().cycle().take(width * height).copied().collect();
            for (pos, k_sq) in run(window, width, &data) {
                if pos.is_valid() {
                    let expected = if window == 1 {
                        0.0
                    } else {
                        brute_force(window, width, &data, pos.x, pos.y)
                    };
                    let error = (k_sq - expected).abs();
                    prop_assert!(error <= 1e-9 * expected.abs().max(1.0));
                }
            }
        }
    }
}
