//! Per-frame orchestration of the compute stages.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use super::unpack::{packed_len, BitUnpacker, MAX_BITS_PER_SAMPLE};
use super::visualize::{Visualizer, VisualizerMode};
use super::window::{PixelCoordinate, SpatialContrastEstimator};
use super::{ComputeError, ConfigError, CorrelationSolver};

/// Output pixel layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Three channels.
    #[default]
    Rgb,
    /// Four channels, alpha always opaque.
    Rgba,
}

impl OutputFormat {
    /// Returns the number of bytes per pixel.
    #[inline]
    pub fn channels(self) -> usize {
        match self {
            Self::Rgb => 3,
            Self::Rgba => 4,
        }
    }

    /// Returns the format with `channels` bytes per pixel.
    pub fn from_channels(channels: usize) -> Result<Self, ComputeError> {
        match channels {
            3 => Ok(Self::Rgb),
            4 => Ok(Self::Rgba),
            n => Err(ComputeError::UnsupportedFormat(format!("{n}-channel"))),
        }
    }
}

impl FromStr for OutputFormat {
    type Err = ComputeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "rgb" => Ok(Self::Rgb),
            "rgba" => Ok(Self::Rgba),
            other => Err(ComputeError::UnsupportedFormat(other.to_string())),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rgb => f.write_str("rgb"),
            Self::Rgba => f.write_str("rgba"),
        }
    }
}

/// An interleaved 8-bit colour image.
#[derive(Clone, PartialEq, Eq)]
pub struct OutputImage {
    width: usize,
    height: usize,
    channels: usize,
    data: Vec<u8>,
}

impl OutputImage {
    /// Creates an opaque black image.
    pub fn new(width: usize, height: usize, format: OutputFormat) -> Self {
        let mut image = Self {
            width: 0,
            height: 0,
            channels: format.channels(),
            data: Vec::new(),
        };
        image.resize(width, height);
        image
    }

    /// Wraps an existing buffer with `channels` bytes per pixel.
    ///
    /// Returns `None` if the buffer length does not match.
    pub fn from_raw(width: usize, height: usize, channels: usize, data: Vec<u8>) -> Option<Self> {
        (data.len() == width * height * channels).then_some(Self {
            width,
            height,
            channels,
            data,
        })
    }

    /// Resizes to `width`×`height`, keeping the channel count.
    ///
    /// Contents are reset to opaque black only if the size changes.
    fn resize(&mut self, width: usize, height: usize) {
        if self.width == width && self.height == height {
            return;
        }
        self.width = width;
        self.height = height;
        self.data.clear();
        self.data.resize(width * height * self.channels, 0);
        if self.channels == 4 {
            self.data.chunks_exact_mut(4).for_each(|px| px[3] = u8::MAX);
        }
    }

    /// Returns the image width.
    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    /// Returns the image height.
    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    /// Returns the number of channels per pixel (3 or 4).
    #[inline]
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Returns the interleaved pixel data, row-major.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Consumes the image, returning its pixel data.
    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    /// Returns the pixel at column `x`, row `y`.
    #[inline]
    pub fn pixel(&self, x: usize, y: usize) -> &[u8] {
        let start = (y * self.width + x) * self.channels;
        &self.data[start..start + self.channels]
    }

    #[inline]
    fn pixel_mut(&mut self, x: usize, y: usize) -> &mut [u8] {
        let start = (y * self.width + x) * self.channels;
        &mut self.data[start..start + self.channels]
    }

    /// Fills every pixel with `value`.
    pub fn fill(&mut self, value: &[u8]) {
        debug_assert_eq!(value.len(), self.channels);
        self.data
            .chunks_exact_mut(self.channels)
            .for_each(|px| px.copy_from_slice(value));
    }
}

impl fmt::Debug for OutputImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutputImage")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("channels", &self.channels)
            .finish()
    }
}

/// Pipeline configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineOptions {
    /// Frame width in pixels.
    pub width: usize,
    /// Frame height in pixels.
    pub height: usize,
    /// Packed sample width.
    pub bits_per_sample: u32,
    /// Contrast window size (odd).
    pub spatial_window: usize,
    /// Correlation lookup table resolution.
    pub correlation_table_size: usize,
    /// Calibration factor β.
    pub baseline_correlation_time: f64,
    /// Declared frame length in bytes; derived from geometry if unset.
    pub frame_size: Option<usize>,
    /// Correlation time at the top of the direct-mode palette.
    pub color_scale: f64,
    /// Overlay opacity.
    pub alpha: f64,
    /// Direct colour or overlay on the source image.
    pub mode: VisualizerMode,
    /// RGB or RGBA output.
    pub output_format: OutputFormat,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            width: 640,
            height: 488,
            bits_per_sample: 10,
            spatial_window: 7,
            correlation_table_size: 1024,
            baseline_correlation_time: 1.0,
            frame_size: None,
            color_scale: 30.0,
            alpha: 1.0,
            mode: VisualizerMode::Direct,
            output_format: OutputFormat::Rgb,
        }
    }
}

impl PipelineOptions {
    /// Creates options for the given geometry with default tuning.
    pub fn with_geometry(width: usize, height: usize, bits_per_sample: u32) -> Self {
        Self {
            width,
            height,
            bits_per_sample,
            ..Default::default()
        }
    }

    /// Returns the exact packed length of one frame.
    pub fn expected_frame_size(&self) -> usize {
        packed_len(self.width * self.height, self.bits_per_sample)
    }

    /// Returns the declared frame length.
    pub fn frame_size(&self) -> usize {
        self.frame_size
            .unwrap_or_else(|| self.expected_frame_size())
    }

    /// Validates the options.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.width == 0 || self.height == 0 {
            return Err(ConfigError::InvalidDimensions {
                width: self.width,
                height: self.height,
            });
        }
        if self.bits_per_sample == 0 || self.bits_per_sample > MAX_BITS_PER_SAMPLE {
            return Err(ConfigError::InvalidBitsPerSample {
                bits: self.bits_per_sample,
                max: MAX_BITS_PER_SAMPLE,
            });
        }
        if self.spatial_window == 0 || self.spatial_window % 2 == 0 {
            return Err(ConfigError::InvalidWindow(self.spatial_window));
        }
        if self.correlation_table_size < 2 {
            return Err(ConfigError::InvalidTableSize(self.correlation_table_size));
        }
        if !self.baseline_correlation_time.is_finite() || self.baseline_correlation_time <= 0.0 {
            return Err(ConfigError::InvalidBaseline(self.baseline_correlation_time));
        }
        if !self.color_scale.is_finite() || self.color_scale <= 0.0 {
            return Err(ConfigError::InvalidColorScale(self.color_scale));
        }
        if !(0.0..=1.0).contains(&self.alpha) {
            return Err(ConfigError::InvalidAlpha(self.alpha));
        }
        Ok(())
    }
}

/// Outcome of one processed frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameSummary {
    /// Pixels that received a correlation-time colour.
    pub valid_pixels: usize,
    /// Wall-clock processing time.
    pub elapsed: Duration,
}

/// Turns raw frames into colour-coded correlation time images.
///
/// Holds all per-frame state, pre-sized at construction; processing a
/// frame allocates nothing unless the output image must be resized. One
/// instance must not process two frames concurrently; use one pipeline per
/// thread and share the solver via [`FramePipeline::with_solver`].
pub struct FramePipeline {
    options: PipelineOptions,
    unpacker: BitUnpacker,
    estimator: SpatialContrastEstimator,
    solver: Arc<CorrelationSolver>,
    visualizer: Visualizer,
    frames_processed: u64,
}

impl FramePipeline {
    /// Creates a pipeline, building a new correlation table.
    pub fn new(options: PipelineOptions) -> Result<Self, ComputeError> {
        options.validate()?;
        let solver = CorrelationSolver::new(
            options.correlation_table_size,
            options.baseline_correlation_time,
        )?;
        Self::with_solver(options, Arc::new(solver))
    }

    /// Creates a pipeline around an existing solver.
    ///
    /// The solver's own table size and β take precedence over the
    /// corresponding options, which are overwritten to match.
    pub fn with_solver(
        mut options: PipelineOptions,
        solver: Arc<CorrelationSolver>,
    ) -> Result<Self, ComputeError> {
        options.validate()?;

        if options.correlation_table_size != solver.table_size()
            || options.baseline_correlation_time != solver.beta()
        {
            tracing::warn!(
                table_size = options.correlation_table_size,
                beta = options.baseline_correlation_time,
                solver_table_size = solver.table_size(),
                solver_beta = solver.beta(),
                "Correlation options overridden by shared solver"
            );
            options.correlation_table_size = solver.table_size();
            options.baseline_correlation_time = solver.beta();
        }

        let frame_size = options.frame_size();
        let expected = options.expected_frame_size();
        if frame_size != expected {
            tracing::warn!(
                declared = frame_size,
                expected,
                "Declared frame size does not match geometry"
            );
        }

        let unpacker = BitUnpacker::new(frame_size, options.bits_per_sample)?;
        let estimator = SpatialContrastEstimator::new(options.spatial_window, options.width)?;
        let visualizer = Visualizer::new(options.mode, options.color_scale, options.alpha)?;

        tracing::debug!(
            width = options.width,
            height = options.height,
            bits = options.bits_per_sample,
            window = options.spatial_window,
            mode = ?options.mode,
            format = %options.output_format,
            "Frame pipeline ready"
        );

        Ok(Self {
            options,
            unpacker,
            estimator,
            solver,
            visualizer,
            frames_processed: 0,
        })
    }

    /// Returns the configuration.
    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    /// Returns the shared solver.
    pub fn solver(&self) -> &Arc<CorrelationSolver> {
        &self.solver
    }

    /// Returns the number of frames processed successfully.
    pub fn frames_processed(&self) -> u64 {
        self.frames_processed
    }

    /// Creates a blank output image in the configured format.
    pub fn new_output(&self) -> OutputImage {
        OutputImage::new(self.options.width, self.options.height, self.options.output_format)
    }

    /// Processes one raw frame into a fresh image.
    pub fn render(&mut self, data: &[u8]) -> Result<OutputImage, ComputeError> {
        let mut output = self.new_output();
        self.write_frame(data, &mut output)?;
        Ok(output)
    }

    /// Processes one raw frame into `output`.
    ///
    /// `output` is resized to the frame geometry; its channel count selects
    /// RGB or RGBA. Pixels without a full estimator window are left
    /// untouched in direct mode. On error the frame is abandoned and the
    /// contents of `output` are unspecified.
    pub fn write_frame(
        &mut self,
        data: &[u8],
        output: &mut OutputImage,
    ) -> Result<FrameSummary, ComputeError> {
        let expected = self.options.frame_size();
        if data.len() != expected {
            return Err(ComputeError::InvalidFrameLength {
                expected,
                actual: data.len(),
            });
        }
        OutputFormat::from_channels(output.channels())?;

        let started = Instant::now();
        let PipelineOptions {
            width,
            height,
            bits_per_sample,
            ..
        } = self.options;
        let overlay = self.visualizer.mode() == VisualizerMode::Overlay;

        output.resize(width, height);
        self.unpacker.start_frame();
        self.estimator.start_frame();

        let mut valid_pixels = 0;
        let mut pos = PixelCoordinate::default();
        for y in 0..height {
            for x in 0..width {
                pos.x = x;
                pos.y = y;
                pos.output = None;

                let sample = self.unpacker.next_sample(data)?;
                if overlay {
                    self.visualizer
                        .paint_background(output.pixel_mut(x, y), sample, bits_per_sample);
                }

                let k_squared = self.estimator.compute(&mut pos, sample);
                let Some((out_x, out_y)) = pos.output else {
                    continue;
                };

                let t = self.solver.compute(k_squared);
                self.visualizer.paint(output.pixel_mut(out_x, out_y), t);
                valid_pixels += 1;
            }
        }

        self.frames_processed += 1;
        let summary = FrameSummary {
            valid_pixels,
            elapsed: started.elapsed(),
        };
        tracing::debug!(
            frame = self.frames_processed,
            valid_pixels,
            elapsed_us = summary.elapsed.as_micros() as u64,
            "Frame processed"
        );
        Ok(summary)
    }
}

impl fmt::Debug for FramePipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FramePipeline")
            .field("options", &self.options)
            .field("frames_processed", &self.frames_processed)
            .finish()
    }
}
