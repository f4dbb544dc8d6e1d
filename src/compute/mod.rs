//! Per-pixel speckle processing.
//!
//! The stages run once per pixel, in scan order, driven by
//! [`FramePipeline`]:
//!
//! ```text
//! raw bytes → BitUnpacker → SpatialContrastEstimator → CorrelationSolver → Visualizer
//!               (sample)          (K², if valid)          (correlation time)    (RGB)
//! ```

mod correlation;
mod error;
pub mod palette;
mod pipeline;
pub mod unpack;
mod visualize;
mod window;

pub use correlation::{squared_contrast_model, squared_contrast_model_deriv, CorrelationSolver};
pub use error::{ComputeError, ConfigError};
pub use pipeline::{FramePipeline, FrameSummary, OutputFormat, OutputImage, PipelineOptions};
pub use unpack::{pack_samples, packed_len, BitUnpacker};
pub use visualize::{luminance, Visualizer, VisualizerMode};
pub use window::{squared_contrast, PixelCoordinate, SpatialContrastEstimator};
