//! Frame source and session configuration.
//!
//! Geometry and bit depth are fixed for the lifetime of a source: the
//! pipeline's buffers are sized once from them.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::compute::{self, PipelineOptions};

/// Configuration for a frame source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Frame width in pixels.
    pub width: usize,
    /// Frame height in pixels.
    pub height: usize,
    /// Packed sample width.
    pub bits_per_sample: u32,
    /// Target frames per second (0 for unthrottled).
    pub fps: u32,
    /// Seed for synthetic sources.
    pub seed: u64,
    /// Mean intensity as a fraction of full scale.
    pub mean_intensity: f64,
    /// Radius of the synthetic flow region as a fraction of the shorter side.
    pub flow_radius: f64,
    /// Independent speckle realisations averaged per exposure inside the
    /// flow region. Higher means faster flow and lower contrast.
    pub flow_mixing: u32,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            width: 640,
            height: 488,
            bits_per_sample: 10,
            fps: 30,
            seed: 0x5eed,
            mean_intensity: 0.25,
            flow_radius: 0.25,
            flow_mixing: 8,
        }
    }
}

impl CaptureConfig {
    /// Creates a new configuration with the specified geometry.
    pub fn with_geometry(width: usize, height: usize, bits_per_sample: u32) -> Self {
        Self {
            width,
            height,
            bits_per_sample,
            ..Default::default()
        }
    }

    /// Validates the configuration parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.width == 0 || self.height == 0 {
            return Err(ConfigError::InvalidDimensions);
        }
        if self.bits_per_sample == 0 || self.bits_per_sample > compute::unpack::MAX_BITS_PER_SAMPLE {
            return Err(ConfigError::InvalidBitDepth(self.bits_per_sample));
        }
        if self.fps > 1000 {
            return Err(ConfigError::InvalidFrameRate);
        }
        if !(0.0..=1.0).contains(&self.mean_intensity) {
            return Err(ConfigError::InvalidIntensity(self.mean_intensity));
        }
        if !(0.0..=1.0).contains(&self.flow_radius) || self.flow_mixing == 0 {
            return Err(ConfigError::InvalidFlowRegion);
        }
        Ok(())
    }
}

/// Configuration validation errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid frame dimensions")]
    InvalidDimensions,
    #[error("invalid bit depth {0}")]
    InvalidBitDepth(u32),
    #[error("invalid frame rate (must be 0-1000 fps)")]
    InvalidFrameRate,
    #[error("invalid mean intensity {0} (must be within 0..=1)")]
    InvalidIntensity(f64),
    #[error("invalid flow region")]
    InvalidFlowRegion,
    #[error("invalid pipeline options: {0}")]
    Pipeline(#[from] compute::ConfigError),
    #[error("failed to read config file: {0}")]
    FileReadError(String),
    #[error("failed to parse config file: {0}")]
    ParseError(String),
}

/// Full configuration file format.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FileConfig {
    /// `[capture]`: frame source settings.
    #[serde(default)]
    pub capture: CaptureConfig,
    /// `[pipeline]`: processing options; geometry comes from `[capture]`.
    #[serde(default)]
    pub pipeline: PipelineOptions,
    /// `[live]`: session settings.
    #[serde(default)]
    pub live: LiveConfig,
}

/// Live session configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LiveConfig {
    /// Run until interrupted (true) or for a fixed number of frames.
    pub continuous: bool,
    /// Number of frames to render if not continuous.
    pub frame_count: u64,
    /// Metrics server port (0 to disable).
    pub metrics_port: u16,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            continuous: false,
            frame_count: 100,
            metrics_port: 9090,
        }
    }
}

impl FileConfig {
    /// Loads configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::FileReadError(e.to_string()))?;
        Self::from_toml(&content)
    }

    /// Parses and validates configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: FileConfig =
            toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.capture.validate()?;
        config.pipeline_options().validate()?;
        Ok(config)
    }

    /// Returns the pipeline options with geometry taken from `[capture]`.
    pub fn pipeline_options(&self) -> PipelineOptions {
        PipelineOptions {
            width: self.capture.width,
            height: self.capture.height,
            bits_per_sample: self.capture.bits_per_sample,
            ..self.pipeline.clone()
        }
    }
}
