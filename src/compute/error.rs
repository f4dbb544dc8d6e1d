//! Error types for the compute pipeline.

use thiserror::Error;

/// Invalid construction parameters.
///
/// These are fatal for the instance being built: discard it and
/// reconstruct with different parameters.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("invalid spatial window {0} (must be odd and >= 1)")]
    InvalidWindow(usize),
    #[error("invalid correlation table size {0} (must be >= 2)")]
    InvalidTableSize(usize),
    #[error("invalid bits per sample {bits} (must be 1..={max})")]
    InvalidBitsPerSample { bits: u32, max: u32 },
    #[error("invalid frame dimensions {width}x{height}")]
    InvalidDimensions { width: usize, height: usize },
    #[error("invalid baseline correlation time {0} (must be finite and > 0)")]
    InvalidBaseline(f64),
    #[error("invalid alpha {0} (must be within 0..=1)")]
    InvalidAlpha(f64),
    #[error("invalid colour scale {0} (must be finite and > 0)")]
    InvalidColorScale(f64),
}

/// Errors raised while building or running the pipeline.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ComputeError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("correlation table entry {index} (k^2 = {k_squared:.6}) did not converge")]
    Convergence { index: usize, k_squared: f64 },

    #[error("invalid frame length: expected {expected} bytes, got {actual}")]
    InvalidFrameLength { expected: usize, actual: usize },

    #[error("attempted to read beyond the end of the {len}-byte input buffer")]
    BufferExhausted { len: usize },

    #[error("unsupported output format: {0}")]
    UnsupportedFormat(String),
}

impl ComputeError {
    /// Returns true if the error aborted only the current frame.
    ///
    /// Construction-time errors leave the instance unusable; per-frame
    /// errors can be retried with the next frame.
    pub fn is_per_frame(&self) -> bool {
        matches!(
            self,
            Self::InvalidFrameLength { .. } | Self::BufferExhausted { .. } | Self::UnsupportedFormat(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_per_frame_classification() {
        assert!(ComputeError::BufferExhausted { len: 4 }.is_per_frame());
        assert!(ComputeError::InvalidFrameLength { expected: 2, actual: 3 }.is_per_frame());
        assert!(ComputeError::UnsupportedFormat("bgr".into()).is_per_frame());
        assert!(!ComputeError::Config(ConfigError::InvalidWindow(4)).is_per_frame());
        assert!(!ComputeError::Convergence { index: 1, k_squared: 0.5 }.is_per_frame());
    }

    #[test]
    fn test_config_error_converts() {
        let err: ComputeError = ConfigError::InvalidTableSize(1).into();
        assert!(matches!(err, ComputeError::Config(ConfigError::InvalidTableSize(1))));
    }
}
