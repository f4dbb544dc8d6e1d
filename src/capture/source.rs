//! Frame source abstraction.
//!
//! Sensors are external collaborators: anything that can hand over packed
//! frames of a fixed geometry implements [`FrameSource`]. Two sources ship
//! with the crate, a seeded synthetic speckle generator and a replay of
//! recorded raw frames.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use thiserror::Error;

use super::{CaptureConfig, RawFrame};
use crate::compute::packed_len;

/// Errors that can occur during frame source operations.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("failed to open frame source: {0}")]
    OpenFailed(String),
    #[error("failed to configure frame source: {0}")]
    ConfigFailed(String),
    /// A single capture failed; the source may recover.
    #[error("failed to capture frame: {0}")]
    CaptureFailed(String),
    #[error("frame source exhausted")]
    Exhausted,
    #[error("frame source not initialized")]
    NotInitialized,
}

/// Trait for frame sources.
pub trait FrameSource {
    /// Opens and initializes the source with the given configuration.
    fn open(&mut self, config: &CaptureConfig) -> Result<(), SourceError>;

    /// Blocks until the next frame is available and returns it.
    fn capture(&mut self) -> Result<RawFrame, SourceError>;

    /// Checks if the source is currently open.
    fn is_open(&self) -> bool;

    /// Closes the source and releases resources.
    fn close(&mut self);
}

/// Paces capture calls to a target frame rate.
#[derive(Debug)]
struct FramePacer {
    interval: Option<Duration>,
    next_deadline: Option<Instant>,
}

impl FramePacer {
    fn new(fps: u32) -> Self {
        Self {
            interval: (fps > 0).then(|| Duration::from_secs_f64(1.0 / f64::from(fps))),
            next_deadline: None,
        }
    }

    fn wait(&mut self) {
        let Some(interval) = self.interval else {
            return;
        };
        let now = Instant::now();
        if let Some(deadline) = self.next_deadline {
            if deadline > now {
                std::thread::sleep(deadline - now);
            }
        }
        self.next_deadline = Some(self.next_deadline.unwrap_or(now).max(now) + interval);
    }
}

/// Synthetic laser speckle generator.
///
/// The static background is one fully developed speckle pattern (negative
/// exponential intensity, K² ≈ 1) that never changes between frames. Inside
/// a central disc, each exposure averages `flow_mixing` fresh patterns, as
/// moving scatterers would, which lowers K² to about `1 / flow_mixing`.
#[derive(Debug, Default)]
pub struct SyntheticSpeckleSource {
    config: Option<CaptureConfig>,
    rng: Option<ChaCha8Rng>,
    /// Static pattern, unit mean.
    background: Vec<f64>,
    pacer: Option<FramePacer>,
    sequence: u64,
}

impl SyntheticSpeckleSource {
    /// Creates a closed source; call [`FrameSource::open`] before capturing.
    pub fn new() -> Self {
        Self::default()
    }

    fn speckle(rng: &mut ChaCha8Rng) -> f64 {
        // Inverse CDF of the unit exponential; 1 - u lies in (0, 1].
        let u: f64 = rng.gen();
        -(1.0 - u).ln()
    }

    fn in_flow_region(config: &CaptureConfig, x: usize, y: usize) -> bool {
        let radius = config.flow_radius * config.width.min(config.height) as f64;
        let dx = x as f64 + 0.5 - config.width as f64 / 2.0;
        let dy = y as f64 + 0.5 - config.height as f64 / 2.0;
        dx * dx + dy * dy <= radius * radius
    }
}

impl FrameSource for SyntheticSpeckleSource {
    fn open(&mut self, config: &CaptureConfig) -> Result<(), SourceError> {
        config
            .validate()
            .map_err(|e| SourceError::ConfigFailed(e.to_string()))?;

        let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
        let pixel_count = config.width * config.height;
        self.background = (0..pixel_count).map(|_| Self::speckle(&mut rng)).collect();
        self.rng = Some(rng);
        self.pacer = Some(FramePacer::new(config.fps));
        self.config = Some(config.clone());
        self.sequence = 0;
        tracing::info!(?config, "Synthetic speckle source opened");
        Ok(())
    }

    fn capture(&mut self) -> Result<RawFrame, SourceError> {
        let config = self.config.as_ref().ok_or(SourceError::NotInitialized)?;
        let rng = self.rng.as_mut().ok_or(SourceError::NotInitialized)?;

        let max_value = ((1u64 << config.bits_per_sample) - 1) as f64;
        let level = config.mean_intensity * max_value;
        let mixing = config.flow_mixing;

        let mut samples = Vec::with_capacity(self.background.len());
        for y in 0..config.height {
            for x in 0..config.width {
                let intensity = if Self::in_flow_region(config, x, y) {
                    (0..mixing).map(|_| Self::speckle(rng)).sum::<f64>() / f64::from(mixing)
                } else {
                    self.background[y * config.width + x]
                };
                samples.push((intensity * level).round().min(max_value) as u32);
            }
        }

        if let Some(pacer) = self.pacer.as_mut() {
            pacer.wait();
        }

        self.sequence += 1;
        Ok(RawFrame::from_samples(
            &samples,
            config.width,
            config.height,
            config.bits_per_sample,
            self.sequence,
        ))
    }

    fn is_open(&self) -> bool {
        self.config.is_some()
    }

    fn close(&mut self) {
        self.config = None;
        self.rng = None;
        self.background.clear();
        tracing::info!("Synthetic speckle source closed");
    }
}

/// Replays a file of concatenated raw frames.
#[derive(Debug)]
pub struct RawFileSource {
    path: PathBuf,
    looping: bool,
    config: Option<CaptureConfig>,
    data: Vec<u8>,
    frame_size: usize,
    frame_count: usize,
    next_frame: usize,
    pacer: Option<FramePacer>,
    sequence: u64,
}

impl RawFileSource {
    /// Creates a source for `path`; with `looping`, replay restarts at the end.
    pub fn new(path: impl Into<PathBuf>, looping: bool) -> Self {
        Self {
            path: path.into(),
            looping,
            config: None,
            data: Vec::new(),
            frame_size: 0,
            frame_count: 0,
            next_frame: 0,
            pacer: None,
            sequence: 0,
        }
    }

    /// Returns the number of complete frames in the file.
    pub fn frame_count(&self) -> usize {
        self.frame_count
    }
}

impl FrameSource for RawFileSource {
    fn open(&mut self, config: &CaptureConfig) -> Result<(), SourceError> {
        config
            .validate()
            .map_err(|e| SourceError::ConfigFailed(e.to_string()))?;

        let data = std::fs::read(&self.path)
            .map_err(|e| SourceError::OpenFailed(format!("{}: {e}", self.path.display())))?;
        let frame_size = packed_len(config.width * config.height, config.bits_per_sample);
        let frame_count = data.len() / frame_size;
        if frame_count == 0 {
            return Err(SourceError::OpenFailed(format!(
                "{}: shorter than one {frame_size}-byte frame",
                self.path.display()
            )));
        }
        let trailing = data.len() % frame_size;
        if trailing != 0 {
            tracing::warn!(trailing, "Ignoring partial frame at end of raw file");
        }

        self.data = data;
        self.frame_size = frame_size;
        self.frame_count = frame_count;
        self.next_frame = 0;
        self.sequence = 0;
        self.pacer = Some(FramePacer::new(config.fps));
        self.config = Some(config.clone());
        tracing::info!(path = %self.path.display(), frame_count, "Raw frame file opened");
        Ok(())
    }

    fn capture(&mut self) -> Result<RawFrame, SourceError> {
        let config = self.config.as_ref().ok_or(SourceError::NotInitialized)?;
        if self.next_frame == self.frame_count {
            if !self.looping {
                return Err(SourceError::Exhausted);
            }
            self.next_frame = 0;
        }

        let start = self.next_frame * self.frame_size;
        let next_frame = self.next_frame;
        let bytes = self
            .data
            .get(start..start + self.frame_size)
            .ok_or_else(|| SourceError::CaptureFailed(format!("frame {next_frame} out of range")))?
            .to_vec();
        self.next_frame += 1;

        if let Some(pacer) = self.pacer.as_mut() {
            pacer.wait();
        }

        self.sequence += 1;
        Ok(RawFrame::new(
            bytes,
            config.width,
            config.height,
            config.bits_per_sample,
            self.sequence,
        ))
    }

    fn is_open(&self) -> bool {
        self.config.is_some()
    }

    fn close(&mut self) {
        self.config = None;
        self.data = Vec::new();
        tracing::info!(path = %self.path.display(), "Raw frame file closed");
    }
}
