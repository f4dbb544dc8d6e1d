//! Laser Speckle Flow Imaging Library
//!
//! Turns raw, bit-packed monochrome frames of a laser-illuminated scene
//! into false-colour maps of speckle correlation time, a proxy for the
//! speed of moving scatterers such as blood flow.
//!
//! # Architecture
//!
//! Each frame streams through a single pass:
//!
//! ```text
//! capture → unpack → spatial contrast (K²) → correlation time (t) → colour
//!                                                                     ↓
//!                                            convert (one file) / live (session)
//! ```
//!
//! # Design Principles
//!
//! - **One pass per frame**: every raw sample is read exactly once
//! - **No per-frame allocation**: all state is sized at construction
//! - **Shared tables**: the correlation table is immutable and can be
//!   shared between pipelines on different threads
//!
//! # Example
//!
//! ```no_run
//! use speckle_flow::{
//!     capture::{CaptureConfig, FrameSource, SyntheticSpeckleSource},
//!     compute::{FramePipeline, PipelineOptions},
//! };
//!
//! let config = CaptureConfig::with_geometry(640, 488, 10);
//! let mut source = SyntheticSpeckleSource::new();
//! source.open(&config).unwrap();
//!
//! let mut pipeline = FramePipeline::new(PipelineOptions::default()).unwrap();
//! let mut image = pipeline.new_output();
//!
//! for _ in 0..10 {
//!     let frame = source.capture().unwrap();
//!     let summary = pipeline.write_frame(frame.data(), &mut image).unwrap();
//!     println!("{} pixels in {:?}", summary.valid_pixels, summary.elapsed);
//! }
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod capture;
pub mod compute;
pub mod convert;
pub mod live;
pub mod metrics;

// Re-export commonly used types at crate root
pub use capture::{CaptureConfig, FileConfig, FrameSource, RawFrame, SyntheticSpeckleSource};
pub use compute::{
    ComputeError, CorrelationSolver, FramePipeline, OutputFormat, OutputImage, PipelineOptions,
    VisualizerMode,
};
pub use live::{LiveSession, SessionReport};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
