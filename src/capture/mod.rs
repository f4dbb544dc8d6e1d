//! Frame acquisition.
//!
//! Frame sources deliver packed raw frames of a fixed geometry. Real
//! sensors live outside this crate; the bundled sources generate synthetic
//! speckle or replay recorded frames.

mod config;
mod frame;
mod source;

pub use config::{CaptureConfig, ConfigError, FileConfig, LiveConfig};
pub use frame::RawFrame;
pub use source::{FrameSource, RawFileSource, SourceError, SyntheticSpeckleSource};
