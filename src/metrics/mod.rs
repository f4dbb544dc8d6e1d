//! Prometheus metrics for live sessions.
//!
//! # Metrics Exposed
//!
//! - `speckle_frames_captured_total` - Frames delivered by the source
//! - `speckle_frames_rendered_total` - Frames rendered
//! - `speckle_frames_dropped_total` - Frames dropped while the renderer was busy
//! - `speckle_frames_failed_total` - Frames abandoned with an error
//! - `speckle_last_frame_seconds` - Processing time of the latest frame
//! - `speckle_last_valid_pixels` - Valid pixels in the latest frame
//!
//! The HTTP exporter is available with the `metrics` feature.
//!
//! # Example
//!
//! ```no_run
//! use speckle_flow::metrics::{MetricsRegistry, MetricsSnapshot};
//!
//! let registry = MetricsRegistry::new().expect("Failed to create registry");
//!
//! let snapshot = MetricsSnapshot {
//!     frames_captured: 120,
//!     frames_rendered: 117,
//!     frames_dropped: 3,
//!     frames_failed: 0,
//!     last_frame_seconds: Some(0.006),
//!     last_valid_pixels: Some(634 * 482),
//! };
//!
//! registry.update(&snapshot);
//! ```

mod collector;
#[cfg(feature = "metrics")]
mod server;

pub use collector::{MetricsError, MetricsRegistry, MetricsSnapshot};
#[cfg(feature = "metrics")]
pub use server::{MetricsServer, MetricsServerConfig, ServerError};
