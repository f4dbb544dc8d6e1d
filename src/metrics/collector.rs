//! Metrics collection and registry.

use prometheus::{Encoder, Gauge, IntCounter, IntGauge, Registry, TextEncoder};
use thiserror::Error;

use crate::live::SessionReport;

/// Errors that can occur during metrics operations.
#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("prometheus error: {0}")]
    Prometheus(#[from] prometheus::Error),
}

/// A snapshot of session state for metrics update.
#[derive(Debug, Clone, Default)]
pub struct MetricsSnapshot {
    /// Total frames delivered by the source.
    pub frames_captured: u64,
    /// Total frames rendered.
    pub frames_rendered: u64,
    /// Total frames dropped under backpressure.
    pub frames_dropped: u64,
    /// Total frames abandoned with an error.
    pub frames_failed: u64,
    /// Processing time of the most recent frame.
    pub last_frame_seconds: Option<f64>,
    /// Valid pixels in the most recent frame.
    pub last_valid_pixels: Option<usize>,
}

/// Prometheus metrics registry for frame processing.
pub struct MetricsRegistry {
    registry: Registry,

    // Throughput
    frames_captured_total: IntCounter,
    frames_rendered_total: IntCounter,
    frames_dropped_total: IntCounter,
    frames_failed_total: IntCounter,

    // Latest frame
    last_frame_seconds: Gauge,
    last_valid_pixels: IntGauge,
}

impl MetricsRegistry {
    /// Creates a new metrics registry with all frame metrics registered.
    pub fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new();

        let frames_captured_total = IntCounter::new(
            "speckle_frames_captured_total",
            "Total number of frames delivered by the frame source",
        )?;
        let frames_rendered_total = IntCounter::new(
            "speckle_frames_rendered_total",
            "Total number of frames rendered",
        )?;
        let frames_dropped_total = IntCounter::new(
            "speckle_frames_dropped_total",
            "Frames dropped because the previous frame was still rendering",
        )?;
        let frames_failed_total = IntCounter::new(
            "speckle_frames_failed_total",
            "Frames abandoned with a processing error",
        )?;

        let last_frame_seconds = Gauge::new(
            "speckle_last_frame_seconds",
            "Processing time of the most recent frame",
        )?;
        let last_valid_pixels = IntGauge::new(
            "speckle_last_valid_pixels",
            "Pixels with a full contrast window in the most recent frame",
        )?;

        registry.register(Box::new(frames_captured_total.clone()))?;
        registry.register(Box::new(frames_rendered_total.clone()))?;
        registry.register(Box::new(frames_dropped_total.clone()))?;
        registry.register(Box::new(frames_failed_total.clone()))?;
        registry.register(Box::new(last_frame_seconds.clone()))?;
        registry.register(Box::new(last_valid_pixels.clone()))?;

        Ok(Self {
            registry,
            frames_captured_total,
            frames_rendered_total,
            frames_dropped_total,
            frames_failed_total,
            last_frame_seconds,
            last_valid_pixels,
        })
    }

    /// Updates all metrics from a snapshot of session state.
    pub fn update(&self, snapshot: &MetricsSnapshot) {
        // Counters only move forward; add the difference.
        advance(&self.frames_captured_total, snapshot.frames_captured);
        advance(&self.frames_rendered_total, snapshot.frames_rendered);
        advance(&self.frames_dropped_total, snapshot.frames_dropped);
        advance(&self.frames_failed_total, snapshot.frames_failed);

        if let Some(seconds) = snapshot.last_frame_seconds {
            self.last_frame_seconds.set(seconds);
        }
        if let Some(pixels) = snapshot.last_valid_pixels {
            self.last_valid_pixels.set(pixels as i64);
        }
    }

    /// Encodes all metrics in Prometheus text format.
    pub fn encode(&self) -> Result<String, MetricsError> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

fn advance(counter: &IntCounter, total: u64) {
    let current = counter.get();
    if total > current {
        counter.inc_by(total - current);
    }
}

impl MetricsSnapshot {
    /// Creates a snapshot from a session report.
    pub fn from_report(report: &SessionReport) -> Self {
        Self {
            frames_captured: report.frames_captured,
            frames_rendered: report.frames_rendered,
            frames_dropped: report.frames_dropped,
            frames_failed: report.frames_failed,
            last_frame_seconds: None,
            last_valid_pixels: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_creation() {
        let registry = MetricsRegistry::new();
        assert!(registry.is_ok());
    }

    #[test]
    fn test_metrics_update() {
        let registry = MetricsRegistry::new().unwrap();

        let snapshot = MetricsSnapshot {
            frames_captured: 12,
            frames_rendered: 9,
            frames_dropped: 2,
            frames_failed: 1,
            last_frame_seconds: Some(0.004),
            last_valid_pixels: Some(64),
        };

        registry.update(&snapshot);
        // Repeating a snapshot must not double count.
        registry.update(&snapshot);

        let output = registry.encode().unwrap();
        assert!(output.contains("speckle_frames_rendered_total 9"));
        assert!(output.contains("speckle_frames_dropped_total 2"));
        assert!(output.contains("speckle_last_valid_pixels 64"));
    }

    #[test]
    fn test_snapshot_from_report() {
        let mut report = SessionReport::start();
        report.frames_captured = 5;
        report.frames_dropped = 1;
        let snapshot = MetricsSnapshot::from_report(&report);
        assert_eq!(snapshot.frames_captured, 5);
        assert_eq!(snapshot.frames_dropped, 1);
        assert_eq!(snapshot.last_frame_seconds, None);
    }

    #[test]
    fn test_metrics_encode() {
        let registry = MetricsRegistry::new().unwrap();
        let output = registry.encode().unwrap();

        assert!(output.contains("speckle_frames_captured_total"));
        assert!(output.contains("speckle_frames_failed_total"));
        assert!(output.contains("speckle_last_frame_seconds"));
    }
}
