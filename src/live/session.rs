//! Live capture and render loop.
//!
//! A capture thread pulls frames from the source and offers each one to the
//! renderer over a channel of depth one. If the renderer has not taken the
//! previous frame yet, the new frame is dropped and counted; capture never
//! blocks on rendering.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, TrySendError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, trace, warn};

use super::SessionReport;
use crate::capture::{CaptureConfig, FrameSource, RawFrame, SourceError};
use crate::compute::{ComputeError, FramePipeline, OutputImage, PipelineOptions};
use crate::metrics::{MetricsRegistry, MetricsSnapshot};

/// How long the render loop waits for a frame before rechecking the stop flag.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Capture failures in a row after which the source is given up.
const MAX_CONSECUTIVE_CAPTURE_FAILURES: u32 = 10;

/// Errors that end a live session.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("pipeline error: {0}")]
    Compute(#[from] ComputeError),

    #[error("frame source error: {0}")]
    Source(#[from] SourceError),

    #[error("failed to spawn capture thread: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("capture thread panicked")]
    CaptureThreadPanicked,
}

/// Result of a completed session.
#[derive(Debug)]
pub struct SessionOutcome {
    /// Session accounting.
    pub report: SessionReport,
    /// The most recently rendered image, if any frame was rendered.
    pub last_image: Option<OutputImage>,
}

/// Drives a frame source through a [`FramePipeline`] until stopped.
pub struct LiveSession {
    capture: CaptureConfig,
    options: PipelineOptions,
    frame_limit: Option<u64>,
    stop: Arc<AtomicBool>,
    metrics: Option<Arc<MetricsRegistry>>,
}

impl LiveSession {
    /// Creates a session that runs until stopped or the source is exhausted.
    pub fn new(capture: CaptureConfig, options: PipelineOptions) -> Self {
        Self {
            capture,
            options,
            frame_limit: None,
            stop: Arc::new(AtomicBool::new(false)),
            metrics: None,
        }
    }

    /// Stops after `frames` frames have been rendered.
    pub fn with_frame_limit(mut self, frames: u64) -> Self {
        self.frame_limit = Some(frames);
        self
    }

    /// Publishes progress to `registry` after every frame.
    pub fn with_metrics(mut self, registry: Arc<MetricsRegistry>) -> Self {
        self.metrics = Some(registry);
        self
    }

    /// Returns a flag that ends the session when set.
    ///
    /// Safe to set from a signal handler.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    /// Runs the session to completion.
    ///
    /// `on_frame` is called on the render thread with the sequence number
    /// and image of every successfully rendered frame. Per-frame pipeline
    /// errors are logged and counted; construction errors, source open
    /// failures and repeated capture failures end the session.
    pub fn run<S, F>(self, mut source: S, mut on_frame: F) -> Result<SessionOutcome, SessionError>
    where
        S: FrameSource + Send + 'static,
        F: FnMut(u64, &OutputImage),
    {
        let mut pipeline = FramePipeline::new(self.options.clone())?;
        source.open(&self.capture)?;

        let mut report = SessionReport::start();
        let captured = Arc::new(AtomicU64::new(0));
        let dropped = Arc::new(AtomicU64::new(0));
        let (tx, rx) = mpsc::sync_channel(1);

        let capture_thread = {
            let stop = Arc::clone(&self.stop);
            let captured = Arc::clone(&captured);
            let dropped = Arc::clone(&dropped);
            thread::Builder::new()
                .name("speckle-capture".into())
                .spawn(move || {
                    let result = capture_loop(&mut source, &tx, &stop, &captured, &dropped);
                    source.close();
                    result
                })
                .map_err(SessionError::Spawn)?
        };

        info!(
            width = self.options.width,
            height = self.options.height,
            frame_limit = ?self.frame_limit,
            "Live session started"
        );

        let mut scratch = pipeline.new_output();
        let mut last = pipeline.new_output();
        let mut fatal = None;
        let mut source_ended = false;

        loop {
            if self.stop.load(Ordering::Relaxed) {
                info!("Stop requested");
                break;
            }
            if self
                .frame_limit
                .is_some_and(|limit| report.frames_rendered >= limit)
            {
                debug!("Frame limit reached");
                break;
            }

            let frame = match rx.recv_timeout(POLL_INTERVAL) {
                Ok(frame) => frame,
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => {
                    source_ended = true;
                    break;
                }
            };

            let mut latest = None;
            match pipeline.write_frame(frame.data(), &mut scratch) {
                Ok(summary) => {
                    report.record_rendered(summary.elapsed);
                    std::mem::swap(&mut scratch, &mut last);
                    on_frame(frame.sequence(), &last);
                    trace!(
                        sequence = frame.sequence(),
                        latency_us = frame.timestamp().elapsed().as_micros() as u64,
                        "Frame rendered"
                    );
                    latest = Some(summary);
                }
                Err(e) if e.is_per_frame() => {
                    report.frames_failed += 1;
                    warn!(sequence = frame.sequence(), error = %e, "Frame skipped");
                }
                Err(e) => {
                    fatal = Some(e);
                    break;
                }
            }

            report.frames_captured = captured.load(Ordering::Relaxed);
            report.frames_dropped = dropped.load(Ordering::Relaxed);
            if let Some(metrics) = &self.metrics {
                let mut snapshot = MetricsSnapshot::from_report(&report);
                if let Some(summary) = latest {
                    snapshot.last_frame_seconds = Some(summary.elapsed.as_secs_f64());
                    snapshot.last_valid_pixels = Some(summary.valid_pixels);
                }
                metrics.update(&snapshot);
            }
        }

        // The capture thread exits on its next send once the receiver is gone.
        drop(rx);
        let capture_result = capture_thread
            .join()
            .map_err(|_| SessionError::CaptureThreadPanicked)?;

        if let Some(e) = fatal {
            return Err(e.into());
        }
        match capture_result {
            Err(e) if source_ended => return Err(e.into()),
            // The render loop already finished; nothing was lost.
            Err(e) => warn!(error = %e, "Capture failed after the session stopped"),
            Ok(()) => {}
        }

        report.frames_captured = captured.load(Ordering::Relaxed);
        report.frames_dropped = dropped.load(Ordering::Relaxed);
        report.finish();
        if let Some(metrics) = &self.metrics {
            metrics.update(&MetricsSnapshot::from_report(&report));
        }

        info!(
            captured = report.frames_captured,
            rendered = report.frames_rendered,
            dropped = report.frames_dropped,
            failed = report.frames_failed,
            mean_frame_ms = report.mean_frame_time().map(|d| d.as_secs_f64() * 1e3),
            "Live session finished"
        );

        let last_image = (report.frames_rendered > 0).then_some(last);
        Ok(SessionOutcome { report, last_image })
    }
}

fn capture_loop<S: FrameSource>(
    source: &mut S,
    tx: &mpsc::SyncSender<RawFrame>,
    stop: &AtomicBool,
    captured: &AtomicU64,
    dropped: &AtomicU64,
) -> Result<(), SourceError> {
    let mut failures = 0;
    while !stop.load(Ordering::Relaxed) {
        let frame = match source.capture() {
            Ok(frame) => {
                failures = 0;
                frame
            }
            Err(SourceError::Exhausted) => {
                info!("Frame source exhausted");
                return Ok(());
            }
            Err(e) => {
                failures += 1;
                warn!(error = %e, failures, "Frame capture failed");
                if failures >= MAX_CONSECUTIVE_CAPTURE_FAILURES {
                    return Err(e);
                }
                continue;
            }
        };

        captured.fetch_add(1, Ordering::Relaxed);
        match tx.try_send(frame) {
            Ok(()) => {}
            Err(TrySendError::Full(frame)) => {
                dropped.fetch_add(1, Ordering::Relaxed);
                trace!(sequence = frame.sequence(), "Renderer busy, frame dropped");
            }
            Err(TrySendError::Disconnected(_)) => return Ok(()),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{RawFileSource, SyntheticSpeckleSource};
    use crate::compute::ConfigError;
    use std::collections::VecDeque;

    fn small_capture() -> CaptureConfig {
        CaptureConfig {
            fps: 0,
            ..CaptureConfig::with_geometry(32, 24, 10)
        }
    }

    fn small_options() -> PipelineOptions {
        PipelineOptions {
            spatial_window: 5,
            correlation_table_size: 256,
            ..PipelineOptions::with_geometry(32, 24, 10)
        }
    }

    /// Hands out a fixed list of frames, one every few milliseconds, then
    /// either ends or fails on every call.
    struct ScriptedSource {
        frames: VecDeque<RawFrame>,
        fail_when_empty: bool,
        open: bool,
    }

    impl ScriptedSource {
        fn new(frames: Vec<RawFrame>, fail_when_empty: bool) -> Self {
            Self {
                frames: frames.into(),
                fail_when_empty,
                open: false,
            }
        }
    }

    impl FrameSource for ScriptedSource {
        fn open(&mut self, _config: &CaptureConfig) -> Result<(), SourceError> {
            self.open = true;
            Ok(())
        }

        fn capture(&mut self) -> Result<RawFrame, SourceError> {
            std::thread::sleep(Duration::from_millis(30));
            match self.frames.pop_front() {
                Some(frame) => Ok(frame),
                None if self.fail_when_empty => {
                    Err(SourceError::CaptureFailed("sensor timeout".into()))
                }
                None => Err(SourceError::Exhausted),
            }
        }

        fn is_open(&self) -> bool {
            self.open
        }

        fn close(&mut self) {
            self.open = false;
        }
    }

    #[test]
    fn test_frame_limit() {
        let mut sequences = Vec::new();
        let outcome = LiveSession::new(small_capture(), small_options())
            .with_frame_limit(3)
            .run(SyntheticSpeckleSource::new(), |sequence, image| {
                assert_eq!((image.width(), image.height()), (32, 24));
                sequences.push(sequence);
            })
            .unwrap();

        let report = &outcome.report;
        assert_eq!(report.frames_rendered, 3);
        assert!(report.frames_captured >= 3);
        assert!(report.finished_at.is_some());
        assert!(sequences.windows(2).all(|w| w[0] < w[1]));
        assert!(outcome.last_image.is_some());
    }

    #[test]
    fn test_bad_frame_is_counted_and_skipped() {
        let flat = [100; 32 * 24];
        let source = ScriptedSource::new(
            vec![
                RawFrame::from_samples(&flat, 32, 24, 10, 1),
                RawFrame::new(vec![0; 7], 32, 24, 10, 2),
                RawFrame::from_samples(&flat, 32, 24, 10, 3),
            ],
            false,
        );

        let outcome = LiveSession::new(small_capture(), small_options())
            .run(source, |_, _| {})
            .unwrap();

        let report = &outcome.report;
        assert_eq!(report.frames_captured, 3);
        assert_eq!(report.frames_failed, 1);
        assert_eq!(
            report.frames_rendered + report.frames_failed + report.frames_dropped,
            report.frames_captured
        );
        let image = outcome.last_image.unwrap();
        // Uniform frames have zero contrast, which maps to palette index 0.
        assert_eq!(image.pixel(16, 12), &crate::compute::palette::PLASMA[0][..]);
    }

    #[test]
    fn test_repeated_capture_failure_ends_session() {
        let source = ScriptedSource::new(Vec::new(), true);
        let result = LiveSession::new(small_capture(), small_options()).run(source, |_, _| {});
        assert!(matches!(
            result,
            Err(SessionError::Source(SourceError::CaptureFailed(_)))
        ));
    }

    #[test]
    fn test_capture_failure_after_frame_limit_is_ignored() {
        let flat = [100; 32 * 24];
        let source = ScriptedSource::new(vec![RawFrame::from_samples(&flat, 32, 24, 10, 1)], true);
        let outcome = LiveSession::new(small_capture(), small_options())
            .with_frame_limit(1)
            .run(source, |_, _| {})
            .unwrap();
        assert_eq!(outcome.report.frames_rendered, 1);
        assert!(outcome.last_image.is_some());
    }

    #[test]
    fn test_stop_before_start() {
        let session = LiveSession::new(small_capture(), small_options());
        session.stop_handle().store(true, Ordering::Relaxed);
        let outcome = session.run(SyntheticSpeckleSource::new(), |_, _| {}).unwrap();
        assert_eq!(outcome.report.frames_rendered, 0);
        assert!(outcome.last_image.is_none());
    }

    #[test]
    fn test_invalid_options_fail_before_capture() {
        let options = PipelineOptions {
            spatial_window: 4,
            ..small_options()
        };
        let result = LiveSession::new(small_capture(), options)
            .run(SyntheticSpeckleSource::new(), |_, _| {});
        assert!(matches!(
            result,
            Err(SessionError::Compute(ComputeError::Config(ConfigError::InvalidWindow(4))))
        ));
    }

    #[test]
    fn test_open_failure() {
        let dir = tempfile::tempdir().unwrap();
        let source = RawFileSource::new(dir.path().join("missing.raw"), false);
        let result = LiveSession::new(small_capture(), small_options()).run(source, |_, _| {});
        assert!(matches!(
            result,
            Err(SessionError::Source(SourceError::OpenFailed(_)))
        ));
    }

    #[test]
    fn test_metrics_published() {
        let registry = Arc::new(MetricsRegistry::new().unwrap());
        LiveSession::new(small_capture(), small_options())
            .with_frame_limit(2)
            .with_metrics(Arc::clone(&registry))
            .run(SyntheticSpeckleSource::new(), |_, _| {})
            .unwrap();

        let output = registry.encode().unwrap();
        assert!(output.contains("speckle_frames_rendered_total 2"));
        assert!(output.contains("speckle_last_valid_pixels 560"));
    }
}
