//! Session accounting.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Counters and timestamps for one live session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionReport {
    /// When the session started.
    pub started_at: DateTime<Utc>,
    /// When the session ended, if it has.
    pub finished_at: Option<DateTime<Utc>>,
    /// Frames delivered by the source.
    pub frames_captured: u64,
    /// Frames turned into images.
    pub frames_rendered: u64,
    /// Frames discarded because the renderer was busy.
    pub frames_dropped: u64,
    /// Frames abandoned with a per-frame error.
    pub frames_failed: u64,
    /// Total processing time of rendered frames, in seconds.
    pub render_seconds: f64,
}

impl SessionReport {
    /// Creates an empty report stamped with the current time.
    pub fn start() -> Self {
        Self {
            started_at: Utc::now(),
            finished_at: None,
            frames_captured: 0,
            frames_rendered: 0,
            frames_dropped: 0,
            frames_failed: 0,
            render_seconds: 0.0,
        }
    }

    /// Records a successfully rendered frame.
    pub fn record_rendered(&mut self, elapsed: Duration) {
        self.frames_rendered += 1;
        self.render_seconds += elapsed.as_secs_f64();
    }

    /// Stamps the end of the session.
    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    /// Mean processing time per rendered frame.
    pub fn mean_frame_time(&self) -> Option<Duration> {
        (self.frames_rendered > 0)
            .then(|| Duration::from_secs_f64(self.render_seconds / self.frames_rendered as f64))
    }

    /// Wall-clock duration, if finished.
    pub fn wall_time(&self) -> Option<chrono::Duration> {
        self.finished_at.map(|end| end - self.started_at)
    }

    /// Serializes the report as TOML.
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mean_frame_time() {
        let mut report = SessionReport::start();
        assert_eq!(report.mean_frame_time(), None);

        report.record_rendered(Duration::from_millis(10));
        report.record_rendered(Duration::from_millis(30));
        let mean = report.mean_frame_time().unwrap();
        assert!((mean.as_secs_f64() - 0.02).abs() < 1e-9);
    }

    #[test]
    fn test_toml_round_trip() {
        let mut report = SessionReport::start();
        report.frames_captured = 12;
        report.frames_dropped = 2;
        report.finish();

        let text = report.to_toml().unwrap();
        assert!(text.contains("frames_dropped = 2"));
        let parsed: SessionReport = toml::from_str(&text).unwrap();
        assert_eq!(parsed, report);
        assert!(report.wall_time().unwrap() >= chrono::Duration::zero());
    }
}
