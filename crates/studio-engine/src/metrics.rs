//! Per-output metrics.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use parking_lot::RwLock;
use studio_ipc::OutputStats;

/// Counters for one output, shared between its worker and the coordinator.
#[derive(Debug, Default)]
pub struct MetricsCollector {
    start_time: RwLock<Option<Instant>>,
    frames_written: AtomicU64,
    bytes_written: AtomicU64,
    dropped_frames: AtomicU64,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset the counters and start the uptime clock.
    pub fn start(&self) {
        self.frames_written.store(0, Ordering::Relaxed);
        self.bytes_written.store(0, Ordering::Relaxed);
        self.dropped_frames.store(0, Ordering::Relaxed);
        *self.start_time.write() = Some(Instant::now());
    }

    /// Stop the uptime clock. Counters keep their last values.
    pub fn stop(&self) {
        *self.start_time.write() = None;
    }

    /// Record a frame accepted by the sink.
    pub fn record_frame(&self, bytes: u64) {
        self.frames_written.fetch_add(1, Ordering::Relaxed);
        self.bytes_written.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Record payload bytes that are not a video frame.
    pub fn record_bytes(&self, bytes: u64) {
        self.bytes_written.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Record a frame the sink refused.
    pub fn record_drop(&self) {
        self.dropped_frames.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current metrics snapshot.
    pub fn snapshot(&self) -> OutputStats {
        let frames_written = self.frames_written.load(Ordering::Relaxed);
        let elapsed = self
            .start_time
            .read()
            .map(|start| start.elapsed())
            .unwrap_or_default();

        let fps = if elapsed.as_secs_f32() > 0.0 {
            frames_written as f32 / elapsed.as_secs_f32()
        } else {
            0.0
        };

        OutputStats {
            frames_written,
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
            dropped_frames: self.dropped_frames.load(Ordering::Relaxed),
            fps,
            uptime_seconds: elapsed.as_secs(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_resets_counters() {
        let metrics = MetricsCollector::new();
        metrics.start();
        metrics.record_frame(100);
        metrics.record_bytes(20);
        metrics.record_drop();

        let stats = metrics.snapshot();
        assert_eq!(stats.frames_written, 1);
        assert_eq!(stats.bytes_written, 120);
        assert_eq!(stats.dropped_frames, 1);

        metrics.stop();
        assert_eq!(metrics.snapshot().fps, 0.0);
        assert_eq!(metrics.snapshot().frames_written, 1);

        metrics.start();
        assert_eq!(metrics.snapshot(), OutputStats::default());
    }
}
