//! Frame pacing for output workers.

use std::time::{Duration, Instant};

/// Fastest rate a clock ticks at, in frames per second.
const MAX_TICK_RATE: u64 = 1000;

/// Timestamp for a produced frame.
#[derive(Debug, Clone, Copy)]
pub struct FrameTimestamp {
    /// Monotonic time when the frame was produced.
    pub produced_at: Instant,

    /// Presentation timestamp in milliseconds since the clock started.
    pub pts_ms: u64,

    /// Monotonically increasing sequence number.
    pub sequence: u64,
}

/// Paces frames at a context's frame rate.
#[derive(Debug, Clone)]
pub struct FrameClock {
    start: Instant,
    fps_num: u64,
    fps_den: u64,
    interval: Duration,
    keyframe_every: u64,
    sequence: u64,
}

impl FrameClock {
    /// Create a clock ticking at `fps_num / fps_den` with a keyframe every
    /// `keyframe_interval_secs` seconds. Rates above one frame per
    /// millisecond are paced at one frame per millisecond.
    pub fn new(fps_num: u32, fps_den: u32, keyframe_interval_secs: u32) -> Self {
        let (mut fps_num, mut fps_den) = (u64::from(fps_num.max(1)), u64::from(fps_den.max(1)));
        if fps_num > MAX_TICK_RATE * fps_den {
            (fps_num, fps_den) = (MAX_TICK_RATE, 1);
        }
        let interval = Duration::from_nanos(1_000_000_000 * fps_den / fps_num);
        let keyframe_every =
            (fps_num * u64::from(keyframe_interval_secs.max(1)) / fps_den).max(1);

        Self {
            start: Instant::now(),
            fps_num,
            fps_den,
            interval,
            keyframe_every,
            sequence: 0,
        }
    }

    /// Time between frames.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Offset from the start of frame `sequence`.
    fn due_at(&self, sequence: u64) -> Duration {
        let nanos = u128::from(sequence) * 1_000_000_000 * u128::from(self.fps_den)
            / u128::from(self.fps_num);
        Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
    }

    /// Time left until the next frame is due.
    pub fn until_next(&self) -> Duration {
        self.due_at(self.sequence).saturating_sub(self.start.elapsed())
    }

    /// Whether the next frame is due.
    pub fn is_due(&self) -> bool {
        self.until_next().is_zero()
    }

    /// Produce the next frame timestamp.
    pub fn tick(&mut self) -> FrameTimestamp {
        let produced_at = Instant::now();
        let pts_ms = u64::try_from(self.due_at(self.sequence).as_millis()).unwrap_or(u64::MAX);
        let ts = FrameTimestamp {
            produced_at,
            pts_ms,
            sequence: self.sequence,
        };
        self.sequence += 1;
        ts
    }

    /// Whether the frame with `sequence` starts a group of pictures.
    pub fn is_keyframe(&self, sequence: u64) -> bool {
        sequence % self.keyframe_every == 0
    }

    /// Frames produced so far.
    pub fn frames(&self) -> u64 {
        self.sequence
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interval_follows_frame_rate() {
        let clock = FrameClock::new(30, 1, 2);
        assert_eq!(clock.interval(), Duration::from_nanos(33_333_333));

        let ntsc = FrameClock::new(30000, 1001, 2);
        assert_eq!(ntsc.interval().as_millis(), 33);
    }

    #[test]
    fn huge_rates_are_paced_at_one_millisecond() {
        let clock = FrameClock::new(u32::MAX, 1, 2);
        assert_eq!(clock.interval(), Duration::from_millis(1));
        assert!(FrameClock::new(1, u32::MAX, 2).interval() > Duration::from_secs(3600));
    }

    #[test]
    fn due_time_survives_long_runs() {
        let mut clock = FrameClock::new(60, 1, 2);
        clock.sequence = u64::from(u32::MAX) + 2;
        // Past 2^32 frames the next frame is still years away, not wrapped.
        assert!(clock.until_next() > Duration::from_secs(365 * 24 * 3600));
        let ts = clock.tick();
        assert_eq!(ts.pts_ms, (u64::from(u32::MAX) + 2) * 1000 / 60);

        clock.sequence = u64::MAX;
        assert_eq!(clock.due_at(clock.sequence), Duration::from_nanos(u64::MAX));
    }

    #[test]
    fn keyframes_every_interval() {
        let mut clock = FrameClock::new(10, 1, 2);
        let mut keyframes = Vec::new();
        for _ in 0..41 {
            let ts = clock.tick();
            if clock.is_keyframe(ts.sequence) {
                keyframes.push(ts.sequence);
            }
        }
        assert_eq!(keyframes, vec![0, 20, 40]);
    }

    #[test]
    fn pts_is_monotonic() {
        let mut clock = FrameClock::new(60, 1, 2);
        let a = clock.tick();
        let b = clock.tick();
        assert!(b.pts_ms > a.pts_ms);
        assert_eq!(clock.frames(), 2);
    }
}
