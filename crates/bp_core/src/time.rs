//! Fixed-cadence frame pacing.
//!
//! The pacer owns a single control variable, `last_frame_time`. Every poll
//! compares the elapsed time against `target_interval`; below the threshold the
//! poll is a no-op, at or above it a [`FrameTick`] is produced and the control
//! variable moves to `now`. The interval is a constant, never adapted.
//!
//! Times are [`Duration`]s since the [`MonotonicClock`] origin. They count whole
//! nanoseconds, so a frame landing exactly on the deadline is always due.

use std::time::{Duration, Instant};

const FPS_SAMPLE_COUNT: usize = 60;

/// What a due frame knows about its own timing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameTick {
    pub now: Duration,
    pub delta: Duration,
    pub frame_index: u64,
}

pub struct FramePacer {
    pub target_interval: Duration,
    last_frame_time: Duration,
    pub frame_count: u64,
    pub idle_polls: u64,

    fps_samples: [f64; FPS_SAMPLE_COUNT],
    fps_sample_index: usize,
    pub smoothed_fps: f64,
    pub smoothed_frame_time_ms: f64,
}

impl FramePacer {
    pub fn new(target_interval: Duration, start: Duration) -> Self {
        let interval_secs = target_interval.as_secs_f64();
        Self {
            target_interval,
            last_frame_time: start,
            frame_count: 0,
            idle_polls: 0,
            fps_samples: [interval_secs; FPS_SAMPLE_COUNT],
            fps_sample_index: 0,
            smoothed_fps: if interval_secs > 0.0 { 1.0 / interval_secs } else { 0.0 },
            smoothed_frame_time_ms: interval_secs * 1000.0,
        }
    }

    pub fn last_frame_time(&self) -> Duration {
        self.last_frame_time
    }

    /// Earliest time at which the next poll will produce a frame.
    pub fn next_deadline(&self) -> Duration {
        self.last_frame_time + self.target_interval
    }

    pub fn is_due(&self, now: Duration) -> bool {
        now.saturating_sub(self.last_frame_time) >= self.target_interval
    }

    /// Returns a tick when a frame is due and advances `last_frame_time` to `now`.
    pub fn poll(&mut self, now: Duration) -> Option<FrameTick> {
        let delta = now.saturating_sub(self.last_frame_time);
        if delta < self.target_interval {
            self.idle_polls += 1;
            return None;
        }
        self.last_frame_time = now;
        self.frame_count += 1;

        self.fps_samples[self.fps_sample_index] = delta.as_secs_f64();
        self.fps_sample_index = (self.fps_sample_index + 1) % FPS_SAMPLE_COUNT;
        let avg_dt: f64 = self.fps_samples.iter().sum::<f64>() / FPS_SAMPLE_COUNT as f64;
        self.smoothed_frame_time_ms = avg_dt * 1000.0;
        self.smoothed_fps = if avg_dt > 0.0 { 1.0 / avg_dt } else { 0.0 };

        Some(FrameTick {
            now,
            delta,
            frame_index: self.frame_count,
        })
    }
}

/// Time elapsed since the clock was created.
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }

    pub fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    /// Converts a clock time back into an `Instant` (for sleeping).
    pub fn instant_at(&self, at: Duration) -> Instant {
        self.origin + at
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}
