//! Transfer progress tracking
//!
//! Providers report cumulative byte counts from whatever task drives the
//! transfer. [`ProgressTracker`] turns those reports into monotonic,
//! rate-limited updates with a smoothed speed.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Sliding-window speed estimate
#[derive(Debug)]
pub struct SpeedCalculator {
    /// Window size for averaging
    window_size: usize,
    /// Recent measurements (bytes, timestamp)
    measurements: VecDeque<(u64, Instant)>,
    /// Total bytes tracked
    total_bytes: u64,
}

impl SpeedCalculator {
    pub fn new(window_size: usize) -> Self {
        Self {
            window_size: window_size.max(2),
            measurements: VecDeque::with_capacity(window_size),
            total_bytes: 0,
        }
    }

    /// Add a measurement
    pub fn add_bytes(&mut self, bytes: u64) {
        self.add_bytes_at(bytes, Instant::now());
    }

    fn add_bytes_at(&mut self, bytes: u64, at: Instant) {
        self.total_bytes += bytes;
        if self.measurements.len() >= self.window_size {
            self.measurements.pop_front();
        }
        self.measurements.push_back((bytes, at));
    }

    /// Current speed in bytes/second
    pub fn speed(&self) -> u64 {
        let (Some(first), Some(last)) = (self.measurements.front(), self.measurements.back()) else {
            return 0;
        };
        if self.measurements.len() < 2 {
            return 0;
        }

        let elapsed = last.1.duration_since(first.1).as_secs_f64();
        if elapsed <= 0.0 {
            return 0;
        }

        // The first sample only marks the window start
        let bytes: u64 = self.measurements.iter().skip(1).map(|(b, _)| *b).sum();
        (bytes as f64 / elapsed) as u64
    }

    pub fn total(&self) -> u64 {
        self.total_bytes
    }

    pub fn reset(&mut self) {
        self.measurements.clear();
        self.total_bytes = 0;
    }
}

/// A progress report worth publishing
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressUpdate {
    pub bytes_transferred: u64,
    pub total_size: Option<u64>,
    pub speed: u64,
}

/// Filters cumulative byte reports into monotonic updates.
///
/// Reports that do not advance the byte count are dropped, as are reports
/// arriving faster than `min_interval`, except the one that reaches the
/// total size.
#[derive(Debug)]
pub struct ProgressTracker {
    speed: SpeedCalculator,
    last_bytes: u64,
    last_emit: Option<Instant>,
    min_interval: Duration,
}

impl ProgressTracker {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            speed: SpeedCalculator::new(20),
            last_bytes: 0,
            last_emit: None,
            min_interval,
        }
    }

    /// Feed a cumulative byte count
    pub fn observe(&mut self, bytes: u64, total: Option<u64>) -> Option<ProgressUpdate> {
        if bytes <= self.last_bytes {
            return None;
        }
        self.speed.add_bytes(bytes - self.last_bytes);
        self.last_bytes = bytes;

        let now = Instant::now();
        let finished = total.is_some_and(|t| bytes >= t);
        let due = self
            .last_emit
            .map_or(true, |at| now.duration_since(at) >= self.min_interval);
        if !due && !finished {
            return None;
        }
        self.last_emit = Some(now);

        Some(ProgressUpdate {
            bytes_transferred: bytes,
            total_size: total,
            speed: self.speed.speed(),
        })
    }

    pub fn bytes(&self) -> u64 {
        self.last_bytes
    }
}
