//! Rolling outcome window.
//!
//! A ring of fixed-width time buckets. Each bucket remembers the epoch
//! (bucket-width ticks since the window origin) it was last written in, so a
//! stale bucket is recycled on write and skipped on read without a timer.

use std::time::Duration;

use tokio::time::Instant;

#[derive(Debug, Clone, Copy, Default)]
struct Bucket {
    epoch: u64,
    successes: u64,
    failures: u64,
}

/// Aggregated counts over the live part of the window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WindowTotals {
    pub requests: u64,
    pub failures: u64,
}

impl WindowTotals {
    /// Failure percentage, 0 when the window is empty.
    pub fn error_percent(&self) -> u64 {
        if self.requests == 0 {
            0
        } else {
            self.failures * 100 / self.requests
        }
    }
}

#[derive(Debug)]
pub struct RollingWindow {
    origin: Instant,
    bucket_width: Duration,
    buckets: Vec<Bucket>,
}

impl RollingWindow {
    /// `bucket_count` must be non-zero and `window / bucket_count` at least
    /// one millisecond; the caller validates configuration beforehand.
    pub fn new(window: Duration, bucket_count: u32) -> Self {
        let count = bucket_count.max(1);
        let bucket_width = (window / count).max(Duration::from_millis(1));
        Self {
            origin: Instant::now(),
            bucket_width,
            buckets: vec![Bucket::default(); count as usize],
        }
    }

    fn epoch(&self, now: Instant) -> u64 {
        let elapsed = now.saturating_duration_since(self.origin).as_nanos();
        (elapsed / self.bucket_width.as_nanos()) as u64
    }

    fn current(&mut self, now: Instant) -> &mut Bucket {
        let epoch = self.epoch(now);
        let len = self.buckets.len() as u64;
        let bucket = &mut self.buckets[(epoch % len) as usize];
        if bucket.epoch != epoch {
            *bucket = Bucket {
                epoch,
                ..Bucket::default()
            };
        }
        bucket
    }

    pub fn record_success(&mut self, now: Instant) {
        self.current(now).successes += 1;
    }

    pub fn record_failure(&mut self, now: Instant) {
        self.current(now).failures += 1;
    }

    pub fn totals(&self, now: Instant) -> WindowTotals {
        let epoch = self.epoch(now);
        let len = self.buckets.len() as u64;
        self.buckets
            .iter()
            .filter(|b| b.epoch <= epoch && epoch - b.epoch < len)
            .fold(WindowTotals::default(), |acc, b| WindowTotals {
                requests: acc.requests + b.successes + b.failures,
                failures: acc.failures + b.failures,
            })
    }

    pub fn reset(&mut self) {
        self.buckets.iter_mut().for_each(|b| *b = Bucket::default());
    }
}
