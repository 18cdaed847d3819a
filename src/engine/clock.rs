//! Absolute-deadline frame pacing.
//!
//! Sleeping a fixed duration per tick accumulates drift (render time adds
//! to the period). `FrameClock` instead advances an absolute deadline by
//! the period each tick, so render-time jitter does not shift the frame
//! rate. If a tick overruns by more than one full period the deadline is
//! re-anchored to now rather than replaying missed frames.

use std::time::{Duration, Instant};

pub struct FrameClock {
    period: Duration,
    next: Instant,
}

impl FrameClock {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            next: Instant::now() + period,
        }
    }

    pub fn from_millis(ms: u32) -> Self {
        Self::new(Duration::from_millis(u64::from(ms.max(1))))
    }

    /// Sleep until the next deadline, then advance it by one period.
    pub fn wait(&mut self) {
        let now = Instant::now();
        if now < self.next {
            std::thread::sleep(self.next - now);
        }
        self.next += self.period;
        // Overran past the advanced deadline: skip, don't replay.
        if self.next < Instant::now() {
            self.next = Instant::now() + self.period;
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paces_at_roughly_the_period() {
        let mut clock = FrameClock::from_millis(10);
        let start = Instant::now();
        for _ in 0..5 {
            clock.wait();
        }
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(45), "elapsed {elapsed:?}");
        // generous upper bound for loaded CI machines
        assert!(elapsed < Duration::from_millis(500), "elapsed {elapsed:?}");
    }

    #[test]
    fn reanchors_after_overrun() {
        let mut clock = FrameClock::from_millis(5);
        std::thread::sleep(Duration::from_millis(30));
        // A long stall must not cause a burst of back-to-back frames.
        let start = Instant::now();
        clock.wait();
        clock.wait();
        assert!(start.elapsed() >= Duration::from_millis(4));
    }
}
