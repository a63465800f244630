//! Clock and pacing utilities for the streaming loop.
//!
//! Every frame leaving the pipeline is stamped against a monotonic epoch
//! recorded when streaming starts. The pacer keeps the loop on a fixed tick
//! interval without compounding drift when a tick overruns.

use std::time::{Duration, Instant};

/// A stream clock that provides monotonic microsecond timestamps relative to
/// a fixed epoch (the moment streaming started).
#[derive(Debug, Clone)]
pub struct StreamClock {
    /// The instant streaming started.
    epoch: Instant,

    /// Wall-clock time at epoch (RFC 3339 string).
    epoch_wall: String,
}

impl StreamClock {
    /// Create a new stream clock anchored to now.
    pub fn start() -> Self {
        Self {
            epoch: Instant::now(),
            epoch_wall: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Microseconds elapsed since the epoch.
    pub fn elapsed_us(&self) -> u64 {
        self.epoch.elapsed().as_micros() as u64
    }

    /// Seconds elapsed since the epoch.
    pub fn elapsed_secs(&self) -> f64 {
        self.epoch.elapsed().as_secs_f64()
    }

    /// Wall-clock time at epoch.
    pub fn epoch_wall(&self) -> &str {
        &self.epoch_wall
    }
}

/// What the loop should do after finishing a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacerDecision {
    /// The tick finished early; wait until the next deadline.
    Sleep(Duration),
    /// The tick ran past its deadline; start the next one immediately.
    Overrun {
        /// How far past the deadline the tick finished.
        behind: Duration,
        /// Overrunning ticks in a row, including this one.
        consecutive: u32,
    },
}

/// Fixed-interval tick scheduler.
#[derive(Debug)]
pub struct FramePacer {
    interval: Duration,
    next_deadline: Instant,
    consecutive_overruns: u32,
}

impl FramePacer {
    /// Create a pacer targeting the given tick rate, with the first deadline
    /// one interval after `start`.
    pub fn new(target_hz: u32, start: Instant) -> Self {
        Self::with_interval(
            Duration::from_nanos(1_000_000_000 / target_hz.max(1) as u64),
            start,
        )
    }

    pub fn with_interval(interval: Duration, start: Instant) -> Self {
        Self {
            interval,
            next_deadline: start + interval,
            consecutive_overruns: 0,
        }
    }

    /// Decide how to continue after a tick that finished at `now`.
    ///
    /// An overrun re-anchors the schedule to `now`, so one slow tick never
    /// forces a burst of catch-up ticks.
    pub fn finish_tick(&mut self, now: Instant) -> PacerDecision {
        if now < self.next_deadline {
            let wait = self.next_deadline - now;
            self.next_deadline += self.interval;
            self.consecutive_overruns = 0;
            PacerDecision::Sleep(wait)
        } else {
            let behind = now - self.next_deadline;
            self.next_deadline = now + self.interval;
            self.consecutive_overruns = self.consecutive_overruns.saturating_add(1);
            PacerDecision::Overrun {
                behind,
                consecutive: self.consecutive_overruns,
            }
        }
    }

    /// Deadline of the tick currently being scheduled.
    pub fn next_deadline(&self) -> Instant {
        self.next_deadline
    }

    /// Target interval.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn consecutive_overruns(&self) -> u32 {
        self.consecutive_overruns
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_elapsed() {
        let clock = StreamClock::start();
        assert!(clock.elapsed_us() < 1_000_000);
        assert!(!clock.epoch_wall().is_empty());
    }

    #[test]
    fn test_pacer_sleeps_until_deadline() {
        let start = Instant::now();
        let mut pacer = FramePacer::with_interval(Duration::from_millis(16), start);
        let decision = pacer.finish_tick(start + Duration::from_millis(4));
        assert_eq!(decision, PacerDecision::Sleep(Duration::from_millis(12)));
        assert_eq!(pacer.next_deadline(), start + Duration::from_millis(32));
    }

    #[test]
    fn test_pacer_overrun_reanchors_schedule() {
        let start = Instant::now();
        let mut pacer = FramePacer::with_interval(Duration::from_millis(16), start);

        let late = start + Duration::from_millis(50);
        let decision = pacer.finish_tick(late);
        assert_eq!(
            decision,
            PacerDecision::Overrun {
                behind: Duration::from_millis(34),
                consecutive: 1
            }
        );
        // No catch-up burst: the next deadline is one interval after the late tick.
        assert_eq!(pacer.next_deadline(), late + Duration::from_millis(16));

        let decision = pacer.finish_tick(late + Duration::from_millis(20));
        assert!(matches!(
            decision,
            PacerDecision::Overrun { consecutive: 2, .. }
        ));

        let decision = pacer.finish_tick(late + Duration::from_millis(21));
        assert!(matches!(decision, PacerDecision::Sleep(_)));
        assert_eq!(pacer.consecutive_overruns(), 0);
    }

    #[test]
    fn test_pacer_rate_to_interval() {
        let pacer = FramePacer::new(60, Instant::now());
        assert_eq!(pacer.interval(), Duration::from_nanos(16_666_666));
    }
}
