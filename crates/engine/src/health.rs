//! Pipeline statistics and sustained-degradation signals.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use simpleobs_media::component::ComponentId;

/// Runtime statistics for the current (or last) streaming session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PipelineStats {
    /// Loop iterations executed.
    pub ticks: u64,

    /// Ticks with no active scene.
    pub idle_ticks: u64,

    /// Video frames that made it through the filter chain.
    pub video_frames: u64,

    /// Video frames lost to a render or filter failure.
    pub video_frames_dropped: u64,

    /// Audio frames that made it through the filter chain.
    pub audio_frames: u64,

    /// Audio frames lost to a render or filter failure.
    pub audio_frames_dropped: u64,

    /// Encode calls that returned an error.
    pub encoder_failures: u64,

    /// Packets accepted by an output.
    pub packets_delivered: u64,

    /// Packets an output rejected.
    pub output_failures: u64,

    /// Ticks that finished past their deadline.
    pub overruns: u64,
}

impl PipelineStats {
    /// Frame drop rate (video and audio combined) as a percentage.
    pub fn drop_rate(&self) -> f64 {
        let dropped = self.video_frames_dropped + self.audio_frames_dropped;
        let total = self.video_frames + self.audio_frames + dropped;
        if total == 0 {
            return 0.0;
        }
        dropped as f64 / total as f64 * 100.0
    }
}

/// Lock-free counters written by the pipeline thread.
#[derive(Debug, Default)]
pub(crate) struct StatsCounters {
    pub ticks: AtomicU64,
    pub idle_ticks: AtomicU64,
    pub video_frames: AtomicU64,
    pub video_frames_dropped: AtomicU64,
    pub audio_frames: AtomicU64,
    pub audio_frames_dropped: AtomicU64,
    pub encoder_failures: AtomicU64,
    pub packets_delivered: AtomicU64,
    pub output_failures: AtomicU64,
    pub overruns: AtomicU64,
}

impl StatsCounters {
    #[inline]
    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> PipelineStats {
        let get = |c: &AtomicU64| c.load(Ordering::Relaxed);
        PipelineStats {
            ticks: get(&self.ticks),
            idle_ticks: get(&self.idle_ticks),
            video_frames: get(&self.video_frames),
            video_frames_dropped: get(&self.video_frames_dropped),
            audio_frames: get(&self.audio_frames),
            audio_frames_dropped: get(&self.audio_frames_dropped),
            encoder_failures: get(&self.encoder_failures),
            packets_delivered: get(&self.packets_delivered),
            output_failures: get(&self.output_failures),
            overruns: get(&self.overruns),
        }
    }

    pub fn reset(&self) {
        for counter in [
            &self.ticks,
            &self.idle_ticks,
            &self.video_frames,
            &self.video_frames_dropped,
            &self.audio_frames,
            &self.audio_frames_dropped,
            &self.encoder_failures,
            &self.packets_delivered,
            &self.output_failures,
            &self.overruns,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

/// A sustained degradation observed by the pipeline thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum HealthEvent {
    /// The loop has missed its deadline for many ticks in a row.
    SustainedOverrun {
        consecutive_ticks: u32,
        /// How far past its deadline the latest tick finished.
        last_tick_behind: Duration,
    },

    /// A registered output has stayed inactive while streaming.
    OutputInactive { output: String, ticks: u32 },
}

/// Receives health events on the pipeline thread. Must not block.
///
/// A panic inside the callback is caught and logged. The callback may
/// replace or clear itself and may call
/// [`Engine::stop_streaming`](crate::Engine::stop_streaming);
/// [`Engine::start_streaming`](crate::Engine::start_streaming) is refused.
pub type HealthCallback = Arc<dyn Fn(&HealthEvent) + Send + Sync>;

/// Edge-triggered detector for [`HealthEvent`]s.
///
/// Each condition fires once when its streak reaches the threshold and
/// re-arms when the streak ends.
#[derive(Debug)]
pub(crate) struct HealthMonitor {
    overrun_alert_ticks: u32,
    output_inactive_ticks: u32,
    inactive_streaks: HashMap<ComponentId, u32>,
}

impl HealthMonitor {
    pub fn new(overrun_alert_ticks: u32, output_inactive_ticks: u32) -> Self {
        Self {
            overrun_alert_ticks: overrun_alert_ticks.max(1),
            output_inactive_ticks: output_inactive_ticks.max(1),
            inactive_streaks: HashMap::new(),
        }
    }

    /// Feed one overrunning tick. `consecutive` restarts at 1 after any
    /// on-time tick, so equality fires once per streak.
    pub fn observe_overrun(&self, consecutive: u32, behind: Duration) -> Option<HealthEvent> {
        (consecutive == self.overrun_alert_ticks).then_some(HealthEvent::SustainedOverrun {
            consecutive_ticks: consecutive,
            last_tick_behind: behind,
        })
    }

    /// Feed one tick's activity state for an output.
    pub fn observe_output(&mut self, id: ComponentId, name: &str, active: bool) -> Option<HealthEvent> {
        if active {
            self.inactive_streaks.remove(&id);
            return None;
        }

        let streak = self.inactive_streaks.entry(id).or_insert(0);
        *streak = streak.saturating_add(1);
        (*streak == self.output_inactive_ticks).then(|| HealthEvent::OutputInactive {
            output: name.to_string(),
            ticks: *streak,
        })
    }

    /// Forget outputs that are no longer part of the chain.
    pub fn retain_outputs(&mut self, ids: &[ComponentId]) {
        self.inactive_streaks.retain(|id, _| ids.contains(id));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drop_rate() {
        let stats = PipelineStats {
            video_frames: 90,
            video_frames_dropped: 5,
            audio_frames: 100,
            audio_frames_dropped: 5,
            ..Default::default()
        };
        assert!((stats.drop_rate() - 5.0).abs() < 1e-9);
        assert_eq!(PipelineStats::default().drop_rate(), 0.0);
    }

    #[test]
    fn test_counters_snapshot_and_reset() {
        let counters = StatsCounters::default();
        StatsCounters::bump(&counters.ticks);
        StatsCounters::bump(&counters.ticks);
        StatsCounters::bump(&counters.output_failures);

        let stats = counters.snapshot();
        assert_eq!(stats.ticks, 2);
        assert_eq!(stats.output_failures, 1);

        counters.reset();
        assert_eq!(counters.snapshot(), PipelineStats::default());
    }

    #[test]
    fn test_overrun_fires_once_per_streak() {
        let monitor = HealthMonitor::new(3, 10);
        let behind = Duration::from_millis(4);
        assert!(monitor.observe_overrun(1, behind).is_none());
        assert!(monitor.observe_overrun(2, behind).is_none());
        assert_eq!(
            monitor.observe_overrun(3, behind),
            Some(HealthEvent::SustainedOverrun {
                consecutive_ticks: 3,
                last_tick_behind: behind
            })
        );
        assert!(monitor.observe_overrun(4, behind).is_none());
        // New streak after an on-time tick.
        assert!(monitor.observe_overrun(3, behind).is_some());
    }

    #[test]
    fn test_inactive_output_fires_once_and_rearms() {
        let mut monitor = HealthMonitor::new(3, 2);
        let rtmp = ComponentId::next();
        assert!(monitor.observe_output(rtmp, "rtmp", false).is_none());
        assert_eq!(
            monitor.observe_output(rtmp, "rtmp", false),
            Some(HealthEvent::OutputInactive {
                output: "rtmp".into(),
                ticks: 2
            })
        );
        assert!(monitor.observe_output(rtmp, "rtmp", false).is_none());

        assert!(monitor.observe_output(rtmp, "rtmp", true).is_none());
        assert!(monitor.observe_output(rtmp, "rtmp", false).is_none());
        assert!(monitor.observe_output(rtmp, "rtmp", false).is_some());
    }

    #[test]
    fn test_outputs_are_tracked_independently() {
        let mut monitor = HealthMonitor::new(3, 1);
        let (a, b) = (ComponentId::next(), ComponentId::next());
        assert!(monitor.observe_output(a, "a", false).is_some());
        assert!(monitor.observe_output(b, "b", false).is_some());

        monitor.retain_outputs(&[b]);
        assert!(monitor.observe_output(a, "a", false).is_some());
        assert!(monitor.observe_output(b, "b", false).is_none());
    }

    #[test]
    fn test_event_serializes_with_tag() {
        let event = HealthEvent::OutputInactive {
            output: "file".into(),
            ticks: 120,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "output_inactive");
        assert_eq!(json["ticks"], 120);
    }
}
