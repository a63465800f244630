//! The streaming loop run on the pipeline thread.
//!
//! Each tick renders the active scene, runs the filter chain, hands the
//! result to every encoder, and fans the packets out to every active output.
//! A failure in any one stage drops only the work that depended on it.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use simpleobs_common::clock::{FramePacer, PacerDecision, StreamClock};
use simpleobs_common::error::{ObsError, ObsResult};
use simpleobs_media::component::{ComponentId, EncoderRef, OutputRef};
use simpleobs_media::frame::{AudioFrame, EncodedPacket, MediaKind, VideoFrame};

use crate::engine::{write, EngineShared, ProcessingChain};
use crate::health::{HealthMonitor, StatsCounters};

pub(crate) struct PipelineWorker {
    shared: Arc<EngineShared>,
    clock: StreamClock,
    health: HealthMonitor,
    video: VideoFrame,
    audio: AudioFrame,
}

impl PipelineWorker {
    pub fn new(shared: Arc<EngineShared>) -> Self {
        let pipeline = &shared.config.pipeline;
        let health = HealthMonitor::new(pipeline.overrun_alert_ticks, pipeline.output_inactive_ticks);
        Self {
            shared,
            clock: StreamClock::start(),
            health,
            video: VideoFrame::default(),
            audio: AudioFrame::default(),
        }
    }

    /// Tick until the streaming flag is cleared.
    pub fn run(mut self) {
        *write(&self.shared.pipeline_thread) = Some(thread::current().id());
        let interval = self.shared.config.frame_interval();
        let mut pacer = FramePacer::with_interval(interval, Instant::now());
        tracing::debug!(
            interval_us = interval.as_micros() as u64,
            epoch = self.clock.epoch_wall(),
            "Pipeline loop started"
        );

        while self.shared.streaming.load(Ordering::SeqCst) {
            let ticked = panic::catch_unwind(AssertUnwindSafe(|| self.tick()));
            if ticked.is_err() {
                tracing::error!("A pipeline stage panicked; dropping this tick");
                StatsCounters::bump(&self.shared.stats.video_frames_dropped);
                StatsCounters::bump(&self.shared.stats.audio_frames_dropped);
            }

            let now = Instant::now();
            match pacer.finish_tick(now) {
                PacerDecision::Sleep(wait) => self.park_until(now + wait),
                PacerDecision::Overrun {
                    behind,
                    consecutive,
                } => {
                    StatsCounters::bump(&self.shared.stats.overruns);
                    tracing::trace!(behind_us = behind.as_micros() as u64, "Tick overran");
                    if let Some(event) = self.health.observe_overrun(consecutive, behind) {
                        self.shared.emit_health(event);
                    }
                }
            }
        }

        tracing::debug!(
            elapsed_secs = self.clock.elapsed_secs(),
            "Pipeline loop exited"
        );
    }

    /// Sleep until `deadline`, waking early if streaming stops.
    fn park_until(&self, deadline: Instant) {
        while self.shared.streaming.load(Ordering::SeqCst) {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            thread::park_timeout(deadline - now);
        }
    }

    fn tick(&mut self) {
        let shared = Arc::clone(&self.shared);
        let stats = &shared.stats;
        StatsCounters::bump(&stats.ticks);

        let chain = shared.chain_snapshot();
        self.watch_outputs(&chain.outputs);

        let Some(scene) = shared.active_scene() else {
            StatsCounters::bump(&stats.idle_ticks);
            return;
        };
        let pts_us = self.clock.elapsed_us();

        match scene.render_video(&mut self.video) {
            Ok(_) => {
                self.video.timestamp_us = pts_us;
                self.process_video(&chain);
            }
            Err(e) => {
                tracing::trace!(scene = scene.name(), error = %e, "No video this tick");
                StatsCounters::bump(&stats.video_frames_dropped);
            }
        }

        match scene.render_audio(&mut self.audio) {
            Ok(_) => {
                self.audio.timestamp_us = pts_us;
                self.process_audio(&chain);
            }
            Err(e) => {
                tracing::trace!(scene = scene.name(), error = %e, "No audio this tick");
                StatsCounters::bump(&stats.audio_frames_dropped);
            }
        }
    }

    fn process_video(&mut self, chain: &ProcessingChain) {
        let stats = &self.shared.stats;
        for filter in &chain.filters {
            if let Err(e) = filter.process_video(&mut self.video) {
                stage_failed("video_filter", filter.name(), &e);
                StatsCounters::bump(&stats.video_frames_dropped);
                return;
            }
        }
        StatsCounters::bump(&stats.video_frames);

        for encoder in &chain.encoders {
            let packets = encoder.encode_video(&self.video);
            self.deliver(encoder, MediaKind::Video, packets, &chain.outputs);
        }
    }

    fn process_audio(&mut self, chain: &ProcessingChain) {
        let stats = &self.shared.stats;
        for filter in &chain.filters {
            if let Err(e) = filter.process_audio(&mut self.audio) {
                stage_failed("audio_filter", filter.name(), &e);
                StatsCounters::bump(&stats.audio_frames_dropped);
                return;
            }
        }
        StatsCounters::bump(&stats.audio_frames);

        for encoder in &chain.encoders {
            let packets = encoder.encode_audio(&self.audio);
            self.deliver(encoder, MediaKind::Audio, packets, &chain.outputs);
        }
    }

    fn deliver(
        &self,
        encoder: &EncoderRef,
        kind: MediaKind,
        packets: ObsResult<Vec<EncodedPacket>>,
        outputs: &[OutputRef],
    ) {
        let stats = &self.shared.stats;
        let packets = match packets {
            Ok(packets) => packets,
            Err(e) => {
                let stage = match kind {
                    MediaKind::Video => "video_encoder",
                    MediaKind::Audio => "audio_encoder",
                };
                stage_failed(stage, encoder.name(), &e);
                StatsCounters::bump(&stats.encoder_failures);
                return;
            }
        };

        for packet in &packets {
            for output in outputs {
                if !output.is_active() {
                    continue;
                }
                match output.send(packet) {
                    Ok(()) => StatsCounters::bump(&stats.packets_delivered),
                    Err(e) => {
                        stage_failed("output", output.name(), &e);
                        StatsCounters::bump(&stats.output_failures);
                    }
                }
            }
        }
    }

    fn watch_outputs(&mut self, outputs: &[OutputRef]) {
        let ids: Vec<ComponentId> = outputs.iter().map(|output| output.id()).collect();
        self.health.retain_outputs(&ids);
        for (output, id) in outputs.iter().zip(ids) {
            if let Some(event) = self.health.observe_output(id, output.name(), output.is_active()) {
                self.shared.emit_health(event);
            }
        }
    }
}

/// Transient failures log at debug, anything else at warn.
fn stage_failed(stage: &'static str, component: &str, error: &ObsError) {
    if error.is_transient() {
        tracing::debug!(stage, component, error = %error, "Stage failed; frame dropped");
    } else {
        tracing::warn!(stage, component, error = %error, "Stage failed; frame dropped");
    }
}
