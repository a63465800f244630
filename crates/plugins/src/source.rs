//! Generated sources: a solid color card and a sine tone.

use std::f64::consts::TAU;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

use simpleobs_common::config::AppConfig;
use simpleobs_common::error::{ObsError, ObsResult};
use simpleobs_media::component::{Component, ComponentId, Source};
use simpleobs_media::frame::{AudioFrame, PixelFormat, VideoFrame};

use crate::{COLOR_SOURCE, TONE_SOURCE};

/// Frame geometry a generated source produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediaFormat {
    pub width: u32,
    pub height: u32,
    pub sample_rate: u32,
    pub channels: u16,
    pub samples_per_frame: usize,
}

impl MediaFormat {
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            width: config.video.width,
            height: config.video.height,
            sample_rate: config.audio.sample_rate,
            channels: config.audio.channels,
            samples_per_frame: config.samples_per_frame(),
        }
    }
}

impl Default for MediaFormat {
    fn default() -> Self {
        Self::from_app_config(&AppConfig::default())
    }
}

/// Opaque red, the classic "no signal" card.
pub const DEFAULT_COLOR: [u8; 4] = [255, 0, 0, 255];

/// Solid color video with silent audio.
#[derive(Debug)]
pub struct ColorSource {
    id: ComponentId,
    name: String,
    format: MediaFormat,
    color: Mutex<[u8; 4]>,
    active: AtomicBool,
}

impl ColorSource {
    /// A red card, active immediately.
    pub fn new(name: impl Into<String>, format: MediaFormat) -> Self {
        Self {
            id: ComponentId::next(),
            name: name.into(),
            format,
            color: Mutex::new(DEFAULT_COLOR),
            active: AtomicBool::new(true),
        }
    }

    pub fn with_color(self, rgba: [u8; 4]) -> Self {
        self.set_color(rgba);
        self
    }

    pub fn set_color(&self, rgba: [u8; 4]) {
        *self.color.lock().unwrap_or_else(|e| e.into_inner()) = rgba;
    }

    pub fn color(&self) -> [u8; 4] {
        *self.color.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Component for ColorSource {
    fn id(&self) -> ComponentId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn component_type(&self) -> &str {
        COLOR_SOURCE
    }

    fn initialize(&self) -> ObsResult<()> {
        if self.format.width == 0 || self.format.height == 0 {
            return Err(ObsError::source(format!(
                "{}: cannot generate a {}x{} frame",
                self.name, self.format.width, self.format.height
            )));
        }
        Ok(())
    }
}

impl Source for ColorSource {
    fn video_frame(&self, frame: &mut VideoFrame) -> ObsResult<()> {
        frame.reshape(self.format.width, self.format.height, PixelFormat::Rgba8);
        frame.fill(self.color());
        Ok(())
    }

    fn audio_frame(&self, frame: &mut AudioFrame) -> ObsResult<()> {
        frame.reshape(
            self.format.sample_rate,
            self.format.channels,
            self.format.samples_per_frame,
        );
        Ok(())
    }

    fn start(&self) {
        self.active.store(true, Ordering::SeqCst);
    }

    fn stop(&self) {
        self.active.store(false, Ordering::SeqCst);
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}

/// Continuous sine tone on every channel. Produces no video.
#[derive(Debug)]
pub struct ToneSource {
    id: ComponentId,
    name: String,
    format: MediaFormat,
    frequency_hz: f64,
    amplitude: f32,
    /// Sample index of the next frame, so the phase is continuous.
    position: AtomicU64,
    active: AtomicBool,
}

impl ToneSource {
    pub const DEFAULT_FREQUENCY_HZ: f64 = 440.0;
    pub const DEFAULT_AMPLITUDE: f32 = 0.25;

    pub fn new(name: impl Into<String>, format: MediaFormat) -> Self {
        Self {
            id: ComponentId::next(),
            name: name.into(),
            format,
            frequency_hz: Self::DEFAULT_FREQUENCY_HZ,
            amplitude: Self::DEFAULT_AMPLITUDE,
            position: AtomicU64::new(0),
            active: AtomicBool::new(true),
        }
    }

    pub fn with_frequency(mut self, frequency_hz: f64) -> Self {
        self.frequency_hz = frequency_hz;
        self
    }

    /// Peak amplitude, clamped to `[0, 1]`.
    pub fn with_amplitude(mut self, amplitude: f32) -> Self {
        self.amplitude = amplitude.clamp(0.0, 1.0);
        self
    }

    pub fn frequency_hz(&self) -> f64 {
        self.frequency_hz
    }

    pub fn amplitude(&self) -> f32 {
        self.amplitude
    }
}

impl Component for ToneSource {
    fn id(&self) -> ComponentId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn component_type(&self) -> &str {
        TONE_SOURCE
    }

    fn initialize(&self) -> ObsResult<()> {
        let nyquist = self.format.sample_rate as f64 / 2.0;
        if !(self.frequency_hz > 0.0 && self.frequency_hz < nyquist) {
            return Err(ObsError::source(format!(
                "{}: tone frequency {} Hz is outside (0, {nyquist})",
                self.name, self.frequency_hz
            )));
        }
        Ok(())
    }
}

impl Source for ToneSource {
    fn video_frame(&self, _frame: &mut VideoFrame) -> ObsResult<()> {
        Err(ObsError::source(format!("{} is audio-only", self.name)))
    }

    fn audio_frame(&self, frame: &mut AudioFrame) -> ObsResult<()> {
        let samples = self.format.samples_per_frame;
        frame.reshape(self.format.sample_rate, self.format.channels, samples);

        let start = self.position.fetch_add(samples as u64, Ordering::Relaxed);
        let step = TAU * self.frequency_hz / self.format.sample_rate as f64;
        let Some((first, rest)) = frame.channels.split_first_mut() else {
            return Ok(());
        };
        for (i, sample) in first.iter_mut().enumerate() {
            let phase = step * (start + i as u64) as f64;
            *sample = (phase.sin() as f32) * self.amplitude;
        }
        for channel in rest {
            channel.copy_from_slice(first);
        }
        Ok(())
    }

    fn start(&self) {
        self.active.store(true, Ordering::SeqCst);
    }

    fn stop(&self) {
        self.active.store(false, Ordering::SeqCst);
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}
