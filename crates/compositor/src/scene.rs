//! Scene: an ordered set of sources composited into one output stream.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use simpleobs_common::config::AppConfig;
use simpleobs_common::error::{ObsError, ObsResult};
use simpleobs_media::component::{same_component, SourceRef};
use simpleobs_media::frame::{AudioFrame, PixelFormat, VideoFrame};

use crate::audio::AudioMixer;
use crate::video::composite_over;

static NEXT_SCENE_ID: AtomicU64 = AtomicU64::new(1);

/// Output format of a scene: canvas size and mixed audio layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SceneConfig {
    /// Canvas width in pixels.
    pub width: u32,
    /// Canvas height in pixels.
    pub height: u32,
    /// Mix sample rate in Hz.
    pub sample_rate: u32,
    /// Mix channel count.
    pub channels: u16,
    /// Samples per channel produced by one audio render.
    pub samples_per_frame: usize,
}

impl SceneConfig {
    /// Derive the scene format from the application config.
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

impl Default for SceneConfig {
    fn default() -> Self {
        Self::from_app_config(&AppConfig::default())
    }
}

/// Lifecycle state of a scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SceneState {
    /// Created but never initialized.
    Uninitialized,
    /// Ready to render.
    Initialized,
    /// Shut down; every owned source has been stopped. Can be re-initialized.
    Shutdown,
}

struct SceneItem {
    source: SourceRef,
    gain: f32,
    video: VideoFrame,
    audio: AudioFrame,
    audio_mismatch: bool,
}

impl SceneItem {
    fn new(source: SourceRef) -> Self {
        Self {
            source,
            gain: 1.0,
            video: VideoFrame::default(),
            audio: AudioFrame::default(),
            audio_mismatch: false,
        }
    }
}

struct SceneInner {
    state: SceneState,
    items: Vec<SceneItem>,
    canvas: VideoFrame,
    mixer: AudioMixer,
}

/// A named composition unit.
///
/// Every operation takes the scene lock for its whole duration, so a render
/// never observes the source list mid-mutation. Source callbacks run under
/// that lock and must not call back into the same scene.
pub struct Scene {
    name: String,
    id: String,
    config: SceneConfig,
    inner: Mutex<SceneInner>,
}

impl Scene {
    /// Create an uninitialized scene.
    pub fn new(name: impl Into<String>, config: SceneConfig) -> Self {
        let name = name.into();
        let id = format!("scene-{}", NEXT_SCENE_ID.fetch_add(1, Ordering::Relaxed));
        tracing::debug!(scene = %name, %id, "Scene constructed");
        Self {
            name,
            id,
            config,
            inner: Mutex::new(SceneInner {
                state: SceneState::Uninitialized,
                items: Vec::new(),
                canvas: VideoFrame::default(),
                mixer: AudioMixer::new(config.sample_rate, config.channels, 0),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Process-unique identifier.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn config(&self) -> &SceneConfig {
        &self.config
    }

    pub fn state(&self) -> SceneState {
        self.lock().state
    }

    pub fn is_initialized(&self) -> bool {
        self.state() == SceneState::Initialized
    }

    /// Allocate render buffers and make the scene renderable.
    ///
    /// Succeeds without doing anything if already initialized.
    pub fn initialize(&self) -> ObsResult<()> {
        let mut inner = self.lock();
        if inner.state == SceneState::Initialized {
            tracing::debug!(scene = %self.name, "Scene already initialized");
            return Ok(());
        }
        if self.name.trim().is_empty() {
            return Err(ObsError::invalid_argument("scene name must not be empty"));
        }
        if self.config.width == 0 || self.config.height == 0 {
            return Err(ObsError::invalid_argument(format!(
                "scene {} has an empty canvas",
                self.name
            )));
        }

        tracing::info!(
            scene = %self.name,
            width = self.config.width,
            height = self.config.height,
            sample_rate = self.config.sample_rate,
            channels = self.config.channels,
            "Scene initializing"
        );
        inner.canvas = VideoFrame::new(self.config.width, self.config.height, PixelFormat::Rgba8);
        inner.mixer = AudioMixer::new(
            self.config.sample_rate,
            self.config.channels,
            self.config.samples_per_frame,
        );
        inner.state = SceneState::Initialized;
        Ok(())
    }

    /// Stop every active source and release render buffers.
    ///
    /// No-op unless the scene is initialized.
    pub fn shutdown(&self) {
        let mut inner = self.lock();
        if inner.state != SceneState::Initialized {
            return;
        }

        tracing::info!(scene = %self.name, "Scene shutting down");
        for item in &inner.items {
            if item.source.is_active() {
                item.source.stop();
            }
        }
        inner.canvas = VideoFrame::default();
        inner.mixer = AudioMixer::new(self.config.sample_rate, self.config.channels, 0);
        inner.state = SceneState::Shutdown;
    }

    /// Append a source on top of the Z-order with unity gain.
    ///
    /// The same instance can only be added once; a second add reports
    /// [`ObsError::AlreadyExists`] and leaves the scene unchanged.
    pub fn add_source(&self, source: SourceRef) -> ObsResult<()> {
        let mut inner = self.lock();
        if inner
            .items
            .iter()
            .any(|item| same_component(&item.source, &source))
        {
            tracing::warn!(scene = %self.name, source = %source.name(), "Source already in scene");
            return Err(ObsError::AlreadyExists {
                what: format!("source {} in scene {}", source.name(), self.name),
            });
        }

        tracing::info!(scene = %self.name, source = %source.name(), id = %source.id(), "Source added");
        inner.items.push(SceneItem::new(source));
        Ok(())
    }

    /// Detach a source, stopping it first if it is active.
    ///
    /// Returns false if the source was not part of the scene.
    pub fn remove_source(&self, source: &SourceRef) -> bool {
        let mut inner = self.lock();
        let Some(index) = inner
            .items
            .iter()
            .position(|item| same_component(&item.source, source))
        else {
            return false;
        };

        if source.is_active() {
            source.stop();
        }
        inner.items.remove(index);
        tracing::info!(scene = %self.name, source = %source.name(), id = %source.id(), "Source removed");
        true
    }

    /// Composite every active source onto the canvas, bottom to top, and copy
    /// the result into `frame`.
    ///
    /// Returns the number of sources that contributed. Sources that fail to
    /// produce a usable frame are skipped. `frame` is only written on success.
    pub fn render_video(&self, frame: &mut VideoFrame) -> ObsResult<usize> {
        let mut guard = self.lock();
        self.check_renderable(&guard)?;

        let SceneInner { items, canvas, .. } = &mut *guard;
        canvas.fill([0, 0, 0, 0]);

        let mut contributed = 0;
        let mut newest_us = 0;
        for item in items.iter_mut() {
            if !item.source.is_active() {
                continue;
            }
            if let Err(e) = item.source.video_frame(&mut item.video) {
                tracing::trace!(scene = %self.name, source = %item.source.name(), error = %e, "No video frame");
                continue;
            }
            if let Err(e) = composite_over(canvas, &item.video) {
                tracing::debug!(scene = %self.name, source = %item.source.name(), error = %e, "Skipping video frame");
                continue;
            }
            newest_us = newest_us.max(item.video.timestamp_us);
            contributed += 1;
        }

        if contributed == 0 {
            return Err(ObsError::NoFrames {
                scene: self.name.clone(),
            });
        }

        frame.clone_from(canvas);
        frame.timestamp_us = newest_us;
        Ok(contributed)
    }

    /// Mix every active source with its gain and clip the result into `frame`.
    ///
    /// Sources whose sample rate or channel count differ from the scene's are
    /// left out of the mix. Returns the number of contributing sources.
    pub fn render_audio(&self, frame: &mut AudioFrame) -> ObsResult<usize> {
        let mut guard = self.lock();
        self.check_renderable(&guard)?;

        let SceneInner { items, mixer, .. } = &mut *guard;
        mixer.clear();

        let mut contributed = 0;
        let mut newest_us = 0;
        for item in items.iter_mut() {
            if !item.source.is_active() {
                continue;
            }
            if let Err(e) = item.source.audio_frame(&mut item.audio) {
                tracing::trace!(scene = %self.name, source = %item.source.name(), error = %e, "No audio frame");
                continue;
            }
            match mixer.accumulate(&item.audio, item.gain) {
                Ok(()) => {
                    item.audio_mismatch = false;
                    newest_us = newest_us.max(item.audio.timestamp_us);
                    contributed += 1;
                }
                Err(e) => {
                    if !item.audio_mismatch {
                        tracing::warn!(
                            scene = %self.name,
                            source = %item.source.name(),
                            error = %e,
                            "Excluding source from audio mix"
                        );
                    }
                    item.audio_mismatch = true;
                }
            }
        }

        if contributed == 0 {
            return Err(ObsError::NoFrames {
                scene: self.name.clone(),
            });
        }

        mixer.finish(frame);
        frame.timestamp_us = newest_us;
        Ok(contributed)
    }

    /// Set the linear mix gain of a source.
    pub fn set_source_gain(&self, source: &SourceRef, gain: f32) -> ObsResult<()> {
        if !gain.is_finite() || gain < 0.0 {
            return Err(ObsError::invalid_argument(format!(
                "gain must be a finite non-negative number, got {gain}"
            )));
        }
        let mut inner = self.lock();
        let item = inner
            .items
            .iter_mut()
            .find(|item| same_component(&item.source, source))
            .ok_or_else(|| ObsError::SourceNotFound {
                scene: self.name.clone(),
            })?;
        item.gain = gain;
        Ok(())
    }

    pub fn source_gain(&self, source: &SourceRef) -> Option<f32> {
        self.lock()
            .items
            .iter()
            .find(|item| same_component(&item.source, source))
            .map(|item| item.gain)
    }

    pub fn source_count(&self) -> usize {
        self.lock().items.len()
    }

    /// Source at a Z-order position (0 is the bottom layer).
    pub fn source(&self, index: usize) -> Option<SourceRef> {
        self.lock().items.get(index).map(|item| item.source.clone())
    }

    /// First source with the given name, bottom to top.
    pub fn find_source(&self, name: &str) -> Option<SourceRef> {
        self.lock()
            .items
            .iter()
            .find(|item| item.source.name() == name)
            .map(|item| item.source.clone())
    }

    pub fn contains_source(&self, source: &SourceRef) -> bool {
        self.lock()
            .items
            .iter()
            .any(|item| same_component(&item.source, source))
    }

    /// Snapshot of the sources in Z-order.
    pub fn sources(&self) -> Vec<SourceRef> {
        self.lock()
            .items
            .iter()
            .map(|item| item.source.clone())
            .collect()
    }

    fn check_renderable(&self, inner: &SceneInner) -> ObsResult<()> {
        if inner.state != SceneState::Initialized {
            return Err(ObsError::not_initialized(format!("scene {}", self.name)));
        }
        if inner.items.is_empty() {
            return Err(ObsError::EmptyScene {
                scene: self.name.clone(),
            });
        }
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, SceneInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for Scene {
    fn drop(&mut self) {
        self.shutdown();
        tracing::debug!(scene = %self.name, "Scene destroyed");
    }
}

impl fmt::Debug for Scene {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.lock();
        f.debug_struct("Scene")
            .field("name", &self.name)
            .field("id", &self.id)
            .field("state", &inner.state)
            .field("sources", &inner.items.len())
            .finish()
    }
}
